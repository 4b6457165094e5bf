use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::model::arn::{Arn, ResourceKind};

/// Tags live as a JSONB column on each entity's own table rather than a
/// shared `tags` table — ECS tag operations are rare and single-entity, so
/// the extra join a normalized schema would need buys nothing (spec.md §3,
/// supplemental `TagResource`/`UntagResource`/`ListTagsForResource`).
fn table_for(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Cluster => "clusters",
        ResourceKind::Service => "services",
        ResourceKind::Task => "tasks",
        ResourceKind::TaskDefinition => "task_definitions",
    }
}

fn arn_column(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Task => "task_arn",
        _ => "arn",
    }
}

fn resolve(resource_arn: &str) -> Result<(ResourceKind, &'static str, &'static str), sqlx::Error> {
    let (kind, _) = Arn::parse(resource_arn).ok_or_else(|| {
        sqlx::Error::Protocol(format!("not a recognizable ARN: {resource_arn}"))
    })?;
    Ok((kind, table_for(kind), arn_column(kind)))
}

pub async fn merge_tags(
    pool: &PgPool,
    resource_arn: &str,
    tags: &HashMap<String, String>,
) -> Result<(), sqlx::Error> {
    let (_, table, column) = resolve(resource_arn)?;
    let sql = format!(
        "UPDATE {table} SET tags = tags || $2::jsonb, updated_at = now() WHERE {column} = $1"
    );
    sqlx::query(&sql)
        .bind(resource_arn)
        .bind(sqlx::types::Json(tags))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn remove_tags(pool: &PgPool, resource_arn: &str, keys: &[String]) -> Result<(), sqlx::Error> {
    let (_, table, column) = resolve(resource_arn)?;
    let sql = format!(
        "UPDATE {table} SET tags = tags - $2::text[], updated_at = now() WHERE {column} = $1"
    );
    sqlx::query(&sql)
        .bind(resource_arn)
        .bind(keys)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_tags(pool: &PgPool, resource_arn: &str) -> Result<Vec<(String, String)>, sqlx::Error> {
    let (_, table, column) = resolve(resource_arn)?;
    let sql = format!("SELECT tags FROM {table} WHERE {column} = $1");
    let row: Option<sqlx::types::Json<HashMap<String, String>>> =
        sqlx::query_scalar(&sql).bind(resource_arn).fetch_optional(pool).await?;
    Ok(row.map(|Json(map)| map.into_iter().collect()).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::clusters;
    use crate::model::Tags;

    #[sqlx::test]
    async fn merge_then_remove_tags_round_trips(pool: PgPool) -> Result<(), sqlx::Error> {
        let cluster = clusters::create(&pool, "default", "arn:aws:ecs:us-east-1:000000000000:cluster/default", "kecs-default", &Tags::default()).await?;

        let mut tags = HashMap::new();
        tags.insert("env".to_string(), "prod".to_string());
        tags.insert("team".to_string(), "platform".to_string());
        merge_tags(&pool, &cluster.arn, &tags).await?;

        let listed: HashMap<_, _> = list_tags(&pool, &cluster.arn).await?.into_iter().collect();
        assert_eq!(listed.get("env"), Some(&"prod".to_string()));
        assert_eq!(listed.get("team"), Some(&"platform".to_string()));

        remove_tags(&pool, &cluster.arn, &["team".to_string()]).await?;
        let listed: HashMap<_, _> = list_tags(&pool, &cluster.arn).await?.into_iter().collect();
        assert_eq!(listed.get("env"), Some(&"prod".to_string()));
        assert!(!listed.contains_key("team"));
        Ok(())
    }
}
