use sqlx::PgPool;
use uuid::Uuid;

use crate::model::{Cluster, ClusterStatus, Tags};

/// Idempotent create: concurrent `CreateCluster` calls for the same name race
/// harmlessly to a single row via `ON CONFLICT ... DO UPDATE`, so the caller
/// never has to serialize around cluster creation (spec.md §8 concurrency
/// invariants).
pub async fn create(
    pool: &PgPool,
    name: &str,
    arn: &str,
    k8s_cluster_name: &str,
    tags: &Tags,
) -> Result<Cluster, sqlx::Error> {
    sqlx::query_as::<_, Cluster>(
        r#"
        INSERT INTO clusters (name, arn, status, k8s_cluster_name, tags)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (name) DO UPDATE SET name = clusters.name
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(arn)
    .bind(ClusterStatus::Provisioning)
    .bind(k8s_cluster_name)
    .bind(sqlx::types::Json(tags.clone()))
    .fetch_one(pool)
    .await
}

pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Cluster>, sqlx::Error> {
    sqlx::query_as::<_, Cluster>("SELECT * FROM clusters WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_arn(pool: &PgPool, arn: &str) -> Result<Option<Cluster>, sqlx::Error> {
    sqlx::query_as::<_, Cluster>("SELECT * FROM clusters WHERE arn = $1")
        .bind(arn)
        .fetch_optional(pool)
        .await
}

/// Accepts either a bare cluster name or a full ARN, per the ECS convention
/// that `cluster` parameters may be either (spec.md §4.1).
pub async fn find_by_name_or_arn(
    pool: &PgPool,
    identifier: &str,
) -> Result<Option<Cluster>, sqlx::Error> {
    if crate::model::arn::Arn::looks_like_arn(identifier) {
        find_by_arn(pool, identifier).await
    } else {
        find_by_name(pool, identifier).await
    }
}

pub async fn list(pool: &PgPool) -> Result<Vec<Cluster>, sqlx::Error> {
    sqlx::query_as::<_, Cluster>("SELECT * FROM clusters ORDER BY created_at")
        .fetch_all(pool)
        .await
}

pub async fn set_status(
    pool: &PgPool,
    id: Uuid,
    status: ClusterStatus,
) -> Result<Cluster, sqlx::Error> {
    sqlx::query_as::<_, Cluster>(
        "UPDATE clusters SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(status)
    .fetch_one(pool)
    .await
}

/// Recomputes the denormalized task/service counters on a cluster row from
/// its current children. Called by the reconciler's batch updater after each
/// flush (spec.md §4.3) so `DescribeClusters` never drifts from reality.
pub async fn refresh_counters(pool: &PgPool, cluster_arn: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE clusters SET
            running_tasks_count = (
                SELECT count(*) FROM tasks
                WHERE cluster_arn = $1 AND last_status = 'Running'
            ),
            pending_tasks_count = (
                SELECT count(*) FROM tasks
                WHERE cluster_arn = $1 AND last_status IN ('Provisioning', 'Pending')
            ),
            active_services_count = (
                SELECT count(*) FROM services
                WHERE cluster_arn = $1 AND status = 'Active'
            ),
            updated_at = now()
        WHERE arn = $1
        "#,
    )
    .bind(cluster_arn)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM clusters WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test]
    async fn create_is_idempotent_on_name(pool: PgPool) -> Result<(), sqlx::Error> {
        let first = create(&pool, "default", "arn:aws:ecs:us-east-1:000000000000:cluster/default", "kecs-default", &Tags::default()).await?;
        let second = create(&pool, "default", "arn:aws:ecs:us-east-1:000000000000:cluster/default", "kecs-default", &Tags::default()).await?;
        assert_eq!(first.id, second.id);
        assert_eq!(list(&pool).await?.len(), 1);
        Ok(())
    }

    #[sqlx::test]
    async fn find_by_name_or_arn_accepts_either(pool: PgPool) -> Result<(), sqlx::Error> {
        let arn = "arn:aws:ecs:us-east-1:000000000000:cluster/default";
        let created = create(&pool, "default", arn, "kecs-default", &Tags::default()).await?;

        let by_name = find_by_name_or_arn(&pool, "default").await?.unwrap();
        let by_arn = find_by_name_or_arn(&pool, arn).await?.unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_arn.id, created.id);
        Ok(())
    }

    #[sqlx::test]
    async fn delete_removes_the_row(pool: PgPool) -> Result<(), sqlx::Error> {
        let created = create(&pool, "default", "arn:aws:ecs:us-east-1:000000000000:cluster/default", "kecs-default", &Tags::default()).await?;
        delete(&pool, created.id).await?;
        assert!(find_by_arn(&pool, &created.arn).await?.is_none());
        Ok(())
    }
}
