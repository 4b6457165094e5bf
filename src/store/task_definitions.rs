use chrono::Utc;
use sqlx::PgPool;

use crate::model::arn::Arn;
use crate::model::{ContainerDefinition, NetworkMode, TaskDefinition, TaskDefinitionStatus, Tags};

pub struct RegisterInput<'a> {
    pub family: &'a str,
    pub region: &'a str,
    pub account_id: &'a str,
    pub network_mode: NetworkMode,
    pub container_definitions: Vec<ContainerDefinition>,
    pub volumes: serde_json::Value,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub execution_role_arn: Option<String>,
    pub task_role_arn: Option<String>,
    pub requires_compatibilities: Vec<String>,
    pub placement_constraints: serde_json::Value,
    pub runtime_platform: Option<serde_json::Value>,
    pub proxy_configuration: Option<serde_json::Value>,
    pub tags: Tags,
}

/// Registers a new revision for `input.family`.
///
/// Revision allocation is the one place spec.md §8 calls out a critical
/// section: "next = max(revision) + 1" must be computed and committed
/// atomically per family, or two concurrent `RegisterTaskDefinition` calls
/// could mint the same revision number. We take a transaction-scoped Postgres
/// advisory lock keyed on the family name so only one allocation per family
/// is in flight at a time, across however many `kecs` processes are running
/// against the same database.
pub async fn register(pool: &PgPool, input: RegisterInput<'_>) -> Result<TaskDefinition, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(input.family)
        .execute(&mut *tx)
        .await?;

    let next_revision: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(revision), 0) + 1 FROM task_definitions WHERE family = $1",
    )
    .bind(input.family)
    .fetch_one(&mut *tx)
    .await?;

    let arn = Arn::task_definition(input.region, input.account_id, input.family, next_revision);
    let arn = arn.as_str();

    let task_definition = sqlx::query_as::<_, TaskDefinition>(
        r#"
        INSERT INTO task_definitions (
            family, revision, arn, status, network_mode, container_definitions,
            volumes, cpu, memory, execution_role_arn, task_role_arn,
            requires_compatibilities, placement_constraints, runtime_platform,
            proxy_configuration, tags
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING *
        "#,
    )
    .bind(input.family)
    .bind(next_revision)
    .bind(arn)
    .bind(TaskDefinitionStatus::Active)
    .bind(input.network_mode)
    .bind(sqlx::types::Json(input.container_definitions))
    .bind(sqlx::types::Json(input.volumes))
    .bind(input.cpu)
    .bind(input.memory)
    .bind(input.execution_role_arn)
    .bind(input.task_role_arn)
    .bind(sqlx::types::Json(input.requires_compatibilities))
    .bind(sqlx::types::Json(input.placement_constraints))
    .bind(sqlx::types::Json(input.runtime_platform))
    .bind(sqlx::types::Json(input.proxy_configuration))
    .bind(sqlx::types::Json(input.tags))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(task_definition)
}

pub async fn find_by_family_and_revision(
    pool: &PgPool,
    family: &str,
    revision: i32,
) -> Result<Option<TaskDefinition>, sqlx::Error> {
    sqlx::query_as::<_, TaskDefinition>(
        "SELECT * FROM task_definitions WHERE family = $1 AND revision = $2",
    )
    .bind(family)
    .bind(revision)
    .fetch_optional(pool)
    .await
}

/// The latest ACTIVE revision for a family — what a bare `family` (no
/// `:revision` suffix) resolves to everywhere ECS accepts a task definition
/// identifier (spec.md §3).
pub async fn find_latest_active(
    pool: &PgPool,
    family: &str,
) -> Result<Option<TaskDefinition>, sqlx::Error> {
    sqlx::query_as::<_, TaskDefinition>(
        r#"
        SELECT * FROM task_definitions
        WHERE family = $1 AND status = 'Active'
        ORDER BY revision DESC
        LIMIT 1
        "#,
    )
    .bind(family)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_arn(pool: &PgPool, arn: &str) -> Result<Option<TaskDefinition>, sqlx::Error> {
    sqlx::query_as::<_, TaskDefinition>("SELECT * FROM task_definitions WHERE arn = $1")
        .bind(arn)
        .fetch_optional(pool)
        .await
}

/// Resolves any of the three accepted identifier shapes: bare family
/// (latest active revision), `family:revision`, or full ARN.
pub async fn resolve(pool: &PgPool, identifier: &str) -> Result<Option<TaskDefinition>, sqlx::Error> {
    if crate::model::arn::Arn::looks_like_arn(identifier) {
        return find_by_arn(pool, identifier).await;
    }
    if let Some((family, revision)) = crate::model::arn::Arn::parse_family_revision(identifier) {
        return find_by_family_and_revision(pool, family, revision).await;
    }
    find_latest_active(pool, identifier).await
}

pub async fn list_families(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT DISTINCT family FROM task_definitions ORDER BY family")
        .fetch_all(pool)
        .await
}

pub async fn list_arns_for_family(
    pool: &PgPool,
    family: Option<&str>,
    status: Option<TaskDefinitionStatus>,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT arn FROM task_definitions
        WHERE ($1::text IS NULL OR family = $1)
          AND ($2::text IS NULL OR status = $2)
        ORDER BY family, revision
        "#,
    )
    .bind(family)
    .bind(status.map(|s| s.to_string()))
    .fetch_all(pool)
    .await
}

/// Deregistering is idempotent: re-deregistering an already-INACTIVE
/// revision simply returns the row unchanged rather than erroring
/// (spec.md §4.1 "Idempotency & Dedup").
pub async fn deregister(pool: &PgPool, arn: &str) -> Result<Option<TaskDefinition>, sqlx::Error> {
    sqlx::query_as::<_, TaskDefinition>(
        r#"
        UPDATE task_definitions
        SET status = 'Inactive', deregistered_at = COALESCE(deregistered_at, $2), updated_at = now()
        WHERE arn = $1
        RETURNING *
        "#,
    )
    .bind(arn)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input<'a>(family: &'a str, region: &'a str, account_id: &'a str) -> RegisterInput<'a> {
        RegisterInput {
            family,
            region,
            account_id,
            network_mode: NetworkMode::Bridge,
            container_definitions: vec![ContainerDefinition {
                name: "app".into(),
                image: "nginx:latest".into(),
                ..Default::default()
            }],
            volumes: serde_json::json!([]),
            cpu: None,
            memory: None,
            execution_role_arn: None,
            task_role_arn: None,
            requires_compatibilities: vec![],
            placement_constraints: serde_json::json!([]),
            runtime_platform: None,
            proxy_configuration: None,
            tags: Tags::default(),
        }
    }

    #[sqlx::test]
    async fn successive_registrations_allocate_increasing_revisions(pool: PgPool) -> Result<(), sqlx::Error> {
        let first = register(&pool, sample_input("web", "us-east-1", "000000000000")).await?;
        let second = register(&pool, sample_input("web", "us-east-1", "000000000000")).await?;
        assert_eq!(first.revision, 1);
        assert_eq!(second.revision, 2);
        assert!(second.arn.ends_with(":2"));
        Ok(())
    }

    #[sqlx::test]
    async fn resolve_bare_family_finds_latest_active(pool: PgPool) -> Result<(), sqlx::Error> {
        register(&pool, sample_input("web", "us-east-1", "000000000000")).await?;
        let second = register(&pool, sample_input("web", "us-east-1", "000000000000")).await?;

        let resolved = resolve(&pool, "web").await?.unwrap();
        assert_eq!(resolved.revision, second.revision);
        Ok(())
    }

    #[sqlx::test]
    async fn deregister_is_idempotent(pool: PgPool) -> Result<(), sqlx::Error> {
        let registered = register(&pool, sample_input("web", "us-east-1", "000000000000")).await?;
        let first = deregister(&pool, &registered.arn).await?.unwrap();
        let second = deregister(&pool, &registered.arn).await?.unwrap();
        assert_eq!(first.deregistered_at, second.deregistered_at);
        assert_eq!(second.status, TaskDefinitionStatus::Inactive);
        Ok(())
    }
}
