use sqlx::PgPool;
use uuid::Uuid;

use crate::model::{DeploymentConfiguration, LaunchType, Service, ServiceStatus, Tags};

pub struct CreateInput<'a> {
    pub cluster_arn: &'a str,
    pub service_name: &'a str,
    pub arn: &'a str,
    pub task_definition_arn: &'a str,
    pub desired_count: i32,
    pub launch_type: LaunchType,
    pub deployment_configuration: DeploymentConfiguration,
    pub placement_strategy: serde_json::Value,
    pub placement_constraints: serde_json::Value,
    pub load_balancers: serde_json::Value,
    pub service_registries: serde_json::Value,
    pub network_configuration: Option<serde_json::Value>,
    pub deployment_name: &'a str,
    pub namespace: &'a str,
    pub tags: Tags,
}

pub async fn create(pool: &PgPool, input: CreateInput<'_>) -> Result<Service, sqlx::Error> {
    sqlx::query_as::<_, Service>(
        r#"
        INSERT INTO services (
            cluster_arn, service_name, arn, task_definition_arn, desired_count,
            running_count, pending_count, status, launch_type,
            deployment_configuration, placement_strategy, placement_constraints,
            load_balancers, service_registries, network_configuration,
            deployment_name, namespace, tags
        )
        VALUES ($1, $2, $3, $4, $5, 0, 0, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING *
        "#,
    )
    .bind(input.cluster_arn)
    .bind(input.service_name)
    .bind(input.arn)
    .bind(input.task_definition_arn)
    .bind(input.desired_count)
    .bind(ServiceStatus::Active)
    .bind(input.launch_type)
    .bind(sqlx::types::Json(input.deployment_configuration))
    .bind(sqlx::types::Json(input.placement_strategy))
    .bind(sqlx::types::Json(input.placement_constraints))
    .bind(sqlx::types::Json(input.load_balancers))
    .bind(sqlx::types::Json(input.service_registries))
    .bind(sqlx::types::Json(input.network_configuration))
    .bind(input.deployment_name)
    .bind(input.namespace)
    .bind(sqlx::types::Json(input.tags))
    .fetch_one(pool)
    .await
}

pub async fn find_by_cluster_and_name(
    pool: &PgPool,
    cluster_arn: &str,
    service_name: &str,
) -> Result<Option<Service>, sqlx::Error> {
    sqlx::query_as::<_, Service>(
        "SELECT * FROM services WHERE cluster_arn = $1 AND service_name = $2",
    )
    .bind(cluster_arn)
    .bind(service_name)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_arn(pool: &PgPool, arn: &str) -> Result<Option<Service>, sqlx::Error> {
    sqlx::query_as::<_, Service>("SELECT * FROM services WHERE arn = $1")
        .bind(arn)
        .fetch_optional(pool)
        .await
}

/// Resolves a service identifier that may be a bare name or a full ARN,
/// scoped to `cluster_arn` the way ECS scopes every service lookup to a
/// cluster (spec.md §4.1).
pub async fn resolve(
    pool: &PgPool,
    cluster_arn: &str,
    identifier: &str,
) -> Result<Option<Service>, sqlx::Error> {
    if crate::model::arn::Arn::looks_like_arn(identifier) {
        find_by_arn(pool, identifier).await
    } else {
        find_by_cluster_and_name(pool, cluster_arn, identifier).await
    }
}

pub async fn list_by_cluster(pool: &PgPool, cluster_arn: &str) -> Result<Vec<Service>, sqlx::Error> {
    sqlx::query_as::<_, Service>(
        "SELECT * FROM services WHERE cluster_arn = $1 ORDER BY created_at",
    )
    .bind(cluster_arn)
    .fetch_all(pool)
    .await
}

pub async fn update_desired_count(
    pool: &PgPool,
    id: Uuid,
    desired_count: i32,
) -> Result<Service, sqlx::Error> {
    sqlx::query_as::<_, Service>(
        "UPDATE services SET desired_count = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(desired_count)
    .fetch_one(pool)
    .await
}

pub async fn update_task_definition(
    pool: &PgPool,
    id: Uuid,
    task_definition_arn: &str,
) -> Result<Service, sqlx::Error> {
    sqlx::query_as::<_, Service>(
        "UPDATE services SET task_definition_arn = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(task_definition_arn)
    .fetch_one(pool)
    .await
}

pub async fn set_status(pool: &PgPool, id: Uuid, status: ServiceStatus) -> Result<Service, sqlx::Error> {
    sqlx::query_as::<_, Service>(
        "UPDATE services SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(status)
    .fetch_one(pool)
    .await
}

/// Called by the reconciler's `deployment_to_service` mapper (spec.md §4.3)
/// after each informer event, so running/pending counts track the backing
/// Deployment's status without a separate poll.
pub async fn update_counts(
    pool: &PgPool,
    arn: &str,
    running_count: i32,
    pending_count: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE services SET running_count = $2, pending_count = $3, updated_at = now() WHERE arn = $1",
    )
    .bind(arn)
    .bind(running_count)
    .bind(pending_count)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM services WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::clusters;

    async fn sample_cluster(pool: &PgPool) -> String {
        clusters::create(pool, "default", "arn:aws:ecs:us-east-1:000000000000:cluster/default", "kecs-default", &Tags::default())
            .await
            .unwrap()
            .arn
    }

    fn sample_input<'a>(cluster_arn: &'a str) -> CreateInput<'a> {
        CreateInput {
            cluster_arn,
            service_name: "web",
            arn: "arn:aws:ecs:us-east-1:000000000000:service/default/web",
            task_definition_arn: "arn:aws:ecs:us-east-1:000000000000:task-definition/web:1",
            desired_count: 2,
            launch_type: LaunchType::Fargate,
            deployment_configuration: DeploymentConfiguration::default(),
            placement_strategy: serde_json::json!([]),
            placement_constraints: serde_json::json!([]),
            load_balancers: serde_json::json!([]),
            service_registries: serde_json::json!([]),
            network_configuration: None,
            deployment_name: "web",
            namespace: "kecs-default",
            tags: Tags::default(),
        }
    }

    #[sqlx::test]
    async fn resolve_accepts_bare_name_and_arn(pool: PgPool) -> Result<(), sqlx::Error> {
        let cluster_arn = sample_cluster(&pool).await;
        let created = create(&pool, sample_input(&cluster_arn)).await?;

        let by_name = resolve(&pool, &cluster_arn, "web").await?.unwrap();
        let by_arn = resolve(&pool, &cluster_arn, &created.arn).await?.unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_arn.id, created.id);
        Ok(())
    }

    #[sqlx::test]
    async fn update_counts_tracks_reconciler_observations(pool: PgPool) -> Result<(), sqlx::Error> {
        let cluster_arn = sample_cluster(&pool).await;
        let created = create(&pool, sample_input(&cluster_arn)).await?;

        update_counts(&pool, &created.arn, 2, 0).await?;
        let updated = find_by_arn(&pool, &created.arn).await?.unwrap();
        assert_eq!(updated.running_count, 2);
        assert_eq!(updated.pending_count, 0);
        Ok(())
    }

    #[sqlx::test]
    async fn update_desired_count_and_task_definition(pool: PgPool) -> Result<(), sqlx::Error> {
        let cluster_arn = sample_cluster(&pool).await;
        let created = create(&pool, sample_input(&cluster_arn)).await?;

        let updated = update_desired_count(&pool, created.id, 5).await?;
        assert_eq!(updated.desired_count, 5);

        let new_td = "arn:aws:ecs:us-east-1:000000000000:task-definition/web:2";
        let updated = update_task_definition(&pool, created.id, new_td).await?;
        assert_eq!(updated.task_definition_arn, new_td);
        Ok(())
    }
}
