use sqlx::PgPool;
use uuid::Uuid;

use crate::model::{ContainerState, LastStatus, Task, Tags};
use crate::store::is_unique_violation;

pub struct RunInput<'a> {
    pub cluster_arn: &'a str,
    pub task_arn: &'a str,
    pub task_definition_arn: &'a str,
    pub group: Option<String>,
    pub client_token: Option<String>,
    pub tags: Tags,
}

/// Outcome of `run`, distinguishing a fresh task from a `clientToken` replay
/// so the API handler can decide whether to report it as newly created.
pub enum RunOutcome {
    Created(Task),
    Replayed(Task),
}

/// Inserts a new task. When `client_token` is set and collides with a prior
/// request's token on the same cluster, the existing task is returned
/// instead of erroring — `RunTask` is idempotent under token replay
/// (spec.md §4.1 "Idempotency & Dedup").
pub async fn run(pool: &PgPool, input: RunInput<'_>) -> Result<RunOutcome, sqlx::Error> {
    if let Some(token) = &input.client_token {
        if let Some(existing) = find_by_client_token(pool, input.cluster_arn, token).await? {
            return Ok(RunOutcome::Replayed(existing));
        }
    }

    let result = sqlx::query_as::<_, Task>(
        r#"
        INSERT INTO tasks (
            cluster_arn, task_arn, task_definition_arn, "group", last_status,
            desired_status, health_status, client_token, container_states, tags
        )
        VALUES ($1, $2, $3, $4, $5, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(input.cluster_arn)
    .bind(input.task_arn)
    .bind(input.task_definition_arn)
    .bind(&input.group)
    .bind(LastStatus::Provisioning)
    .bind(crate::model::HealthStatus::Unknown)
    .bind(&input.client_token)
    .bind(sqlx::types::Json(Vec::<ContainerState>::new()))
    .bind(sqlx::types::Json(input.tags))
    .fetch_one(pool)
    .await;

    match result {
        Ok(task) => Ok(RunOutcome::Created(task)),
        Err(err) if is_unique_violation(&err) => {
            let token = input
                .client_token
                .as_deref()
                .expect("unique violation on tasks insert implies a client_token collision");
            let existing = find_by_client_token(pool, input.cluster_arn, token)
                .await?
                .expect("row that caused the conflict must now be visible");
            Ok(RunOutcome::Replayed(existing))
        }
        Err(err) => Err(err),
    }
}

pub async fn find_by_client_token(
    pool: &PgPool,
    cluster_arn: &str,
    client_token: &str,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE cluster_arn = $1 AND client_token = $2",
    )
    .bind(cluster_arn)
    .bind(client_token)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_arn(pool: &PgPool, task_arn: &str) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE task_arn = $1")
        .bind(task_arn)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_pod_name(
    pool: &PgPool,
    namespace: &str,
    pod_name: &str,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE namespace = $1 AND pod_name = $2",
    )
    .bind(namespace)
    .bind(pod_name)
    .fetch_optional(pool)
    .await
}

pub async fn list_by_cluster(
    pool: &PgPool,
    cluster_arn: &str,
    service_deployment_name: Option<&str>,
) -> Result<Vec<Task>, sqlx::Error> {
    match service_deployment_name {
        Some(deployment_name) => {
            sqlx::query_as::<_, Task>(
                r#"
                SELECT * FROM tasks
                WHERE cluster_arn = $1 AND pod_name LIKE $2 || '-%'
                ORDER BY created_at
                "#,
            )
            .bind(cluster_arn)
            .bind(deployment_name)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE cluster_arn = $1 ORDER BY created_at")
                .bind(cluster_arn)
                .fetch_all(pool)
                .await
        }
    }
}

pub async fn bind_pod(
    pool: &PgPool,
    id: Uuid,
    namespace: &str,
    pod_name: &str,
) -> Result<Task, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        r#"
        UPDATE tasks SET namespace = $2, pod_name = $3, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(namespace)
    .bind(pod_name)
    .fetch_one(pool)
    .await
}

/// Applies the pod-derived status snapshot computed by the `pod_to_task`
/// mapper. `last_status` only ever moves forward except for the STOPPED
/// jump (spec.md §3 LastStatus invariant); the mapper is responsible for
/// enforcing that before calling this.
pub async fn apply_status(
    pool: &PgPool,
    task_arn: &str,
    last_status: LastStatus,
    health_status: crate::model::HealthStatus,
    container_states: Vec<ContainerState>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    stopped_at: Option<chrono::DateTime<chrono::Utc>>,
    stopped_reason: Option<String>,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        r#"
        UPDATE tasks SET
            last_status = $2,
            health_status = $3,
            container_states = $4,
            started_at = COALESCE(started_at, $5),
            stopped_at = COALESCE(stopped_at, $6),
            stopped_reason = COALESCE(stopped_reason, $7),
            updated_at = now()
        WHERE task_arn = $1
        RETURNING *
        "#,
    )
    .bind(task_arn)
    .bind(last_status)
    .bind(health_status)
    .bind(sqlx::types::Json(container_states))
    .bind(started_at)
    .bind(stopped_at)
    .bind(stopped_reason)
    .fetch_optional(pool)
    .await
}

pub async fn request_stop(
    pool: &PgPool,
    task_arn: &str,
    reason: Option<String>,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        r#"
        UPDATE tasks SET
            desired_status = $2,
            stopped_reason = COALESCE($3, stopped_reason),
            updated_at = now()
        WHERE task_arn = $1
        RETURNING *
        "#,
    )
    .bind(task_arn)
    .bind(LastStatus::Stopped)
    .bind(reason)
    .fetch_optional(pool)
    .await
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

    fn sample_input<'a>(cluster_arn: &'a str, task_arn: &'a str, client_token: Option<String>) -> RunInput<'a> {
        RunInput {
            cluster_arn,
            task_arn,
            task_definition_arn: "arn:aws:ecs:us-east-1:000000000000:task-definition/web:1",
            group: None,
            client_token,
            tags: Tags::default(),
        }
    }

    #[sqlx::test]
    async fn run_replays_on_matching_client_token(pool: PgPool) -> Result<(), sqlx::Error> {
        let cluster_arn = sample_cluster(&pool).await;
        let token = Some("client-token-1".to_string());

        let first = run(&pool, sample_input(&cluster_arn, "arn:aws:ecs:us-east-1:000000000000:task/default/aaa", token.clone())).await?;
        let second = run(&pool, sample_input(&cluster_arn, "arn:aws:ecs:us-east-1:000000000000:task/default/bbb", token)).await?;

        let first_task = match first { RunOutcome::Created(t) => t, RunOutcome::Replayed(_) => panic!("expected Created") };
        let second_task = match second { RunOutcome::Replayed(t) => t, RunOutcome::Created(_) => panic!("expected Replayed") };
        assert_eq!(first_task.id, second_task.id);
        Ok(())
    }

    #[sqlx::test]
    async fn apply_status_timestamps_are_monotonic(pool: PgPool) -> Result<(), sqlx::Error> {
        let cluster_arn = sample_cluster(&pool).await;
        let task_arn = "arn:aws:ecs:us-east-1:000000000000:task/default/aaa";
        run(&pool, sample_input(&cluster_arn, task_arn, None)).await?;

        let started = chrono::Utc::now();
        apply_status(&pool, task_arn, LastStatus::Running, crate::model::HealthStatus::Healthy, vec![], Some(started), None, None).await?;
        let later = apply_status(&pool, task_arn, LastStatus::Running, crate::model::HealthStatus::Healthy, vec![], Some(started + chrono::Duration::seconds(30)), None, None)
            .await?
            .unwrap();

        assert_eq!(later.started_at.unwrap().timestamp(), started.timestamp());
        Ok(())
    }

    #[sqlx::test]
    async fn request_stop_sets_desired_status(pool: PgPool) -> Result<(), sqlx::Error> {
        let cluster_arn = sample_cluster(&pool).await;
        let task_arn = "arn:aws:ecs:us-east-1:000000000000:task/default/aaa";
        run(&pool, sample_input(&cluster_arn, task_arn, None)).await?;

        let stopped = request_stop(&pool, task_arn, Some("user request".into())).await?.unwrap();
        assert_eq!(stopped.desired_status, LastStatus::Stopped);
        assert_eq!(stopped.stopped_reason.as_deref(), Some("user request"));
        Ok(())
    }
}
