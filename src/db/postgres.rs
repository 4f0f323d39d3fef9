//! PostgreSQL job store.

use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use secrecy::ExposeSecret;
use tokio_postgres::NoTls;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::db::JobStore;
use crate::error::DatabaseError;
use crate::jobs::{Hyperparameters, Job, JobPatch, JobScope, JobStatus, JobSummary, NewJob};

mod embedded {
    refinery::embed_migrations!("migrations");
}

const JOB_COLUMNS: &str = "id, owner, name, model_type, dataset_path, hyperparameters, status, \
     dispatch_reference, error_message, training_logs, created_at, updated_at";

/// Job store backed by the `training_jobs` table.
pub struct PgJobStore {
    pool: Pool,
}

impl PgJobStore {
    /// Create a new store and connect to the database.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut cfg = Config::new();
        cfg.url = Some(config.url.expose_secret().to_string());
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        // Test connection
        let _ = pool.get().await?;

        Ok(Self { pool })
    }

    /// Apply embedded schema migrations.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let mut conn = self.conn().await?;
        let report = embedded::migrations::runner()
            .run_async(&mut **conn)
            .await?;

        for migration in report.applied_migrations() {
            tracing::info!(
                version = migration.version(),
                name = %migration.name(),
                "Applied migration"
            );
        }
        Ok(())
    }

    /// Get a connection from the pool.
    pub async fn conn(&self) -> Result<deadpool_postgres::Object, DatabaseError> {
        Ok(self.pool.get().await?)
    }
}

/// Owner filter for a scope, appended to a WHERE clause.
///
/// `next_param` is the placeholder index the owner value will bind to.
fn scope_clause(scope: &JobScope, next_param: usize) -> (String, Option<String>) {
    match scope {
        JobScope::Owner(principal) => (
            format!(" AND owner = ${}", next_param),
            Some(principal.as_str().to_string()),
        ),
        JobScope::Unowned => (" AND owner IS NULL".to_string(), None),
        JobScope::Unrestricted => (String::new(), None),
    }
}

fn parse_status(raw: &str) -> Result<JobStatus, DatabaseError> {
    raw.parse().map_err(DatabaseError::Serialization)
}

fn row_to_job(row: &Row) -> Result<Job, DatabaseError> {
    let status: String = row.get("status");
    let hyperparameters = match row.get::<_, Option<serde_json::Value>>("hyperparameters") {
        Some(serde_json::Value::Object(map)) => map,
        Some(serde_json::Value::Null) | None => Hyperparameters::new(),
        Some(other) => {
            return Err(DatabaseError::Serialization(format!(
                "hyperparameters must be a JSON object, found {}",
                other
            )));
        }
    };

    Ok(Job {
        id: row.get("id"),
        owner: row.get("owner"),
        name: row.get("name"),
        model_type: row.get("model_type"),
        dataset_path: row.get("dataset_path"),
        hyperparameters,
        status: parse_status(&status)?,
        dispatch_reference: row.get("dispatch_reference"),
        error_message: row.get("error_message"),
        training_logs: row.get("training_logs"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &NewJob) -> Result<Job, DatabaseError> {
        let conn = self.conn().await?;
        let hyperparameters = serde_json::Value::Object(job.hyperparameters.clone());

        let row = conn
            .query_one(
                &format!(
                    r#"
                    INSERT INTO training_jobs (
                        owner, name, model_type, dataset_path, hyperparameters, status
                    ) VALUES ($1, $2, $3, $4, $5, 'pending')
                    RETURNING {}
                    "#,
                    JOB_COLUMNS
                ),
                &[
                    &job.owner,
                    &job.name,
                    &job.model_type,
                    &job.dataset_path,
                    &hyperparameters,
                ],
            )
            .await?;

        row_to_job(&row)
    }

    async fn get(&self, id: Uuid, scope: &JobScope) -> Result<Option<Job>, DatabaseError> {
        let conn = self.conn().await?;
        let (clause, owner) = scope_clause(scope, 2);

        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&id];
        if let Some(ref owner) = owner {
            params.push(owner);
        }

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM training_jobs WHERE id = $1{}",
                    JOB_COLUMNS, clause
                ),
                &params,
            )
            .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn list(
        &self,
        scope: &JobScope,
        limit: Option<usize>,
    ) -> Result<Vec<Job>, DatabaseError> {
        let conn = self.conn().await?;
        let limit = limit.map(|l| l as i64);
        let (clause, owner) = scope_clause(scope, 2);

        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&limit];
        if let Some(ref owner) = owner {
            params.push(owner);
        }

        // LIMIT NULL means no limit.
        let rows = conn
            .query(
                &format!(
                    r#"
                    SELECT {} FROM training_jobs
                    WHERE TRUE{}
                    ORDER BY created_at DESC
                    LIMIT $1
                    "#,
                    JOB_COLUMNS, clause
                ),
                &params,
            )
            .await?;

        rows.iter().map(row_to_job).collect()
    }

    async fn update(
        &self,
        id: Uuid,
        patch: &JobPatch,
        scope: &JobScope,
        expected_status: Option<JobStatus>,
    ) -> Result<Option<Job>, DatabaseError> {
        let conn = self.conn().await?;
        let status = patch.status.map(|s| s.as_str());
        let expected = expected_status.map(|s| s.as_str());
        let (clause, owner) = scope_clause(scope, 7);

        let mut params: Vec<&(dyn ToSql + Sync)> = vec![
            &id,
            &status,
            &patch.dispatch_reference,
            &patch.error_message,
            &patch.training_logs,
            &expected,
        ];
        if let Some(ref owner) = owner {
            params.push(owner);
        }

        let row = conn
            .query_opt(
                &format!(
                    r#"
                    UPDATE training_jobs SET
                        status = COALESCE($2, status),
                        dispatch_reference = COALESCE($3, dispatch_reference),
                        error_message = COALESCE($4, error_message),
                        training_logs = COALESCE($5, training_logs),
                        updated_at = NOW()
                    WHERE id = $1
                      AND ($6::TEXT IS NULL OR status = $6::TEXT){}
                    RETURNING {}
                    "#,
                    clause, JOB_COLUMNS
                ),
                &params,
            )
            .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn summary(&self, scope: &JobScope) -> Result<JobSummary, DatabaseError> {
        let conn = self.conn().await?;
        let (clause, owner) = scope_clause(scope, 1);

        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        if let Some(ref owner) = owner {
            params.push(owner);
        }

        let rows = conn
            .query(
                &format!(
                    "SELECT status, COUNT(*) AS cnt FROM training_jobs WHERE TRUE{} GROUP BY status",
                    clause
                ),
                &params,
            )
            .await?;

        let mut summary = JobSummary::default();
        for row in &rows {
            let status: String = row.get("status");
            let count: i64 = row.get("cnt");
            summary.add(parse_status(&status)?, count);
        }
        Ok(summary)
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.query_one("SELECT 1", &[]).await?;
        Ok(())
    }
}
