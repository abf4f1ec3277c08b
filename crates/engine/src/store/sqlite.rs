use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use tracing::{debug, error, info};

use crate::{
    store::{DatabaseConfig, PersistedState, PersistedStep, StateStore},
    EngineError, Result,
};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let url = if config.sqlite_path.as_os_str() == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", config.sqlite_path.display())
        };
        info!("connecting to SQLite database: {}", url);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&url)
            .await
            .map_err(|e| {
                error!("failed to connect to SQLite: {}", e);
                EngineError::Sqlx(e)
            })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn init(&self) -> Result<()> {
        info!("running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("failed to run migrations: {}", e);
                EngineError::Migrate(e)
            })?;

        Ok(())
    }

    async fn load_state(&self) -> Result<Option<PersistedState>> {
        debug!("loading persisted engine state");

        let row = sqlx::query("SELECT cursor, server_path, port FROM app_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let cursor: i64 = row.get("cursor");
        if cursor < 0 {
            return Err(EngineError::Config(format!(
                "persisted cursor {} is out of range",
                cursor
            )));
        }
        let port: i64 = row.get("port");
        let port = u16::try_from(port)
            .map_err(|_| EngineError::Config(format!("persisted port {} is out of range", port)))?;
        let server_path: String = row.get("server_path");

        let step_rows = sqlx::query("SELECT id, status FROM pipeline_steps")
            .fetch_all(&self.pool)
            .await?;

        let mut steps = Vec::with_capacity(step_rows.len());
        for row in step_rows {
            let id: String = row.get("id");
            let status: String = row.get("status");
            steps.push(PersistedStep {
                id,
                status: status.parse()?,
            });
        }

        Ok(Some(PersistedState {
            cursor: cursor as usize,
            steps,
            service: crate::service::ServiceConfig { server_path, port },
        }))
    }

    async fn save_state(&self, state: &PersistedState) -> Result<()> {
        debug!("persisting engine state (cursor = {})", state.cursor);

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO app_state (id, cursor, server_path, port, updated_at)
            VALUES (1, ?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                cursor = excluded.cursor,
                server_path = excluded.server_path,
                port = excluded.port,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(state.cursor as i64)
        .bind(&state.service.server_path)
        .bind(state.service.port as i64)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM pipeline_steps")
            .execute(&mut *tx)
            .await?;

        for step in &state.steps {
            sqlx::query("INSERT INTO pipeline_steps (id, status, updated_at) VALUES (?1, ?2, ?3)")
                .bind(&step.id)
                .bind(step.status.to_string())
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
