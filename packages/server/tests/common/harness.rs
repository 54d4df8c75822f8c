//! Test harness with testcontainers for integration testing.
//!
//! One Postgres container is started for the whole test run; every test
//! gets its own freshly migrated database inside it, so tests can run in
//! parallel without seeing each other's leads.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use pipeline::{Lead, LeadStore, PipelineConfig, PostgresLeadStore, Stage, StageGraph};

/// Shared container infrastructure, initialized once on the first test.
struct SharedTestInfra {
    base_url: String,
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Respect RUST_LOG; try_init avoids panicking if already set up.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=200"])
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let base_url = format!("postgresql://postgres:postgres@{}:{}", host, port);

        Ok(Self {
            base_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Per-test context: an isolated, migrated database.
pub struct TestHarness {
    pub db_pool: PgPool,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }

    async fn teardown(self) {
        // Pool drops with the harness; the throwaway database stays in
        // the container until the container itself is torn down.
    }
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        // Carve out a private database for this test.
        let db_name = format!("test_{}", Uuid::new_v4().simple());
        let admin_pool = PgPool::connect(&format!("{}/postgres", infra.base_url))
            .await
            .context("Failed to connect to admin database")?;
        sqlx::query(&format!(r#"CREATE DATABASE "{}""#, db_name))
            .execute(&admin_pool)
            .await
            .context("Failed to create test database")?;
        admin_pool.close().await;

        let db_pool = PgPool::connect(&format!("{}/{}", infra.base_url, db_name))
            .await
            .context("Failed to connect to test database")?;

        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self { db_pool })
    }

    pub fn store(&self) -> Arc<PostgresLeadStore> {
        Arc::new(PostgresLeadStore::new(self.db_pool.clone()))
    }

    /// Pipeline knobs tightened for tests.
    pub fn pipeline_config() -> PipelineConfig {
        PipelineConfig {
            claim_batch_size: 10,
            poll_interval: Duration::from_millis(50),
            poll_concurrency: 4,
            max_retries: 3,
            stuck_timeout: Duration::from_secs(600),
        }
    }

    pub fn graph() -> StageGraph {
        StageGraph::standard(&Self::pipeline_config())
    }

    /// Insert a lead with all stage rows seeded and the first stage queued.
    pub async fn create_queued_lead(&self, store: &dyn LeadStore) -> Result<Lead> {
        let lead = Lead::new(Some("Test Co".into()), "https://example.com".into());
        let graph = Self::graph();
        let stages: Vec<Stage> = graph.stages().iter().map(|d| d.stage).collect();
        store.insert_lead(&lead, &stages).await?;
        store.trigger_stage(lead.id, graph.first()).await?;
        Ok(lead)
    }

    /// Backdate a started row and pin its retry count, for stuck-job tests.
    pub async fn age_started_row(
        &self,
        lead_id: Uuid,
        stage: Stage,
        age: Duration,
        retry_count: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE lead_stage_states
            SET started_at = NOW() - ($3 || ' milliseconds')::INTERVAL,
                retry_count = $4
            WHERE lead_id = $1 AND stage = $2
            "#,
        )
        .bind(lead_id)
        .bind(stage)
        .bind((age.as_millis() as i64).to_string())
        .bind(retry_count)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Pin a row's retry count directly.
    pub async fn set_retry_count(&self, lead_id: Uuid, stage: Stage, retry_count: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE lead_stage_states
            SET retry_count = $3
            WHERE lead_id = $1 AND stage = $2
            "#,
        )
        .bind(lead_id)
        .bind(stage)
        .bind(retry_count)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }
}
