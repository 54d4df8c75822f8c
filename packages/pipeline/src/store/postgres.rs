use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Duration;
use sqlx::PgPool;
use uuid::Uuid;

use super::LeadStore;
use crate::types::{Lead, Stage, StageState, WebhookEvent};

const STAGE_STATE_COLUMNS: &str = "lead_id, stage, status, job_id, result, error, \
     retry_count, started_at, completed_at, created_at, updated_at";

pub struct PostgresLeadStore {
    pool: PgPool,
}

impl PostgresLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LeadStore for PostgresLeadStore {
    async fn insert_lead(&self, lead: &Lead, stages: &[Stage]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO leads (id, company_name, website_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(lead.id)
        .bind(&lead.company_name)
        .bind(&lead.website_url)
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert lead")?;

        for stage in stages {
            sqlx::query(
                r#"
                INSERT INTO lead_stage_states (lead_id, stage, status, created_at, updated_at)
                VALUES ($1, $2, 'pending', NOW(), NOW())
                "#,
            )
            .bind(lead.id)
            .bind(stage)
            .execute(&mut *tx)
            .await
            .context("Failed to seed stage state")?;
        }

        tx.commit().await.context("Failed to commit lead insert")?;
        Ok(())
    }

    async fn get_lead(&self, lead_id: Uuid) -> Result<Option<Lead>> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"
            SELECT id, company_name, website_url, created_at, updated_at
            FROM leads
            WHERE id = $1
            "#,
        )
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get lead")?;

        Ok(lead)
    }

    async fn stage_state(&self, lead_id: Uuid, stage: Stage) -> Result<Option<StageState>> {
        let state = sqlx::query_as::<_, StageState>(&format!(
            "SELECT {STAGE_STATE_COLUMNS} FROM lead_stage_states WHERE lead_id = $1 AND stage = $2"
        ))
        .bind(lead_id)
        .bind(stage)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get stage state")?;

        Ok(state)
    }

    async fn stage_states(&self, lead_id: Uuid) -> Result<Vec<StageState>> {
        let states = sqlx::query_as::<_, StageState>(&format!(
            "SELECT {STAGE_STATE_COLUMNS} FROM lead_stage_states WHERE lead_id = $1 ORDER BY stage"
        ))
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list stage states")?;

        Ok(states)
    }

    async fn trigger_stage(&self, lead_id: Uuid, stage: Stage) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE lead_stage_states
            SET status = 'queued', updated_at = NOW()
            WHERE lead_id = $1 AND stage = $2 AND status = 'pending'
            "#,
        )
        .bind(lead_id)
        .bind(stage)
        .execute(&self.pool)
        .await
        .context("Failed to trigger stage")?;

        Ok(result.rows_affected() > 0)
    }

    async fn retry_stage(&self, lead_id: Uuid, stage: Stage) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE lead_stage_states
            SET status = 'queued',
                job_id = NULL,
                error = NULL,
                started_at = NULL,
                completed_at = NULL,
                updated_at = NOW()
            WHERE lead_id = $1 AND stage = $2 AND status = 'failed'
            "#,
        )
        .bind(lead_id)
        .bind(stage)
        .execute(&self.pool)
        .await
        .context("Failed to retry stage")?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim_queued(&self, stage: Stage, limit: i64) -> Result<Vec<StageState>> {
        // FOR UPDATE SKIP LOCKED: concurrent claimers never block on or
        // return each other's rows. The row lock lives only for the
        // duration of this statement.
        let states = sqlx::query_as::<_, StageState>(
            r#"
            WITH next_leads AS (
                SELECT lead_id
                FROM lead_stage_states
                WHERE stage = $1 AND status = 'queued'
                ORDER BY created_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE lead_stage_states s
            SET status = 'started',
                started_at = NOW(),
                updated_at = NOW()
            FROM next_leads n
            WHERE s.lead_id = n.lead_id AND s.stage = $1
            RETURNING s.lead_id, s.stage, s.status, s.job_id, s.result, s.error,
                      s.retry_count, s.started_at, s.completed_at, s.created_at, s.updated_at
            "#,
        )
        .bind(stage)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to claim queued leads")?;

        Ok(states)
    }

    async fn record_submission(&self, lead_id: Uuid, stage: Stage, job_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE lead_stage_states
            SET job_id = $3, updated_at = NOW()
            WHERE lead_id = $1 AND stage = $2 AND status = 'started'
            "#,
        )
        .bind(lead_id)
        .bind(stage)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .context("Failed to record submission")?;

        Ok(result.rows_affected() > 0)
    }

    async fn started_with_job(&self, stage: Stage) -> Result<Vec<StageState>> {
        let states = sqlx::query_as::<_, StageState>(&format!(
            r#"
            SELECT {STAGE_STATE_COLUMNS}
            FROM lead_stage_states
            WHERE stage = $1 AND status = 'started' AND job_id IS NOT NULL
            ORDER BY started_at
            "#
        ))
        .bind(stage)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list in-flight leads")?;

        Ok(states)
    }

    async fn fail_stuck(
        &self,
        stage: Stage,
        older_than: Duration,
        max_retries: i32,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE lead_stage_states
            SET status = 'failed',
                error = 'stuck or timed out',
                completed_at = NOW(),
                updated_at = NOW()
            WHERE stage = $1
              AND status = 'started'
              AND started_at < NOW() - ($2 || ' milliseconds')::INTERVAL
              AND retry_count >= $3
            "#,
        )
        .bind(stage)
        .bind(older_than.num_milliseconds().to_string())
        .bind(max_retries)
        .execute(&self.pool)
        .await
        .context("Failed to fail stuck leads")?;

        Ok(result.rows_affected())
    }

    async fn requeue_stuck(
        &self,
        stage: Stage,
        older_than: Duration,
        max_retries: i32,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE lead_stage_states
            SET status = 'queued',
                retry_count = retry_count + 1,
                job_id = NULL,
                started_at = NULL,
                error = 'stuck or timed out',
                updated_at = NOW()
            WHERE stage = $1
              AND status = 'started'
              AND started_at < NOW() - ($2 || ' milliseconds')::INTERVAL
              AND retry_count < $3
            "#,
        )
        .bind(stage)
        .bind(older_than.num_milliseconds().to_string())
        .bind(max_retries)
        .execute(&self.pool)
        .await
        .context("Failed to requeue stuck leads")?;

        Ok(result.rows_affected())
    }

    async fn complete_stage(
        &self,
        lead_id: Uuid,
        stage: Stage,
        result: &serde_json::Value,
        next: Option<Stage>,
    ) -> Result<bool> {
        // Completion and chaining commit together: there is no window
        // where this stage is completed but the next is still pending.
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let updated = sqlx::query(
            r#"
            UPDATE lead_stage_states
            SET status = 'completed',
                result = $3,
                error = NULL,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE lead_id = $1 AND stage = $2 AND status = 'started'
            "#,
        )
        .bind(lead_id)
        .bind(stage)
        .bind(result)
        .execute(&mut *tx)
        .await
        .context("Failed to complete stage")?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Ok(false);
        }

        if let Some(next_stage) = next {
            sqlx::query(
                r#"
                UPDATE lead_stage_states
                SET status = 'queued', updated_at = NOW()
                WHERE lead_id = $1 AND stage = $2 AND status = 'pending'
                "#,
            )
            .bind(lead_id)
            .bind(next_stage)
            .execute(&mut *tx)
            .await
            .context("Failed to queue next stage")?;
        }

        tx.commit().await.context("Failed to commit stage completion")?;
        Ok(true)
    }

    async fn fail_stage(&self, lead_id: Uuid, stage: Stage, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE lead_stage_states
            SET status = 'failed',
                error = $3,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE lead_id = $1 AND stage = $2 AND status = 'started'
            "#,
        )
        .bind(lead_id)
        .bind(stage)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to fail stage")?;

        Ok(result.rows_affected() > 0)
    }

    async fn requeue_stage(&self, lead_id: Uuid, stage: Stage, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE lead_stage_states
            SET status = 'queued',
                retry_count = retry_count + 1,
                job_id = NULL,
                started_at = NULL,
                error = $3,
                updated_at = NOW()
            WHERE lead_id = $1 AND stage = $2 AND status = 'started'
            "#,
        )
        .bind(lead_id)
        .bind(stage)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to requeue stage")?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_webhook_event(
        &self,
        fingerprint: &str,
        payload: &serde_json::Value,
    ) -> Result<Option<WebhookEvent>> {
        let event = sqlx::query_as::<_, WebhookEvent>(
            r#"
            INSERT INTO webhook_events (id, fingerprint, payload, processed, created_at)
            VALUES ($1, $2, $3, FALSE, NOW())
            ON CONFLICT (fingerprint) DO NOTHING
            RETURNING id, fingerprint, payload, processed, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(fingerprint)
        .bind(payload)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to record webhook event")?;

        Ok(event)
    }

    async fn mark_webhook_processed(&self, event_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET processed = TRUE
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark webhook event processed")?;

        Ok(())
    }
}
