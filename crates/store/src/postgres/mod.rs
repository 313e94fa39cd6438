// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres-backed `Store`: every operation below is one SQL
//! statement, no read-modify-write races. IDs are stored as their wire
//! string form (`{prefix}{uuid}`) and parsed back with `from_string` — the
//! store never validates or reinterprets an ID's prefix, it's opaque text.

use async_trait::async_trait;
use orc_core::{
    Agent, AgentName, Runner, RunnerId, Sandbox, SandboxId, SandboxState, Session, SessionConfig,
    SessionId, SessionStatus, TenantId,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::StoreError;
use crate::traits::Store;
use crate::types::{QueueItem, QueueItemStatus, SessionEventRow};

const SCHEMA: &str = include_str!("schema.sql");

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent; safe to call on every startup.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn sandbox_state_str(state: SandboxState) -> &'static str {
    match state {
        SandboxState::Warming => "warming",
        SandboxState::Warm => "warm",
        SandboxState::Waiting => "waiting",
        SandboxState::Running => "running",
        SandboxState::Cold => "cold",
    }
}

fn parse_sandbox_state(raw: &str) -> Result<SandboxState, StoreError> {
    match raw {
        "warming" => Ok(SandboxState::Warming),
        "warm" => Ok(SandboxState::Warm),
        "waiting" => Ok(SandboxState::Waiting),
        "running" => Ok(SandboxState::Running),
        "cold" => Ok(SandboxState::Cold),
        other => Err(StoreError::Database(format!("unrecognized sandbox state {other}"))),
    }
}

fn session_status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Starting => "starting",
        SessionStatus::Active => "active",
        SessionStatus::Paused => "paused",
        SessionStatus::Ended => "ended",
        SessionStatus::Error => "error",
        SessionStatus::Stopped => "stopped",
    }
}

fn parse_session_status(raw: &str) -> Result<SessionStatus, StoreError> {
    match raw {
        "starting" => Ok(SessionStatus::Starting),
        "active" => Ok(SessionStatus::Active),
        "paused" => Ok(SessionStatus::Paused),
        "ended" => Ok(SessionStatus::Ended),
        "error" => Ok(SessionStatus::Error),
        "stopped" => Ok(SessionStatus::Stopped),
        other => Err(StoreError::Database(format!("unrecognized session status {other}"))),
    }
}

fn row_to_runner(row: &sqlx::postgres::PgRow) -> Result<Runner, StoreError> {
    Ok(Runner {
        id: RunnerId::from_string(row.try_get::<String, _>("id")?),
        host: row.try_get("host")?,
        port: row.try_get::<i32, _>("port")? as u16,
        max_sandboxes: row.try_get::<i32, _>("max_sandboxes")? as u32,
        active_count: row.try_get::<i32, _>("active_count")? as u32,
        warming_count: row.try_get::<i32, _>("warming_count")? as u32,
        registered_at_ms: row.try_get::<i64, _>("registered_at_ms")? as u64,
        last_heartbeat_at_ms: row.try_get::<i64, _>("last_heartbeat_at_ms")? as u64,
    })
}

fn row_to_sandbox(row: &sqlx::postgres::PgRow) -> Result<Sandbox, StoreError> {
    let session_id: Option<String> = row.try_get("session_id")?;
    Ok(Sandbox {
        id: SandboxId::from_string(row.try_get::<String, _>("id")?),
        session_id: session_id.map(SessionId::from_string),
        agent_name: AgentName::new(row.try_get::<String, _>("agent_name")?),
        workspace_dir: PathBuf::from(row.try_get::<String, _>("workspace_dir")?),
        state: parse_sandbox_state(&row.try_get::<String, _>("state")?)?,
        created_at_ms: row.try_get::<i64, _>("created_at_ms")? as u64,
        last_used_at_ms: row.try_get::<i64, _>("last_used_at_ms")? as u64,
    })
}

fn row_to_session(row: &sqlx::postgres::PgRow) -> Result<Session, StoreError> {
    let sandbox_id: Option<String> = row.try_get("sandbox_id")?;
    let runner_id: Option<String> = row.try_get("runner_id")?;
    let config_value: serde_json::Value = row.try_get("config")?;
    let config: SessionConfig = serde_json::from_value(config_value)
        .map_err(|e| StoreError::Database(format!("malformed session config: {e}")))?;
    Ok(Session {
        id: SessionId::from_string(row.try_get::<String, _>("id")?),
        tenant_id: TenantId::from_string(row.try_get::<String, _>("tenant_id")?),
        agent_name: AgentName::new(row.try_get::<String, _>("agent_name")?),
        sandbox_id: sandbox_id.map(SandboxId::from_string),
        runner_id: runner_id.map(RunnerId::from_string),
        status: parse_session_status(&row.try_get::<String, _>("status")?)?,
        config,
        sdk_session_resume_id: row.try_get("sdk_session_resume_id")?,
        created_at_ms: row.try_get::<i64, _>("created_at_ms")? as u64,
        last_active_at_ms: row.try_get::<i64, _>("last_active_at_ms")? as u64,
    })
}

fn row_to_agent(row: &sqlx::postgres::PgRow) -> Result<Agent, StoreError> {
    Ok(Agent {
        name: AgentName::new(row.try_get::<String, _>("name")?),
        tenant_id: TenantId::from_string(row.try_get::<String, _>("tenant_id")?),
        path: PathBuf::from(row.try_get::<String, _>("path")?),
        version: row.try_get::<i32, _>("version")? as u32,
    })
}

fn row_to_session_event(row: &sqlx::postgres::PgRow) -> Result<SessionEventRow, StoreError> {
    Ok(SessionEventRow {
        session_id: SessionId::from_string(row.try_get::<String, _>("session_id")?),
        seq: row.try_get("seq")?,
        role: row.try_get("role")?,
        payload: row.try_get("payload")?,
        created_at_ms: row.try_get::<i64, _>("created_at_ms")? as u64,
    })
}

fn queue_status_str(status: QueueItemStatus) -> &'static str {
    match status {
        QueueItemStatus::Pending => "pending",
        QueueItemStatus::Claimed => "claimed",
        QueueItemStatus::Done => "done",
        QueueItemStatus::Failed => "failed",
    }
}

fn parse_queue_status(raw: &str) -> Result<QueueItemStatus, StoreError> {
    match raw {
        "pending" => Ok(QueueItemStatus::Pending),
        "claimed" => Ok(QueueItemStatus::Claimed),
        "done" => Ok(QueueItemStatus::Done),
        "failed" => Ok(QueueItemStatus::Failed),
        other => Err(StoreError::Database(format!("unrecognized queue item status {other}"))),
    }
}

fn row_to_queue_item(row: &sqlx::postgres::PgRow) -> Result<QueueItem, StoreError> {
    Ok(QueueItem {
        id: row.try_get("id")?,
        payload: row.try_get("payload")?,
        status: parse_queue_status(&row.try_get::<String, _>("status")?)?,
        created_at_ms: row.try_get::<i64, _>("created_at_ms")? as u64,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_runner(&self, id: &RunnerId, host: &str, port: u16, max: u32) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO runners (id, host, port, max_sandboxes, active_count, warming_count, registered_at_ms, last_heartbeat_at_ms)
             VALUES ($1, $2, $3, $4, 0, 0, 0, 0)
             ON CONFLICT (id) DO UPDATE SET host = EXCLUDED.host, port = EXCLUDED.port, max_sandboxes = EXCLUDED.max_sandboxes",
        )
        .bind(id.as_str())
        .bind(host)
        .bind(port as i32)
        .bind(max as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn heartbeat_runner(&self, id: &RunnerId, active: u32, warming: u32, now_ms: u64) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE runners SET active_count = $2, warming_count = $3, last_heartbeat_at_ms = $4 WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(active as i32)
        .bind(warming as i32)
        .bind(now_ms as i64)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("runner {id}")));
        }
        Ok(())
    }

    async fn get_runner(&self, id: &RunnerId) -> Result<Option<Runner>, StoreError> {
        let row = sqlx::query("SELECT * FROM runners WHERE id = $1").bind(id.as_str()).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_runner).transpose()
    }

    async fn select_best_runner(&self, cutoff_ms: u64) -> Result<Option<Runner>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM runners WHERE last_heartbeat_at_ms > $1
             ORDER BY (max_sandboxes - active_count) DESC, last_heartbeat_at_ms DESC
             LIMIT 1",
        )
        .bind(cutoff_ms as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_runner).transpose()
    }

    async fn list_dead_runners(&self, cutoff_ms: u64) -> Result<Vec<Runner>, StoreError> {
        let rows = sqlx::query("SELECT * FROM runners WHERE last_heartbeat_at_ms <= $1")
            .bind(cutoff_ms as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_runner).collect()
    }

    async fn bulk_pause_sessions_by_runner(&self, id: &RunnerId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET status = 'paused', sandbox_id = NULL WHERE runner_id = $1 AND status = 'active'",
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_runner(&self, id: &RunnerId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM runners WHERE id = $1").bind(id.as_str()).execute(&self.pool).await?;
        Ok(())
    }

    async fn get_sandbox(&self, id: &SandboxId) -> Result<Option<Sandbox>, StoreError> {
        let row = sqlx::query("SELECT * FROM sandboxes WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_sandbox).transpose()
    }

    async fn insert_sandbox(&self, sandbox: &Sandbox) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sandboxes (id, session_id, agent_name, workspace_dir, state, created_at_ms, last_used_at_ms)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(sandbox.id.as_str())
        .bind(sandbox.session_id.as_ref().map(|s| s.as_str().to_string()))
        .bind(sandbox.agent_name.as_str())
        .bind(sandbox.workspace_dir.to_string_lossy().to_string())
        .bind(sandbox_state_str(sandbox.state))
        .bind(sandbox.created_at_ms as i64)
        .bind(sandbox.last_used_at_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_sandbox_state(&self, id: &SandboxId, state: SandboxState) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sandboxes SET state = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(sandbox_state_str(state))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("sandbox {id}")));
        }
        Ok(())
    }

    async fn touch_sandbox(&self, id: &SandboxId, now_ms: u64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sandboxes SET last_used_at_ms = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(now_ms as i64)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("sandbox {id}")));
        }
        Ok(())
    }

    async fn delete_sandbox(&self, id: &SandboxId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sandboxes WHERE id = $1").bind(id.as_str()).execute(&self.pool).await?;
        Ok(())
    }

    async fn count_sandboxes(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM sandboxes").fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>("count")? as u64)
    }

    async fn get_best_eviction_candidate(&self) -> Result<Option<Sandbox>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM sandboxes WHERE state IN ('cold', 'warm', 'waiting')
             ORDER BY CASE state WHEN 'cold' THEN 0 WHEN 'warm' THEN 1 WHEN 'waiting' THEN 2 END, last_used_at_ms ASC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_sandbox).transpose()
    }

    async fn get_idle_sandboxes(&self, older_than_ms: u64) -> Result<Vec<Sandbox>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM sandboxes WHERE state = 'waiting' AND last_used_at_ms < $1 ORDER BY last_used_at_ms ASC",
        )
        .bind(older_than_ms as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_sandbox).collect()
    }

    async fn mark_all_sandboxes_cold(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE sandboxes SET state = 'cold' WHERE state != 'cold'")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let config = serde_json::to_value(&session.config)
            .map_err(|e| StoreError::Database(format!("unserializable session config: {e}")))?;
        sqlx::query(
            "INSERT INTO sessions (id, tenant_id, agent_name, sandbox_id, runner_id, status, config, sdk_session_resume_id, created_at_ms, last_active_at_ms)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(session.id.as_str())
        .bind(session.tenant_id.as_str())
        .bind(session.agent_name.as_str())
        .bind(session.sandbox_id.as_ref().map(|s| s.as_str().to_string()))
        .bind(session.runner_id.as_ref().map(|r| r.as_str().to_string()))
        .bind(session_status_str(session.status))
        .bind(config)
        .bind(session.sdk_session_resume_id.clone())
        .bind(session.created_at_ms as i64)
        .bind(session.last_active_at_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        let config = serde_json::to_value(&session.config)
            .map_err(|e| StoreError::Database(format!("unserializable session config: {e}")))?;
        let result = sqlx::query(
            "UPDATE sessions SET sandbox_id = $2, runner_id = $3, status = $4, config = $5,
             sdk_session_resume_id = $6, last_active_at_ms = $7 WHERE id = $1",
        )
        .bind(session.id.as_str())
        .bind(session.sandbox_id.as_ref().map(|s| s.as_str().to_string()))
        .bind(session.runner_id.as_ref().map(|r| r.as_str().to_string()))
        .bind(session_status_str(session.status))
        .bind(config)
        .bind(session.sdk_session_resume_id.clone())
        .bind(session.last_active_at_ms as i64)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("session {}", session.id)));
        }
        Ok(())
    }

    async fn get_agent(&self, tenant: &TenantId, name: &AgentName) -> Result<Option<Agent>, StoreError> {
        let row = sqlx::query("SELECT * FROM agents WHERE tenant_id = $1 AND name = $2")
            .bind(tenant.as_str())
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn upsert_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO agents (tenant_id, name, path, version) VALUES ($1, $2, $3, $4)
             ON CONFLICT (tenant_id, name) DO UPDATE SET path = EXCLUDED.path, version = EXCLUDED.version",
        )
        .bind(agent.tenant_id.as_str())
        .bind(agent.name.as_str())
        .bind(agent.path.to_string_lossy().to_string())
        .bind(agent.version as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_agent(&self, tenant: &TenantId, name: &AgentName) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM agents WHERE tenant_id = $1 AND name = $2")
            .bind(tenant.as_str())
            .bind(name.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_agents(&self, tenant: &TenantId) -> Result<Vec<Agent>, StoreError> {
        let rows = sqlx::query("SELECT * FROM agents WHERE tenant_id = $1 ORDER BY name")
            .bind(tenant.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_agent).collect()
    }

    async fn append_session_event(&self, row: SessionEventRow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO session_events (session_id, seq, role, payload, created_at_ms) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(row.session_id.as_str())
        .bind(row.seq)
        .bind(row.role)
        .bind(row.payload)
        .bind(row.created_at_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_session_events(&self, session_id: &SessionId) -> Result<Vec<SessionEventRow>, StoreError> {
        let rows = sqlx::query("SELECT * FROM session_events WHERE session_id = $1 ORDER BY seq ASC")
            .bind(session_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_session_event).collect()
    }

    async fn claim_queue_item(&self) -> Result<Option<QueueItem>, StoreError> {
        let row = sqlx::query(
            "UPDATE queue_items SET status = 'claimed' WHERE id = (
                 SELECT id FROM queue_items WHERE status = 'pending' ORDER BY created_at_ms ASC
                 LIMIT 1 FOR UPDATE SKIP LOCKED
             )
             RETURNING *",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_queue_item).transpose()
    }
}
