use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use parley_core::{
    ContractId, DecisionContext, Message, PendingDecision, StoreError, SupplierId, Thread,
    ThreadId, ThreadStore, TurnId,
};

use super::{parse_role, parse_status, role_as_str, status_as_str};
use crate::DbPool;

pub struct SqlThreadStore {
    pool: DbPool,
}

impl SqlThreadStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn backend(error: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_thread(
    row: &sqlx::sqlite::SqliteRow,
    messages: Vec<Message>,
) -> Result<Thread, StoreError> {
    let id: String = row.try_get("id").map_err(backend)?;
    let version: i64 = row.try_get("version").map_err(backend)?;
    let status_str: String = row.try_get("status").map_err(backend)?;
    let contract_id: String = row.try_get("contract_id").map_err(backend)?;
    let supplier_id: String = row.try_get("supplier_id").map_err(backend)?;
    let contract_title: String = row.try_get("contract_title").map_err(backend)?;
    let risk_score: f64 = row.try_get("risk_score").map_err(backend)?;
    let pending_feedback: Option<String> = row.try_get("pending_feedback").map_err(backend)?;
    let created_at_str: String = row.try_get("created_at").map_err(backend)?;
    let updated_at_str: String = row.try_get("updated_at").map_err(backend)?;

    let status = parse_status(&status_str)
        .ok_or_else(|| StoreError::Backend(format!("unknown thread status `{status_str}`")))?;

    let decision_strategy: Option<String> = row.try_get("decision_strategy").map_err(backend)?;
    let current_decision = match decision_strategy {
        Some(strategy) => {
            let reasoning: String = row.try_get("decision_reasoning").map_err(backend)?;
            let redline: Option<String> = row.try_get("decision_redline").map_err(backend)?;
            let turn_id: String = row.try_get("decision_turn_id").map_err(backend)?;
            let message: String = row.try_get("decision_message").map_err(backend)?;
            let risk: f64 = row.try_get("decision_risk").map_err(backend)?;
            let terminal: i64 = row.try_get("decision_terminal").map_err(backend)?;
            let requested_at_str: String =
                row.try_get("decision_requested_at").map_err(backend)?;

            Some(PendingDecision {
                context: DecisionContext {
                    strategy,
                    reasoning,
                    redline,
                    turn_id: TurnId(turn_id),
                },
                message,
                risk,
                terminal: terminal != 0,
                requested_at: parse_timestamp(&requested_at_str),
            })
        }
        None => None,
    };

    Ok(Thread {
        id: ThreadId(id),
        version,
        status,
        contract_id: ContractId(contract_id),
        supplier_id: SupplierId(supplier_id),
        contract_title,
        risk_score,
        messages,
        current_decision,
        pending_feedback,
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
    let role_str: String = row.try_get("role").map_err(backend)?;
    let content: String = row.try_get("content").map_err(backend)?;
    let source_turn_id: Option<String> = row.try_get("source_turn_id").map_err(backend)?;
    let created_at_str: String = row.try_get("created_at").map_err(backend)?;

    let role = parse_role(&role_str)
        .ok_or_else(|| StoreError::Backend(format!("unknown message role `{role_str}`")))?;

    Ok(Message {
        role,
        content,
        created_at: parse_timestamp(&created_at_str),
        source_turn_id: source_turn_id.map(TurnId),
    })
}

impl SqlThreadStore {
    async fn load_messages(&self, id: &ThreadId) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT role, content, source_turn_id, created_at
             FROM thread_message WHERE thread_id = ? ORDER BY seq ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_message).collect()
    }
}

const THREAD_COLUMNS: &str = "id, version, status, contract_id, supplier_id, contract_title,
        risk_score, pending_feedback, decision_strategy, decision_reasoning, decision_redline,
        decision_turn_id, decision_message, decision_risk, decision_terminal,
        decision_requested_at, created_at, updated_at";

#[async_trait]
impl ThreadStore for SqlThreadStore {
    async fn create(&self, thread: Thread) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let decision = thread.current_decision.as_ref();
        let result = sqlx::query(
            "INSERT INTO thread (id, version, status, contract_id, supplier_id, contract_title,
                                 risk_score, pending_feedback, decision_strategy,
                                 decision_reasoning, decision_redline, decision_turn_id,
                                 decision_message, decision_risk, decision_terminal,
                                 decision_requested_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&thread.id.0)
        .bind(thread.version)
        .bind(status_as_str(thread.status))
        .bind(&thread.contract_id.0)
        .bind(&thread.supplier_id.0)
        .bind(&thread.contract_title)
        .bind(thread.risk_score)
        .bind(&thread.pending_feedback)
        .bind(decision.map(|d| d.context.strategy.clone()))
        .bind(decision.map(|d| d.context.reasoning.clone()))
        .bind(decision.and_then(|d| d.context.redline.clone()))
        .bind(decision.map(|d| d.context.turn_id.0.clone()))
        .bind(decision.map(|d| d.message.clone()))
        .bind(decision.map(|d| d.risk))
        .bind(decision.map(|d| i64::from(d.terminal)))
        .bind(decision.map(|d| d.requested_at.to_rfc3339()))
        .bind(thread.created_at.to_rfc3339())
        .bind(thread.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => {
                return Err(StoreError::AlreadyExists(thread.id.clone()));
            }
            Err(error) => return Err(backend(error)),
        }

        for (seq, message) in thread.messages.iter().enumerate() {
            sqlx::query(
                "INSERT INTO thread_message (thread_id, seq, role, content, source_turn_id, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&thread.id.0)
            .bind(seq as i64)
            .bind(role_as_str(message.role))
            .bind(&message.content)
            .bind(message.source_turn_id.as_ref().map(|id| id.0.clone()))
            .bind(message.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn find_by_id(&self, id: &ThreadId) -> Result<Option<Thread>, StoreError> {
        let row = sqlx::query(&format!("SELECT {THREAD_COLUMNS} FROM thread WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(ref row) => {
                let messages = self.load_messages(id).await?;
                Ok(Some(row_to_thread(row, messages)?))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, thread: Thread, expected_version: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let decision = thread.current_decision.as_ref();
        let result = sqlx::query(
            "UPDATE thread SET version = ?, status = ?, risk_score = ?, pending_feedback = ?,
                    decision_strategy = ?, decision_reasoning = ?, decision_redline = ?,
                    decision_turn_id = ?, decision_message = ?, decision_risk = ?,
                    decision_terminal = ?, decision_requested_at = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(thread.version)
        .bind(status_as_str(thread.status))
        .bind(thread.risk_score)
        .bind(&thread.pending_feedback)
        .bind(decision.map(|d| d.context.strategy.clone()))
        .bind(decision.map(|d| d.context.reasoning.clone()))
        .bind(decision.and_then(|d| d.context.redline.clone()))
        .bind(decision.map(|d| d.context.turn_id.0.clone()))
        .bind(decision.map(|d| d.message.clone()))
        .bind(decision.map(|d| d.risk))
        .bind(decision.map(|d| i64::from(d.terminal)))
        .bind(decision.map(|d| d.requested_at.to_rfc3339()))
        .bind(thread.updated_at.to_rfc3339())
        .bind(&thread.id.0)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict(thread.id.clone()));
        }

        // Append-only: existing (thread_id, seq) rows are left untouched.
        for (seq, message) in thread.messages.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO thread_message (thread_id, seq, role, content, source_turn_id, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&thread.id.0)
            .bind(seq as i64)
            .bind(role_as_str(message.role))
            .bind(&message.content)
            .bind(message.source_turn_id.as_ref().map(|id| id.0.clone()))
            .bind(message.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn list(&self) -> Result<Vec<Thread>, StoreError> {
        let rows =
            sqlx::query(&format!("SELECT {THREAD_COLUMNS} FROM thread ORDER BY updated_at DESC"))
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

        let mut threads = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id").map_err(backend)?;
            let messages = self.load_messages(&ThreadId(id)).await?;
            threads.push(row_to_thread(row, messages)?);
        }

        Ok(threads)
    }
}
