//! Audit record emission.
//!
//! The core emits one record per submitted command; persisting them is an
//! external collaborator's job (compliance storage, SIEM forwarding). The
//! default sink just writes structured log lines.

use async_trait::async_trait;
use deskgate_types::{CommandId, CommandStatus, SessionId};
use tracing::info;

/// One record per submitted command, applied or rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub command: CommandId,
    pub session: SessionId,
    /// Command kind name, e.g. `MoveMouse`.
    pub kind: &'static str,
    /// Unix milliseconds at submission.
    pub timestamp_ms: u64,
    pub status: CommandStatus,
    /// Reason code when rejected.
    pub reason: Option<String>,
}

/// Receives audit records from the dispatcher.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Default sink: structured log lines via `tracing`.
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, record: AuditRecord) {
        info!(
            command = %record.command,
            session = %record.session,
            kind = record.kind,
            status = %record.status,
            reason = record.reason.as_deref().unwrap_or("-"),
            "audit"
        );
    }
}
