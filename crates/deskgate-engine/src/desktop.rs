//! The versioned desktop record and its optimistic-concurrency gate.
//!
//! One instance owns the logical desktop's mutable state. Writers go
//! through [`DesktopState::try_apply`], a compare-and-swap on the version
//! number; readers take cheap snapshots and never block behind a writer
//! doing I/O, because no I/O happens inside the critical section.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use deskgate_types::{
    ClipboardContent, CommandId, CommandKind, DesktopId, DesktopSnapshot, ScreenResolution,
};
use tracing::{debug, error};

use crate::error::EngineError;

/// The single shared logical desktop.
pub struct DesktopState {
    id: DesktopId,
    max_clipboard_bytes: usize,
    record: Mutex<DesktopSnapshot>,
    /// Set after a persistent version conflict; never cleared at runtime.
    halted: AtomicBool,
}

impl DesktopState {
    /// Create a desktop at version 0 with the given initial resolution.
    #[must_use]
    pub fn new(resolution: ScreenResolution, max_clipboard_bytes: usize) -> Self {
        Self {
            id: DesktopId::new(),
            max_clipboard_bytes,
            record: Mutex::new(DesktopSnapshot::initial(resolution)),
            halted: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> DesktopId {
        self.id
    }

    /// Non-blocking read of the current record. Always succeeds.
    #[must_use]
    pub fn snapshot(&self) -> DesktopSnapshot {
        self.record
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Apply a mutation against an expected version.
    ///
    /// Fails with `VersionConflict` if another writer committed in between;
    /// the caller re-reads the snapshot and retries a bounded number of
    /// times. Payload checks happen before the version bump, so a rejected
    /// command never partially mutates state.
    pub fn try_apply(
        &self,
        expected_version: u64,
        command_id: CommandId,
        kind: &CommandKind,
    ) -> Result<DesktopSnapshot, EngineError> {
        if self.is_halted() {
            return Err(EngineError::ConsistencyFailure);
        }

        let mut record = self
            .record
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if record.version != expected_version {
            return Err(EngineError::VersionConflict {
                expected: expected_version,
                actual: record.version,
            });
        }

        match kind {
            CommandKind::MoveMouse { position } => {
                record.mouse = position.clamped_to(record.resolution);
            }
            CommandKind::SetClipboard { content } => {
                self.check_clipboard(content)?;
                record.clipboard = content.clone();
            }
            CommandKind::SetResolution { resolution } => {
                if !resolution.is_valid() {
                    return Err(EngineError::InvalidArgument(format!(
                        "resolution {resolution} is out of bounds"
                    )));
                }
                record.resolution = *resolution;
                // Keep the cursor inside the new bounds.
                record.mouse = record.mouse.clamped_to(*resolution);
            }
            // Key combos and power actions carry no record fields to write,
            // but still count as mutations: the version bump below gives
            // observers a total order over everything the controller did.
            CommandKind::KeyCombo { .. } | CommandKind::PowerAction { .. } => {}
        }

        record.version += 1;
        record.last_applied = Some(command_id);
        debug!(desktop = %self.id, version = record.version, command = %command_id, "applied mutation");
        Ok(record.clone())
    }

    fn check_clipboard(&self, content: &ClipboardContent) -> Result<(), EngineError> {
        if content.size() > self.max_clipboard_bytes {
            return Err(EngineError::PayloadTooLarge {
                size: content.size(),
                max: self.max_clipboard_bytes,
            });
        }
        Ok(())
    }

    /// Stop accepting mutations. Called when a version conflict persists
    /// under what should be a single-writer discipline; only operator
    /// intervention (a restart) recovers the desktop.
    pub fn halt(&self) {
        if !self.halted.swap(true, Ordering::SeqCst) {
            error!(desktop = %self.id, "desktop halted: single-writer invariant is broken");
        }
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }
}
