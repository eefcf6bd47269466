//! Core control engine for deskgate.
//!
//! Owns authenticated sessions, serialises control commands against a
//! versioned desktop record, arbitrates Exclusive access to the single
//! shared desktop, and fans state changes out to subscribed observers.
//! Transport (HTTP/WebSocket framing, TLS) is an external collaborator;
//! this crate only sees already-authenticated, already-framed requests.

pub mod arbiter;
pub mod audit;
pub mod auth;
pub mod channel;
pub mod config;
pub mod desktop;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod store;

pub use arbiter::{ArbiterDecision, SessionArbiter};
pub use audit::{AuditRecord, AuditSink, LogAuditSink};
pub use auth::CredentialRegistry;
pub use channel::{ChannelHub, EventStream, LifecycleStream};
pub use config::Config;
pub use desktop::DesktopState;
pub use dispatcher::CommandDispatcher;
pub use engine::{AuthOutcome, Engine};
pub use error::EngineError;
pub use store::{SessionStore, SweepOutcome};
