//! Session identity and lifecycle types.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a control session.
///
/// Wraps a UUID v4 but serialises as raw bytes for bincode efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct SessionId(#[bincode(with_serde)] Uuid);

impl SessionId {
    /// Generate a new random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a session ID from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bearer token proving ownership of a session.
///
/// 32 bytes of CSPRNG entropy. The engine mints these; the transport layer
/// hands the text form to the client at authentication time.
#[derive(Debug, Clone, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct SessionToken([u8; 32]);

impl SessionToken {
    /// Wrap raw token bytes (the engine's credential module fills them).
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// URL-safe base64 text form for transports.
    #[must_use]
    pub fn encoded(&self) -> String {
        use base64::Engine as _;
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Parse the base64 text form back into a token.
    #[must_use]
    pub fn decode(text: &str) -> Option<Self> {
        use base64::Engine as _;
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(text)
            .ok()?;
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl PartialEq for SessionToken {
    /// Constant-time comparison; token equality must not leak a prefix.
    fn eq(&self, other: &Self) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// The authenticated principal a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct Identity(pub String);

impl Identity {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a session is allowed to do with the desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum AccessMode {
    /// May mutate desktop state; at most one holder per desktop.
    Exclusive,
    /// Receives state-change notifications only.
    Observer,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exclusive => write!(f, "Exclusive"),
            Self::Observer => write!(f, "Observer"),
        }
    }
}

/// State of a control session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum SessionState {
    /// Created but not yet attached to a control channel.
    Pending,
    /// Attached and processing commands.
    Active,
    /// No activity within the soft idle window; still usable.
    Idle,
    /// Ended; immutable, retained for audit until garbage-collected.
    Terminated,
}

impl SessionState {
    /// Whether activity updates are still accepted.
    #[must_use]
    pub fn can_touch(self) -> bool {
        !matches!(self, Self::Terminated)
    }

    /// Whether the session may still submit or receive anything.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Pending | Self::Active | Self::Idle)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Active => write!(f, "Active"),
            Self::Idle => write!(f, "Idle"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Admin-facing view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct SessionSummary {
    pub id: SessionId,
    pub identity: Identity,
    pub mode: AccessMode,
    pub state: SessionState,
    /// Unix milliseconds.
    pub created_at_ms: u64,
    /// Unix milliseconds.
    pub last_activity_ms: u64,
}
