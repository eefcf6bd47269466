//! Desktop state: the versioned record every command mutates.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::CommandId;

/// Largest supported resolution per axis.
pub const MAX_RESOLUTION_AXIS: u32 = 16_384;

/// Unique identifier for a logical desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct DesktopId(#[bincode(with_serde)] Uuid);

impl DesktopId {
    /// Generate a new random desktop ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DesktopId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DesktopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Absolute cursor position in desktop pixels.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub struct MousePosition {
    pub x: i32,
    pub y: i32,
}

impl MousePosition {
    #[must_use]
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Clamp the position into a resolution's bounds.
    #[must_use]
    pub fn clamped_to(self, resolution: ScreenResolution) -> Self {
        let max_x = i32::try_from(resolution.width).unwrap_or(i32::MAX).saturating_sub(1);
        let max_y = i32::try_from(resolution.height).unwrap_or(i32::MAX).saturating_sub(1);
        Self {
            x: self.x.clamp(0, max_x.max(0)),
            y: self.y.clamp(0, max_y.max(0)),
        }
    }
}

/// Desktop resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct ScreenResolution {
    pub width: u32,
    pub height: u32,
}

impl ScreenResolution {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether both axes are positive and within [`MAX_RESOLUTION_AXIS`].
    #[must_use]
    pub fn is_valid(self) -> bool {
        (1..=MAX_RESOLUTION_AXIS).contains(&self.width)
            && (1..=MAX_RESOLUTION_AXIS).contains(&self.height)
    }
}

impl Default for ScreenResolution {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl std::fmt::Display for ScreenResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Text clipboard content.
///
/// Size limits are enforced by the desktop-state owner at apply time, not
/// here; this type only reports its own size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct ClipboardContent {
    pub text: String,
}

impl ClipboardContent {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Size of the content in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.text.len()
    }
}

/// An immutable snapshot of the desktop record at a given version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct DesktopSnapshot {
    /// Strictly increases with every successful mutation.
    pub version: u64,
    pub mouse: MousePosition,
    pub clipboard: ClipboardContent,
    pub resolution: ScreenResolution,
    /// The command that produced this version, if any mutation has landed.
    pub last_applied: Option<CommandId>,
}

impl DesktopSnapshot {
    /// Initial state at version 0, before any command has been applied.
    #[must_use]
    pub fn initial(resolution: ScreenResolution) -> Self {
        Self {
            version: 0,
            mouse: MousePosition::default(),
            clipboard: ClipboardContent::default(),
            resolution,
            last_applied: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;

    #[test]
    fn resolution_validity() {
        assert!(ScreenResolution::new(1920, 1080).is_valid());
        assert!(ScreenResolution::new(1, 1).is_valid());
        assert!(ScreenResolution::new(16_384, 16_384).is_valid());
        assert!(!ScreenResolution::new(0, 1080).is_valid());
        assert!(!ScreenResolution::new(1920, 0).is_valid());
        assert!(!ScreenResolution::new(16_385, 1080).is_valid());
    }

    #[test]
    fn mouse_clamping() {
        let res = ScreenResolution::new(1920, 1080);
        assert_eq!(
            MousePosition::new(-5, 2000).clamped_to(res),
            MousePosition::new(0, 1079)
        );
        assert_eq!(
            MousePosition::new(100, 50).clamped_to(res),
            MousePosition::new(100, 50)
        );
    }

    #[test]
    fn clipboard_size() {
        assert_eq!(ClipboardContent::new("abc").size(), 3);
        assert_eq!(ClipboardContent::default().size(), 0);
    }

    #[test]
    fn snapshot_bincode_roundtrip() {
        let snapshot = DesktopSnapshot {
            version: 42,
            mouse: MousePosition::new(100, 50),
            clipboard: ClipboardContent::new("hi"),
            resolution: ScreenResolution::default(),
            last_applied: Some(CommandId {
                session: SessionId::new(),
                seq: 7,
            }),
        };
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(&snapshot, config).unwrap();
        let (decoded, _): (DesktopSnapshot, _) =
            bincode::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(snapshot, decoded);
    }

    #[test]
    fn initial_snapshot_is_version_zero() {
        let snapshot = DesktopSnapshot::initial(ScreenResolution::default());
        assert_eq!(snapshot.version, 0);
        assert!(snapshot.last_applied.is_none());
        assert_eq!(snapshot.mouse, MousePosition::default());
    }
}
