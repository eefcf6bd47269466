//! Integration tests exercising the full engine through its public facade.

use std::time::{Duration, Instant};

use deskgate_engine::config::{Config, DesktopConfig, IdentityConfig, SessionConfig};
use deskgate_engine::{ArbiterDecision, Engine};
use deskgate_types::{
    AccessMode, ClipboardContent, CommandKind, CommandStatus, Identity, LifecycleEvent,
    MousePosition, ScreenResolution, SessionState,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

fn test_config() -> Config {
    Config {
        desktop: DesktopConfig {
            name: "test-desktop".to_string(),
            width: 1920,
            height: 1080,
            // Small enough that "hi" does not fit, for the handoff scenario.
            max_clipboard_bytes: 1,
        },
        session: SessionConfig {
            idle_after_secs: 5,
            idle_timeout_secs: 10,
            retention_secs: 60,
            max_sessions: 8,
        },
        identities: vec![
            IdentityConfig {
                name: "alice".to_string(),
                secret: "alice-secret".to_string(),
            },
            IdentityConfig {
                name: "bob".to_string(),
                secret: "bob-secret".to_string(),
            },
            IdentityConfig {
                name: "carol".to_string(),
                secret: "carol-secret".to_string(),
            },
        ],
        ..Config::default()
    }
}

#[tokio::test]
async fn exclusive_handoff_scenario() {
    init_tracing();
    let engine = Engine::new(&test_config());

    // Session A authenticates requesting Exclusive and is granted.
    let a = engine
        .authenticate(&Identity::new("alice"), "alice-secret", AccessMode::Exclusive)
        .unwrap();
    assert_eq!(a.mode, AccessMode::Exclusive);

    // Session B comes in as Observer and queues for Exclusive.
    let b = engine
        .authenticate(&Identity::new("bob"), "bob-secret", AccessMode::Observer)
        .unwrap();
    match engine.request_exclusive(b.session).unwrap() {
        ArbiterDecision::Denied { holder } => assert_eq!(holder, a.session),
        ArbiterDecision::Granted => panic!("B must be denied while A holds the slot"),
    }

    let mut admin = engine.subscribe_lifecycle();
    let mut b_stream = engine.subscribe(b.session).unwrap();

    // A moves the mouse: version 1, position updated.
    let result = engine
        .submit(
            a.session,
            1,
            CommandKind::MoveMouse {
                position: MousePosition::new(100, 50),
            },
        )
        .await
        .unwrap();
    assert_eq!(result.status, CommandStatus::Applied);
    assert_eq!(result.new_version, Some(1));

    let event = b_stream.next().await.unwrap();
    assert_eq!(event.version, 1);
    assert_eq!(event.snapshot.mouse, MousePosition::new(100, 50));

    // A terminates; B is promoted and notified.
    engine.terminate(a.session).unwrap();
    let mut saw_grant = false;
    while let Some(event) = admin.try_next() {
        if let LifecycleEvent::ExclusiveGranted { session } = event {
            assert_eq!(session, b.session);
            saw_grant = true;
        }
    }
    assert!(saw_grant, "B must be notified of the exclusive grant");

    // B's oversized clipboard write is rejected; version unchanged.
    let result = engine
        .submit(
            b.session,
            1,
            CommandKind::SetClipboard {
                content: ClipboardContent::new("hi"),
            },
        )
        .await
        .unwrap();
    assert_eq!(result.status, CommandStatus::Rejected);
    assert_eq!(result.reason.as_deref(), Some("payload_too_large"));
    assert_eq!(engine.desktop_snapshot().version, 1);

    // B can still mutate within limits.
    let result = engine
        .submit(
            b.session,
            2,
            CommandKind::MoveMouse {
                position: MousePosition::new(7, 7),
            },
        )
        .await
        .unwrap();
    assert_eq!(result.new_version, Some(2));
}

#[tokio::test]
async fn fifo_promotion_across_three_sessions() {
    init_tracing();
    let engine = Engine::new(&test_config());

    let a = engine
        .authenticate(&Identity::new("alice"), "alice-secret", AccessMode::Exclusive)
        .unwrap();
    let b = engine
        .authenticate(&Identity::new("bob"), "bob-secret", AccessMode::Observer)
        .unwrap();
    let c = engine
        .authenticate(&Identity::new("carol"), "carol-secret", AccessMode::Observer)
        .unwrap();

    engine.request_exclusive(b.session).unwrap();
    engine.request_exclusive(c.session).unwrap();

    // Queue drains in arrival order as holders fall away.
    engine.terminate(a.session).unwrap();
    assert!(engine
        .submit(
            b.session,
            1,
            CommandKind::MoveMouse {
                position: MousePosition::new(1, 1)
            }
        )
        .await
        .unwrap()
        .status
        == CommandStatus::Applied);

    engine.release_exclusive(b.session).unwrap();
    assert!(engine
        .submit(
            c.session,
            1,
            CommandKind::MoveMouse {
                position: MousePosition::new(2, 2)
            }
        )
        .await
        .unwrap()
        .status
        == CommandStatus::Applied);

    // B lost the slot and is an observer again.
    let rejected = engine
        .submit(
            b.session,
            2,
            CommandKind::MoveMouse {
                position: MousePosition::new(3, 3),
            },
        )
        .await
        .unwrap();
    assert_eq!(rejected.reason.as_deref(), Some("exclusive_required"));
}

#[tokio::test]
async fn snapshot_reflects_apply_immediately() {
    init_tracing();
    let engine = Engine::new(&test_config());
    let a = engine
        .authenticate(&Identity::new("alice"), "alice-secret", AccessMode::Exclusive)
        .unwrap();

    let before = engine.desktop_snapshot();
    let result = engine
        .submit(
            a.session,
            1,
            CommandKind::SetResolution {
                resolution: ScreenResolution::new(2560, 1440),
            },
        )
        .await
        .unwrap();

    let after = engine.desktop_snapshot();
    assert_eq!(after.version, before.version + 1);
    assert_eq!(after.version, result.new_version.unwrap());
    assert_eq!(after.resolution, ScreenResolution::new(2560, 1440));
    assert_eq!(after.last_applied.map(|id| id.seq), Some(1));
}

#[tokio::test]
async fn idle_sweep_hands_the_desktop_over() {
    init_tracing();
    let engine = Engine::new(&test_config());
    let start = Instant::now();

    let a = engine
        .authenticate(&Identity::new("alice"), "alice-secret", AccessMode::Exclusive)
        .unwrap();
    let b = engine
        .authenticate(&Identity::new("bob"), "bob-secret", AccessMode::Observer)
        .unwrap();
    engine.request_exclusive(b.session).unwrap();

    // Give B fresher activity than A, then sweep at a point where only A
    // has been idle past the 10 s hard window.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let denied = engine
        .submit(
            b.session,
            1,
            CommandKind::MoveMouse {
                position: MousePosition::new(1, 1),
            },
        )
        .await
        .unwrap();
    assert_eq!(denied.reason.as_deref(), Some("exclusive_required"));

    engine.sweep_once(start + Duration::from_secs(11));

    let listed = engine.admin_list_sessions();
    let a_state = listed.iter().find(|s| s.id == a.session).unwrap().state;
    let b_state = listed.iter().find(|s| s.id == b.session).unwrap().state;
    assert_eq!(a_state, SessionState::Terminated);
    assert!(b_state != SessionState::Terminated);

    // B was promoted and can now mutate.
    let applied = engine
        .submit(
            b.session,
            2,
            CommandKind::MoveMouse {
                position: MousePosition::new(9, 9),
            },
        )
        .await
        .unwrap();
    assert_eq!(applied.status, CommandStatus::Applied);
}

#[tokio::test]
async fn admin_listing_is_ordered_and_complete() {
    init_tracing();
    let engine = Engine::new(&test_config());

    let a = engine
        .authenticate(&Identity::new("alice"), "alice-secret", AccessMode::Exclusive)
        .unwrap();
    let b = engine
        .authenticate(&Identity::new("bob"), "bob-secret", AccessMode::Observer)
        .unwrap();

    let listed = engine.admin_list_sessions();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().any(|s| s.id == a.session && s.mode == AccessMode::Exclusive));
    assert!(listed.iter().any(|s| s.id == b.session && s.mode == AccessMode::Observer));

    engine.admin_evict(a.session).unwrap();
    let listed = engine.admin_list_sessions();
    let evicted = listed.iter().find(|s| s.id == a.session).unwrap();
    assert_eq!(evicted.state, SessionState::Terminated);
}
