//! End-to-end lifecycle tests against the synthetic camera backend.

use std::path::PathBuf;
use std::time::Duration;

use annocam::config::{AnnocamConfig, DetectionSettings, SnapshotSettings};
use annocam::{
    CameraEndpoint, CaptureError, CaptureState, CommandError, DisplayMode, Facing, FlashState,
    LifecycleController, SnapshotError, StubDetector, DEFAULT_ANIMAL_CLASSES,
};

fn config_for(url: &str, torch: bool) -> AnnocamConfig {
    AnnocamConfig {
        cameras: vec![CameraEndpoint {
            url: url.to_string(),
            facing: Some(Facing::Environment),
            width: 96,
            height: 96,
            torch,
        }],
        detection: DetectionSettings {
            interval: Duration::from_millis(1),
            min_confidence: 0.5,
            animal_classes: DEFAULT_ANIMAL_CLASSES
                .iter()
                .map(|class| class.to_string())
                .collect(),
        },
        snapshot: SnapshotSettings {
            prefix: "capture".to_string(),
            out_dir: PathBuf::from("."),
        },
    }
}

async fn ready_controller(url: &str, torch: bool) -> LifecycleController {
    let controller = LifecycleController::new(&config_for(url, torch), Box::new(StubDetector::new()));
    controller
        .warm_up_detector()
        .await
        .expect("stub detector warms up");
    controller
}

#[tokio::test]
async fn full_session_produces_cycles_and_snapshot() {
    let controller = ready_controller("stub://front", false).await;

    assert_eq!(
        controller.toggle_camera().await.expect("camera starts"),
        CaptureState::On
    );
    assert!(controller.loop_running());

    // Let the loop render a few frames.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(controller.loop_cycles() > 0);
    assert!(controller.surface_generation().await > 0);

    let snapshot = controller.snapshot().await.expect("snapshot while on");
    assert!(snapshot.filename.starts_with("capture-"));
    assert!(snapshot.filename.ends_with(".png"));
    assert_eq!(&snapshot.bytes[..4], &[0x89, b'P', b'N', b'G']);

    assert_eq!(
        controller.toggle_camera().await.expect("camera stops"),
        CaptureState::Off
    );
    assert!(!controller.loop_running());
}

#[tokio::test]
async fn failed_start_leaves_everything_idle() {
    let controller = ready_controller("stub://unavailable", false).await;

    let err = controller.toggle_camera().await.unwrap_err();
    assert!(matches!(
        err,
        CommandError::Capture(CaptureError::DeviceUnavailable(_))
    ));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(controller.capture_state(), CaptureState::Off);
    assert!(!controller.loop_running());
    assert_eq!(controller.loop_cycles(), 0);
    assert_eq!(controller.surface_generation().await, 0);
}

#[tokio::test]
async fn permission_denied_aborts_start() {
    let controller = ready_controller("stub://denied", false).await;
    let err = controller.toggle_camera().await.unwrap_err();
    assert!(matches!(
        err,
        CommandError::Capture(CaptureError::PermissionDenied(_))
    ));
    assert_eq!(controller.capture_state(), CaptureState::Off);
}

#[tokio::test]
async fn snapshot_while_off_fails_without_drawing() {
    let controller = ready_controller("stub://front", false).await;

    let before = controller.surface_generation().await;
    let err = controller.snapshot().await.unwrap_err();
    assert!(matches!(err, SnapshotError::CameraNotActive));
    assert_eq!(controller.surface_generation().await, before);
}

#[tokio::test]
async fn flash_follows_session_lifecycle() {
    let controller = ready_controller("stub://front", true).await;
    assert_eq!(controller.flash_state(), FlashState::Unsupported);

    controller.toggle_camera().await.expect("camera starts");
    assert_eq!(controller.flash_state(), FlashState::Off);

    assert_eq!(
        controller.toggle_flash().await.expect("torch on"),
        FlashState::On
    );

    // Stopping with the torch lit resets flash state for the next session.
    controller.toggle_camera().await.expect("camera stops");
    assert_eq!(controller.flash_state(), FlashState::Unsupported);

    controller.toggle_camera().await.expect("camera restarts");
    assert_eq!(controller.flash_state(), FlashState::Off);
    controller.toggle_camera().await.expect("camera stops");
}

#[tokio::test]
async fn torch_rejection_disables_flash_for_the_session() {
    let controller = ready_controller("stub://flaky-torch", true).await;
    controller.toggle_camera().await.expect("camera starts");
    assert_eq!(controller.flash_state(), FlashState::Off);

    let err = controller.toggle_flash().await.unwrap_err();
    assert!(matches!(
        err,
        CommandError::Capture(CaptureError::TorchControlFailed(_))
    ));
    assert_eq!(controller.flash_state(), FlashState::Unsupported);

    // A second attempt is refused outright.
    let err = controller.toggle_flash().await.unwrap_err();
    assert!(matches!(
        err,
        CommandError::Capture(CaptureError::TorchUnsupported)
    ));
    controller.toggle_camera().await.expect("camera stops");
}

#[tokio::test]
async fn mode_switch_applies_while_running() {
    let controller = ready_controller("stub://front", false).await;
    controller.toggle_camera().await.expect("camera starts");

    assert_eq!(controller.mode(), DisplayMode::All);
    assert_eq!(controller.toggle_mode(), DisplayMode::AnimalsOnly);

    // The loop keeps rendering in the new mode.
    let cycles = controller.loop_cycles();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(controller.loop_cycles() > cycles);

    let snapshot = controller.snapshot().await.expect("animals-only snapshot");
    assert!(!snapshot.bytes.is_empty());

    controller.toggle_camera().await.expect("camera stops");
}

#[tokio::test]
async fn capture_state_watch_observes_transitions() {
    let controller = ready_controller("stub://front", false).await;
    let mut watcher = controller.watch_capture_state();
    assert_eq!(*watcher.borrow(), CaptureState::Off);

    // The watcher may observe the transient Starting/Stopping states or skip
    // straight to the settled one.
    controller.toggle_camera().await.expect("camera starts");
    while *watcher.borrow_and_update() != CaptureState::On {
        watcher.changed().await.expect("state change");
    }

    controller.toggle_camera().await.expect("camera stops");
    while *watcher.borrow_and_update() != CaptureState::Off {
        watcher.changed().await.expect("state change");
    }
}
