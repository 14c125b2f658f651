use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use annocam::capture::Facing;
use annocam::config::AnnocamConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ANNOCAM_CONFIG",
        "ANNOCAM_CAMERA_URL",
        "ANNOCAM_INTERVAL_MS",
        "ANNOCAM_ANIMAL_CLASSES",
        "ANNOCAM_SNAPSHOT_PREFIX",
        "ANNOCAM_SNAPSHOT_DIR",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "cameras": [
            {
                "url": "https://cam.local/stream",
                "facing": "environment",
                "width": 800,
                "height": 600,
                "torch": true
            }
        ],
        "detection": {
            "interval_ms": 250,
            "min_confidence": 0.6,
            "animal_classes": ["Dog", "Cat"]
        },
        "snapshot": {
            "prefix": "yard",
            "out_dir": "/tmp/annocam"
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("ANNOCAM_CONFIG", file.path());
    std::env::set_var("ANNOCAM_INTERVAL_MS", "125");
    std::env::set_var("ANNOCAM_SNAPSHOT_PREFIX", "backyard");

    let cfg = AnnocamConfig::load().expect("load config");

    assert_eq!(cfg.cameras.len(), 1);
    assert_eq!(cfg.cameras[0].url, "https://cam.local/stream");
    assert_eq!(cfg.cameras[0].facing, Some(Facing::Environment));
    assert_eq!(cfg.cameras[0].width, 800);
    assert_eq!(cfg.cameras[0].height, 600);
    assert!(cfg.cameras[0].torch);
    assert_eq!(cfg.detection.interval, Duration::from_millis(125));
    assert_eq!(cfg.detection.min_confidence, 0.6);
    // Labels are normalized to lowercase during validation.
    assert_eq!(cfg.detection.animal_classes, vec!["dog", "cat"]);
    assert_eq!(cfg.snapshot.prefix, "backyard");
    assert_eq!(cfg.snapshot.out_dir.to_str(), Some("/tmp/annocam"));

    clear_env();
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AnnocamConfig::load().expect("load config");

    assert_eq!(cfg.cameras.len(), 1);
    assert_eq!(cfg.cameras[0].url, "stub://front_camera");
    assert_eq!(cfg.detection.interval, Duration::from_millis(100));
    assert!(cfg.detection.animal_classes.contains(&"dog".to_string()));
    assert!(!cfg.detection.animal_classes.contains(&"person".to_string()));
    assert_eq!(cfg.snapshot.prefix, "snapshot");

    clear_env();
}

#[test]
fn camera_url_env_replaces_camera_list() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ANNOCAM_CAMERA_URL", "stub://garden");
    std::env::set_var("ANNOCAM_ANIMAL_CLASSES", "fox, badger");

    let cfg = AnnocamConfig::load().expect("load config");
    assert_eq!(cfg.cameras.len(), 1);
    assert_eq!(cfg.cameras[0].url, "stub://garden");
    assert_eq!(cfg.detection.animal_classes, vec!["fox", "badger"]);

    clear_env();
}

#[test]
fn rejects_invalid_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ANNOCAM_INTERVAL_MS", "0");
    assert!(AnnocamConfig::load().is_err());

    std::env::set_var("ANNOCAM_INTERVAL_MS", "not-a-number");
    assert!(AnnocamConfig::load().is_err());

    std::env::remove_var("ANNOCAM_INTERVAL_MS");
    std::env::set_var("ANNOCAM_SNAPSHOT_PREFIX", "nested/prefix");
    assert!(AnnocamConfig::load().is_err());

    clear_env();
}
