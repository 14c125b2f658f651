use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{CameraEndpoint, Facing};
use crate::mode::DEFAULT_ANIMAL_CLASSES;

const DEFAULT_CAMERA_URL: &str = "stub://front_camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_INTERVAL_MS: u64 = 100;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
const DEFAULT_SNAPSHOT_PREFIX: &str = "snapshot";

#[derive(Debug, Deserialize, Default)]
struct AnnocamConfigFile {
    cameras: Option<Vec<CameraConfigFile>>,
    detection: Option<DetectionConfigFile>,
    snapshot: Option<SnapshotConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    facing: Option<Facing>,
    width: Option<u32>,
    height: Option<u32>,
    torch: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    interval_ms: Option<u64>,
    min_confidence: Option<f32>,
    animal_classes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct SnapshotConfigFile {
    prefix: Option<String>,
    out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AnnocamConfig {
    pub cameras: Vec<CameraEndpoint>,
    pub detection: DetectionSettings,
    pub snapshot: SnapshotSettings,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    /// Minimum pause between detect+draw cycles.
    pub interval: Duration,
    /// Detections below this confidence are discarded by model backends.
    pub min_confidence: f32,
    /// Labels visible under the animals-only display mode.
    pub animal_classes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    /// Filename prefix; exported files are `<prefix>-<timestamp>.png`.
    pub prefix: String,
    pub out_dir: PathBuf,
}

impl AnnocamConfig {
    /// Load from the file named by `ANNOCAM_CONFIG` (if set), then apply
    /// `ANNOCAM_*` environment overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ANNOCAM_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AnnocamConfigFile) -> Self {
        let cameras = file
            .cameras
            .unwrap_or_default()
            .into_iter()
            .map(|camera| CameraEndpoint {
                url: camera.url.unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                facing: camera.facing,
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                torch: camera.torch.unwrap_or(false),
            })
            .collect::<Vec<_>>();
        let cameras = if cameras.is_empty() {
            vec![CameraEndpoint {
                url: DEFAULT_CAMERA_URL.to_string(),
                facing: Some(Facing::Environment),
                width: DEFAULT_CAMERA_WIDTH,
                height: DEFAULT_CAMERA_HEIGHT,
                torch: false,
            }]
        } else {
            cameras
        };
        let detection = DetectionSettings {
            interval: Duration::from_millis(
                file.detection
                    .as_ref()
                    .and_then(|detection| detection.interval_ms)
                    .unwrap_or(DEFAULT_INTERVAL_MS),
            ),
            min_confidence: file
                .detection
                .as_ref()
                .and_then(|detection| detection.min_confidence)
                .unwrap_or(DEFAULT_MIN_CONFIDENCE),
            animal_classes: file
                .detection
                .and_then(|detection| detection.animal_classes)
                .unwrap_or_else(|| {
                    DEFAULT_ANIMAL_CLASSES
                        .iter()
                        .map(|class| class.to_string())
                        .collect()
                }),
        };
        let snapshot = SnapshotSettings {
            prefix: file
                .snapshot
                .as_ref()
                .and_then(|snapshot| snapshot.prefix.clone())
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_PREFIX.to_string()),
            out_dir: file
                .snapshot
                .and_then(|snapshot| snapshot.out_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        Self {
            cameras,
            detection,
            snapshot,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("ANNOCAM_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.cameras = vec![CameraEndpoint {
                    url,
                    facing: Some(Facing::Environment),
                    width: DEFAULT_CAMERA_WIDTH,
                    height: DEFAULT_CAMERA_HEIGHT,
                    torch: false,
                }];
            }
        }
        if let Ok(interval) = std::env::var("ANNOCAM_INTERVAL_MS") {
            let millis: u64 = interval
                .parse()
                .map_err(|_| anyhow!("ANNOCAM_INTERVAL_MS must be an integer number of ms"))?;
            self.detection.interval = Duration::from_millis(millis);
        }
        if let Ok(classes) = std::env::var("ANNOCAM_ANIMAL_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.detection.animal_classes = parsed;
            }
        }
        if let Ok(prefix) = std::env::var("ANNOCAM_SNAPSHOT_PREFIX") {
            if !prefix.trim().is_empty() {
                self.snapshot.prefix = prefix;
            }
        }
        if let Ok(dir) = std::env::var("ANNOCAM_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                self.snapshot.out_dir = PathBuf::from(dir);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(anyhow!("at least one camera endpoint is required"));
        }
        if self.detection.interval.is_zero() {
            return Err(anyhow!("detection interval must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detection.min_confidence) {
            return Err(anyhow!("min_confidence must be within 0..=1"));
        }
        for class in &mut self.detection.animal_classes {
            *class = class.trim().to_lowercase();
            if class.is_empty() {
                return Err(anyhow!("animal class labels must not be empty"));
            }
        }
        if self.snapshot.prefix.contains(['/', '\\']) {
            return Err(anyhow!("snapshot prefix must not contain path separators"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AnnocamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
