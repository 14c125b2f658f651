//! annocamd - annotated camera preview daemon
//!
//! Runs the full pipeline headless:
//! 1. Loads configuration (file + environment overrides)
//! 2. Warms up the detector
//! 3. Starts the capture session and the paced detection loop
//! 4. Logs cycle throughput periodically
//! 5. Optionally writes a final annotated snapshot on shutdown

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::time::Duration;

use annocam::ui::{Ui, UiMode};
use annocam::{
    AnnocamConfig, CaptureState, Detector, DisplayMode, LifecycleController, StubDetector,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Run duration in seconds. 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 10)]
    seconds: u64,
    /// Start in animals-only display mode.
    #[arg(long, default_value_t = false)]
    animals_only: bool,
    /// Write an annotated snapshot before shutting down.
    #[arg(long, default_value_t = false)]
    snapshot: bool,
    /// Camera URL override (stub://, http(s)://, v4l2://).
    #[arg(long, env = "ANNOCAM_CAMERA_URL")]
    camera: Option<String>,
    /// ONNX model path. Runs the scripted detector when omitted.
    #[arg(long, env = "ANNOCAM_MODEL")]
    model: Option<std::path::PathBuf>,
    /// Terminal output: auto, plain, or pretty.
    #[arg(long)]
    ui: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::new(UiMode::parse(args.ui.as_deref()));

    let mut config = AnnocamConfig::load().context("loading configuration")?;
    if let Some(url) = &args.camera {
        for camera in &mut config.cameras {
            camera.url = url.clone();
        }
    }

    let detector = build_detector(args.model.as_deref(), &config)?;
    let controller = LifecycleController::new(&config, detector);

    {
        let stage = ui.stage("loading detector");
        if let Err(e) = controller.warm_up_detector().await {
            stage.fail(&e.to_string());
            return Err(e).context("detector warm-up");
        }
    }

    {
        let stage = ui.stage("starting camera");
        match controller.toggle_camera().await {
            Ok(CaptureState::On) => {}
            Ok(state) => {
                stage.fail("unexpected state");
                anyhow::bail!("camera settled in state {:?}", state);
            }
            Err(e) => {
                stage.fail(&e.to_string());
                return Err(e).context("camera start");
            }
        }
    }

    if args.animals_only {
        controller.set_mode(DisplayMode::AnimalsOnly);
    }

    log::info!(
        "annocamd running: {} camera(s), {} ms interval, mode '{}'",
        config.cameras.len(),
        config.detection.interval.as_millis(),
        controller.mode().label()
    );

    run_until_shutdown(&controller, args.seconds).await?;

    if args.snapshot {
        let snapshot = controller.snapshot().await.context("final snapshot")?;
        fs::create_dir_all(&config.snapshot.out_dir)?;
        let path = config.snapshot.out_dir.join(&snapshot.filename);
        fs::write(&path, &snapshot.bytes)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("snapshot written to {}", path.display());
    }

    controller.toggle_camera().await.context("camera stop")?;
    log::info!("annocamd stopped after {} cycles", controller.loop_cycles());
    Ok(())
}

fn build_detector(
    model: Option<&std::path::Path>,
    config: &AnnocamConfig,
) -> Result<Box<dyn Detector>> {
    let Some(path) = model else {
        return Ok(Box::new(StubDetector::new()));
    };

    #[cfg(feature = "backend-tract")]
    {
        let camera = &config.cameras[0];
        let detector = annocam::TractDetector::new(
            path,
            camera.width,
            camera.height,
            config.detection.min_confidence,
        )
        .with_context(|| format!("loading model {}", path.display()))?;
        return Ok(Box::new(detector));
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        let _ = (path, config);
        anyhow::bail!("--model requires a build with the backend-tract feature")
    }
}

async fn run_until_shutdown(controller: &LifecycleController, seconds: u64) -> Result<()> {
    let deadline = async {
        if seconds == 0 {
            std::future::pending::<()>().await;
        } else {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
        }
    };
    tokio::pin!(deadline);

    let mut health = tokio::time::interval(Duration::from_secs(5));
    health.tick().await; // the first tick is immediate
    let mut last_cycles = 0u64;

    loop {
        tokio::select! {
            _ = &mut deadline => {
                log::info!("run duration elapsed");
                return Ok(());
            }
            result = tokio::signal::ctrl_c() => {
                result.context("listening for ctrl-c")?;
                log::info!("interrupt received, shutting down");
                return Ok(());
            }
            _ = health.tick() => {
                let cycles = controller.loop_cycles();
                let status = controller.status();
                log::info!(
                    "health: {} cycles ({:.1}/s), capture {:?}, flash {}, {}",
                    cycles,
                    (cycles - last_cycles) as f64 / 5.0,
                    status.capture,
                    status.flash.label(),
                    status.message
                );
                last_cycles = cycles;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> AnnocamConfig {
        AnnocamConfig {
            cameras: vec![annocam::CameraEndpoint {
                url: "stub://front_camera".to_string(),
                facing: None,
                width: 640,
                height: 480,
                torch: false,
            }],
            detection: annocam::config::DetectionSettings {
                interval: Duration::from_millis(100),
                min_confidence: 0.5,
                animal_classes: vec!["dog".to_string()],
            },
            snapshot: annocam::config::SnapshotSettings {
                prefix: "snapshot".to_string(),
                out_dir: ".".into(),
            },
        }
    }

    #[test]
    fn no_model_selects_scripted_detector() {
        let detector = build_detector(None, &stub_config()).unwrap();
        assert_eq!(detector.name(), "stub");
    }

    #[cfg(feature = "backend-tract")]
    #[test]
    fn missing_model_file_fails_loudly() {
        let err = build_detector(
            Some(std::path::Path::new("/nonexistent/model.onnx")),
            &stub_config(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("model"));
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn model_flag_requires_tract_build() {
        let err = build_detector(
            Some(std::path::Path::new("model.onnx")),
            &stub_config(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("backend-tract"));
    }
}
