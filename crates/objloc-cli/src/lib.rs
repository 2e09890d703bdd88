pub mod errors;
pub mod output;
pub mod replay;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use clap::Parser;
use log::{debug, info, warn};
use objloc_engine::{LocatorConfig, ObjectLocator, TickScheduler};

use crate::errors::{CliError, Result};
use crate::output::{JsonLinesPublisher, OverlayRenderer};
use crate::replay::{FrameReplay, discover_frames};

/// Locate a planar reference object in a replayed frame sequence.
#[derive(Debug, Clone, Parser)]
#[command(name = "objloc")]
#[command(version)]
pub struct Args {
    /// YAML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Calibration image; overrides `calibration_image` from the config.
    #[arg(long)]
    pub calibration: Option<PathBuf>,

    /// Directory of frames, replayed in file-name order.
    #[arg(long)]
    pub frames: PathBuf,

    /// Rate at which frames are fed to the buffer.
    #[arg(long, default_value = "30.0")]
    pub source_fps: f64,

    /// Directory for overlay PNGs and `results.jsonl`.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Stop after this many scheduler ticks.
    #[arg(long)]
    pub max_ticks: Option<u64>,
}

/// Totals for one replay run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub cycles: u64,
    pub located: u64,
    pub submitted_frames: u64,
    pub dropped_frames: u64,
}

pub fn load_config(args: &Args) -> Result<LocatorConfig> {
    let mut config = match &args.config {
        Some(path) => LocatorConfig::load(path)?,
        None => LocatorConfig::default(),
    };
    if let Some(calibration) = &args.calibration {
        config.calibration_image = Some(calibration.clone());
    }
    config.validate()?;
    Ok(config)
}

pub fn run(args: &Args) -> Result<RunSummary> {
    let config = load_config(args)?;
    let started = Instant::now();
    let mut locator = ObjectLocator::from_config(&config)?;
    let (ref_width, ref_height) = locator.reference().dimensions();
    info!(
        "Reference {}x{} with {} keypoints",
        ref_width,
        ref_height,
        locator.reference().features().len()
    );

    let frames = discover_frames(&args.frames)?;
    let replay = FrameReplay::new(frames, args.source_fps)?;
    info!(
        "Replaying {} frames from {} at {:.1} fps",
        replay.len(),
        args.frames.display(),
        args.source_fps
    );

    let (mut overlay, mut publisher) = match &args.output {
        Some(dir) => {
            let overlay = OverlayRenderer::new(dir)?;
            let publisher = JsonLinesPublisher::create(&dir.join("results.jsonl"))?;
            (Some(overlay), Some(publisher))
        }
        None => (None, None),
    };

    let mut scheduler = TickScheduler::new(config.rate_hz)?;
    if let Some(max) = args.max_ticks {
        scheduler = scheduler.with_max_ticks(max);
    }
    let shutdown = scheduler.shutdown_handle();
    let finished = Arc::new(AtomicBool::new(false));
    let buffer = locator.frame_buffer();
    let producer = replay.spawn(buffer.clone(), Arc::clone(&finished), Arc::clone(&shutdown));

    let mut located = 0u64;
    let mut publish_error: Option<CliError> = None;
    let ticks = scheduler.run(|tick| {
        // Producer done and nothing left to take.
        let drained = finished.load(Ordering::Acquire) && buffer.is_empty();

        let report = match overlay.as_mut() {
            Some(sink) => locator.on_cycle_with(sink),
            None => locator.on_cycle(),
        };

        if let Some(report) = report {
            if report.result.is_located() {
                located += 1;
            }
            if let Some(publisher) = publisher.as_mut() {
                if let Err(err) = publisher.publish(locator.cycles() - 1, &report) {
                    publish_error = Some(err);
                    shutdown.store(true, Ordering::Release);
                    return;
                }
            }
        } else {
            debug!("Tick {tick}: no frame buffered");
        }

        if drained {
            shutdown.store(true, Ordering::Release);
        }
    });

    // Stops the producer when the tick budget ran out first.
    shutdown.store(true, Ordering::Release);
    if producer.join().is_err() {
        warn!("Frame replay thread panicked");
    }
    if let Some(err) = publish_error {
        return Err(err);
    }
    if let Some(publisher) = publisher {
        info!("Published {} cycle records", publisher.records());
        publisher.finish()?;
    }

    let summary = RunSummary {
        ticks,
        cycles: locator.cycles(),
        located,
        submitted_frames: buffer.submitted(),
        dropped_frames: buffer.dropped(),
    };
    info!(
        "Processed {} cycles in {} ticks ({} located, {}/{} frames dropped) in {:.2}s",
        summary.cycles,
        summary.ticks,
        summary.located,
        summary.dropped_frames,
        summary.submitted_frames,
        started.elapsed().as_secs_f64()
    );
    if let Some(overlay) = &overlay {
        info!("Wrote {} overlay frames", overlay.written());
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "objloc",
            "--config",
            "loc.yaml",
            "--frames",
            "frames/",
            "--source-fps",
            "60",
            "--max-ticks",
            "10",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("loc.yaml")));
        assert_eq!(args.frames, PathBuf::from("frames/"));
        assert_eq!(args.source_fps, 60.0);
        assert_eq!(args.max_ticks, Some(10));
        assert!(args.output.is_none());
    }

    #[test]
    fn frames_flag_is_required() {
        assert!(Args::try_parse_from(["objloc", "--config", "loc.yaml"]).is_err());
    }

    #[test]
    fn calibration_flag_overrides_config() {
        let args = Args::try_parse_from([
            "objloc",
            "--calibration",
            "poster.png",
            "--frames",
            "frames",
        ])
        .unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.calibration_image, Some(PathBuf::from("poster.png")));
    }

    #[test]
    fn missing_calibration_aborts() {
        let args = Args::try_parse_from(["objloc", "--frames", "frames"]).unwrap();
        assert!(matches!(
            run(&args),
            Err(CliError::Calibration(
                objloc_engine::CalibrationLoadError::Missing
            ))
        ));
    }
}
