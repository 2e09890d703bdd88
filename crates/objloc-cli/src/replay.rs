//! Replays a directory of image files into the frame buffer, standing in
//! for a live camera feed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use objloc_engine::FrameBuffer;
use objloc_providers::{CameraProvider, FrameSample, RawFrame};

use crate::errors::{CliError, Result};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Image files in `dir`, sorted by file name.
pub fn discover_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    frames.sort();
    if frames.is_empty() {
        return Err(CliError::NoFrames(dir.to_path_buf()));
    }
    Ok(frames)
}

/// Producer side of the replay. Frames are read as encoded bytes and decoded
/// by the detection loop, so unreadable images surface as skipped cycles.
pub struct FrameReplay {
    frames: Vec<PathBuf>,
    period: Duration,
}

impl FrameReplay {
    pub fn new(frames: Vec<PathBuf>, fps: f64) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(CliError::InvalidArgument(format!(
                "source fps must be positive, got {fps}"
            )));
        }
        Ok(Self {
            frames,
            period: Duration::from_secs_f64(1.0 / fps),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Starts the producer thread. `finished` is raised once the last frame
    /// has been submitted; `shutdown` stops the producer early. The thread
    /// returns the number of frames submitted.
    pub fn spawn(
        self,
        buffer: FrameBuffer<FrameSample>,
        finished: Arc<AtomicBool>,
        shutdown: Arc<AtomicBool>,
    ) -> JoinHandle<usize> {
        thread::spawn(move || {
            let mut camera = CameraProvider::new();
            let mut submitted = 0usize;
            let mut deadline = Instant::now();

            for path in &self.frames {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                match std::fs::read(path) {
                    Ok(bytes) => {
                        let sample = camera.ingest_frame(RawFrame::encoded(bytes));
                        debug!("Submitting {} as frame {}", path.display(), sample.sequence);
                        buffer.submit(sample);
                        submitted += 1;
                    }
                    Err(err) => warn!("Cannot read {}: {}", path.display(), err),
                }

                deadline += self.period;
                if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                    thread::sleep(wait);
                }
            }

            info!("Replay finished: {submitted}/{} frames submitted", self.frames.len());
            finished.store(true, Ordering::Release);
            submitted
        })
    }
}
