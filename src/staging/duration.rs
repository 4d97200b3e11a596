//! Audio duration probe. Logged for observability only.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use super::layout::file_extension;

/// Read the container header of `path` and return the duration in seconds.
pub fn probe_duration_secs(path: &Path) -> Option<f64> {
    let file = File::open(path).ok()?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.to_str().and_then(file_extension) {
        hint.with_extension(ext);
    }

    let probed = match symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    ) {
        Ok(p) => p,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Audio probe failed");
            return None;
        }
    };

    let track = probed.format.default_track()?;
    let params = &track.codec_params;
    let frames = params.n_frames?;

    if let Some(time_base) = params.time_base {
        let time = time_base.calc_time(frames);
        return Some(time.seconds as f64 + time.frac);
    }
    params.sample_rate.map(|rate| frames as f64 / rate as f64)
}

/// Probe on a blocking thread and log the result; never awaited by callers.
pub fn spawn_duration_probe(path: PathBuf) {
    tokio::task::spawn_blocking(move || match probe_duration_secs(&path) {
        Some(secs) => info!(
            path = %path.display(),
            "Audio file duration: {} minutes {:.1} seconds",
            (secs / 60.0).floor(),
            secs % 60.0
        ),
        None => debug!(path = %path.display(), "Audio file duration unknown"),
    });
}
