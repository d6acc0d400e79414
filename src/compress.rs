//! Compression fallback: re-encodes a file Telegram rejected as too large.
//! Only invoked after the transport itself refuses the upload; the regular
//! size guard runs before this ever comes into play.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{error, info, warn};

const FFMPEG_TIMEOUT: Duration = Duration::from_secs(300);
const AUDIO_BITRATE_KBPS: u64 = 96;
/// Applied to the size ratio so the result lands safely under the ceiling.
const SAFETY_FACTOR: f64 = 0.9;
const MIN_VIDEO_BITRATE_KBPS: u64 = 100;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    bit_rate: Option<String>,
}

/// Re-encodes `source` to fit under `target_bytes`, scaling the video
/// bitrate by the ratio of target to actual size. On success the original
/// is deleted and the new path returned; any failure leaves the original in
/// place and reports None.
pub async fn compress_to_fit(source: &Path, target_bytes: u64) -> Option<PathBuf> {
    let source_size = tokio::fs::metadata(source).await.ok()?.len();
    if source_size == 0 {
        return None;
    }

    let source_bitrate_kbps = probe_bitrate_kbps(source).await?;
    let video_bitrate =
        scaled_video_bitrate_kbps(source_bitrate_kbps, source_size, target_bytes);

    let output = compressed_path(source);
    info!(
        "Compressing {} ({source_size} bytes) at {video_bitrate}k video bitrate",
        source.display()
    );

    let command_future = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(source)
        .arg("-b:v")
        .arg(format!("{video_bitrate}k"))
        .arg("-maxrate")
        .arg(format!("{video_bitrate}k"))
        .arg("-bufsize")
        .arg(format!("{}k", video_bitrate * 2))
        .arg("-b:a")
        .arg(format!("{AUDIO_BITRATE_KBPS}k"))
        .arg("-preset")
        .arg("fast")
        .arg(&output)
        .output();

    let result = match timeout(FFMPEG_TIMEOUT, command_future).await {
        Ok(result) => result,
        Err(_) => {
            warn!("ffmpeg timed out after {}s", FFMPEG_TIMEOUT.as_secs());
            let _ = tokio::fs::remove_file(&output).await;
            return None;
        }
    };

    match result {
        Ok(out) if out.status.success() => {
            // Original is gone once the re-encode succeeds.
            if let Err(error) = tokio::fs::remove_file(source).await {
                warn!("Could not remove original {}: {error}", source.display());
            }
            Some(output)
        }
        Ok(out) => {
            warn!(
                "ffmpeg exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr)
                    .lines()
                    .next_back()
                    .unwrap_or("")
            );
            let _ = tokio::fs::remove_file(&output).await;
            None
        }
        Err(error) => {
            if error.kind() == ErrorKind::NotFound {
                error!("ffmpeg is not installed; cannot compress oversized files.");
            } else {
                error!("Could not execute ffmpeg: {error}");
            }
            None
        }
    }
}

/// Total stream bitrate in kbps, from ffprobe's format block.
async fn probe_bitrate_kbps(source: &Path) -> Option<u64> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-show_entries", "format=bit_rate", "-of", "json"])
        .arg(source)
        .output()
        .await
        .map_err(|error| {
            error!("Could not execute ffprobe: {error}");
        })
        .ok()?;

    if !output.status.success() {
        warn!("ffprobe failed for {}", source.display());
        return None;
    }

    let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|error| warn!("Could not parse ffprobe JSON: {error}"))
        .ok()?;
    let total = parsed.format.bit_rate?.parse::<u64>().ok()?;
    Some(total / 1000)
}

/// New video bitrate: total bitrate scaled by target/source with a safety
/// factor, minus the fixed audio allotment, floored at a watchable minimum.
fn scaled_video_bitrate_kbps(total_kbps: u64, source_size: u64, target_bytes: u64) -> u64 {
    let ratio = (target_bytes as f64 / source_size as f64).min(1.0) * SAFETY_FACTOR;
    let scaled = (total_kbps as f64 * ratio) as u64;
    scaled
        .saturating_sub(AUDIO_BITRATE_KBPS)
        .max(MIN_VIDEO_BITRATE_KBPS)
}

fn compressed_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("video");
    source.with_file_name(format!("{stem}_compressed.mp4"))
}
