//! Thin wrapper around the external `yt-dlp` binary: option bundles per
//! platform family, the metadata probe, and output-file discovery.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{error, warn};

use crate::failure::DownloadFailure;

const YT_DLP_TIMEOUT_SECONDS: u64 = 180;

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Media kind requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// Subset of `yt-dlp -J` output used for the pre-download checks.
#[derive(Debug, Deserialize)]
pub struct ProbedInfo {
    pub title: Option<String>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
}

impl ProbedInfo {
    pub fn declared_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx).map(|size| size as u64)
    }

    pub fn display_title(&self, fallback: &str) -> String {
        self.title
            .as_deref()
            .and_then(crate::config::non_empty)
            .unwrap_or(fallback)
            .to_string()
    }
}

/// Runs yt-dlp with a wall-clock ceiling and returns the raw output.
/// Non-zero exits and timeouts collapse to `DownloadFailed`; the real cause
/// goes to the log.
pub async fn run_yt_dlp(args: &[String]) -> Result<std::process::Output, DownloadFailure> {
    let command_future = Command::new("yt-dlp").args(args).output();
    let output = timeout(Duration::from_secs(YT_DLP_TIMEOUT_SECONDS), command_future)
        .await
        .map_err(|_| {
            warn!("yt-dlp timed out after {YT_DLP_TIMEOUT_SECONDS}s");
            DownloadFailure::DownloadFailed
        })?
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                error!("yt-dlp is not installed; install it and restart the bot.");
            } else {
                error!("Could not execute yt-dlp: {error}");
            }
            DownloadFailure::DownloadFailed
        })?;

    if !output.status.success() {
        warn!("yt-dlp failed: {}", last_stderr_line(&output.stderr));
        return Err(DownloadFailure::DownloadFailed);
    }

    Ok(output)
}

/// Probes a URL with `-J` and parses the metadata needed for the declared
/// size check and for output-file discovery.
pub async fn probe(url: &str, extra_args: &[String]) -> Result<ProbedInfo, DownloadFailure> {
    let mut args = vec![
        "-J".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
    ];
    args.extend_from_slice(extra_args);
    args.push(url.to_string());

    let output = run_yt_dlp(&args)
        .await
        .map_err(|_| DownloadFailure::ExtractFailed)?;

    serde_json::from_slice(&output.stdout).map_err(|error| {
        warn!("Could not parse yt-dlp metadata JSON: {error}");
        DownloadFailure::ExtractFailed
    })
}

pub fn last_stderr_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp produced no diagnostics")
        .to_string()
}

/// One set of yt-dlp arguments; the orchestrator tries profiles in order
/// until one produces a file.
#[derive(Debug, Clone)]
pub struct OptionProfile {
    pub name: &'static str,
    pub args: Vec<String>,
}

fn output_template(temp_dir: &Path) -> String {
    format!("{}/%(title)s.%(ext)s", temp_dir.display())
}

fn base_args(temp_dir: &Path, proxy: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "-o".to_string(),
        output_template(temp_dir),
        "--user-agent".to_string(),
        DESKTOP_USER_AGENT.to_string(),
        "--recode-video".to_string(),
        "mp4".to_string(),
    ];
    if let Some(proxy) = proxy {
        args.push("--proxy".to_string());
        args.push(proxy.to_string());
    }
    args
}

/// Generic bundle used for Facebook and any other allow-listed host without
/// a dedicated path.
pub fn generic_args(temp_dir: &Path, proxy: Option<&str>, cookie_file: Option<&Path>) -> Vec<String> {
    let mut args = base_args(temp_dir, proxy);
    args.push("-f".to_string());
    args.push("best".to_string());
    if let Some(cookies) = cookie_file {
        args.push("--cookies".to_string());
        args.push(cookies.display().to_string());
    }
    args
}

pub fn instagram_args(temp_dir: &Path, proxy: Option<&str>, cookie_file: &Path) -> Vec<String> {
    let mut args = base_args(temp_dir, proxy);
    args.push("-f".to_string());
    args.push("best".to_string());
    args.push("--cookies".to_string());
    args.push(cookie_file.display().to_string());
    args.push("--add-headers".to_string());
    args.push("Referer:https://www.instagram.com/".to_string());
    args
}

pub fn tiktok_args(temp_dir: &Path, proxy: Option<&str>) -> Vec<String> {
    let mut args = base_args(temp_dir, proxy);
    args.push("-f".to_string());
    args.push("best".to_string());
    args.push("--add-headers".to_string());
    args.push("Referer:https://www.tiktok.com/".to_string());
    args.push("--add-headers".to_string());
    args.push("Accept-Language:en-US,en;q=0.5".to_string());
    args
}

/// YouTube gets three profiles tried in sequence: the plain ≤1080p profile,
/// android client emulation with split-format merge, then the web_embedded
/// client with full format fallback and IPv4 forcing.
pub fn youtube_profiles(temp_dir: &Path, proxy: Option<&str>, kind: MediaKind) -> Vec<OptionProfile> {
    match kind {
        MediaKind::Video => vec![
            OptionProfile {
                name: "default",
                args: {
                    let mut args = base_args(temp_dir, proxy);
                    args.push("-f".to_string());
                    args.push("best[height<=1080]/best".to_string());
                    args
                },
            },
            OptionProfile {
                name: "android-client",
                args: {
                    let mut args = base_args(temp_dir, proxy);
                    args.push("-f".to_string());
                    args.push("bestvideo[height<=1080]+bestaudio/best".to_string());
                    args.push("--merge-output-format".to_string());
                    args.push("mp4".to_string());
                    args.push("--extractor-args".to_string());
                    args.push("youtube:player_client=android".to_string());
                    args
                },
            },
            OptionProfile {
                name: "web-embedded",
                args: {
                    let mut args = base_args(temp_dir, proxy);
                    args.push("-f".to_string());
                    args.push("b".to_string());
                    args.push("--extractor-args".to_string());
                    args.push("youtube:player_client=web_embedded".to_string());
                    args.push("--force-ipv4".to_string());
                    args
                },
            },
        ],
        MediaKind::Audio => vec![
            OptionProfile {
                name: "audio-default",
                args: audio_args(temp_dir, proxy, None),
            },
            OptionProfile {
                name: "audio-android-client",
                args: audio_args(temp_dir, proxy, Some("youtube:player_client=android")),
            },
            OptionProfile {
                name: "audio-web-embedded",
                args: audio_args(temp_dir, proxy, Some("youtube:player_client=web_embedded")),
            },
        ],
    }
}

fn audio_args(temp_dir: &Path, proxy: Option<&str>, extractor_args: Option<&str>) -> Vec<String> {
    // No --recode-video for audio; -x drives the ffmpeg extract postprocessor.
    let mut args = vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "-o".to_string(),
        output_template(temp_dir),
        "--user-agent".to_string(),
        DESKTOP_USER_AGENT.to_string(),
        "-f".to_string(),
        "bestaudio/best".to_string(),
        "-x".to_string(),
        "--audio-format".to_string(),
        "mp3".to_string(),
        "--audio-quality".to_string(),
        "192K".to_string(),
    ];
    if let Some(proxy) = proxy {
        args.push("--proxy".to_string());
        args.push(proxy.to_string());
    }
    if let Some(extractor) = extractor_args {
        args.push("--extractor-args".to_string());
        args.push(extractor.to_string());
    }
    args
}

/// Strips everything but word characters, hyphens and spaces, truncated to
/// 50 chars. Used both for the discovery prefix and direct-download names.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || *c == ' ')
        .take(50)
        .collect();
    let trimmed = cleaned.trim().to_string();
    if trimmed.is_empty() { "video".to_string() } else { trimmed }
}

/// Locates the file yt-dlp just wrote: first by sanitized-title prefix
/// (first 20 chars), then falling back to the most recently modified file.
/// Approximate by design; concurrent downloads sharing the directory can
/// misattribute files.
pub fn find_downloaded_file(temp_dir: &Path, title: &str) -> Option<PathBuf> {
    let prefix: String = sanitize_title(title).chars().take(20).collect();

    let entries = std::fs::read_dir(temp_dir).ok()?;
    let mut files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        if !prefix.is_empty()
            && let Some(name) = path.file_name().and_then(|name| name.to_str())
            && sanitize_title(name).starts_with(&prefix)
        {
            return Some(path);
        }

        let modified = metadata.modified().unwrap_or(std::time::UNIX_EPOCH);
        files.push((path, modified));
    }

    files
        .into_iter()
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mediabot_ytdlp_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn sanitize_title_filters_and_truncates() {
        assert_eq!(sanitize_title("My Video: Part 1!"), "My Video Part 1");
        assert_eq!(sanitize_title("///"), "video");
        assert_eq!(sanitize_title(&"x".repeat(80)).len(), 50);
    }

    #[test]
    fn generic_args_attach_cookie_file_when_present() {
        let dir = PathBuf::from("/tmp/dl");
        let cookies = PathBuf::from("/tmp/facebook.txt");
        let with = generic_args(&dir, None, Some(&cookies));
        assert!(with.contains(&"--cookies".to_string()));
        assert!(with.contains(&"/tmp/facebook.txt".to_string()));

        let without = generic_args(&dir, None, None);
        assert!(!without.contains(&"--cookies".to_string()));
    }

    #[test]
    fn proxy_is_forwarded_to_yt_dlp() {
        let dir = PathBuf::from("/tmp/dl");
        let args = tiktok_args(&dir, Some("socks5://127.0.0.1:9050"));
        let position = args.iter().position(|arg| arg == "--proxy").unwrap();
        assert_eq!(args[position + 1], "socks5://127.0.0.1:9050");
    }

    #[test]
    fn youtube_video_profiles_escalate_bypass_flags() {
        let dir = PathBuf::from("/tmp/dl");
        let profiles = youtube_profiles(&dir, None, MediaKind::Video);
        assert_eq!(profiles.len(), 3);

        assert!(profiles[0].args.contains(&"best[height<=1080]/best".to_string()));
        assert!(
            profiles[1]
                .args
                .contains(&"youtube:player_client=android".to_string())
        );
        assert!(
            profiles[2]
                .args
                .contains(&"youtube:player_client=web_embedded".to_string())
        );
        assert!(profiles[2].args.contains(&"--force-ipv4".to_string()));
    }

    #[test]
    fn youtube_audio_profiles_extract_mp3() {
        let dir = PathBuf::from("/tmp/dl");
        for profile in youtube_profiles(&dir, None, MediaKind::Audio) {
            assert!(profile.args.contains(&"-x".to_string()));
            assert!(profile.args.contains(&"mp3".to_string()));
            assert!(!profile.args.contains(&"--recode-video".to_string()));
        }
    }

    #[test]
    fn probed_info_prefers_exact_size() {
        let info = ProbedInfo {
            title: Some("  ".to_string()),
            filesize: Some(1000.0),
            filesize_approx: Some(2000.0),
        };
        assert_eq!(info.declared_size(), Some(1000));
        assert_eq!(info.display_title("fallback"), "fallback");

        let approx_only = ProbedInfo {
            title: Some("Clip".to_string()),
            filesize: None,
            filesize_approx: Some(2000.0),
        };
        assert_eq!(approx_only.declared_size(), Some(2000));
        assert_eq!(approx_only.display_title("fallback"), "Clip");
    }

    #[test]
    fn find_downloaded_file_matches_title_prefix() {
        let dir = scratch_dir("prefix");
        std::fs::write(dir.join("Some Other Clip.mp4"), b"x").unwrap();
        std::fs::write(dir.join("My Holiday Video Part 2.mp4"), b"x").unwrap();

        let found = find_downloaded_file(&dir, "My Holiday Video: Part 2").unwrap();
        assert_eq!(found.file_name().unwrap(), "My Holiday Video Part 2.mp4");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn find_downloaded_file_falls_back_to_newest() {
        let dir = scratch_dir("newest");
        std::fs::write(dir.join("old.mp4"), b"x").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(dir.join("new.mp4"), b"x").unwrap();

        let found = find_downloaded_file(&dir, "ZZZ no match ZZZ").unwrap();
        assert_eq!(found.file_name().unwrap(), "new.mp4");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn find_downloaded_file_empty_dir_is_none() {
        let dir = scratch_dir("empty");
        assert!(find_downloaded_file(&dir, "anything").is_none());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn last_stderr_line_takes_final_nonempty_line() {
        let stderr = b"WARNING: something\n\nERROR: the real cause\n\n";
        assert_eq!(last_stderr_line(stderr), "ERROR: the real cause");
        assert_eq!(last_stderr_line(b""), "yt-dlp produced no diagnostics");
    }
}
