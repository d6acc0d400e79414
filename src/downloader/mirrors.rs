//! Third-party mirror APIs that extract TikTok media server-side and return
//! a direct, non-watermarked link. Tried in priority order before falling
//! back to yt-dlp.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::downloader::ytdlp::sanitize_title;
use crate::failure::DownloadFailure;

pub const MIRROR_TIMEOUT: Duration = Duration::from_secs(20);
const DIRECT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Response shapes differ between mirrors; two formats cover all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorStyle {
    /// tikwm.com: `{"data": {"url": ..., "hdplay": ..., "title": ...}}`,
    /// takes an extra `hd=1` query parameter.
    Tikwm,
    /// douyin.wtf / dd01.ru: flat `{"url": ..., "nwm_url": ..., "title": ...}`.
    Plain,
}

#[derive(Debug, Clone)]
pub struct MirrorApi {
    pub endpoint: String,
    pub style: MirrorStyle,
}

/// Default mirror chain, in the order it is tried.
pub fn default_mirrors() -> Vec<MirrorApi> {
    vec![
        MirrorApi {
            endpoint: "https://tikwm.com/api".to_string(),
            style: MirrorStyle::Tikwm,
        },
        MirrorApi {
            endpoint: "https://api.douyin.wtf/api".to_string(),
            style: MirrorStyle::Plain,
        },
        MirrorApi {
            endpoint: "https://api.dd01.ru/api/tiktok".to_string(),
            style: MirrorStyle::Plain,
        },
    ]
}

/// Direct media link plus the title reported by the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
struct TikwmResponse {
    #[serde(default)]
    data: Option<TikwmData>,
}

#[derive(Debug, Deserialize)]
struct TikwmData {
    url: Option<String>,
    hdplay: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlainResponse {
    url: Option<String>,
    nwm_url: Option<String>,
    title: Option<String>,
}

/// Asks one mirror to resolve a video URL to a direct link. Any failure
/// (HTTP error, timeout, missing link) returns None so the next mirror in
/// the chain gets a chance.
pub async fn resolve(
    http: &reqwest::Client,
    mirror: &MirrorApi,
    video_url: &str,
) -> Option<ResolvedMedia> {
    let request = match mirror.style {
        MirrorStyle::Tikwm => http
            .get(&mirror.endpoint)
            .query(&[("url", video_url), ("hd", "1")]),
        MirrorStyle::Plain => http.get(&mirror.endpoint).query(&[("url", video_url)]),
    };

    let response = match request.timeout(MIRROR_TIMEOUT).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!("Mirror {} answered {}", mirror.endpoint, response.status());
            return None;
        }
        Err(error) => {
            warn!("Mirror {} failed: {error}", mirror.endpoint);
            return None;
        }
    };

    match mirror.style {
        MirrorStyle::Tikwm => {
            let parsed: TikwmResponse = match response.json().await {
                Ok(parsed) => parsed,
                Err(error) => {
                    warn!("Mirror {} returned bad JSON: {error}", mirror.endpoint);
                    return None;
                }
            };
            let data = parsed.data?;
            let url = data.hdplay.or(data.url)?;
            Some(ResolvedMedia {
                url,
                title: data.title.unwrap_or_else(|| "tiktok_video".to_string()),
            })
        }
        MirrorStyle::Plain => {
            let parsed: PlainResponse = match response.json().await {
                Ok(parsed) => parsed,
                Err(error) => {
                    warn!("Mirror {} returned bad JSON: {error}", mirror.endpoint);
                    return None;
                }
            };
            let url = parsed.url.or(parsed.nwm_url)?;
            Some(ResolvedMedia {
                url,
                title: parsed.title.unwrap_or_else(|| "tiktok_video".to_string()),
            })
        }
    }
}

/// Streams a direct media link into the shared temp directory, aborting as
/// soon as the byte count passes the size ceiling. Partial files are removed
/// on any failure.
pub async fn fetch_direct(
    http: &reqwest::Client,
    media: &ResolvedMedia,
    temp_dir: &Path,
    max_file_size: u64,
) -> Result<(PathBuf, String), DownloadFailure> {
    let safe_title = sanitize_title(&media.title);
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let destination = temp_dir.join(format!("{safe_title}_{stamp}.mp4"));

    let result = stream_to_file(http, &media.url, &destination, max_file_size).await;
    if let Err(failure) = result {
        let _ = tokio::fs::remove_file(&destination).await;
        return Err(failure);
    }

    let size = tokio::fs::metadata(&destination)
        .await
        .map(|metadata| metadata.len())
        .unwrap_or(0);
    if size > max_file_size {
        let _ = tokio::fs::remove_file(&destination).await;
        return Err(DownloadFailure::FileTooLarge);
    }

    info!("Direct download complete: {} ({size} bytes)", destination.display());
    Ok((destination, safe_title))
}

async fn stream_to_file(
    http: &reqwest::Client,
    url: &str,
    destination: &Path,
    max_file_size: u64,
) -> Result<(), DownloadFailure> {
    let mut response = http
        .get(url)
        .timeout(DIRECT_DOWNLOAD_TIMEOUT)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|error| {
            warn!("Direct download failed: {error}");
            DownloadFailure::DownloadFailed
        })?;

    let mut file = tokio::fs::File::create(destination).await.map_err(|error| {
        warn!("Could not create {}: {error}", destination.display());
        DownloadFailure::DownloadFailed
    })?;

    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await.map_err(|error| {
        warn!("Direct download stream broke: {error}");
        DownloadFailure::DownloadFailed
    })? {
        written += chunk.len() as u64;
        if written > max_file_size {
            warn!("Direct download passed the size ceiling mid-stream; aborting");
            return Err(DownloadFailure::FileTooLarge);
        }
        file.write_all(&chunk).await.map_err(|error| {
            warn!("Could not write {}: {error}", destination.display());
            DownloadFailure::DownloadFailed
        })?;
    }

    file.flush().await.map_err(|error| {
        warn!("Could not flush {}: {error}", destination.display());
        DownloadFailure::DownloadFailed
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_chain_order_is_stable() {
        let mirrors = default_mirrors();
        assert_eq!(mirrors.len(), 3);
        assert_eq!(mirrors[0].endpoint, "https://tikwm.com/api");
        assert_eq!(mirrors[0].style, MirrorStyle::Tikwm);
        assert_eq!(mirrors[1].endpoint, "https://api.douyin.wtf/api");
        assert_eq!(mirrors[2].endpoint, "https://api.dd01.ru/api/tiktok");
    }

    #[tokio::test]
    async fn tikwm_mirror_prefers_hd_link() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("url".into(), "https://vm.tiktok.com/x".into()),
                mockito::Matcher::UrlEncoded("hd".into(), "1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": {"url": "https://cdn/sd.mp4", "hdplay": "https://cdn/hd.mp4", "title": "Dance"}}"#,
            )
            .create_async()
            .await;

        let mirror = MirrorApi {
            endpoint: format!("{}/api", server.url()),
            style: MirrorStyle::Tikwm,
        };
        let resolved = resolve(&reqwest::Client::new(), &mirror, "https://vm.tiktok.com/x")
            .await
            .unwrap();
        assert_eq!(resolved.url, "https://cdn/hd.mp4");
        assert_eq!(resolved.title, "Dance");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn plain_mirror_falls_back_to_nwm_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api")
            .match_query(mockito::Matcher::UrlEncoded(
                "url".into(),
                "https://vm.tiktok.com/x".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"nwm_url": "https://cdn/clean.mp4"}"#)
            .create_async()
            .await;

        let mirror = MirrorApi {
            endpoint: format!("{}/api", server.url()),
            style: MirrorStyle::Plain,
        };
        let resolved = resolve(&reqwest::Client::new(), &mirror, "https://vm.tiktok.com/x")
            .await
            .unwrap();
        assert_eq!(resolved.url, "https://cdn/clean.mp4");
        assert_eq!(resolved.title, "tiktok_video");
    }

    #[tokio::test]
    async fn http_error_resolves_to_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let mirror = MirrorApi {
            endpoint: format!("{}/api", server.url()),
            style: MirrorStyle::Plain,
        };
        assert!(
            resolve(&reqwest::Client::new(), &mirror, "https://vm.tiktok.com/x")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn missing_link_resolves_to_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": {"title": "no links here"}}"#)
            .create_async()
            .await;

        let mirror = MirrorApi {
            endpoint: format!("{}/api", server.url()),
            style: MirrorStyle::Tikwm,
        };
        assert!(
            resolve(&reqwest::Client::new(), &mirror, "https://vm.tiktok.com/x")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn fetch_direct_enforces_size_ceiling() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/video.mp4")
            .with_status(200)
            .with_body(vec![0u8; 2048])
            .create_async()
            .await;

        let dir = std::env::temp_dir().join("mediabot_mirror_test_ceiling");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let media = ResolvedMedia {
            url: format!("{}/video.mp4", server.url()),
            title: "big clip".to_string(),
        };
        let result = fetch_direct(&reqwest::Client::new(), &media, &dir, 1024).await;
        assert_eq!(result.unwrap_err(), DownloadFailure::FileTooLarge);
        // The oversized file must be gone.
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn fetch_direct_writes_named_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/video.mp4")
            .with_status(200)
            .with_body(b"tiny".to_vec())
            .create_async()
            .await;

        let dir = std::env::temp_dir().join("mediabot_mirror_test_ok");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let media = ResolvedMedia {
            url: format!("{}/video.mp4", server.url()),
            title: "Dance / Clip".to_string(),
        };
        let (path, title) = fetch_direct(&reqwest::Client::new(), &media, &dir, 1024)
            .await
            .unwrap();
        assert!(path.exists());
        assert_eq!(title, "Dance  Clip");
        assert_eq!(std::fs::read(&path).unwrap(), b"tiny");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
