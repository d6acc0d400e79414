//! Platform-dispatching extraction orchestrator. Picks the option bundle for
//! the URL's platform family, retries transient failures a fixed number of
//! times, enforces the size ceiling before and after download, and locates
//! the produced file in the shared temp directory.

pub mod mirrors;
pub mod ytdlp;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::classify::Platform;
use crate::config::Config;
use crate::cookies::CookieStore;
use crate::failure::DownloadFailure;
use mirrors::MirrorApi;
pub use ytdlp::MediaKind;

const DOWNLOAD_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// A completed download: the file on disk and a display title.
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub path: PathBuf,
    pub title: String,
}

pub struct Downloader {
    config: Arc<Config>,
    cookies: CookieStore,
    http: reqwest::Client,
    mirrors: Vec<MirrorApi>,
}

impl Downloader {
    pub fn new(config: Arc<Config>, cookies: CookieStore, http: reqwest::Client) -> Self {
        Self {
            config,
            cookies,
            http,
            mirrors: mirrors::default_mirrors(),
        }
    }

    /// Entry point for one request. The caller has already classified the
    /// URL; YouTube is the only platform where `kind` may be Audio.
    pub async fn download(
        &self,
        url: &str,
        platform: Platform,
        kind: MediaKind,
    ) -> Result<Downloaded, DownloadFailure> {
        match platform {
            Platform::Instagram => self.download_instagram(url).await,
            Platform::TikTok => self.download_tiktok(url).await,
            Platform::YouTube => self.download_youtube(url, kind).await,
            Platform::Facebook => self.download_generic(url).await,
        }
    }

    async fn download_instagram(&self, url: &str) -> Result<Downloaded, DownloadFailure> {
        let Some(cookie_file) = self.cookies.instagram.clone() else {
            return Err(DownloadFailure::InstagramAuthRequired);
        };

        let args = ytdlp::instagram_args(
            &self.config.temp_dir,
            self.config.proxy.as_deref(),
            &cookie_file,
        );
        let info = ytdlp::probe(url, &cookie_args(&cookie_file)).await?;
        self.guard_declared_size(&info)?;
        let title = info.display_title("instagram_video");

        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            match self.run_download(url, &args, &title).await {
                Ok(downloaded) => return Ok(downloaded),
                Err(DownloadFailure::FileTooLarge) => return Err(DownloadFailure::FileTooLarge),
                Err(failure) => {
                    warn!("Instagram download attempt {attempt} failed: {failure}");
                    if attempt < DOWNLOAD_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(DownloadFailure::InstagramDownloadFailed)
    }

    async fn download_tiktok(&self, url: &str) -> Result<Downloaded, DownloadFailure> {
        // Mirror chain first: these return non-watermarked direct links.
        for mirror in &self.mirrors {
            let Some(resolved) = mirrors::resolve(&self.http, mirror, url).await else {
                continue;
            };
            info!("Mirror {} resolved a direct link", mirror.endpoint);
            match mirrors::fetch_direct(
                &self.http,
                &resolved,
                &self.config.temp_dir,
                self.config.max_file_size,
            )
            .await
            {
                Ok((path, title)) => return Ok(Downloaded { path, title }),
                Err(DownloadFailure::FileTooLarge) => return Err(DownloadFailure::FileTooLarge),
                Err(failure) => {
                    warn!("Direct download via {} failed: {failure}", mirror.endpoint)
                }
            }
        }

        // All mirrors exhausted; fall back to yt-dlp with TikTok headers.
        let args = ytdlp::tiktok_args(&self.config.temp_dir, self.config.proxy.as_deref());
        let info = ytdlp::probe(url, &[]).await?;
        self.guard_declared_size(&info)?;
        let title = info.display_title("tiktok_video");

        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            match self.run_download(url, &args, &title).await {
                Ok(downloaded) => return Ok(downloaded),
                Err(DownloadFailure::FileTooLarge) => return Err(DownloadFailure::FileTooLarge),
                Err(failure) => {
                    warn!("TikTok download attempt {attempt} failed: {failure}");
                    if attempt < DOWNLOAD_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(DownloadFailure::TikTokDownloadFailed)
    }

    /// YouTube path: three option profiles tried in sequence until one
    /// produces a file. A failed metadata probe is not terminal; the
    /// fallback profiles exist for links the default web client cannot
    /// extract, so the size pre-check is skipped and the profiles still run.
    async fn download_youtube(
        &self,
        url: &str,
        kind: MediaKind,
    ) -> Result<Downloaded, DownloadFailure> {
        let title = match ytdlp::probe(url, &[]).await {
            Ok(info) => {
                self.guard_declared_size(&info)?;
                info.display_title("youtube_video")
            }
            Err(failure) => {
                warn!("YouTube metadata probe failed ({failure}); trying profiles anyway");
                "youtube_video".to_string()
            }
        };

        let profiles =
            ytdlp::youtube_profiles(&self.config.temp_dir, self.config.proxy.as_deref(), kind);
        let mut last_failure = DownloadFailure::DownloadFailed;

        for profile in &profiles {
            info!("Trying YouTube profile '{}'", profile.name);
            match self.run_download(url, &profile.args, &title).await {
                Ok(downloaded) => return Ok(downloaded),
                Err(DownloadFailure::FileTooLarge) => return Err(DownloadFailure::FileTooLarge),
                Err(failure) => {
                    warn!("YouTube profile '{}' failed: {failure}", profile.name);
                    last_failure = failure;
                }
            }
        }
        Err(last_failure)
    }

    /// Facebook and anything else on the allow-list without a dedicated path.
    async fn download_generic(&self, url: &str) -> Result<Downloaded, DownloadFailure> {
        let args = ytdlp::generic_args(
            &self.config.temp_dir,
            self.config.proxy.as_deref(),
            self.cookies.facebook.as_deref(),
        );
        let probe_args = self
            .cookies
            .facebook
            .as_deref()
            .map(cookie_args)
            .unwrap_or_default();
        let info = ytdlp::probe(url, &probe_args).await?;
        self.guard_declared_size(&info)?;
        let title = info.display_title("video");

        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            match self.run_download(url, &args, &title).await {
                Ok(downloaded) => return Ok(downloaded),
                Err(DownloadFailure::FileTooLarge) => return Err(DownloadFailure::FileTooLarge),
                Err(failure) => {
                    warn!("Download attempt {attempt} failed: {failure}");
                    if attempt < DOWNLOAD_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(DownloadFailure::DownloadFailed)
    }

    /// One yt-dlp invocation plus output discovery and the post-download
    /// size check.
    async fn run_download(
        &self,
        url: &str,
        args: &[String],
        title: &str,
    ) -> Result<Downloaded, DownloadFailure> {
        let mut full_args = args.to_vec();
        full_args.push(url.to_string());
        ytdlp::run_yt_dlp(&full_args).await?;

        let Some(path) = ytdlp::find_downloaded_file(&self.config.temp_dir, title) else {
            return Err(DownloadFailure::DownloadFailed);
        };

        let size = tokio::fs::metadata(&path)
            .await
            .map(|metadata| metadata.len())
            .unwrap_or(0);
        if size > self.config.max_file_size {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(DownloadFailure::FileTooLarge);
        }

        info!("Downloaded {} ({size} bytes)", path.display());
        Ok(Downloaded {
            path,
            title: title.to_string(),
        })
    }

    /// Pre-download check against the size the extractor declares, when it
    /// declares one.
    fn guard_declared_size(&self, info: &ytdlp::ProbedInfo) -> Result<(), DownloadFailure> {
        if let Some(declared) = info.declared_size()
            && declared > self.config.max_file_size
        {
            return Err(DownloadFailure::FileTooLarge);
        }
        Ok(())
    }
}

fn cookie_args(cookie_file: &std::path::Path) -> Vec<String> {
    vec!["--cookies".to_string(), cookie_file.display().to_string()]
}
