use thiserror::Error;

/// Symbolic failure codes surfaced to the chat layer.
///
/// Every lower-level error collapses into one of these; the root cause is
/// only kept in the log. The `Display` form is the wire-stable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DownloadFailure {
    #[error("unsupported_platform")]
    UnsupportedPlatform,
    #[error("file_too_large")]
    FileTooLarge,
    #[error("instagram_auth_required")]
    InstagramAuthRequired,
    #[error("extract_failed")]
    ExtractFailed,
    #[error("download_failed")]
    DownloadFailed,
    #[error("instagram_download_failed")]
    InstagramDownloadFailed,
    #[error("tiktok_download_failed")]
    TikTokDownloadFailed,
}

impl DownloadFailure {
    pub fn code(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(DownloadFailure::UnsupportedPlatform.code(), "unsupported_platform");
        assert_eq!(DownloadFailure::FileTooLarge.code(), "file_too_large");
        assert_eq!(DownloadFailure::InstagramAuthRequired.code(), "instagram_auth_required");
        assert_eq!(DownloadFailure::ExtractFailed.code(), "extract_failed");
        assert_eq!(DownloadFailure::DownloadFailed.code(), "download_failed");
        assert_eq!(DownloadFailure::InstagramDownloadFailed.code(), "instagram_download_failed");
        assert_eq!(DownloadFailure::TikTokDownloadFailed.code(), "tiktok_download_failed");
    }
}
