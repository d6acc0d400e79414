//! Localized (Kurdish) user-facing texts, keyed by symbolic result code.

use crate::failure::DownloadFailure;

pub const START: &str = "تکایە لینکی ڤیدیۆکەت دابنێ";
pub const PROCESSING: &str = "ڤیدیۆکەت دادەبەزێت...";
pub const COMPLETED: &str = "فەرموو ئەوەش ڤیدیۆکەت";
pub const CHOOSE_FORMAT: &str = "ڤیدیۆ یان دەنگ هەڵبژێرە";
pub const BUTTON_VIDEO: &str = "ڤیدیۆ 🎬";
pub const BUTTON_AUDIO: &str = "دەنگ MP3 🎵";
pub const COMPRESSING: &str = "ڤیدیۆکە گەورەیە، بچووک دەکرێتەوە...";

pub const INVALID_LINK: &str = "لینکەکە دروست نییە، تکایە لینکێکی دروست دابنێ";
pub const UNSUPPORTED: &str =
    "ئەم لینکە پشتگیری ناکرێت، تکایە لینکی TikTok، Instagram یان Facebook بەکاربهێنە";
pub const DOWNLOAD_FAILED: &str =
    "ڕووداوێک ڕووی دا لە دابەزاندنی ڤیدیۆکە، تکایە دووبارە تاقی بکەوە";
pub const FILE_TOO_LARGE: &str = "ڤیدیۆکە زۆر گەورەیە، ناتوانرێت بنێردرێت";
pub const INSTAGRAM_AUTH: &str =
    "Instagram ڤیدیۆکان پێویستیان بە چاوەڕوانی زیاترە، تکایە چەند چرکەیەک چاوەڕێ بە و دووبارە تاقی بکەوە";
pub const INSTAGRAM_AUTH_REQUIRED: &str =
    "Instagram ڤیدیۆ دابەزاندن پێویستی بە تۆماربوونە، تکایە دووبارە تاقی بکەوە یان لینکێکی TikTok بەکاربهێنە";

/// Maps a symbolic failure code to the text shown to the user.
///
/// `extract_failed` on an Instagram link gets the softer retry message, like
/// the original deployment did; the caller passes that context in.
pub fn for_failure(failure: DownloadFailure, is_instagram_link: bool) -> &'static str {
    match failure {
        DownloadFailure::UnsupportedPlatform => UNSUPPORTED,
        DownloadFailure::FileTooLarge => FILE_TOO_LARGE,
        DownloadFailure::InstagramAuthRequired => INSTAGRAM_AUTH_REQUIRED,
        DownloadFailure::ExtractFailed if is_instagram_link => INSTAGRAM_AUTH,
        DownloadFailure::ExtractFailed
        | DownloadFailure::DownloadFailed
        | DownloadFailure::InstagramDownloadFailed
        | DownloadFailure::TikTokDownloadFailed => DOWNLOAD_FAILED,
    }
}
