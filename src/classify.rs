use url::Url;

/// Platform families that get distinct download paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    TikTok,
    Instagram,
    Facebook,
    YouTube,
}

/// Outcome of classifying an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCheck {
    /// Not a well-formed http(s) URL. Rejected before any network call.
    Invalid,
    /// Well-formed URL, but the host is not on the allow-list.
    Unsupported,
    Supported(Platform),
}

const TIKTOK_DOMAINS: [&str; 3] = ["tiktok.com", "vm.tiktok.com", "vt.tiktok.com"];
const INSTAGRAM_DOMAINS: [&str; 1] = ["instagram.com"];
const FACEBOOK_DOMAINS: [&str; 3] = ["facebook.com", "fb.com", "fb.watch"];
const YOUTUBE_DOMAINS: [&str; 4] = [
    "youtube.com",
    "youtu.be",
    "m.youtube.com",
    "music.youtube.com",
];

pub fn classify(input: &str) -> LinkCheck {
    let parsed = match Url::parse(input.trim()) {
        Ok(url) => url,
        Err(_) => return LinkCheck::Invalid,
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return LinkCheck::Invalid;
    }

    let host = match parsed.host_str() {
        Some(host) => host.to_ascii_lowercase(),
        None => return LinkCheck::Invalid,
    };

    let matches_any = |domains: &[&str]| {
        domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
    };

    if matches_any(&TIKTOK_DOMAINS) {
        LinkCheck::Supported(Platform::TikTok)
    } else if matches_any(&INSTAGRAM_DOMAINS) {
        LinkCheck::Supported(Platform::Instagram)
    } else if matches_any(&FACEBOOK_DOMAINS) {
        LinkCheck::Supported(Platform::Facebook)
    } else if matches_any(&YOUTUBE_DOMAINS) {
        LinkCheck::Supported(Platform::YouTube)
    } else {
        LinkCheck::Unsupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_strings_without_scheme() {
        assert_eq!(classify("tiktok.com/@user/video/123"), LinkCheck::Invalid);
        assert_eq!(classify("hello"), LinkCheck::Invalid);
        assert_eq!(classify(""), LinkCheck::Invalid);
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert_eq!(classify("ftp://tiktok.com/video"), LinkCheck::Invalid);
        assert_eq!(classify("file:///etc/passwd"), LinkCheck::Invalid);
    }

    #[test]
    fn unknown_hosts_are_unsupported() {
        assert_eq!(classify("https://vimeo.com/12345"), LinkCheck::Unsupported);
        assert_eq!(classify("https://example.com/"), LinkCheck::Unsupported);
        // Suffix tricks must not match the allow-list.
        assert_eq!(classify("https://nottiktok.com/v/1"), LinkCheck::Unsupported);
        assert_eq!(classify("https://tiktok.com.evil.io/v/1"), LinkCheck::Unsupported);
    }

    #[test]
    fn allow_list_hosts_classify_by_platform() {
        assert_eq!(
            classify("https://www.tiktok.com/@user/video/123"),
            LinkCheck::Supported(Platform::TikTok)
        );
        assert_eq!(
            classify("https://vm.tiktok.com/ZMabc/"),
            LinkCheck::Supported(Platform::TikTok)
        );
        assert_eq!(
            classify("https://www.instagram.com/reel/abc/"),
            LinkCheck::Supported(Platform::Instagram)
        );
        assert_eq!(
            classify("https://fb.watch/xyz/"),
            LinkCheck::Supported(Platform::Facebook)
        );
        assert_eq!(
            classify("https://m.facebook.com/watch?v=1"),
            LinkCheck::Supported(Platform::Facebook)
        );
        assert_eq!(
            classify("https://youtu.be/dQw4w9WgXcQ"),
            LinkCheck::Supported(Platform::YouTube)
        );
        assert_eq!(
            classify("https://music.youtube.com/watch?v=abc"),
            LinkCheck::Supported(Platform::YouTube)
        );
    }

    #[test]
    fn host_match_is_case_insensitive() {
        assert_eq!(
            classify("https://WWW.TikTok.com/@user/video/123"),
            LinkCheck::Supported(Platform::TikTok)
        );
    }
}
