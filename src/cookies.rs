//! Locally cached authentication artifacts: cookie files decoded from
//! base64 environment blobs and a persisted Instagram session blob.
//! Loaded once at startup and treated as read-mostly configuration.
//! Everything lives in the system temp directory, outside the swept
//! download directory.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{error, info, warn};

/// Fields a usable Instagram cookie export must contain.
const REQUIRED_INSTAGRAM_FIELDS: [&str; 3] = ["sessionid", "ds_user_id", "csrftoken"];

const SESSION_FILE_NAME: &str = "instagram_session.json";
const SESSION_COOKIES_NAME: &str = "instagram_session_cookies.txt";

#[derive(Debug, Clone, Default)]
pub struct CookieStore {
    pub instagram: Option<PathBuf>,
    pub facebook: Option<PathBuf>,
    pub session: Option<serde_json::Value>,
}

impl CookieStore {
    /// Decodes cookie env blobs into the system temp directory, then picks the
    /// first valid cookie file among the known candidate locations. When no
    /// Instagram cookie file validates, a persisted session blob can supply
    /// one instead.
    pub fn load() -> Self {
        let decoded_instagram = decode_blob("IG_COOKIES_B64", "instagram.txt");
        let decoded_facebook = decode_blob("FB_COOKIES_B64", "facebook.txt");
        let session = load_session(&std::env::temp_dir().join(SESSION_FILE_NAME));

        let instagram = validate_cookies(
            &[
                std::env::var("IG_COOKIES_FILE").ok().map(PathBuf::from),
                Some(PathBuf::from("instagram_cookies.txt")),
                decoded_instagram,
            ],
            &REQUIRED_INSTAGRAM_FIELDS,
        )
        .or_else(|| session.as_ref().and_then(cookie_file_from_session));
        // Facebook exports carry no fixed marker fields; any readable file counts.
        let facebook = validate_cookies(
            &[
                std::env::var("FB_COOKIES_FILE").ok().map(PathBuf::from),
                Some(PathBuf::from("facebook_cookies.txt")),
                decoded_facebook,
            ],
            &[],
        );

        if instagram.is_none() {
            warn!("No valid Instagram cookie file found; Instagram downloads will require auth.");
        }
        if facebook.is_none() {
            warn!("No Facebook cookie file found; Facebook downloads run unauthenticated.");
        }

        Self {
            instagram,
            facebook,
            session,
        }
    }
}

/// Decodes a base64 env var into a file under the system temp directory and
/// returns the path, or None when the var is absent or does not decode.
fn decode_blob(env_var: &str, out_name: &str) -> Option<PathBuf> {
    let blob = std::env::var(env_var).ok().filter(|value| !value.trim().is_empty())?;
    info!("{env_var} present: {} bytes", blob.len());

    let bytes = match BASE64.decode(blob.trim()) {
        Ok(bytes) => bytes,
        Err(error) => {
            error!("Failed to decode {env_var}: {error}");
            return None;
        }
    };

    let out_path = std::env::temp_dir().join(out_name);
    match std::fs::write(&out_path, bytes) {
        Ok(()) => {
            info!("Decoded {env_var} to {}", out_path.display());
            Some(out_path)
        }
        Err(error) => {
            error!("Failed to write decoded {env_var}: {error}");
            None
        }
    }
}

/// Returns the first candidate path that exists, is readable, and contains
/// every required field.
fn validate_cookies(candidates: &[Option<PathBuf>], required: &[&str]) -> Option<PathBuf> {
    for candidate in candidates.iter().flatten() {
        let Ok(contents) = std::fs::read_to_string(candidate) else {
            continue;
        };
        if required.iter().all(|field| contents.contains(field)) {
            return Some(candidate.clone());
        }
    }
    None
}

/// Builds a Netscape cookie file in the system temp directory from a
/// persisted session blob. The blob must carry every required Instagram
/// field as a string value.
fn cookie_file_from_session(session: &serde_json::Value) -> Option<PathBuf> {
    let mut lines = vec!["# Netscape HTTP Cookie File".to_string()];
    for field in REQUIRED_INSTAGRAM_FIELDS {
        let value = session.get(field)?.as_str()?;
        lines.push(format!(".instagram.com\tTRUE\t/\tTRUE\t0\t{field}\t{value}"));
    }

    let out_path = std::env::temp_dir().join(SESSION_COOKIES_NAME);
    match std::fs::write(&out_path, lines.join("\n") + "\n") {
        Ok(()) => {
            info!("Built Instagram cookie file from persisted session");
            Some(out_path)
        }
        Err(error) => {
            error!("Failed to write session cookie file: {error}");
            None
        }
    }
}

fn load_session(path: &Path) -> Option<serde_json::Value> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(session) => {
            info!("Loaded persisted Instagram session from {}", path.display());
            Some(session)
        }
        Err(error) => {
            warn!("Ignoring unreadable session blob {}: {error}", path.display());
            None
        }
    }
}
