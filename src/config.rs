use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/api";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: String,
    pub session_file: PathBuf,
    /// `None` leaves the transport default in place.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let api_url = env::var("PORTAL_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let session_file = match env::var("PORTAL_SESSION_FILE") {
            Ok(path) => PathBuf::from(path),
            Err(_) => default_session_file()?,
        };

        let timeout = match env::var("PORTAL_HTTP_TIMEOUT_SECS") {
            Ok(raw) => Some(parse_timeout(&raw)?),
            Err(_) => None,
        };

        Ok(Self {
            api_url: normalize_base(&api_url),
            session_file,
            timeout,
        })
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = normalize_base(api_url);
        self
    }
}

fn default_session_file() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("could not determine a data directory; set PORTAL_SESSION_FILE"))?;
    Ok(base.join("portal-tracker").join("session.json"))
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("PORTAL_HTTP_TIMEOUT_SECS must be whole seconds, got {raw:?}"))?;
    if secs == 0 {
        return Err(anyhow!("PORTAL_HTTP_TIMEOUT_SECS must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
