use std::env;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

use crate::gateway::DEFAULT_API_BASE;
use crate::origin::AllowList;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: 5,
            window: Duration::from_secs(1800),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Gemini credential.  Absence is not fatal at startup; generation
    /// requests answer with a configuration error instead.
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub gemini_timeout: Option<Duration>,
    pub allowed_origins: Option<AllowList>,
    pub api_key: Option<String>,
    pub require_api_key: bool,
    pub rate_limit: RateLimitConfig,
    pub default_model: String,
    pub max_request_bytes: usize,
    pub log_requests: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_api_base: DEFAULT_API_BASE.to_string(),
            gemini_timeout: None,
            allowed_origins: None,
            api_key: None,
            require_api_key: false,
            rate_limit: RateLimitConfig::default(),
            default_model: DEFAULT_MODEL.to_string(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            log_requests: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let gemini_api_key = non_empty_var("GEMINI_API_KEY");
        let gemini_api_base = non_empty_var("GEMINI_API_BASE").unwrap_or(defaults.gemini_api_base);
        let gemini_timeout = parse_optional_u64("GEMINI_TIMEOUT_MS")?.map(Duration::from_millis);
        let allowed_origins = non_empty_var("ALLOWED_ORIGINS").map(|raw| AllowList::parse(&raw));
        let api_key = non_empty_var("API_KEY");
        let require_api_key = parse_bool_env("STORYBOOK_REQUIRE_API_KEY")?.unwrap_or(false);
        if require_api_key && api_key.is_none() {
            bail!("STORYBOOK_REQUIRE_API_KEY is enabled but API_KEY is not set");
        }

        let max_requests = match parse_optional_u64("STORYBOOK_RATE_LIMIT_MAX")? {
            Some(0) => bail!("STORYBOOK_RATE_LIMIT_MAX must be at least 1"),
            Some(n) => u32::try_from(n)
                .map_err(|_| anyhow!("STORYBOOK_RATE_LIMIT_MAX is too large"))?,
            None => defaults.rate_limit.max_requests,
        };
        let window = match parse_optional_u64("STORYBOOK_RATE_LIMIT_WINDOW_SECS")? {
            Some(0) => bail!("STORYBOOK_RATE_LIMIT_WINDOW_SECS must be at least 1"),
            Some(secs) => Duration::from_secs(secs),
            None => defaults.rate_limit.window,
        };
        let rate_limit = RateLimitConfig {
            enabled: parse_bool_env("STORYBOOK_RATE_LIMIT")?.unwrap_or(false),
            max_requests,
            window,
        };

        let default_model = non_empty_var("STORYBOOK_DEFAULT_MODEL").unwrap_or(defaults.default_model);
        let max_request_bytes = parse_optional_u64("STORYBOOK_MAX_REQUEST_BYTES")?
            .map(|v| v as usize)
            .unwrap_or(defaults.max_request_bytes);
        let log_requests = parse_bool_env("STORYBOOK_LOG_REQUESTS")?.unwrap_or(false);

        Ok(Self {
            gemini_api_key,
            gemini_api_base,
            gemini_timeout,
            allowed_origins,
            api_key,
            require_api_key,
            rate_limit,
            default_model,
            max_request_bytes,
            log_requests,
        })
    }
}

fn non_empty_var(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
