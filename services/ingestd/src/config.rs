use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

#[derive(Clone, Debug)]
pub struct HubConfig {
    pub hub_url: String,
    pub rows_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ImportConfig {
    /// Rows requested per page; datasets-server caps this at 100.
    pub page_size: u32,
    pub default_max_samples: u64,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub hub: HubConfig,
    pub warning_limit: usize,
    pub preview_chars: usize,
    pub import: ImportConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = var_or("INGEST_BIND_ADDR", "0.0.0.0:8080");
        let data_dir = PathBuf::from(var_or("INGEST_DATA_DIR", "data"));

        let hub_url = var_or("HF_HUB_URL", "https://huggingface.co");
        let rows_url = var_or("HF_ROWS_URL", "https://datasets-server.huggingface.co");
        let token = std::env::var("HF_TOKEN").ok().filter(|t| !t.trim().is_empty());
        let timeout_secs: u64 = parse_or("HF_TIMEOUT_SECS", 30)?;

        let warning_limit = parse_or("INGEST_WARNING_LIMIT", 5)?;
        let preview_chars = parse_or("INGEST_PREVIEW_CHARS", datasets::preview::DEFAULT_PREVIEW_CHARS)?;
        let page_size: u32 = parse_or("IMPORT_PAGE_SIZE", 100)?;
        let default_max_samples = parse_or("IMPORT_DEFAULT_MAX_SAMPLES", 1000)?;

        // fail fast on obviously broken endpoints
        for (key, url) in [("HF_HUB_URL", &hub_url), ("HF_ROWS_URL", &rows_url)] {
            check_url(key, url)?;
        }
        if !(1..=100).contains(&page_size) {
            bail!("IMPORT_PAGE_SIZE must be between 1 and 100");
        }
        if preview_chars < 4 {
            bail!("INGEST_PREVIEW_CHARS must be at least 4");
        }

        Ok(Self {
            bind_addr,
            data_dir,
            hub: HubConfig {
                hub_url: hub_url.trim_end_matches('/').to_string(),
                rows_url: rows_url.trim_end_matches('/').to_string(),
                token,
                timeout: Duration::from_secs(timeout_secs),
            },
            warning_limit,
            preview_chars,
            import: ImportConfig {
                page_size,
                default_max_samples,
            },
        })
    }

    pub fn validation(&self) -> datasets::ValidationConfig {
        datasets::ValidationConfig {
            warning_limit: self.warning_limit,
            ..Default::default()
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for env var {key}: {v}")),
        Err(_) => Ok(default),
    }
}

fn check_url(key: &str, url: &str) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        bail!("{key} must start with http:// or https://");
    }
    Ok(())
}

#[cfg(test)]
impl AppConfig {
    /// Defaults with storage under `data_dir`; never touches the environment.
    pub fn for_tests(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            data_dir: data_dir.into(),
            hub: HubConfig {
                hub_url: "http://hub.invalid".to_string(),
                rows_url: "http://rows.invalid".to_string(),
                token: None,
                timeout: Duration::from_secs(1),
            },
            warning_limit: 5,
            preview_chars: datasets::preview::DEFAULT_PREVIEW_CHARS,
            import: ImportConfig {
                page_size: 2,
                default_max_samples: 1000,
            },
        }
    }
}
