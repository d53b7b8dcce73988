use std::path::PathBuf;

use anyhow::{Context, bail};

/// Secret keys that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me", "hard to guess string"];

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub secret_key: String,
    /// Registering with this address grants the full-permission role.
    pub admin_email: Option<String>,
    pub comments_per_page: u32,
    pub mail_subject_prefix: String,
    pub mail_sender: String,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset keys take their defaults;
    /// a missing or placeholder secret key is an error.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let secret_key = lookup("EFC_SECRET_KEY").unwrap_or_default();
        if secret_key.is_empty() || PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
            bail!("EFC_SECRET_KEY is unset or still a placeholder");
        }

        let port = var("EFC_PORT", "3000")
            .parse()
            .context("EFC_PORT must be a port number")?;
        let comments_per_page: u32 = var("EFC_COMMENTS_PER_PAGE", "20")
            .parse()
            .context("EFC_COMMENTS_PER_PAGE must be a positive integer")?;
        let max_upload_mb: usize = var("EFC_MAX_UPLOAD_MB", "100")
            .parse()
            .context("EFC_MAX_UPLOAD_MB must be a positive integer")?;

        Ok(Self {
            host: var("EFC_HOST", "0.0.0.0"),
            port,
            db_path: var("EFC_DB_PATH", "efc.db").into(),
            storage_dir: var("EFC_STORAGE_DIR", "./uploads").into(),
            secret_key,
            admin_email: lookup("EFC_ADMIN").filter(|e| !e.is_empty()),
            comments_per_page: comments_per_page.max(1),
            mail_subject_prefix: var("EFC_MAIL_SUBJECT_PREFIX", "[EFC]"),
            mail_sender: var("EFC_MAIL_SENDER", "EFC Admin <noreply@efc.local>"),
            max_upload_bytes: max_upload_mb.max(1) * 1024 * 1024,
        })
    }
}
