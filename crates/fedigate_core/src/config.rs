/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::delivery_queue::QueueSettings;
use crate::poll_tally::DEFAULT_MAX_POLL_OPTIONS;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    #[serde(alias = "base_url")]
    pub public_base_url: String,
    /// Defaults to `FEDIGATE_DATA_DIR`, else the platform data dir.
    pub data_dir: Option<PathBuf>,
    /// Used when `RUST_LOG` is not set.
    pub log_filter: String,
    pub queue: QueueSettings,
    pub http_timeout_secs: u64,
    pub http_attempts: u32,
    pub notification_buffer: usize,
    /// Seeded into the domain permission store at startup.
    pub blocked_domains: Vec<String>,
    pub silenced_domains: Vec<String>,
    pub max_poll_options: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8080".to_string(),
            data_dir: None,
            log_filter: "info".to_string(),
            queue: QueueSettings::default(),
            http_timeout_secs: 20,
            http_attempts: 3,
            notification_buffer: 256,
            blocked_domains: Vec::new(),
            silenced_domains: Vec::new(),
            max_poll_options: DEFAULT_MAX_POLL_OPTIONS,
        }
    }
}

impl CoreConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text).context("decode CoreConfig")?;
        Ok(cfg)
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text)
                .with_context(|| format!("parse config {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("read config {}", path.display())),
        }
    }

    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(d) => Ok(d.clone()),
            None => default_data_dir(),
        }
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        Ok(self.resolved_data_dir()?.join("fedigate.sqlite"))
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("org", "fedigate", "Fedigate").context("unable to determine platform dirs")
}

pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(v) = std::env::var("FEDIGATE_DATA_DIR") {
        return Ok(PathBuf::from(v));
    }
    Ok(project_dirs()?.data_local_dir().to_path_buf())
}

pub fn default_config_path() -> Result<PathBuf> {
    if let Ok(v) = std::env::var("FEDIGATE_CONFIG") {
        return Ok(PathBuf::from(v));
    }
    Ok(project_dirs()?.config_dir().join("config.json"))
}
