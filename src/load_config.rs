//! Loads the static YAML config file and merges in environment secrets.
//!
//! The file carries no credentials; the GitHub token comes from the
//! `GITHUB_TOKEN` environment variable (a `.env` file is honoured by the
//! binary, not here).

use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::Deserialize;
use tracing::{error, info};

use crate::analyse::AnalyseConfig;
use crate::contract::RepoId;

#[derive(Deserialize)]
struct StaticConfig {
    /// Repository slug, `owner/name`.
    repo: String,
    /// Per-stage item ceiling. Omitted means effectively unbounded.
    #[serde(default)]
    limit: Option<u64>,
    output_dir: std::path::PathBuf,
}

/// Fully merged run configuration: file contents plus env secrets.
#[derive(Debug)]
pub struct LoadedConfig {
    pub analyse: AnalyseConfig,
    pub token: String,
}

/// Loads a static YAML config file (no secrets) and injects required env
/// vars for secrets. Returns a fully merged [`LoadedConfig`] or an error.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LoadedConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let static_conf: StaticConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let repo = match RepoId::parse(&static_conf.repo) {
        Ok(repo) => repo,
        Err(e) => {
            error!(repo = %static_conf.repo, "Config 'repo' is not an owner/name slug");
            return Err(anyhow::anyhow!("Invalid repo in config: {e}"));
        }
    };

    let token = match std::env::var("GITHUB_TOKEN") {
        Ok(token) => token,
        Err(e) => {
            error!(error = ?e, "GITHUB_TOKEN environment variable not set");
            return Err(anyhow::anyhow!(
                "GITHUB_TOKEN environment variable not set: {e}"
            ));
        }
    };

    let limit = static_conf.limit.unwrap_or(u64::MAX);
    info!(
        repo = %repo,
        limit = limit,
        output_dir = %static_conf.output_dir.display(),
        "Config loaded and merged successfully"
    );

    Ok(LoadedConfig {
        analyse: AnalyseConfig {
            repo,
            limit,
            output_dir: static_conf.output_dir,
        },
        token,
    })
}
