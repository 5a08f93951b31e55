//! Application configuration.
//!
//! Precedence: CLI > env (`HOSPITAL_*`) > config file > defaults. The first
//! existing file among `--config`, `$HOSPITAL_CONFIG` and
//! `./hospital-registry.toml` is used.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{RegistryError, Result};
use crate::records::ServiceSettings;
use crate::records::model::DEFAULT_PROFILE_IMAGE_URL;

pub const CONFIG_FILE_NAME: &str = "hospital-registry.toml";
const ENV_PREFIX: &str = "HOSPITAL_";

/// One configuration source; unset keys fall through to the next source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub bind_addr: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_retention: Option<usize>,
    pub default_page_limit: Option<i64>,
    pub max_page_limit: Option<i64>,
    pub session_ttl_secs: Option<u64>,
    pub code_ttl_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub default_profile_image_url: Option<String>,
}

macro_rules! overlay_fields {
    ($dst:expr, $src:expr, $($field:ident),+ $(,)?) => {
        $( if $src.$field.is_some() { $dst.$field = $src.$field; } )+
    };
}

impl ConfigLayer {
    /// Fields set in `top` replace those in `self`.
    pub fn overlay(&mut self, top: ConfigLayer) {
        overlay_fields!(
            self,
            top,
            bind_addr,
            data_dir,
            log_dir,
            log_level,
            log_retention,
            default_page_limit,
            max_page_limit,
            session_ttl_secs,
            code_ttl_secs,
            sweep_interval_secs,
            default_profile_image_url,
        );
    }

    /// # Errors
    /// `Config` when the file cannot be read or is not valid TOML for this layer.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| RegistryError::Config(format!("{}: {e}", path.display())))
    }

    /// Reads `HOSPITAL_<KEY>` variables through `lookup`.
    ///
    /// # Errors
    /// `Config` when a numeric variable does not parse.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(&format!("{ENV_PREFIX}{key}")).filter(|v| !v.trim().is_empty());
        fn num<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>> {
            raw.map(|s| {
                s.trim()
                    .parse::<T>()
                    .map_err(|_| RegistryError::Config(format!("{ENV_PREFIX}{key} must be a number, got {s:?}")))
            })
            .transpose()
        }
        Ok(Self {
            bind_addr: var("BIND_ADDR"),
            data_dir: var("DATA_DIR").map(PathBuf::from),
            log_dir: var("LOG_DIR").map(PathBuf::from),
            log_level: var("LOG_LEVEL"),
            log_retention: num("LOG_RETENTION", var("LOG_RETENTION"))?,
            default_page_limit: num("DEFAULT_PAGE_LIMIT", var("DEFAULT_PAGE_LIMIT"))?,
            max_page_limit: num("MAX_PAGE_LIMIT", var("MAX_PAGE_LIMIT"))?,
            session_ttl_secs: num("SESSION_TTL_SECS", var("SESSION_TTL_SECS"))?,
            code_ttl_secs: num("CODE_TTL_SECS", var("CODE_TTL_SECS"))?,
            sweep_interval_secs: num("SWEEP_INTERVAL_SECS", var("SWEEP_INTERVAL_SECS"))?,
            default_profile_image_url: var("DEFAULT_PROFILE_IMAGE_URL"),
        })
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    /// `None` logs to stdout only.
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
    pub log_retention: usize,
    pub default_page_limit: i64,
    pub max_page_limit: i64,
    pub session_ttl_secs: u64,
    pub code_ttl_secs: u64,
    /// 0 disables the periodic deactivation sweep.
    pub sweep_interval_secs: u64,
    pub default_profile_image_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: PathBuf::from("./data"),
            log_dir: None,
            log_level: "info".into(),
            log_retention: 7,
            default_page_limit: 10,
            max_page_limit: 100,
            session_ttl_secs: 3600,
            code_ttl_secs: 600,
            sweep_interval_secs: 0,
            default_profile_image_url: DEFAULT_PROFILE_IMAGE_URL.into(),
        }
    }
}

/// Candidate config files in lookup order.
#[must_use]
pub fn find_config_paths(cli_cfg: Option<&Path>, env_cfg: Option<String>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = vec![];
    if let Some(p) = cli_cfg {
        paths.push(p.to_path_buf());
    }
    if let Some(p) = env_cfg {
        paths.push(PathBuf::from(p));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join(CONFIG_FILE_NAME));
    }
    paths
}

impl AppConfig {
    /// Loads from the process environment and the first existing config file.
    ///
    /// # Errors
    /// `Config` for unreadable files, bad values or an explicit `--config`
    /// path that does not exist.
    pub fn load(cli_cfg: Option<&Path>, cli: ConfigLayer) -> Result<Self> {
        if let Some(p) = cli_cfg
            && !p.exists()
        {
            return Err(RegistryError::Config(format!("config file {} does not exist", p.display())));
        }
        let file = match find_config_paths(cli_cfg, std::env::var(format!("{ENV_PREFIX}CONFIG")).ok())
            .into_iter()
            .find(|p| p.exists())
        {
            Some(p) => {
                log::debug!("config: using {}", p.display());
                ConfigLayer::from_file(&p)?
            }
            None => ConfigLayer::default(),
        };
        let env = ConfigLayer::from_env_with(|k| std::env::var(k).ok())?;
        Self::resolve(file, env, cli)
    }

    /// Merges the layers over the defaults and validates the result.
    ///
    /// # Errors
    /// `Config` for an unparseable bind address or inconsistent page limits.
    pub fn resolve(file: ConfigLayer, env: ConfigLayer, cli: ConfigLayer) -> Result<Self> {
        let mut merged = file;
        merged.overlay(env);
        merged.overlay(cli);
        let d = Self::default();
        let bind_addr = match merged.bind_addr {
            Some(s) => s
                .parse::<SocketAddr>()
                .map_err(|e| RegistryError::Config(format!("bind_addr {s:?}: {e}")))?,
            None => d.bind_addr,
        };
        let cfg = Self {
            bind_addr,
            data_dir: merged.data_dir.unwrap_or(d.data_dir),
            log_dir: merged.log_dir.or(d.log_dir),
            log_level: merged.log_level.unwrap_or(d.log_level),
            log_retention: merged.log_retention.unwrap_or(d.log_retention),
            default_page_limit: merged.default_page_limit.unwrap_or(d.default_page_limit),
            max_page_limit: merged.max_page_limit.unwrap_or(d.max_page_limit),
            session_ttl_secs: merged.session_ttl_secs.unwrap_or(d.session_ttl_secs),
            code_ttl_secs: merged.code_ttl_secs.unwrap_or(d.code_ttl_secs),
            sweep_interval_secs: merged.sweep_interval_secs.unwrap_or(d.sweep_interval_secs),
            default_profile_image_url: merged.default_profile_image_url.unwrap_or(d.default_profile_image_url),
        };
        if cfg.default_page_limit <= 0 || cfg.default_page_limit > cfg.max_page_limit {
            return Err(RegistryError::Config(format!(
                "default_page_limit must be in 1..={}, got {}",
                cfg.max_page_limit, cfg.default_page_limit
            )));
        }
        Ok(cfg)
    }

    #[must_use]
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            default_page_limit: self.default_page_limit,
            max_page_limit: self.max_page_limit,
            default_profile_image_url: self.default_profile_image_url.clone(),
        }
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    #[must_use]
    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_secs)
    }

    /// `None` when the periodic sweep is disabled.
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}
