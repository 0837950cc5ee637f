use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "QuoteSync";
const APP_NAME: &str = "quotesync";

pub const CONFIG_ENV: &str = "QUOTES_CONFIG";
pub const DATA_ENV: &str = "QUOTES_DATA";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn from_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub state_dir: PathBuf,
    pub session_file: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_data = env::var(DATA_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let database_path = data_root.join("quotes.db");

        let state_dir = project_dirs
            .state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_root.join("state"));
        let session_file = state_dir.join("session.json");

        Ok(Self {
            config_dir,
            config_file,
            data_dir: data_root,
            database_path,
            state_dir,
            session_file,
        })
    }

    /// Lays every path out below `root`; used by tests and `--data-dir` sandboxes.
    pub fn rooted_at(root: &Path) -> Self {
        let config_dir = root.join("config");
        let data_dir = root.join("data");
        let state_dir = root.join("state");
        Self {
            config_file: config_dir.join("config.toml"),
            config_dir,
            database_path: data_dir.join("quotes.db"),
            data_dir,
            session_file: state_dir.join("session.json"),
            state_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.state_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sync: SyncOptions,
    pub storage: StorageOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sync: SyncOptions::default(),
            storage: StorageOptions::default(),
        }
    }
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage
            .resolve(paths)
            .context("resolving storage paths")?;
        if self.sync.interval_secs == 0 {
            tracing::warn!("sync.interval_secs of 0 in config, clamping to 1");
            self.sync.interval_secs = 1;
        }
        if self.sync.text_fields.is_empty() {
            tracing::warn!("sync.text_fields is empty, falling back to [\"text\"]");
            self.sync.text_fields = vec!["text".to_string()];
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Endpoint polled for remote quotes.
    pub endpoint: String,
    /// Endpoint receiving the full store on push; defaults to `endpoint` when empty.
    pub push_endpoint: String,
    /// Record fields tried in order for the quote text.
    pub text_fields: Vec<String>,
    pub category_field: String,
    pub timeout_secs: u64,
    pub interval_secs: u64,
    pub push_after_merge: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            endpoint: "https://jsonplaceholder.typicode.com/posts".to_string(),
            push_endpoint: String::new(),
            text_fields: vec!["text".to_string(), "title".to_string()],
            category_field: "category".to_string(),
            timeout_secs: 10,
            interval_secs: 30,
            push_after_merge: false,
        }
    }
}

impl SyncOptions {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn push_target(&self) -> &str {
        if self.push_endpoint.trim().is_empty() {
            &self.endpoint
        } else {
            &self.push_endpoint
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    #[serde(skip)]
    pub session_file: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            session_file: PathBuf::new(),
            busy_timeout_ms: 2_000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        if self.session_file.as_os_str().is_empty() {
            self.session_file = paths.session_file.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_run_writes_default_config() -> Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted_at(temp.path());
        let loader = ConfigLoader::from_paths(paths.clone());

        let cfg = loader.load_or_init()?;
        assert!(paths.config_file.exists());
        assert_eq!(cfg.sync.interval_secs, 30);
        assert_eq!(cfg.storage.database_path, paths.database_path);
        assert_eq!(cfg.storage.session_file, paths.session_file);
        Ok(())
    }

    #[test]
    fn partial_config_keeps_defaults_and_clamps_interval() -> Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted_at(temp.path());
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            "[sync]\nendpoint = \"http://127.0.0.1:1/quotes\"\ninterval_secs = 0\n",
        )?;

        let cfg = ConfigLoader::from_paths(paths).load()?;
        assert_eq!(cfg.sync.endpoint, "http://127.0.0.1:1/quotes");
        assert_eq!(cfg.sync.interval_secs, 1);
        assert_eq!(cfg.sync.category_field, "category");
        assert_eq!(cfg.sync.push_target(), "http://127.0.0.1:1/quotes");
        Ok(())
    }
}
