use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "portal", about = "A student portal")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Import lecturers from a JSON file (upserted by abbreviation)
    ImportLecturers {
        /// JSON array of lecturer records
        file: PathBuf,
    },
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub downloads: DownloadConfig,
    pub ratings: RatingsConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_hours: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DownloadConfig {
    /// Repeat downloads from one address inside this window are not counted.
    pub dedup_window_hours: i64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RatingsConfig {
    pub lecturers: RatingPolicyConfig,
    pub documents: RatingPolicyConfig,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingPolicyConfig {
    pub min: u8,
    pub max: u8,
    #[serde(default)]
    pub forbid_self_rating: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "portal_session".to_string(),
            session_hours: 720,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dedup_window_hours: 24,
        }
    }
}

impl Default for RatingsConfig {
    fn default() -> Self {
        Self {
            lecturers: RatingPolicyConfig {
                min: 1,
                max: 10,
                forbid_self_rating: false,
            },
            documents: RatingPolicyConfig {
                min: 1,
                max: 5,
                forbid_self_rating: true,
            },
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("portal.db"));
        }
        if config.storage.path.is_none() {
            config.storage.path = Some(data_dir.join("uploads"));
        }

        config.validate()?;
        Ok(config)
    }

    /// Config for tests and tools that don't read a file: all paths rooted at `dir`.
    pub fn rooted_at(dir: &std::path::Path) -> Self {
        let mut config = Config::default();
        config.database.path = Some(dir.join("portal.db"));
        config.storage.path = Some(dir.join("uploads"));
        config
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (name, policy) in [
            ("lecturers", &self.ratings.lecturers),
            ("documents", &self.ratings.documents),
        ] {
            if policy.min == 0 || policy.min > policy.max {
                anyhow::bail!(
                    "ratings.{}: invalid score range {}..={}",
                    name,
                    policy.min,
                    policy.max
                );
            }
        }
        if self.downloads.dedup_window_hours < 0 {
            anyhow::bail!("downloads.dedup_window_hours must not be negative");
        }
        Ok(())
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".portal")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("portal.db"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("uploads"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with(data_dir: Option<PathBuf>) -> Cli {
        Cli {
            config: None,
            host: None,
            port: None,
            data_dir,
            command: None,
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.auth.cookie_name, "portal_session");
        assert_eq!(config.auth.session_hours, 720);
        assert_eq!(config.downloads.dedup_window_hours, 24);
        assert_eq!(config.storage.max_upload_bytes, 20 * 1024 * 1024);
        assert!(config.database.path.is_none());
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn default_rating_policies_differ_per_entity() {
        let config = Config::default();
        assert_eq!(config.ratings.lecturers.max, 10);
        assert!(!config.ratings.lecturers.forbid_self_rating);
        assert_eq!(config.ratings.documents.max, 5);
        assert!(config.ratings.documents.forbid_self_rating);
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let cli = cli_with(Some(PathBuf::from("/tmp/test-portal")));
        assert_eq!(Config::data_dir(&cli), PathBuf::from("/tmp/test-portal"));
    }

    #[test]
    fn data_dir_defaults_to_home_dot_portal() {
        let dir = Config::data_dir(&cli_with(None));
        assert!(dir.ends_with(".portal"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&cli_with(Some(tmp.path().to_path_buf()))).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.db_path(), tmp.path().join("portal.db"));
        assert_eq!(config.uploads_path(), tmp.path().join("uploads"));
    }

    #[test]
    fn load_applies_cli_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cli = cli_with(Some(tmp.path().to_path_buf()));
        cli.host = Some("127.0.0.1".to_string());
        cli.port = Some(8080);
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
host = "192.168.1.1"
port = 9000

[downloads]
dedup_window_hours = 12

[ratings.lecturers]
min = 1
max = 6
forbid_self_rating = true
"#,
        )
        .unwrap();

        let mut cli = cli_with(Some(tmp.path().to_path_buf()));
        cli.config = Some(config_path);
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.downloads.dedup_window_hours, 12);
        assert_eq!(config.ratings.lecturers.max, 6);
        assert!(config.ratings.lecturers.forbid_self_rating);
        // untouched section keeps its defaults
        assert_eq!(config.ratings.documents.max, 5);
    }

    #[test]
    fn load_rejects_inverted_score_range() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            "[ratings.documents]\nmin = 5\nmax = 1\n",
        )
        .unwrap();

        let mut cli = cli_with(Some(tmp.path().to_path_buf()));
        cli.config = Some(config_path);
        assert!(Config::load(&cli).is_err());
    }
}
