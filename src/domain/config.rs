use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Project configuration, stored as `config.toml` in the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// File name of the SQLite database, relative to the project root.
    database: PathBuf,

    /// Whether to open the database in write-ahead-log mode.
    pub wal_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            wal_mode: default_wal_mode(),
        }
    }
}

impl Config {
    /// The name of the configuration file inside a project root.
    pub const FILE_NAME: &'static str = "config.toml";

    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Loads `config.toml` from a project root, falling back to the defaults
    /// if it is missing or invalid.
    #[must_use]
    pub fn load_or_default(root: &Path) -> Self {
        let path = root.join(Self::FILE_NAME);
        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Failed to load config: {e}");
            Self::default()
        })
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// The database file name, relative to the project root.
    #[must_use]
    pub fn database(&self) -> &Path {
        &self.database
    }

    /// The database location for a project rooted at `root`.
    #[must_use]
    pub fn database_path(&self, root: &Path) -> PathBuf {
        root.join(&self.database)
    }

    /// Sets the database file name.
    pub fn set_database(&mut self, database: impl Into<PathBuf>) {
        self.database = database.into();
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("requirements.sqlite")
}

const fn default_wal_mode() -> bool {
    true
}

/// The serialized versions of the configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_database")]
        database: PathBuf,

        #[serde(default = "default_wal_mode")]
        wal_mode: bool,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 { database, wal_mode } => Self { database, wal_mode },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            database: config.database,
            wal_mode: config.wal_mode,
        }
    }
}
