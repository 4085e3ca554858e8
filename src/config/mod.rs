// dblocalsync/src/config/mod.rs
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::Path;

pub const PASSWORD_KEY: &str = "DB_PASSWORD";
const ENTRY_PREFIX: &str = "DB_";
const LOCAL_DIR_KEY: &str = "LOCAL_DB_DIR";
const LIGHT_MARKER_KEY: &str = "LIGHT_DB_MARKER";
const DEFAULT_LOCAL_DIR: &str = "dbs-locales";
const DEFAULT_LIGHT_MARKER: &str = "correos";

/// One configured database: remote original and its local copy. The local
/// path always keeps the remote file name.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseEntry {
    pub name: String,
    pub remote_path: String,
    pub local_path: String,
}

/// Immutable run configuration, built once at startup from the environment
/// and passed by reference to every component.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_password: String,
    pub local_db_dir: String,
    pub light_marker: String,
    pub databases: Vec<DatabaseEntry>,
}

impl AppConfig {
    pub fn load_from_env() -> Result<Self> {
        Self::from_vars(env::vars())
    }

    /// Builds the configuration from a flat key/value mapping. Every
    /// `DB_<NAME>` key (except the reserved password key) declares one
    /// database with `<NAME>` as its name and the value as its remote path.
    pub(crate) fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut db_password = String::new();
        let mut local_db_dir = DEFAULT_LOCAL_DIR.to_string();
        let mut light_marker = DEFAULT_LIGHT_MARKER.to_string();
        let mut remotes: Vec<(String, String)> = Vec::new();

        for (key, value) in vars {
            match key.as_str() {
                PASSWORD_KEY => db_password = value,
                LOCAL_DIR_KEY if !value.is_empty() => local_db_dir = value,
                LIGHT_MARKER_KEY if !value.is_empty() => light_marker = value,
                _ => {
                    if let Some(name) = key.strip_prefix(ENTRY_PREFIX) {
                        if !name.is_empty() && !value.is_empty() {
                            remotes.push((name.to_string(), value));
                        }
                    }
                }
            }
        }

        // Environment iteration order is arbitrary; keep a stable run order.
        remotes.sort();

        let databases = remotes
            .into_iter()
            .map(|(name, remote_path)| {
                let filename = file_name_of(&remote_path);
                let local_path = join_file(&local_db_dir, filename);
                DatabaseEntry {
                    name,
                    remote_path,
                    local_path,
                }
            })
            .collect();

        Ok(AppConfig {
            db_password,
            local_db_dir,
            light_marker,
            databases,
        })
    }

    pub fn ensure_local_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.local_db_dir).with_context(|| {
            format!(
                "Failed to create local database directory {}",
                self.local_db_dir
            )
        })
    }

    /// Maps a path referenced by a linked table to its local equivalent:
    /// the configured local path of the entry with the same file name, or
    /// a best-effort guess under the local directory. Callers must check
    /// that the returned path actually exists.
    pub fn to_local_path(&self, referenced_path: &str) -> String {
        let filename = file_name_of(referenced_path);
        for entry in &self.databases {
            if file_name_of(&entry.remote_path) == filename {
                return entry.local_path.clone();
            }
        }
        join_file(&self.local_db_dir, filename)
    }

    /// Whether this entry gets a light copy instead of a verbatim one.
    pub fn is_light_entry(&self, entry: &DatabaseEntry) -> bool {
        file_name_of(&entry.remote_path)
            .to_lowercase()
            .contains(&self.light_marker.to_lowercase())
    }
}

/// Final path component. Handles both separator styles, since remote paths
/// are Windows UNC strings regardless of the platform the tool is built on.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// Joins a directory and file name, matching the directory's separator
/// style so Windows-style configured paths stay Windows-style.
pub fn join_file(dir: &str, file: &str) -> String {
    let dir = dir.trim_end_matches(['\\', '/']);
    let sep = if dir.contains('\\') || dir.contains(':') {
        '\\'
    } else {
        std::path::MAIN_SEPARATOR
    };
    format!("{dir}{sep}{file}")
}

/// `\\server\share` root of a UNC path, if the path is one.
pub fn network_root(path: &str) -> Option<String> {
    if !path.starts_with("\\\\") {
        return None;
    }
    let parts: Vec<&str> = path.split('\\').collect();
    if parts.len() >= 4 {
        Some(format!("\\\\{}\\{}", parts[2], parts[3]))
    } else {
        None
    }
}

/// Existence check for configured path strings.
pub fn path_exists(path: &str) -> bool {
    Path::new(path).exists()
}
