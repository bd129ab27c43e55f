use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filtre de logs utilisé quand ni RUST_LOG ni MINIDHCP_LOG ne sont définis
pub const DEFAULT_LOG_FILTER: &str = "info,minidhcp=debug,md_dhcp=debug";

/// Configuration du processus chargée depuis les variables d'environnement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvConfig {
    /// Fichier JSON de configuration du serveur DHCP
    pub config_path: PathBuf,
    /// Filtre tracing (syntaxe EnvFilter)
    pub log_filter: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/etc/minidhcp/config.json"),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl EnvConfig {
    /// Charge la configuration depuis les variables d'environnement
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("MINIDHCP_CONFIG") {
            config.config_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MINIDHCP_LOG") {
            if !v.trim().is_empty() {
                config.log_filter = v;
            }
        }

        config
    }

    /// Charge le fichier .env puis les variables d'environnement
    pub fn load(env_file: Option<&Path>) -> Self {
        if let Some(path) = env_file {
            load_dotenv(path);
        } else {
            let candidates = [
                PathBuf::from("/etc/minidhcp/.env"),
                PathBuf::from(".env"),
            ];
            for candidate in &candidates {
                if candidate.exists() {
                    load_dotenv(candidate);
                    break;
                }
            }
        }

        Self::from_env()
    }
}

/// Charge un fichier .env basique (KEY=VALUE par ligne), sans écraser l'existant
fn load_dotenv(path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    debug!("Loading environment from {}", path.display());

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if std::env::var(key).is_err() {
                // SAFETY: called before spawning any threads (single-threaded init)
                unsafe { std::env::set_var(key, value) };
            }
        }
    }
}
