use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{CONFIG_FILE_NAME, DEFAULT_CIPHER_KEY, DOWNLOAD_DIR_NAME};
use crate::error::MeshError;
use crate::packet::NodeId;

/// Persisted node identity and peer set, mirroring `offline_mesh_app/config.py`'s
/// `mesh_config.json` schema field-for-field (`MY_ID`, `KNOWN_PEERS`, plus the
/// gateway flag the original kept as a module-level global).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(rename = "MY_ID")]
    pub my_id: NodeId,

    #[serde(rename = "KNOWN_PEERS", default)]
    pub known_peers: Vec<Ipv4Addr>,

    #[serde(rename = "IS_HOTSPOT_HOST", default)]
    pub is_hotspot_host: bool,

    #[serde(skip)]
    path: PathBuf,
}

impl NodeConfig {
    /// Loads `mesh_config.json` from `dir` if present, otherwise generates a
    /// fresh identity and writes a new file. Corrupt files are logged and
    /// treated as absent, matching the original's broad `except Exception`.
    pub fn load_or_create(dir: &Path) -> Result<Self, MeshError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(CONFIG_FILE_NAME);

        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<NodeConfig>(&raw) {
                    Ok(mut cfg) => {
                        cfg.path = path;
                        return Ok(cfg);
                    }
                    Err(e) => {
                        log::warn!("error loading config, regenerating: {e}");
                    }
                },
                Err(e) => {
                    log::warn!("error reading config file, regenerating: {e}");
                }
            }
        }

        let cfg = NodeConfig {
            my_id: NodeId::generate(),
            known_peers: Vec::new(),
            is_hotspot_host: false,
            path,
        };
        cfg.save()?;
        Ok(cfg)
    }

    pub fn save(&self) -> Result<(), MeshError> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }

    pub fn download_dir(dir: &Path) -> PathBuf {
        dir.join(DOWNLOAD_DIR_NAME)
    }

    pub fn cipher_key(&self) -> [u8; 16] {
        DEFAULT_CIPHER_KEY
    }
}

/// Base directory for config and downloads when none is given explicitly:
/// the user's home directory, falling back to the current directory.
pub fn default_base_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = NodeConfig::load_or_create(tmp.path()).unwrap();
        let id = cfg.my_id.clone();

        let reloaded = NodeConfig::load_or_create(tmp.path()).unwrap();
        assert_eq!(reloaded.my_id, id);
    }

    #[test]
    fn generates_eight_char_hex_id() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = NodeConfig::load_or_create(tmp.path()).unwrap();
        assert_eq!(cfg.my_id.0.len(), 8);
        assert!(cfg.my_id.0.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn corrupt_file_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "not json").unwrap();
        let cfg = NodeConfig::load_or_create(tmp.path()).unwrap();
        assert_eq!(cfg.my_id.0.len(), 8);
    }
}
