use directories::ProjectDirs;
use std::path::PathBuf;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "keytap";
pub const APP_NAME: &str = "keytap";

pub const KEY_FILE_ENV: &str = "KEYTAP_KEY_FILE";
pub const CONFIG_ENV: &str = "KEYTAP_CONFIG";

const KEY_FILE_NAME: &str = "keytap_key.txt";
const CONFIG_FILE_NAME: &str = "keytap.json";

/// Where captured keys go unless configured otherwise.
pub fn default_key_file() -> PathBuf {
    if let Ok(override_path) = std::env::var(KEY_FILE_ENV) {
        return PathBuf::from(override_path);
    }
    std::env::temp_dir().join(KEY_FILE_NAME)
}

pub fn config_dir() -> anyhow::Result<PathBuf> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine config directory"))?;
    Ok(dirs.config_dir().to_path_buf())
}

/// Config file location: `KEYTAP_CONFIG` if set, else the per-user config dir.
pub fn config_path() -> anyhow::Result<PathBuf> {
    if let Ok(override_path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}
