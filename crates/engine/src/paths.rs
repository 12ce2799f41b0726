use std::path::PathBuf;

/// Environment override for the store root, also exposed as a CLI flag.
pub const CONFIG_DIR_ENV: &str = "CAPSNIP_CONFIG_DIR";

/// Default store root: `$CAPSNIP_CONFIG_DIR`, else the platform config dir
/// (`~/.config/capsnip` on Linux), else the current directory.
pub fn default_root() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    directories::ProjectDirs::from("", "", "capsnip")
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
