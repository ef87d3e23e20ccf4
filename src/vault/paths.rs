use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct VaultPaths {
    pub vault_home: PathBuf,
    pub media_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub state_dir: PathBuf,
    pub saved_dir: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<VaultPaths> {
    let home = required_home_dir()?;
    let vault_home = env_or_default_path("CHATVAULT_HOME", home.join(".chatvault"));

    let media_dir = env_or_default_path("CHATVAULT_MEDIA_DIR", vault_home.join("media"));
    let logs_dir = env_or_default_path("CHATVAULT_LOGS_DIR", vault_home.join("logs"));
    let state_dir = env_or_default_path("CHATVAULT_STATE_DIR", vault_home.join("state"));
    let saved_dir = env_or_default_path("CHATVAULT_SAVED_DIR", vault_home.join("saved_messages"));

    Ok(VaultPaths {
        vault_home,
        media_dir,
        logs_dir,
        state_dir,
        saved_dir,
    })
}

impl VaultPaths {
    /// Layout rooted at a single directory.
    #[cfg(test)]
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let vault_home = root.into();
        Self {
            media_dir: vault_home.join("media"),
            logs_dir: vault_home.join("logs"),
            state_dir: vault_home.join("state"),
            saved_dir: vault_home.join("saved_messages"),
            vault_home,
        }
    }
}
