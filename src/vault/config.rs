use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "mp4", "webm", "mov"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSyncConfig {
    pub interval_minutes: u64,
    pub target_branch: String,
    pub request_timeout_secs: u64,
    pub run_on_start: bool,
}

impl Default for VaultSyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 10,
            target_branch: "main".to_string(),
            request_timeout_secs: 30,
            run_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRemoteConfig {
    /// Repository identifier in `owner/name` form. Empty means unconfigured.
    #[serde(default)]
    pub repo: String,
    #[serde(default = "default_remote_prefix")]
    pub prefix: String,
    #[serde(default = "default_github_api")]
    pub api_base: String,
}

fn default_remote_prefix() -> String {
    "media".to_string()
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

impl Default for VaultRemoteConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            prefix: default_remote_prefix(),
            api_base: default_github_api(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultIngestConfig {
    #[serde(default)]
    pub channel_id: String,
    /// Server whose text channels `save` walks when no channel is given.
    #[serde(default)]
    pub guild_id: String,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_discord_api")]
    pub api_base: String,
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_discord_api() -> String {
    "https://discord.com/api/v10".to_string()
}

impl Default for VaultIngestConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            guild_id: String::new(),
            extensions: default_extensions(),
            api_base: default_discord_api(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VaultConfig {
    pub sync: VaultSyncConfig,
    pub remote: VaultRemoteConfig,
    pub ingest: VaultIngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialVaultConfig {
    sync: Option<VaultSyncConfig>,
    remote: Option<VaultRemoteConfig>,
    ingest: Option<VaultIngestConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_csv(var: &str, fallback: &[String]) -> Vec<String> {
    match env::var(var) {
        Ok(v) => {
            let out = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_start_matches('.').to_ascii_lowercase())
                .collect::<Vec<_>>();
            if out.is_empty() {
                fallback.to_vec()
            } else {
                out
            }
        }
        Err(_) => fallback.to_vec(),
    }
}

pub fn validate(cfg: &VaultConfig) -> Result<()> {
    if cfg.sync.interval_minutes == 0 {
        return Err(anyhow!("invalid sync interval: must be >= 1 minute"));
    }
    if cfg.sync.target_branch.trim().is_empty() {
        return Err(anyhow!("invalid target branch: cannot be empty"));
    }
    if cfg.sync.request_timeout_secs == 0 {
        return Err(anyhow!("invalid request timeout: must be >= 1 second"));
    }
    let repo = cfg.remote.repo.trim();
    if !repo.is_empty() {
        let mut parts = repo.split('/');
        let well_formed = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
        );
        if !well_formed {
            return Err(anyhow!(
                "invalid remote repo `{repo}`: expected `owner/name`"
            ));
        }
    }
    if cfg.ingest.extensions.is_empty() {
        return Err(anyhow!("invalid ingest extensions: list cannot be empty"));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("CHATVAULT_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".chatvault").join("chatvault.toml"))
}

fn merge_toml(base: &mut VaultConfig, raw: &str) -> Result<()> {
    let parsed: PartialVaultConfig = toml::from_str(raw)?;
    if let Some(sync) = parsed.sync {
        base.sync = sync;
    }
    if let Some(remote) = parsed.remote {
        base.remote = remote;
    }
    if let Some(ingest) = parsed.ingest {
        base.ingest = ingest;
    }
    Ok(())
}

fn merge_file_config(base: &mut VaultConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    merge_toml(base, &raw)
        .map_err(|err| anyhow!("failed to parse chatvault config {}: {err}", path.display()))
}

pub fn load_config() -> Result<VaultConfig> {
    let mut cfg = VaultConfig::default();
    merge_file_config(&mut cfg)?;

    cfg.sync.interval_minutes =
        env_or_u64("CHATVAULT_SYNC_INTERVAL_MINUTES", cfg.sync.interval_minutes);
    cfg.sync.target_branch = env_or_string("CHATVAULT_TARGET_BRANCH", &cfg.sync.target_branch);
    cfg.sync.request_timeout_secs = env_or_u64(
        "CHATVAULT_REQUEST_TIMEOUT_SECS",
        cfg.sync.request_timeout_secs,
    );
    cfg.sync.run_on_start = env_or_bool("CHATVAULT_RUN_ON_START", cfg.sync.run_on_start);
    cfg.remote.repo = env_or_string("CHATVAULT_REMOTE_REPO", &cfg.remote.repo);
    cfg.remote.prefix = env_or_string("CHATVAULT_REMOTE_PREFIX", &cfg.remote.prefix);
    cfg.remote.api_base = env_or_string("CHATVAULT_GITHUB_API", &cfg.remote.api_base);
    cfg.ingest.channel_id = env_or_string("CHATVAULT_CHANNEL_ID", &cfg.ingest.channel_id);
    cfg.ingest.guild_id = env_or_string("CHATVAULT_GUILD_ID", &cfg.ingest.guild_id);
    cfg.ingest.extensions = env_or_csv("CHATVAULT_EXTENSIONS", &cfg.ingest.extensions);
    cfg.ingest.api_base = env_or_string("CHATVAULT_DISCORD_API", &cfg.ingest.api_base);

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::{VaultConfig, merge_toml, validate};

    #[test]
    fn defaults_are_valid() {
        let cfg = VaultConfig::default();
        assert_eq!(cfg.sync.interval_minutes, 10);
        assert_eq!(cfg.sync.target_branch, "main");
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut cfg = VaultConfig::default();
        cfg.sync.interval_minutes = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn malformed_repo_is_rejected() {
        let mut cfg = VaultConfig::default();
        cfg.remote.repo = "just-a-name".to_string();
        assert!(validate(&cfg).is_err());
        cfg.remote.repo = "owner/name/extra".to_string();
        assert!(validate(&cfg).is_err());
        cfg.remote.repo = "owner/name".to_string();
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn toml_sections_replace_defaults() {
        let mut cfg = VaultConfig::default();
        merge_toml(
            &mut cfg,
            r#"
[sync]
interval_minutes = 5
target_branch = "archive"
request_timeout_secs = 12

[remote]
repo = "octo/memes"
"#,
        )
        .expect("merge");
        assert_eq!(cfg.sync.interval_minutes, 5);
        assert_eq!(cfg.sync.target_branch, "archive");
        assert!(!cfg.sync.run_on_start);
        assert_eq!(cfg.remote.repo, "octo/memes");
        assert_eq!(cfg.remote.prefix, "media");
        assert_eq!(cfg.ingest.extensions.len(), 7);
    }

    #[test]
    fn partial_sync_section_keeps_other_defaults() {
        let mut cfg = VaultConfig::default();
        merge_toml(&mut cfg, "[sync]\ninterval_minutes = 3\n").expect("merge");
        assert_eq!(cfg.sync.interval_minutes, 3);
        assert_eq!(cfg.sync.target_branch, "main");
        assert_eq!(cfg.sync.request_timeout_secs, 30);
    }
}
