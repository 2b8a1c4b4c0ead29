//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.natter/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.
//! The backend URL and anon key have no defaults; without them the client
//! cannot start.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::feed::DEFAULT_HISTORY_LIMIT;
use crate::core::presence::DEFAULT_PRESENCE_LEASE_SECS;
use crate::core::session::DEFAULT_HEARTBEAT_SECS;
use crate::core::time_format::Locale;

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NatterConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ChatConfig {
    pub history_limit: Option<usize>,
    pub heartbeat_secs: Option<u64>,
    pub presence_lease_secs: Option<u64>,
    pub locale: Option<Locale>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UiConfig {
    pub theme: Option<Theme>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub backend_url: String,
    pub anon_key: String,
    pub history_limit: usize,
    pub heartbeat_secs: u64,
    pub presence_lease_secs: u64,
    pub locale: Locale,
    pub theme: Theme,
}

/// Flags from the command line. `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub locale: Option<Locale>,
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    /// A required setting has no value in any layer.
    Missing(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
            ConfigError::Missing(what) => write!(f, "missing required setting: {what}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// Returns `~/.natter/`.
pub fn natter_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".natter"))
}

/// Returns the path to `~/.natter/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    natter_dir().map(|d| d.join("config.toml"))
}

/// Load config from `~/.natter/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `NatterConfig::default()`. If it exists but is malformed,
/// returns `ConfigError::Parse`.
pub fn load_config() -> Result<NatterConfig, ConfigError> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(NatterConfig::default());
        }
    };

    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(&path);
        return Ok(NatterConfig::default());
    }

    let contents = fs::read_to_string(&path).map_err(ConfigError::Io)?;
    let config = parse_config(&contents)?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<NatterConfig, ConfigError> {
    let config: NatterConfig = toml::from_str(contents).map_err(ConfigError::Parse)?;
    debug!("Config: chat={:?} ui={:?}", config.chat, config.ui);
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
fn generate_default_config(path: &Path) {
    let default_content = r#"# Natter Configuration
# Override hierarchy: defaults → this file → env vars → CLI flags.
# The backend URL and anon key are required (here or in the environment).

# [backend]
# url = "https://your-project.supabase.co"   # Or set SUPABASE_URL
# anon_key = "eyJ..."                        # Or set SUPABASE_ANON_KEY

# [chat]
# history_limit = 100          # Messages fetched when the room opens
# heartbeat_secs = 30          # How often "online" is refreshed
# presence_lease_secs = 60     # Hide users not seen for this long
# locale = "en"                # "en" or "fr"; or NATTER_LOCALE / --locale

# [ui]
# theme = "dark"               # "dark" or "light"; Ctrl+T toggles
"#;

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Failed to create config directory: {}", e);
            return;
        }
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
pub fn resolve(config: &NatterConfig, cli: &CliOverrides) -> Result<ResolvedConfig, ConfigError> {
    resolve_with(config, cli, |key| std::env::var(key).ok())
}

/// [`resolve`] with an injectable environment lookup.
pub fn resolve_with(
    config: &NatterConfig,
    cli: &CliOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig, ConfigError> {
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    // Backend URL: env → config, required
    let backend_url = non_empty(env("SUPABASE_URL"))
        .or_else(|| non_empty(config.backend.url.clone()))
        .ok_or(ConfigError::Missing("backend url (SUPABASE_URL)"))?;

    // Anon key: env → config, required
    let anon_key = non_empty(env("SUPABASE_ANON_KEY"))
        .or_else(|| non_empty(config.backend.anon_key.clone()))
        .ok_or(ConfigError::Missing("backend anon key (SUPABASE_ANON_KEY)"))?;

    // Locale: CLI → env → config → default
    let env_locale = env("NATTER_LOCALE").and_then(|raw| {
        let parsed = Locale::parse(&raw);
        if parsed.is_none() {
            warn!("Ignoring unknown NATTER_LOCALE {:?}", raw);
        }
        parsed
    });
    let locale = cli
        .locale
        .or(env_locale)
        .or(config.chat.locale)
        .unwrap_or_default();

    let heartbeat_secs = config
        .chat
        .heartbeat_secs
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_HEARTBEAT_SECS)
        .min(MAX_HEARTBEAT_SECS);
    let presence_lease_secs = lease_for(
        heartbeat_secs,
        config.chat.presence_lease_secs.unwrap_or(DEFAULT_PRESENCE_LEASE_SECS),
    );

    Ok(ResolvedConfig {
        backend_url: backend_url.trim_end_matches('/').to_string(),
        anon_key,
        history_limit: config
            .chat
            .history_limit
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_HISTORY_LIMIT),
        heartbeat_secs,
        presence_lease_secs,
        locale,
        theme: config.ui.theme.unwrap_or_default(),
    })
}

/// Upper bound on the heartbeat interval.
pub const MAX_HEARTBEAT_SECS: u64 = 3_600;
/// Upper bound on the presence lease (one week).
pub const MAX_PRESENCE_LEASE_SECS: u64 = 604_800;

/// Clamps the presence lease to between two heartbeats and a week.
///
/// `last_seen` is stamped with the writer's clock and compared against the
/// reader's, so the slack between the two must also absorb clock skew.
fn lease_for(heartbeat_secs: u64, requested: u64) -> u64 {
    let floor = heartbeat_secs.saturating_mul(2);
    if requested < floor {
        warn!(
            "presence_lease_secs = {} is shorter than two heartbeats, using {}",
            requested, floor
        );
    }
    requested.clamp(floor, MAX_PRESENCE_LEASE_SECS)
}
