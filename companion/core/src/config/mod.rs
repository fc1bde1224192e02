//! TOML Configuration File Support
//!
//! Centralized configuration loading for the companion, from a TOML file at
//! `~/.config/avatar-companion/companion.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! api_base = "https://api.openai.com/v1"
//! model = "gpt-4o"
//! system_prompt_path = "/home/me/.config/avatar-companion/system_prompt.txt"
//! request_timeout_secs = 120
//!
//! [decoder]
//! start_tag = "<response>"
//! end_tag = "</response>"
//!
//! [conversation]
//! reset_sentinel = "RESET"
//! error_message = "에러!"
//!
//! [animation]
//! frame_rate = 60
//! initial_motion = "w-cool-posenod01"
//!
//! [motions]
//! thinking = ["w-adult-think02", "face_surprise_03"]
//! idle = [
//!     ["w-adult-blushed04", "face_smile_09"],
//!     ["w-adult-delicious03", "face_smile_01"],
//! ]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{DEFAULT_API_BASE, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};
use crate::conversation::ConversationConfig;
use crate::motion::MotionPair;

/// Environment variable holding the API key
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable overriding the API base URL
pub const ENV_API_BASE: &str = "COMPANION_API_BASE";
/// Environment variable overriding the model
pub const ENV_MODEL: &str = "COMPANION_MODEL";
/// Environment variable pointing at a system prompt file
pub const ENV_SYSTEM_PROMPT_PATH: &str = "COMPANION_SYSTEM_PROMPT_PATH";
/// Environment variable overriding the frame rate
pub const ENV_FRAME_RATE: &str = "COMPANION_FRAME_RATE";
/// Environment variable overriding the reset sentinel
pub const ENV_RESET_SENTINEL: &str = "COMPANION_RESET_SENTINEL";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("Failed to read {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// API base URL
    pub api_base: Option<String>,

    /// API key (prefer the environment for this)
    pub api_key: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// File holding the system prompt
    pub system_prompt_path: Option<PathBuf>,

    /// Whole-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Decoder section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderToml {
    /// Tag opening the visible reply
    pub start_tag: Option<String>,

    /// Tag closing the visible reply
    pub end_tag: Option<String>,
}

/// Conversation section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationToml {
    /// Prompt that resets the conversation instead of being sent
    pub reset_sentinel: Option<String>,

    /// Text shown when an exchange fails
    pub error_message: Option<String>,
}

/// Animation section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationToml {
    /// Frames per second of the completion poll
    pub frame_rate: Option<u32>,

    /// Body motion played once the avatar is ready
    pub initial_motion: Option<String>,
}

/// Motions section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionsToml {
    /// Pair played while waiting for the backend
    pub thinking: Option<MotionPair>,

    /// Pair played when streaming starts
    pub acknowledged: Option<MotionPair>,

    /// Pair played after a finished reply
    pub satisfied: Option<MotionPair>,

    /// Pair played after a failure
    pub failed: Option<MotionPair>,

    /// Pairs picked at random on click
    pub idle: Option<Vec<MotionPair>>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionToml {
    /// Backend configuration section
    pub backend: BackendToml,

    /// Decoder configuration section
    pub decoder: DecoderToml,

    /// Conversation configuration section
    pub conversation: ConversationToml,

    /// Animation configuration section
    pub animation: AnimationToml,

    /// Motion library section
    pub motions: MotionsToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved chat backend settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendSettings {
    /// API base URL
    pub api_base: String,

    /// API key, if any
    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,

    /// File holding the system prompt (built-in prompt when `None`)
    pub system_prompt_path: Option<PathBuf>,

    /// Whole-request timeout
    pub request_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            system_prompt_path: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Centralized configuration for the companion
///
/// Consolidates all configuration from multiple sources and tracks where
/// the values came from. Use [`load_config`] to load configuration with
/// proper priority handling.
#[derive(Clone, Debug)]
pub struct CompanionConfigFile {
    /// Chat backend settings
    pub backend: BackendSettings,

    /// Conversation machine settings
    pub conversation: ConversationConfig,

    /// Frames per second of the completion poll
    pub frame_rate: u32,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for CompanionConfigFile {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            conversation: ConversationConfig::default(),
            frame_rate: 60,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl CompanionConfigFile {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Time between two frame ticks
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }

    /// Read the system prompt, falling back to the built-in one
    ///
    /// # Errors
    ///
    /// Returns an error if a prompt file is configured but unreadable.
    pub fn load_system_prompt(&self) -> Result<String, ConfigError> {
        match self.backend.system_prompt_path {
            Some(ref path) => read_file(path),
            None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }

    /// Check values that would make the companion misbehave
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_rate == 0 {
            return Err(ConfigError::ValidationError(
                "frame_rate must be at least 1".to_string(),
            ));
        }
        if self.conversation.start_tag.is_empty() {
            return Err(ConfigError::ValidationError(
                "decoder start_tag must not be empty".to_string(),
            ));
        }
        if self.conversation.end_tag.is_empty() {
            return Err(ConfigError::ValidationError(
                "decoder end_tag must not be empty".to_string(),
            ));
        }
        if self.backend.model.is_empty() {
            return Err(ConfigError::ValidationError(
                "backend model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/avatar-companion/companion.toml` or
/// `~/.config/avatar-companion/companion.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("avatar-companion").join("companion.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI arguments are not handled here; apply [`ConfigOverrides`] after.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// result fails validation. A missing config file is not an error.
pub fn load_config() -> Result<CompanionConfigFile, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<CompanionConfigFile, ConfigError> {
    load_with_env(path, |key| std::env::var(key).ok())
}

fn load_with_env<F>(path: Option<PathBuf>, env: F) -> Result<CompanionConfigFile, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Start with defaults
    let mut config = CompanionConfigFile::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content = read_file(config_path)?;
            let toml_config: CompanionToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config, env);

    config.validate()?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut CompanionConfigFile, toml: CompanionToml) {
    let CompanionToml {
        backend,
        decoder,
        conversation,
        animation,
        motions,
    } = toml;

    // Backend settings
    if let Some(api_base) = backend.api_base {
        config.backend.api_base = api_base;
    }
    if backend.api_key.is_some() {
        config.backend.api_key = backend.api_key;
    }
    if let Some(model) = backend.model {
        config.backend.model = model;
    }
    if backend.system_prompt_path.is_some() {
        config.backend.system_prompt_path = backend.system_prompt_path;
    }
    if let Some(secs) = backend.request_timeout_secs {
        config.backend.request_timeout = Duration::from_secs(secs);
    }

    // Decoder settings
    if let Some(tag) = decoder.start_tag {
        config.conversation.start_tag = tag;
    }
    if let Some(tag) = decoder.end_tag {
        config.conversation.end_tag = tag;
    }

    // Conversation settings
    if let Some(sentinel) = conversation.reset_sentinel {
        config.conversation.reset_sentinel = sentinel;
    }
    if let Some(message) = conversation.error_message {
        config.conversation.error_message = message;
    }

    // Animation settings
    if let Some(rate) = animation.frame_rate {
        config.frame_rate = rate;
    }
    if let Some(motion) = animation.initial_motion {
        config.conversation.motions.initial = motion;
    }

    // Motion library
    let library = &mut config.conversation.motions;
    if let Some(pair) = motions.thinking {
        library.thinking = pair;
    }
    if let Some(pair) = motions.acknowledged {
        library.acknowledged = pair;
    }
    if let Some(pair) = motions.satisfied {
        library.satisfied = pair;
    }
    if let Some(pair) = motions.failed {
        library.failed = pair;
    }
    if let Some(idle) = motions.idle {
        library.idle = idle;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut CompanionConfigFile, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = env(ENV_API_KEY) {
        config.backend.api_key = Some(key);
        config.source = ConfigSource::Env;
    }
    if let Some(api_base) = env(ENV_API_BASE) {
        config.backend.api_base = api_base;
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env(ENV_MODEL) {
        config.backend.model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(path) = env(ENV_SYSTEM_PROMPT_PATH) {
        config.backend.system_prompt_path = Some(PathBuf::from(path));
        config.source = ConfigSource::Env;
    }
    if let Some(rate) = env(ENV_FRAME_RATE) {
        match rate.parse::<u32>() {
            Ok(fps) => {
                config.frame_rate = fps;
                config.source = ConfigSource::Env;
            }
            Err(_) => tracing::warn!(value = %rate, "Ignoring invalid {ENV_FRAME_RATE}"),
        }
    }
    if let Some(sentinel) = env(ENV_RESET_SENTINEL) {
        config.conversation.reset_sentinel = sentinel;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// API base override
    pub api_base: Option<String>,

    /// Model override
    pub model: Option<String>,

    /// System prompt file override
    pub system_prompt_path: Option<PathBuf>,

    /// Frame rate override
    pub frame_rate: Option<u32>,

    /// Reset sentinel override
    pub reset_sentinel: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set API base override
    #[must_use]
    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = Some(api_base);
        self
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Set system prompt file override
    #[must_use]
    pub fn with_system_prompt_path(mut self, path: PathBuf) -> Self {
        self.system_prompt_path = Some(path);
        self
    }

    /// Set frame rate override
    #[must_use]
    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    /// Set reset sentinel override
    #[must_use]
    pub fn with_reset_sentinel(mut self, sentinel: String) -> Self {
        self.reset_sentinel = Some(sentinel);
        self
    }

    fn is_empty(&self) -> bool {
        self.api_base.is_none()
            && self.model.is_none()
            && self.system_prompt_path.is_none()
            && self.frame_rate.is_none()
            && self.reset_sentinel.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut CompanionConfigFile) {
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref api_base) = self.api_base {
            config.backend.api_base = api_base.clone();
        }
        if let Some(ref model) = self.model {
            config.backend.model = model.clone();
        }
        if let Some(ref path) = self.system_prompt_path {
            config.backend.system_prompt_path = Some(path.clone());
        }
        if let Some(rate) = self.frame_rate {
            config.frame_rate = rate;
        }
        if let Some(ref sentinel) = self.reset_sentinel {
            config.conversation.reset_sentinel = sentinel.clone();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
