//! Configuration file handling for courier.
//!
//! This crate loads `.courier.toml` files holding the named registry profiles
//! a project can notify, and the name of the profile the notifier uses.
//!
//! # Example
//!
//! ```
//! use courier_config::load_config;
//! use std::path::Path;
//!
//! // Nearest .courier.toml from this directory upward
//! let config = load_config(Path::new(".")).expect("load config");
//!
//! if let Some(profile) = config.selected_profile(None) {
//!     println!("Registry: {}", profile.base_url());
//! }
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use courier_types::Credentials;
use serde::{Deserialize, Serialize};

/// Default configuration file name
pub const CONFIG_FILE: &str = ".courier.toml";

/// Default timeout for registry calls
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Names shorter than this get a warning
pub const MIN_NAME_LEN: usize = 4;

/// Get the config file path for a directory
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Complete courier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Notifier settings
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// Named registry profiles
    #[serde(default)]
    pub registries: Vec<RegistryProfile>,
}

/// Notifier settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Name of the registry profile to notify
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// A named registry endpoint with optional credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryProfile {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_port() -> u16 {
    80
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl RegistryProfile {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            username: None,
            password: None,
            timeout_secs: default_timeout(),
        }
    }

    /// Base URL of the registry. A scheme already present in `host` is kept.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}:{}", self.port)
        } else {
            format!("http://{host}:{}", self.port)
        }
    }

    /// Credentials to pass through; anonymous when no username is set.
    pub fn credentials(&self) -> Credentials {
        match &self.username {
            Some(user) if !user.is_empty() => Credentials {
                username: Some(user.clone()),
                password: self.password.clone(),
            },
            _ => Credentials::anonymous(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Option<&RegistryProfile> {
        self.registries.iter().find(|p| p.name == name)
    }

    /// Resolve the profile to use. `requested` (e.g. a CLI flag) takes
    /// precedence over `[notifier] profile`; a config with a single profile
    /// uses it when neither names one.
    pub fn selected_profile(&self, requested: Option<&str>) -> Option<&RegistryProfile> {
        match requested.or(self.notifier.profile.as_deref()) {
            Some(name) => self.profile(name),
            None if self.registries.len() == 1 => self.registries.first(),
            None => None,
        }
    }

    /// Validate every profile.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut seen = BTreeSet::new();

        for profile in &self.registries {
            issues.extend(validate_profile(profile));
            if !profile.name.is_empty() && !seen.insert(profile.name.as_str()) {
                issues.push(ValidationIssue::error(
                    &profile.name,
                    "name",
                    "duplicate profile name",
                ));
            }
        }

        if let Some(name) = &self.notifier.profile
            && self.profile(name).is_none()
        {
            issues.push(ValidationIssue::error(
                name,
                "notifier.profile",
                "no registry profile with this name",
            ));
        }

        issues
    }
}

/// Severity of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueLevel {
    Warning,
    Error,
}

/// A problem found in a registry profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    pub profile: String,
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn error(profile: &str, field: &str, message: &str) -> Self {
        Self {
            level: IssueLevel::Error,
            profile: profile.to_string(),
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    fn warning(profile: &str, field: &str, message: &str) -> Self {
        Self {
            level: IssueLevel::Warning,
            ..Self::error(profile, field, message)
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == IssueLevel::Error
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.level {
            IssueLevel::Warning => "warning",
            IssueLevel::Error => "error",
        };
        write!(f, "{level}: [{}] {}: {}", self.profile, self.field, self.message)
    }
}

/// Validate the form fields of one profile
pub fn validate_profile(profile: &RegistryProfile) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if profile.name.is_empty() {
        issues.push(ValidationIssue::error("", "name", "please set a name"));
    } else if profile.name.chars().count() < MIN_NAME_LEN {
        issues.push(ValidationIssue::warning(
            &profile.name,
            "name",
            "isn't the name too short?",
        ));
    }

    if profile.host.trim().is_empty() {
        issues.push(ValidationIssue::error(
            &profile.name,
            "host",
            "please set a valid host",
        ));
    }

    issues
}

/// Load the configuration of a project: the nearest config file from `dir`
/// upward, or defaults when there is none.
pub fn load_config(dir: &Path) -> Result<Config> {
    match find_config(dir) {
        Some(path) => load_config_from_file(&path),
        None => Ok(Config::default()),
    }
}

/// Load configuration from a specific file path
pub fn load_config_from_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Find configuration file by walking up the directory tree
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;

    loop {
        let config_file = config_path(current);
        if config_file.exists() {
            return Some(config_file);
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}
