//! Engine configuration.

use std::path::PathBuf;

/// Configuration for building a [`crate::RulesEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// JSON catalog to load. The built-in SRD catalog is used when `None`.
    pub catalog_path: Option<PathBuf>,

    /// Allow levels in a second class. The rule system must allow it too.
    pub allow_multiclassing: bool,

    /// Rule system for characters created by the host.
    pub default_setting: String,

    /// Skip XP checks for active characters.
    pub ignore_xp: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            catalog_path: None,
            allow_multiclassing: true,
            default_setting: "dnd5e".to_string(),
            ignore_xp: false,
        }
    }

    /// Load the catalog from a JSON file.
    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    pub fn with_multiclassing(mut self, allow: bool) -> Self {
        self.allow_multiclassing = allow;
        self
    }

    pub fn with_default_setting(mut self, setting: impl Into<String>) -> Self {
        self.default_setting = setting.into();
        self
    }

    pub fn with_ignore_xp(mut self, ignore: bool) -> Self {
        self.ignore_xp = ignore;
        self
    }

    /// Defaults overridden by `DND_CATALOG_PATH`, `DND_ALLOW_MULTICLASS`,
    /// `DND_DEFAULT_SETTING` and `DND_IGNORE_XP`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new();
        if let Some(path) = lookup("DND_CATALOG_PATH").filter(|p| !p.trim().is_empty()) {
            config.catalog_path = Some(PathBuf::from(path));
        }
        if let Some(allow) = lookup("DND_ALLOW_MULTICLASS").and_then(|v| parse_flag(&v)) {
            config.allow_multiclassing = allow;
        }
        if let Some(setting) = lookup("DND_DEFAULT_SETTING").filter(|s| !s.trim().is_empty()) {
            config.default_setting = setting;
        }
        if let Some(ignore) = lookup("DND_IGNORE_XP").and_then(|v| parse_flag(&v)) {
            config.ignore_xp = ignore;
        }
        config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            tracing::warn!(value = %other, "Ignoring unrecognized boolean setting");
            None
        }
    }
}
