//! Configuration system for cmdgate.
//!
//! Supports layered configuration from multiple sources:
//! 1. Environment variables (highest priority)
//! 2. Explicit config file (`CMDGATE_CONFIG`)
//! 3. Project config (`.cmdgate.toml`, nearest ancestor of the cwd)
//! 4. User config (`~/.config/cmdgate/config.toml`)
//! 5. Compiled defaults (lowest priority)
//!
//! Rule documents live in the same file under `[rules]`: two lists,
//! `[[rules.block]]` and `[[rules.allow]]`, prepended to the built-in set
//! unless `rules.use_defaults = false`. Rules missing a name or reason, or
//! carrying an uncompilable pattern, are rejected at load time; the core
//! matcher assumes a structurally valid rule set.

use crate::defaults::default_rules;
use crate::guard::DEFAULT_FAST_PATH;
use crate::logging::LogFormat;
use crate::offload::OffloadConfig;
use crate::rules::{Rule, RuleSet};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable prefix for all config options.
const ENV_PREFIX: &str = "CMDGATE";

/// User config file name under the config directory.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Project-level config file name.
const PROJECT_CONFIG_NAME: &str = ".cmdgate.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,

    /// Fast-path tuning.
    pub fast_path: FastPathConfig,

    /// Rule document.
    pub rules: RulesConfig,

    /// Output offload settings.
    pub offload: OffloadConfig,
}

/// General configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Whether to show fail-open diagnostics on stderr.
    pub verbose: bool,

    /// Path to the decision log file (optional). Supports `~` expansion.
    pub log_file: Option<String>,

    /// Decision log format.
    pub log_format: LogFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_file: None,
            log_format: LogFormat::Text,
        }
    }
}

/// Fast-path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FastPathConfig {
    /// Disable to force every command through full evaluation.
    pub enabled: bool,

    /// Safe command prefixes. Membership is operational tuning; the subset
    /// property is what matters.
    pub prefixes: Vec<String>,
}

impl Default for FastPathConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefixes: DEFAULT_FAST_PATH.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

/// Rule document: user/project rules plus default-set enablement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Keep the compiled-in default rules behind the configured ones.
    pub use_defaults: bool,

    /// Additional block rules, evaluated before the defaults.
    pub block: Vec<Rule>,

    /// Additional allow rules, evaluated before the defaults.
    pub allow: Vec<Rule>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            use_defaults: true,
            block: Vec::new(),
            allow: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the highest-priority available source, then
    /// apply environment overrides. Never fails: a missing or malformed file
    /// falls back to the next layer with a stderr warning.
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::load_first_available();
        config.apply_env();
        config
    }

    fn load_first_available() -> Self {
        if let Ok(path) = env::var(format!("{ENV_PREFIX}_CONFIG")) {
            if let Some(config) = Self::load_from_file(Path::new(&path)) {
                return config;
            }
        }

        if let Some(path) = Self::project_config_path() {
            if let Some(config) = Self::load_from_file(&path) {
                return config;
            }
        }

        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                if let Some(config) = Self::load_from_file(&path) {
                    return config;
                }
            }
        }

        Self::default()
    }

    /// Load and parse one config file. Returns `None` (with a stderr
    /// warning) on read or parse failure.
    #[must_use]
    pub fn load_from_file(path: &Path) -> Option<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) => {
                eprintln!("cmdgate: cannot read {}: {err}", path.display());
                return None;
            }
        };
        match toml::from_str(&contents) {
            Ok(config) => Some(config),
            Err(err) => {
                eprintln!("cmdgate: cannot parse {}: {err}", path.display());
                None
            }
        }
    }

    fn apply_env(&mut self) {
        if env_flag("VERBOSE") {
            self.general.verbose = true;
        }
        if let Ok(path) = env::var(format!("{ENV_PREFIX}_LOG_FILE")) {
            if !path.is_empty() {
                self.general.log_file = Some(path);
            }
        }
    }

    /// Check the kill switch: `CMDGATE_BYPASS=1` disables gating entirely.
    #[must_use]
    pub fn is_bypassed() -> bool {
        env_flag("BYPASS")
    }

    /// Path of the user config file (`~/.config/cmdgate/config.toml`).
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("cmdgate").join(CONFIG_FILE_NAME))
    }

    /// Nearest `.cmdgate.toml` in the cwd or an ancestor directory.
    #[must_use]
    pub fn project_config_path() -> Option<PathBuf> {
        let mut dir = env::current_dir().ok()?;
        loop {
            let candidate = dir.join(PROJECT_CONFIG_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Assemble the effective rule set: validated configured rules first,
    /// then the built-ins unless disabled. Invalid rules are skipped with a
    /// stderr diagnostic rather than aborting the gate.
    #[must_use]
    pub fn rule_set(&self) -> RuleSet {
        let mut set = RuleSet {
            block: keep_valid(&self.rules.block, "block"),
            allow: keep_valid(&self.rules.allow, "allow"),
        };

        if self.rules.use_defaults {
            let defaults = default_rules();
            set.block.extend(defaults.block);
            set.allow.extend(defaults.allow);
        }

        set
    }

    /// Fast-path prefixes honoring the enabled flag.
    #[must_use]
    pub fn fast_path_prefixes(&self) -> Vec<String> {
        if self.fast_path.enabled {
            self.fast_path.prefixes.clone()
        } else {
            Vec::new()
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(format!("{ENV_PREFIX}_{name}"))
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Validation errors for one rule, as operator-readable strings.
#[must_use]
pub fn validate_rule(rule: &Rule) -> Vec<String> {
    let mut errors = Vec::new();
    if rule.name.trim().is_empty() {
        errors.push("rule is missing a name".to_string());
    }
    if rule.reason.trim().is_empty() {
        errors.push(format!("rule '{}' is missing a reason", rule.name));
    }
    for pattern in rule.path_patterns.iter().chain(rule.arg_patterns.iter()) {
        if let Err(err) = Regex::new(pattern) {
            errors.push(format!("rule '{}': invalid pattern {pattern}: {err}", rule.name));
        }
    }
    errors
}

fn keep_valid(rules: &[Rule], kind: &str) -> Vec<Rule> {
    let mut valid = Vec::with_capacity(rules.len());
    for rule in rules {
        let errors = validate_rule(rule);
        if errors.is_empty() {
            valid.push(rule.clone());
        } else {
            for err in errors {
                eprintln!("cmdgate: skipping {kind} rule: {err}");
            }
        }
    }
    valid
}
