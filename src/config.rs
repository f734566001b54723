use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ── Models ────────────────────────────────────────────────────────────────────

/// One entry of the model selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOption {
    /// Identifier sent to the service ("gpt-4o")
    pub id: String,
    /// Label shown in the picker ("GPT-4o")
    pub name: String,
}

impl ModelOption {
    fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

fn default_models() -> Vec<ModelOption> {
    vec![
        ModelOption::new("gemini-2.5-flash", "Gemini 2.5 Flash"),
        ModelOption::new("gemini-2.0-flash", "Gemini 2.0 Flash"),
        ModelOption::new("gpt-4o", "GPT-4o"),
        ModelOption::new("gpt-4o-mini", "GPT-4o Mini"),
        ModelOption::new("deepseek-coder", "DeepSeek Coder"),
        ModelOption::new("deepseek-chat", "DeepSeek V3"),
        ModelOption::new("grok-2-latest", "Grok 2"),
    ]
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

// ── Config file ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Base URL of the indexing/chat service
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model used when neither the CLI nor a saved preference picks one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Where history, the model preference and the log live.
    /// Defaults to `$XDG_DATA_HOME/repochat`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_models")]
    pub models: Vec<ModelOption>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            default_model: default_model(),
            data_dir: None,
            models: default_models(),
        }
    }
}

impl ConfigFile {
    /// Load from disk, or return a default config if the file doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    /// The configured data directory, or the XDG default.
    pub fn storage_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(data_dir)
    }

    /// Write a starter config file to disk (only if it doesn't exist).
    pub fn write_default_if_missing() -> Result<PathBuf> {
        let path = config_path();
        write_default_at(&path)?;
        Ok(path)
    }
}

fn write_default_at(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("Failed to write config file at {}", path.display()))
}

// ── Resolved runtime config (after merging file + CLI overrides) ──────────────

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub endpoint: String,
    pub model: String,
    pub models: Vec<ModelOption>,
}

impl ResolvedConfig {
    /// Merge the config file with CLI overrides and the saved model preference.
    /// Priority: CLI args > env vars (handled by clap) > saved preference > config file > built-in defaults
    pub fn resolve(
        file: &ConfigFile,
        endpoint_override: Option<&str>,
        model_override: Option<&str>,
        saved_model: Option<&str>,
    ) -> Self {
        Self {
            endpoint: endpoint_override
                .map(str::to_string)
                .unwrap_or_else(|| file.endpoint.clone()),
            model: model_override
                .or(saved_model)
                .map(str::to_string)
                .unwrap_or_else(|| file.default_model.clone()),
            models: file.models.clone(),
        }
    }

    /// Display name for a model id; unknown ids are shown as-is.
    pub fn model_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.models
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.name.as_str())
            .unwrap_or(id)
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn config_path() -> PathBuf {
    dirs_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repochat")
        .join("config.toml")
}

fn dirs_config_dir() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
}

/// Default data directory: `$XDG_DATA_HOME/repochat` or `~/.local/share/repochat`.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".local").join("share"))
        })
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repochat")
}

// ── Default config template written on first run ──────────────────────────────

const DEFAULT_CONFIG_TOML: &str = r#"# repochat configuration
# Run `repochat --init` to regenerate this file.

# Indexing/chat service
endpoint      = "http://127.0.0.1:8000"
default_model = "gemini-2.5-flash"

# History, model preference and repochat.log live here.
# data_dir = "/home/user/.local/share/repochat"

# ── Model selector ───────────────────────────────────────────────────────────
# Remove entries to shorten the picker; `id` is what the service receives.
[[models]]
id   = "gemini-2.5-flash"
name = "Gemini 2.5 Flash"

[[models]]
id   = "gemini-2.0-flash"
name = "Gemini 2.0 Flash"

[[models]]
id   = "gpt-4o"
name = "GPT-4o"

[[models]]
id   = "gpt-4o-mini"
name = "GPT-4o Mini"

[[models]]
id   = "deepseek-coder"
name = "DeepSeek Coder"

[[models]]
id   = "deepseek-chat"
name = "DeepSeek V3"

[[models]]
id   = "grok-2-latest"
name = "Grok 2"
"#;
