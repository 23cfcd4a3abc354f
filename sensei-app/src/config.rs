//! Bonsai sensei configuration loader.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct SenseiConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// OpenAI-compatible endpoint; the public OpenAI API when unset.
    #[serde(default)]
    pub api_base_url: Option<String>,
}

fn default_system_prompt() -> String {
    "You are a bonsai sensei. Answer questions about bonsai care and keep the user's \
     records of species, specimens, fertilizers and treatments. Use the list and find \
     tools to read records. Never claim a record was created, updated or deleted: \
     propose the change with a propose_* tool and tell the user it awaits their \
     confirmation."
        .to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysConfig {
    pub llm_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_http_timeout_secs() -> u64 {
    120
}

fn default_max_in_flight() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            http_timeout_secs: default_http_timeout_secs(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Ceiling on model calls per turn.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Identical governed tool calls allowed per turn.
    #[serde(default = "default_max_identical_tool_calls")]
    pub max_identical_tool_calls: u32,
    #[serde(default = "default_history_max_messages")]
    pub history_max_messages: usize,
}

fn default_max_steps() -> usize {
    20
}

fn default_max_identical_tool_calls() -> u32 {
    sensei_tools::DEFAULT_IDENTICAL_CALL_LIMIT
}

fn default_history_max_messages() -> usize {
    40
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_identical_tool_calls: default_max_identical_tool_calls(),
            history_max_messages: default_history_max_messages(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "~/.bonsai-sensei/data/records.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    /// Telegram user ids allowed to talk to the bot.
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Respond to anyone. Off by default: an explicit allowlist is required.
    #[serde(default)]
    pub allow_all_senders: bool,
}

impl SenseiConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self::load_with_path(path).await?.0)
    }

    pub async fn load_with_path(path: Option<PathBuf>) -> anyhow::Result<(Self, PathBuf)> {
        let path = path.unwrap_or_else(default_config_path);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;

        let mut cfg: SenseiConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok((cfg, path))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("SENSEI_MODEL") {
            self.general.model = v;
        }
        if let Some(v) = var("SENSEI_LLM_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            self.keys.llm_api_key = Some(v);
        }
        if let Some(v) = var("SENSEI_API_BASE_URL") {
            self.general.api_base_url = Some(v);
        }
        if let Some(v) = var("TELEGRAM_BOT_TOKEN") {
            self.channels.telegram.bot_token = v;
            self.channels.telegram.enabled = true;
        }
        if let Some(v) = var("SENSEI_DATABASE_PATH") {
            self.store.database_path = v;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.general.model.trim().is_empty() {
            return Err(anyhow::anyhow!("general.model is required"));
        }
        if self.agent.max_steps == 0 {
            return Err(anyhow::anyhow!("agent.max_steps must be > 0"));
        }
        if self.agent.max_identical_tool_calls == 0 {
            return Err(anyhow::anyhow!("agent.max_identical_tool_calls must be > 0"));
        }
        if self.server.bind.port() == 0 {
            return Err(anyhow::anyhow!("server.bind port must be > 0"));
        }
        if self.server.max_in_flight == 0 {
            return Err(anyhow::anyhow!("server.max_in_flight must be > 0"));
        }
        if self.store.database_path.trim().is_empty() {
            return Err(anyhow::anyhow!("store.database_path is required"));
        }
        if self.channels.telegram.enabled && self.channels.telegram.bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "channels.telegram.bot_token is required when telegram is enabled"
            ));
        }
        Ok(())
    }

    pub fn llm_api_key(&self) -> Option<&str> {
        self.keys
            .llm_api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        expand_home(&self.store.database_path)
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".bonsai-sensei").join("config.toml")
}

pub fn expand_home(path: &str) -> anyhow::Result<PathBuf> {
    let trimmed = path.trim();
    if !trimmed.starts_with("~/") {
        return Ok(PathBuf::from(trimmed));
    }
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME is not set"))?;
    Ok(PathBuf::from(trimmed.replacen('~', &home, 1)))
}
