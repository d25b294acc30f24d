use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuillConfig {
    /// Chat completion endpoint settings
    pub llm: LlmConfig,

    /// Buffer writer and save settings
    pub editor: EditorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,

    /// Model name
    pub model: String,

    /// API key; filled from OPENAI_API_KEY if not in the file
    pub api_key: Option<String>,

    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,

    /// Timeout in seconds for the whole request
    pub timeout_seconds: u64,

    /// Timeout in seconds for establishing the connection
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Pause between line insertions, in milliseconds
    pub insert_delay_ms: u64,

    /// Ceiling on the wait for the buffer-changed check before saving
    pub save_wait_ms: u64,

    /// Directory files are saved into; current directory when unset
    pub workspace_root: Option<PathBuf>,
}

impl QuillConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // Load the API key from the environment if not in config
        config.load_env_vars();

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        // Create a copy without sensitive data
        let mut safe_config = self.clone();
        safe_config.sanitize_for_save();

        let content =
            toml::to_string_pretty(&safe_config).context("Failed to serialize config")?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get the default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".quill").join("config.toml"))
    }

    /// The directory saved files land in.
    pub fn workspace_root(&self) -> PathBuf {
        match &self.editor.workspace_root {
            Some(root) => root.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    fn load_env_vars(&mut self) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
    }

    /// Remove sensitive data before saving
    fn sanitize_for_save(&mut self) {
        self.llm.api_key = None;
    }
}

impl Default for QuillConfig {
    fn default() -> Self {
        let mut config = Self {
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o".to_string(),
                api_key: None,
                temperature: 0.01,
                max_tokens: 4096,
                top_p: 1.0,
                frequency_penalty: 0.0,
                presence_penalty: 0.0,
                timeout_seconds: 120,
                connect_timeout_seconds: 10,
            },
            editor: EditorConfig {
                insert_delay_ms: 100,
                save_wait_ms: 2000,
                workspace_root: None,
            },
        };
        config.load_env_vars();
        config
    }
}

/// Load or create configuration
pub fn load_or_create_config(path: Option<&Path>) -> Result<QuillConfig> {
    let config_path = if let Some(p) = path {
        p.to_path_buf()
    } else {
        QuillConfig::default_path()?
    };

    if config_path.exists() {
        QuillConfig::load(&config_path)
    } else {
        let config = QuillConfig::default();
        config.save(&config_path)?;
        Ok(config)
    }
}
