//! Configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which prebuilt LlamaEdge app to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// OpenAI-compatible API server with the chatbot web UI
    ApiServer,
    /// Chat in the terminal
    Chat,
}

impl RunMode {
    /// File name of the app's release asset
    pub fn wasm_file(&self) -> &'static str {
        match self {
            RunMode::ApiServer => "llama-api-server.wasm",
            RunMode::Chat => "llama-chat.wasm",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunMode::ApiServer => "API server with web UI",
            RunMode::Chat => "CLI chat",
        }
    }
}

/// Runner configuration
///
/// Every `Option` field is an answer the wizard asks for when it is unset.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub port: u16,
    pub work_dir: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<RunMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctx_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_gpu_layers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_prompts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_stat: Option<bool>,

    pub wasmedge_version: String,
    pub ggml_plugin: String,
    pub hf_endpoint: String,
    pub github_api: String,
    pub installer_url: String,
    pub release_repo: String,
    pub chatbot_ui_repo: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            work_dir: PathBuf::from("."),
            model_url: None,
            weights: None,
            mode: None,
            prompt_template: None,
            reverse_prompt: None,
            ctx_size: None,
            n_predict: None,
            n_gpu_layers: None,
            log_prompts: None,
            log_stat: None,
            wasmedge_version: default_wasmedge_version(),
            ggml_plugin: default_ggml_plugin(),
            hf_endpoint: default_hf_endpoint(),
            github_api: default_github_api(),
            installer_url: default_installer_url(),
            release_repo: default_release_repo(),
            chatbot_ui_repo: default_chatbot_ui_repo(),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(port) = std::env::var("RUN_LLM_PORT") {
            config.port = port.parse().context("Invalid RUN_LLM_PORT value")?;
        }
        if let Ok(model_url) = std::env::var("RUN_LLM_MODEL_URL") {
            config.model_url = Some(model_url);
        }
        if let Ok(work_dir) = std::env::var("RUN_LLM_WORK_DIR") {
            config.work_dir = PathBuf::from(work_dir);
        }
        if let Ok(version) = std::env::var("WASMEDGE_VERSION") {
            config.wasmedge_version = version;
        }
        if let Ok(endpoint) = std::env::var("HF_ENDPOINT") {
            config.hf_endpoint = endpoint;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port must be between 1 and 65535");
        }
        if self.ctx_size == Some(0) {
            anyhow::bail!("Context size must be greater than zero");
        }

        for (name, value) in [
            ("hf_endpoint", &self.hf_endpoint),
            ("github_api", &self.github_api),
            ("installer_url", &self.installer_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                anyhow::bail!("{} must be an http(s) URL (got {:?})", name, value);
            }
        }

        for (name, value) in [
            ("release_repo", &self.release_repo),
            ("chatbot_ui_repo", &self.chatbot_ui_repo),
        ] {
            if value.split('/').filter(|s| !s.is_empty()).count() != 2 {
                anyhow::bail!("{} must look like owner/name (got {:?})", name, value);
            }
        }

        if self.work_dir.is_file() {
            anyhow::bail!("work_dir is a file: {:?}", self.work_dir);
        }

        Ok(())
    }
}

// Default functions
fn default_port() -> u16 {
    8080
}
fn default_wasmedge_version() -> String {
    "0.13.5".to_string()
}
fn default_ggml_plugin() -> String {
    "wasi_nn-ggml".to_string()
}
fn default_hf_endpoint() -> String {
    "https://huggingface.co".to_string()
}
fn default_github_api() -> String {
    "https://api.github.com".to_string()
}
fn default_installer_url() -> String {
    "https://raw.githubusercontent.com/WasmEdge/WasmEdge/master/utils/install.sh".to_string()
}
fn default_release_repo() -> String {
    "LlamaEdge/LlamaEdge".to_string()
}
fn default_chatbot_ui_repo() -> String {
    "LlamaEdge/chatbot-ui".to_string()
}
