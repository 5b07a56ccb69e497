//! run-llm - run a GGUF chat model on WasmEdge with LlamaEdge
//!
//! Walks the user through picking a model from Hugging Face, installs the
//! WasmEdge runtime with its ggml plugin, fetches the LlamaEdge API server
//! or CLI chat app and launches it with the chosen settings.

pub mod archive;
pub mod config;
pub mod error;
pub mod gpu;
pub mod http;
pub mod launch;
pub mod models;
pub mod prereq;
pub mod prompt;
pub mod release;
pub mod runtime;
pub mod template;
pub mod wizard;

pub use config::{RunMode, RunnerConfig};
pub use error::{RunnerError, RunnerResult};
pub use launch::{LaunchOptions, LaunchPlan, ProcessLauncher, SystemLauncher};
pub use models::{HfRepo, HubClient, ModelFile};
pub use prompt::{Prompter, TerminalPrompter};
pub use release::GithubClient;
pub use runtime::{RuntimeInfo, RuntimeProvisioner, WasmEdgeInstaller};
pub use template::PromptTemplate;
pub use wizard::{Services, Wizard, WizardOptions};
