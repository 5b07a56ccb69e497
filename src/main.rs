//! run-llm - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use run_llm::{
    GithubClient, HubClient, RunMode, RunnerConfig, Services, SystemLauncher, TerminalPrompter,
    WasmEdgeInstaller, Wizard, WizardOptions, gpu, http, models::Downloader, prereq, runtime,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "run-llm")]
#[command(about = "Download a GGUF model and run it on WasmEdge with LlamaEdge", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port of the API server
    #[arg(long)]
    port: Option<u16>,

    /// Hugging Face repository URL or owner/name
    #[arg(long)]
    model_url: Option<String>,

    /// GGUF file inside the repository
    #[arg(long)]
    weights: Option<String>,

    /// App to run
    #[arg(long, value_enum)]
    mode: Option<RunMode>,

    /// Prompt template passed as -p
    #[arg(long)]
    prompt_template: Option<String>,

    /// Reverse prompt passed as -r
    #[arg(long)]
    reverse_prompt: Option<String>,

    /// Context size in tokens
    #[arg(long)]
    ctx_size: Option<u32>,

    /// Maximum number of tokens to predict
    #[arg(long)]
    n_predict: Option<u32>,

    /// Number of layers to offload to the GPU
    #[arg(long)]
    n_gpu_layers: Option<u32>,

    /// Log prompts and answers
    #[arg(long)]
    log_prompts: bool,

    /// Log inference statistics
    #[arg(long)]
    log_stat: bool,

    /// Directory the model and apps are downloaded to
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Accept every default without asking
    #[arg(short, long)]
    yes: bool,

    /// Download the apps and web UI even if present
    #[arg(long)]
    refresh: bool,

    /// Print the final command instead of running it
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    log_format: String,
}

impl Cli {
    /// Apply command-line answers on top of the loaded configuration
    fn apply(&self, config: &mut RunnerConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(work_dir) = &self.work_dir {
            config.work_dir = work_dir.clone();
        }
        if self.model_url.is_some() {
            config.model_url = self.model_url.clone();
        }
        if self.weights.is_some() {
            config.weights = self.weights.clone();
        }
        if self.mode.is_some() {
            config.mode = self.mode;
        }
        if self.prompt_template.is_some() {
            config.prompt_template = self.prompt_template.clone();
        }
        if self.reverse_prompt.is_some() {
            config.reverse_prompt = self.reverse_prompt.clone();
        }
        if self.ctx_size.is_some() {
            config.ctx_size = self.ctx_size;
        }
        if self.n_predict.is_some() {
            config.n_predict = self.n_predict;
        }
        if self.n_gpu_layers.is_some() {
            config.n_gpu_layers = self.n_gpu_layers;
        }
        if self.log_prompts {
            config.log_prompts = Some(true);
        }
        if self.log_stat {
            config.log_stat = Some(true);
        }
    }
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for the menus
    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting run-llm");

    // Load configuration
    let mut config = RunnerConfig::load(cli.config.clone())?;
    cli.apply(&mut config);
    config.validate()?;

    tracing::info!(
        port = config.port,
        work_dir = ?config.work_dir,
        wasmedge_version = %config.wasmedge_version,
        hf_endpoint = %config.hf_endpoint,
        "Configuration loaded"
    );

    prereq::check_tools(prereq::REQUIRED_TOOLS).context("Missing prerequisites")?;

    let gpus = gpu::get_or_init();

    let client = http::build_client().context("Failed to create HTTP client")?;
    let services = Services {
        hub: HubClient::new(client.clone(), config.hf_endpoint.clone()),
        github: GithubClient::new(client.clone(), config.github_api.clone()),
        downloader: Downloader::new(client.clone(), true),
        runtime: Arc::new(WasmEdgeInstaller::new(
            client,
            config.installer_url.clone(),
            config.wasmedge_version.clone(),
            config.ggml_plugin.clone(),
            runtime::default_install_dir(),
        )),
        launcher: Arc::new(SystemLauncher::default()),
    };

    let options = WizardOptions {
        dry_run: cli.dry_run,
        refresh_apps: cli.refresh,
        default_gpu_layers: gpus.default_gpu_layers(),
    };

    let wizard = Wizard::new(config, TerminalPrompter::stdio(cli.yes), services, options);
    let code = wizard.run().await.context("run-llm failed")?;

    Ok(code)
}
