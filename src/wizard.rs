//! The prompt, fetch, select and launch sequence
//!
//! Each step takes its answer from the configuration when one is set and
//! asks the user otherwise.

use crate::config::{RunMode, RunnerConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::launch::{LaunchOptions, LaunchPlan, ProcessLauncher};
use crate::models::{self, Downloader, FetchOutcome, HfRepo, HubClient, ModelFile};
use crate::prompt::Prompter;
use crate::release::{self, GithubClient};
use crate::runtime::{RuntimeInfo, RuntimeProvisioner};
use crate::template::{self, CATALOGUE, PromptTemplate};
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_MODEL_REPO: &str = "second-state/Llama-2-7B-Chat-GGUF";
pub const DEFAULT_CTX_SIZE: u32 = 4096;
pub const DEFAULT_N_PREDICT: u32 = 1024;

/// External services the wizard talks to
pub struct Services {
    pub hub: HubClient,
    pub github: GithubClient,
    pub downloader: Downloader,
    pub runtime: Arc<dyn RuntimeProvisioner>,
    pub launcher: Arc<dyn ProcessLauncher>,
}

/// Switches that are not answers to questions
#[derive(Debug, Clone, Default)]
pub struct WizardOptions {
    /// Print the command instead of running it
    pub dry_run: bool,
    /// Download the apps and UI even when present
    pub refresh_apps: bool,
    /// `--n-gpu-layers` offered by default
    pub default_gpu_layers: u32,
}

pub struct Wizard<P: Prompter> {
    config: RunnerConfig,
    prompter: P,
    services: Services,
    options: WizardOptions,
}

impl<P: Prompter> Wizard<P> {
    pub fn new(config: RunnerConfig, prompter: P, services: Services, options: WizardOptions) -> Self {
        Self {
            config,
            prompter,
            services,
            options,
        }
    }

    /// Run every step and launch the app, returning its exit code
    pub async fn run(mut self) -> RunnerResult<i32> {
        let plan = self.prepare().await?;

        println!("\n[+] Running:\n\n    {}\n", plan.render());
        if self.options.dry_run {
            return Ok(0);
        }

        self.services.launcher.launch(&plan).await
    }

    /// Run every step up to, but not including, the launch
    pub async fn prepare(&mut self) -> RunnerResult<LaunchPlan> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let runtime = self.ensure_runtime().await?;

        let (repo, file) = self.select_model().await?;
        let weights = self.fetch_model(&repo, &file).await?;
        let weights_name = file.file_name().to_string();

        let (prompt_template, reverse_prompt) = self.select_prompt_template(&weights_name)?;
        let mode = self.select_mode()?;
        self.fetch_apps(mode).await?;

        let options = self.collect_launch_options(mode, weights_name, prompt_template, reverse_prompt)?;

        tracing::info!(
            weights = ?weights,
            mode = ?mode,
            template = %options.prompt_template,
            ctx_size = options.ctx_size,
            n_predict = options.n_predict,
            n_gpu_layers = options.n_gpu_layers,
            "Launch prepared"
        );

        Ok(LaunchPlan::new(&runtime.binary, &options, &self.config.work_dir))
    }

    async fn ensure_runtime(&mut self) -> RunnerResult<RuntimeInfo> {
        let runtime = self.services.runtime.clone();

        let reinstall = match runtime.locate().await {
            Some(info) if !info.plugin_installed => {
                println!("[+] WasmEdge found at {}, but the ggml plugin is missing.", info.binary.display());
                self.prompter.confirm("Install WasmEdge with the ggml plugin now?", true)?
            }
            Some(info) => {
                let version = info.version.as_deref().unwrap_or("unknown version");
                println!("[+] WasmEdge {} found at {}", version, info.binary.display());
                if self.prompter.confirm("Reinstall WasmEdge?", false)? {
                    true
                } else {
                    return Ok(info);
                }
            }
            None => {
                println!("[+] WasmEdge not found, installing it with the ggml plugin");
                true
            }
        };

        if !reinstall {
            return Err(RunnerError::Install(
                "the ggml plugin is required to run GGUF models".to_string(),
            ));
        }

        runtime.install().await
    }

    async fn select_model(&mut self) -> RunnerResult<(HfRepo, ModelFile)> {
        let repo = match self.config.model_url.clone() {
            Some(url) => HfRepo::parse(&url)?,
            None => loop {
                let answer = self
                    .prompter
                    .input("Hugging Face model repository (URL or owner/name)", Some(DEFAULT_MODEL_REPO))?;
                match HfRepo::parse(&answer) {
                    Ok(repo) => break repo,
                    Err(e) => println!("{}", e),
                }
            },
        };

        println!("[+] Listing GGUF files in {}", repo.id());
        let mut files = self.services.hub.list_gguf_files(&repo).await?;

        let index = match self.config.weights.as_deref() {
            Some(wanted) => files
                .iter()
                .position(|f| f.name == wanted || f.file_name() == wanted)
                .ok_or_else(|| {
                    RunnerError::InvalidInput(format!("{} has no file named {}", repo.id(), wanted))
                })?,
            None => {
                let labels: Vec<String> = files.iter().map(ModelFile::label).collect();
                self.prompter.select(
                    "Choose the weights file to download",
                    &labels,
                    models::default_choice(&files),
                )?
            }
        };

        let file = files.swap_remove(index);
        Ok((repo, file))
    }

    async fn fetch_model(&mut self, repo: &HfRepo, file: &ModelFile) -> RunnerResult<PathBuf> {
        match file.size_bytes {
            Some(size) => println!("[+] Fetching {} ({})", file.name, models::format_size(size)),
            None => println!("[+] Fetching {}", file.name),
        }

        let (path, outcome) = models::ensure_model(
            &self.services.hub,
            &self.services.downloader,
            repo,
            file,
            &self.config.work_dir,
        )
        .await?;

        if outcome == FetchOutcome::AlreadyPresent {
            println!("[+] Using verified {}", path.display());
        }
        Ok(path)
    }

    fn select_prompt_template(&mut self, weights_name: &str) -> RunnerResult<(String, Option<String>)> {
        let template: PromptTemplate = match self.config.prompt_template.as_deref() {
            Some(name) => name.parse()?,
            None => {
                let guessed = template::guess(weights_name).unwrap_or(CATALOGUE[0]);
                let names: Vec<String> = CATALOGUE.iter().map(|t| t.name.to_string()).collect();
                let index = self.prompter.select(
                    "Choose the prompt template of the model",
                    &names,
                    template::position(&guessed),
                )?;
                CATALOGUE[index]
            }
        };

        let reverse = match self.config.reverse_prompt.clone() {
            Some(reverse) => reverse,
            None => self.prompter.input(
                "Reverse prompt (leave empty for none)",
                Some(template.reverse_prompt.unwrap_or("")),
            )?,
        };

        let reverse = Some(reverse).filter(|r| !r.trim().is_empty());
        Ok((template.name.to_string(), reverse))
    }

    fn select_mode(&mut self) -> RunnerResult<RunMode> {
        if let Some(mode) = self.config.mode {
            return Ok(mode);
        }

        let modes = [RunMode::ApiServer, RunMode::Chat];
        let labels: Vec<String> = modes.iter().map(|m| m.label().to_string()).collect();
        let index = self
            .prompter
            .select("How do you want to run the model?", &labels, 0)?;
        Ok(modes[index])
    }

    async fn fetch_apps(&mut self, mode: RunMode) -> RunnerResult<()> {
        println!("[+] Fetching {}", mode.wasm_file());
        release::fetch_app(
            &self.services.github,
            &self.services.downloader,
            &self.config.release_repo,
            mode,
            &self.config.work_dir,
            self.options.refresh_apps,
        )
        .await?;

        if mode == RunMode::ApiServer {
            println!("[+] Fetching the chatbot web UI");
            release::fetch_chatbot_ui(
                &self.services.github,
                &self.services.downloader,
                &self.config.chatbot_ui_repo,
                &self.config.work_dir,
                self.options.refresh_apps,
            )
            .await?;
        }
        Ok(())
    }

    fn collect_launch_options(
        &mut self,
        mode: RunMode,
        weights: String,
        prompt_template: String,
        reverse_prompt: Option<String>,
    ) -> RunnerResult<LaunchOptions> {
        let ctx_size = match self.config.ctx_size {
            Some(ctx_size) => ctx_size,
            None => loop {
                let n = self.prompter.number("Context size", DEFAULT_CTX_SIZE)?;
                if n > 0 {
                    break n;
                }
                println!("The context size must be greater than zero.");
            },
        };

        let n_predict = match self.config.n_predict {
            Some(n) => n,
            None => self
                .prompter
                .number("Maximum tokens to predict", DEFAULT_N_PREDICT)?,
        };

        let n_gpu_layers = match self.config.n_gpu_layers {
            Some(n) => n,
            None => self
                .prompter
                .number("Layers to offload to the GPU", self.options.default_gpu_layers)?,
        };

        let log_prompts = match self.config.log_prompts {
            Some(v) => v,
            None => self.prompter.confirm("Log prompts and answers?", false)?,
        };

        let log_stat = match self.config.log_stat {
            Some(v) => v,
            None => self.prompter.confirm("Log inference statistics?", false)?,
        };

        Ok(LaunchOptions {
            mode,
            weights,
            prompt_template,
            reverse_prompt,
            ctx_size,
            n_predict,
            n_gpu_layers,
            log_prompts,
            log_stat,
            port: self.config.port,
        })
    }
}
