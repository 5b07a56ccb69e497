//! Command assembly and process lifecycle for the final launch

use crate::config::RunMode;
use crate::error::{RunnerError, RunnerResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::{Child, Command};

// ============================================================================
// Command Assembly
// ============================================================================

/// Everything the LlamaEdge app is started with
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchOptions {
    pub mode: RunMode,
    /// Weights file name, relative to the work directory
    pub weights: String,
    pub prompt_template: String,
    pub reverse_prompt: Option<String>,
    pub ctx_size: u32,
    pub n_predict: u32,
    pub n_gpu_layers: u32,
    pub log_prompts: bool,
    pub log_stat: bool,
    pub port: u16,
}

/// Fully resolved command line
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
}

impl LaunchPlan {
    /// Build the wasmedge invocation for `options`
    pub fn new(runtime: &Path, options: &LaunchOptions, work_dir: &Path) -> Self {
        let mut args = vec![
            "--dir".to_string(),
            ".:.".to_string(),
            "--nn-preload".to_string(),
            format!("default:GGML:AUTO:{}", options.weights),
            options.mode.wasm_file().to_string(),
            "-p".to_string(),
            options.prompt_template.clone(),
        ];

        if let Some(reverse) = options.reverse_prompt.as_deref().filter(|r| !r.is_empty()) {
            args.push("-r".to_string());
            args.push(reverse.to_string());
        }

        args.push("--ctx-size".to_string());
        args.push(options.ctx_size.to_string());
        args.push("--n-predict".to_string());
        args.push(options.n_predict.to_string());
        args.push("--n-gpu-layers".to_string());
        args.push(options.n_gpu_layers.to_string());

        if options.log_prompts {
            args.push("--log-prompts".to_string());
        }
        if options.log_stat {
            args.push("--log-stat".to_string());
        }
        if options.mode == RunMode::ApiServer {
            args.push("--socket-addr".to_string());
            args.push(format!("0.0.0.0:{}", options.port));
        }

        Self {
            program: runtime.to_path_buf(),
            args,
            work_dir: work_dir.to_path_buf(),
        }
    }

    /// Single shell-quoted line for display
    pub fn render(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .map(|arg| shell_quote(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Value following `flag`, if present
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }
}

/// Quote an argument for a POSIX shell when needed
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@%+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

// ============================================================================
// Trait Definitions
// ============================================================================

/// Runs the final command
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Run the plan to completion and return its exit code
    async fn launch(&self, plan: &LaunchPlan) -> RunnerResult<i32>;
}

// ============================================================================
// Production Implementation
// ============================================================================

/// Launcher running the command as a child that inherits the terminal
pub struct SystemLauncher {
    grace_period: Duration,
}

impl SystemLauncher {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    /// Ask the child to stop with SIGTERM, killing it after the grace period
    async fn stop(&self, child: &mut Child) -> std::io::Result<ExitStatus> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        tokio::select! {
            status = child.wait() => status,
            _ = tokio::time::sleep(self.grace_period) => {
                tracing::warn!("App did not stop in time, killing it");
                child.kill().await?;
                child.wait().await
            }
        }
    }
}

impl Default for SystemLauncher {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// Exit code of a finished child, shell style for signals
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[async_trait]
impl ProcessLauncher for SystemLauncher {
    async fn launch(&self, plan: &LaunchPlan) -> RunnerResult<i32> {
        let launch_err = |reason: String| RunnerError::Launch {
            program: plan.program.display().to_string(),
            reason,
        };

        let mut child = Command::new(&plan.program)
            .args(&plan.args)
            .current_dir(&plan.work_dir)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| launch_err(e.to_string()))?;

        let pid = child.id();
        tracing::info!(program = ?plan.program, pid = ?pid, "App started");

        let status = tokio::select! {
            status = child.wait() => status?,
            signal = shutdown_signal() => {
                tracing::info!(signal = signal, "Stopping app");
                self.stop(&mut child).await?
            }
        };

        let code = exit_code(status);
        tracing::info!(code = code, "App exited");
        Ok(code)
    }
}

/// Resolves with the name of the first termination signal received
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================


#[cfg(test)]
mod tests {
    use super::*;
    use mocks::MockLauncher;

    fn options(mode: RunMode) -> LaunchOptions {
        LaunchOptions {
            mode,
            weights: "Llama-2-7b-chat-hf-Q5_K_M.gguf".to_string(),
            prompt_template: "llama-2-chat".to_string(),
            reverse_prompt: None,
            ctx_size: 4096,
            n_predict: 1024,
            n_gpu_layers: 100,
            log_prompts: false,
            log_stat: false,
            port: 8080,
        }
    }

    #[test]
    fn test_api_server_command() {
        let plan = LaunchPlan::new(
            Path::new("/home/u/.wasmedge/bin/wasmedge"),
            &LaunchOptions {
                log_prompts: true,
                log_stat: true,
                port: 9090,
                ..options(RunMode::ApiServer)
            },
            Path::new("/work"),
        );

        assert_eq!(
            plan.args,
            vec![
                "--dir",
                ".:.",
                "--nn-preload",
                "default:GGML:AUTO:Llama-2-7b-chat-hf-Q5_K_M.gguf",
                "llama-api-server.wasm",
                "-p",
                "llama-2-chat",
                "--ctx-size",
                "4096",
                "--n-predict",
                "1024",
                "--n-gpu-layers",
                "100",
                "--log-prompts",
                "--log-stat",
                "--socket-addr",
                "0.0.0.0:9090",
            ]
        );
        assert_eq!(plan.work_dir, PathBuf::from("/work"));
    }

    #[test]
    fn test_chat_command_has_no_socket() {
        let plan = LaunchPlan::new(
            Path::new("wasmedge"),
            &LaunchOptions {
                reverse_prompt: Some("<|im_end|>".to_string()),
                ..options(RunMode::Chat)
            },
            Path::new("."),
        );

        assert_eq!(plan.args[4], "llama-chat.wasm");
        assert_eq!(plan.arg_value("-r"), Some("<|im_end|>"));
        assert!(!plan.has_flag("--socket-addr"));
        assert!(!plan.has_flag("--log-prompts"));
    }

    #[test]
    fn test_empty_reverse_prompt_omitted() {
        let plan = LaunchPlan::new(
            Path::new("wasmedge"),
            &LaunchOptions {
                reverse_prompt: Some(String::new()),
                ..options(RunMode::Chat)
            },
            Path::new("."),
        );
        assert!(!plan.has_flag("-r"));
    }

    #[test]
    fn test_render_quotes_special_arguments() {
        let plan = LaunchPlan::new(
            Path::new("wasmedge"),
            &LaunchOptions {
                reverse_prompt: Some("<|im_end|>".to_string()),
                ..options(RunMode::Chat)
            },
            Path::new("."),
        );
        let line = plan.render();
        assert!(line.starts_with("wasmedge --dir .:. --nn-preload default:GGML:AUTO:"));
        assert!(line.contains("-r '<|im_end|>'"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("llama-2-chat"), "llama-2-chat");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("用户:"), "'用户:'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_mock_launcher_records_plan() {
        let launcher = MockLauncher::new(3);
        let plan = LaunchPlan::new(Path::new("wasmedge"), &options(RunMode::Chat), Path::new("."));

        assert_eq!(launcher.launch(&plan).await.unwrap(), 3);
        assert_eq!(launcher.launched(), vec![plan]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_launcher_exit_code() {
        let launcher = SystemLauncher::default();
        let plan = LaunchPlan {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), "exit 7".to_string()],
            work_dir: PathBuf::from("."),
        };
        assert_eq!(launcher.launch(&plan).await.unwrap(), 7);
    }

    #[cfg(unix)]
    async fn spawn_ready(script: &str) -> Child {
        use std::process::Stdio;
        use tokio::io::{AsyncBufReadExt, BufReader};

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        let mut line = String::new();
        BufReader::new(child.stdout.take().unwrap())
            .read_line(&mut line)
            .await
            .unwrap();
        assert_eq!(line.trim(), "ready");
        child
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_sends_sigterm() {
        let launcher = SystemLauncher::new(Duration::from_secs(10));
        let mut child = spawn_ready("echo ready; exec sleep 30").await;

        let started = std::time::Instant::now();
        let status = launcher.stop(&mut child).await.unwrap();
        assert_eq!(exit_code(status), 128 + 15);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_kills_after_grace_period() {
        let launcher = SystemLauncher::new(Duration::from_millis(200));
        let mut child = spawn_ready("trap '' TERM; echo ready; sleep 30").await;

        let started = std::time::Instant::now();
        let status = launcher.stop(&mut child).await.unwrap();
        assert_eq!(exit_code(status), 128 + 9);
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_system_launcher_missing_program() {
        let launcher = SystemLauncher::default();
        let plan = LaunchPlan {
            program: PathBuf::from("/nonexistent/wasmedge"),
            args: vec![],
            work_dir: PathBuf::from("."),
        };
        assert!(matches!(
            launcher.launch(&plan).await,
            Err(RunnerError::Launch { .. })
        ));
    }
}
