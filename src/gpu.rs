//! GPU detection
//!
//! Detects CUDA GPUs via nvidia-smi. The result only decides how many model
//! layers are offloaded by default; WasmEdge's ggml plugin picks the device
//! itself.

use std::process::Command;
use std::sync::OnceLock;

/// Cached GPU information detected at startup
static GPU_INFO: OnceLock<GpuInfo> = OnceLock::new();

/// Layers offloaded when an accelerator is present ("all of them" for any
/// model the apps can load)
pub const FULL_OFFLOAD_LAYERS: u32 = 100;

/// Information about available accelerators
#[derive(Debug, Clone, Default)]
pub struct GpuInfo {
    /// CUDA device indices reported by nvidia-smi
    pub indices: Vec<u32>,
    /// Apple Silicon, where ggml uses Metal
    pub metal: bool,
}

impl GpuInfo {
    pub fn has_accelerator(&self) -> bool {
        self.metal || !self.indices.is_empty()
    }

    /// Default value for `--n-gpu-layers`
    pub fn default_gpu_layers(&self) -> u32 {
        if self.has_accelerator() {
            FULL_OFFLOAD_LAYERS
        } else {
            0
        }
    }
}

/// Parse `nvidia-smi --query-gpu=index --format=csv,noheader` output
pub fn parse_indices(stdout: &str) -> Vec<u32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

/// Detect available GPUs using nvidia-smi
pub fn detect_gpus() -> GpuInfo {
    let metal = cfg!(all(target_os = "macos", target_arch = "aarch64"));

    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=index", "--format=csv,noheader"])
        .output();

    let indices = match output {
        Ok(output) if output.status.success() => {
            parse_indices(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(stderr = %stderr, "nvidia-smi failed, assuming no CUDA GPUs");
            Vec::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "nvidia-smi not available, assuming no CUDA GPUs");
            Vec::new()
        }
    };

    tracing::info!(
        gpu_count = indices.len(),
        indices = ?indices,
        metal = metal,
        "Detected accelerators"
    );

    GpuInfo { indices, metal }
}

/// Get cached GPU info, or detect if not initialized
pub fn get_or_init() -> &'static GpuInfo {
    GPU_INFO.get_or_init(detect_gpus)
}
