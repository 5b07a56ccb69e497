//! WasmEdge runtime installation

use crate::error::{RunnerError, RunnerResult};
use crate::http::send_checked;
use crate::prereq;
use async_trait::async_trait;
use reqwest::Client;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// A usable WasmEdge installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub binary: PathBuf,
    pub version: Option<String>,
    pub plugin_installed: bool,
}

/// Finds or installs the runtime that runs the LlamaEdge apps
#[async_trait]
pub trait RuntimeProvisioner: Send + Sync {
    /// Look for an existing installation
    async fn locate(&self) -> Option<RuntimeInfo>;

    /// Install (or reinstall) the runtime and its ggml plugin
    async fn install(&self) -> RunnerResult<RuntimeInfo>;
}

/// Default install location, `~/.wasmedge`
pub fn default_install_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WASMEDGE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|h| h.join(".wasmedge"))
        .unwrap_or_else(|| PathBuf::from(".wasmedge"))
}

/// Parse `wasmedge --version` output ("wasmedge version 0.13.5")
pub fn parse_version(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .next()?
        .split_whitespace()
        .last()
        .filter(|v| v.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Directories that may hold the WASI-NN plugin for `binary`
///
/// Covers the install dir and the prefix the binary lives in, so a system
/// install such as `/usr/local/bin/wasmedge` finds `/usr/local/lib/wasmedge`.
pub fn plugin_dirs(install_dir: &Path, binary: &Path) -> Vec<PathBuf> {
    let mut prefixes = vec![install_dir.to_path_buf()];
    if let Some(prefix) = binary.parent().and_then(Path::parent)
        && !prefixes.iter().any(|p| p == prefix)
    {
        prefixes.push(prefix.to_path_buf());
    }

    prefixes
        .iter()
        .flat_map(|prefix| {
            [
                prefix.join("plugin"),
                prefix.join("lib").join("wasmedge"),
                prefix.join("lib64").join("wasmedge"),
            ]
        })
        .collect()
}

/// Whether the WASI-NN ggml plugin library exists in any of `dirs`
pub fn plugin_installed(dirs: &[PathBuf]) -> bool {
    let names = [
        "libwasmedgePluginWasiNN.so",
        "libwasmedgePluginWasiNN.dylib",
    ];
    dirs.iter()
        .any(|dir| names.iter().any(|name| dir.join(name).is_file()))
}

/// Installs WasmEdge with the official installer script
pub struct WasmEdgeInstaller {
    client: Client,
    installer_url: String,
    version: String,
    plugin: String,
    install_dir: PathBuf,
}

impl WasmEdgeInstaller {
    pub fn new(
        client: Client,
        installer_url: impl Into<String>,
        version: impl Into<String>,
        plugin: impl Into<String>,
        install_dir: PathBuf,
    ) -> Self {
        Self {
            client,
            installer_url: installer_url.into(),
            version: version.into(),
            plugin: plugin.into(),
            install_dir,
        }
    }

    fn find_binary(&self) -> Option<PathBuf> {
        let bundled = self.install_dir.join("bin").join("wasmedge");
        if bundled.is_file() {
            return Some(bundled);
        }
        prereq::which("wasmedge")
    }

    async fn query_version(binary: &Path) -> Option<String> {
        let output = Command::new(binary).arg("--version").output().await.ok()?;
        if !output.status.success() {
            return None;
        }
        parse_version(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl RuntimeProvisioner for WasmEdgeInstaller {
    async fn locate(&self) -> Option<RuntimeInfo> {
        let binary = self.find_binary()?;
        let version = Self::query_version(&binary).await;
        let plugin_installed = plugin_installed(&plugin_dirs(&self.install_dir, &binary));

        tracing::info!(
            binary = ?binary,
            version = ?version,
            plugin_installed = plugin_installed,
            "Found WasmEdge"
        );

        Some(RuntimeInfo {
            binary,
            version,
            plugin_installed,
        })
    }

    async fn install(&self) -> RunnerResult<RuntimeInfo> {
        tracing::info!(
            version = %self.version,
            plugin = %self.plugin,
            install_dir = ?self.install_dir,
            "Installing WasmEdge"
        );

        let req = self.client.get(&self.installer_url);
        let script = send_checked(req, &self.installer_url).await?.text().await?;

        let mut script_file = tempfile::Builder::new()
            .prefix("wasmedge-install")
            .suffix(".sh")
            .tempfile()?;
        script_file.write_all(script.as_bytes())?;
        script_file.flush()?;

        let status = Command::new("bash")
            .arg(script_file.path())
            .arg("-v")
            .arg(&self.version)
            .arg("--plugins")
            .arg(&self.plugin)
            .arg("-p")
            .arg(&self.install_dir)
            .status()
            .await
            .map_err(|e| RunnerError::Install(format!("cannot run installer: {}", e)))?;

        if !status.success() {
            return Err(RunnerError::Install(format!(
                "installer exited with {}",
                status
            )));
        }

        self.locate().await.ok_or_else(|| {
            RunnerError::Install(format!(
                "wasmedge not found in {:?} after installation",
                self.install_dir
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("wasmedge version 0.13.5\n"),
            Some("0.13.5".to_string())
        );
        assert_eq!(parse_version("wasmedge version\n"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn test_plugin_detection() {
        let dir = TempDir::new().unwrap();
        let dirs = plugin_dirs(dir.path(), &dir.path().join("bin/wasmedge"));
        assert!(!plugin_installed(&dirs));

        std::fs::create_dir_all(dir.path().join("plugin")).unwrap();
        std::fs::write(dir.path().join("plugin/libwasmedgePluginWasiNN.so"), b"").unwrap();
        assert!(plugin_installed(&dirs));
    }

    #[test]
    fn test_plugin_found_next_to_system_binary() {
        let install_dir = TempDir::new().unwrap();
        let prefix = TempDir::new().unwrap();
        let binary = prefix.path().join("bin/wasmedge");

        let plugin_dir = prefix.path().join("lib/wasmedge");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("libwasmedgePluginWasiNN.so"), b"").unwrap();

        assert!(!plugin_installed(&plugin_dirs(
            install_dir.path(),
            &install_dir.path().join("bin/wasmedge")
        )));
        assert!(plugin_installed(&plugin_dirs(install_dir.path(), &binary)));
    }

    #[test]
    fn test_plugin_dirs_not_duplicated() {
        let dirs = plugin_dirs(Path::new("/home/u/.wasmedge"), Path::new("/home/u/.wasmedge/bin/wasmedge"));
        assert_eq!(dirs.len(), 3);
        assert!(dirs.contains(&PathBuf::from("/home/u/.wasmedge/lib/wasmedge")));
    }

    #[tokio::test]
    async fn test_locate_bundled_binary() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin/wasmedge"), b"").unwrap();

        let installer = WasmEdgeInstaller::new(
            Client::new(),
            "http://127.0.0.1:9/install.sh",
            "0.13.5",
            "wasi_nn-ggml",
            dir.path().to_path_buf(),
        );

        let info = installer.locate().await.unwrap();
        assert_eq!(info.binary, dir.path().join("bin/wasmedge"));
        // The placeholder file cannot be executed
        assert_eq!(info.version, None);
        assert!(!info.plugin_installed);
    }

    #[tokio::test]
    async fn test_install_fails_when_script_unreachable() {
        let dir = TempDir::new().unwrap();
        let installer = WasmEdgeInstaller::new(
            Client::new(),
            "http://127.0.0.1:9/install.sh",
            "0.13.5",
            "wasi_nn-ggml",
            dir.path().to_path_buf(),
        );
        assert!(installer.install().await.is_err());
    }
}
