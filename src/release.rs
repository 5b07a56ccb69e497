//! GitHub release assets
//!
//! The LlamaEdge apps and the chatbot UI are published as assets of the
//! latest GitHub release of their repositories.

use crate::archive;
use crate::config::RunMode;
use crate::error::{RunnerError, RunnerResult};
use crate::http::{send_checked, token_from_env, with_token};
use crate::models::Downloader;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CHATBOT_UI_ASSET: &str = "chatbot-ui.tar.gz";
pub const CHATBOT_UI_DIR: &str = "chatbot-ui";

/// A published release
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// A downloadable file attached to a release
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl Release {
    /// Find an asset by exact name
    pub fn asset(&self, name: &str) -> RunnerResult<&Asset> {
        self.assets
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| RunnerError::AssetNotFound {
                tag: self.tag_name.clone(),
                asset: name.to_string(),
            })
    }
}

/// Client for the GitHub releases API
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    api: String,
    token: Option<String>,
}

impl GithubClient {
    /// Client authenticated with `GITHUB_TOKEN` when it is set
    pub fn new(client: Client, api: impl Into<String>) -> Self {
        Self::with_bearer(client, api, token_from_env(&["GITHUB_TOKEN", "GH_TOKEN"]))
    }

    pub fn with_bearer(client: Client, api: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            api: api.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Fetch the latest release of `owner/name`
    pub async fn latest_release(&self, repo: &str) -> RunnerResult<Release> {
        let url = format!("{}/repos/{}/releases/latest", self.api, repo);
        let req = with_token(
            self.client
                .get(&url)
                .header(reqwest::header::ACCEPT, "application/vnd.github+json"),
            self.token.as_deref(),
        );
        let release: Release = send_checked(req, &url).await?.json().await?;

        tracing::info!(
            repo = %repo,
            tag = %release.tag_name,
            assets = release.assets.len(),
            "Fetched latest release"
        );
        Ok(release)
    }
}

/// Download the app for `mode` into `work_dir`
///
/// An existing file is kept unless `refresh` is set.
pub async fn fetch_app(
    github: &GithubClient,
    downloader: &Downloader,
    repo: &str,
    mode: RunMode,
    work_dir: &Path,
    refresh: bool,
) -> RunnerResult<PathBuf> {
    let dest = work_dir.join(mode.wasm_file());
    if !refresh && tokio::fs::try_exists(&dest).await? {
        tracing::info!(path = ?dest, "App already present");
        return Ok(dest);
    }

    let release = github.latest_release(repo).await?;
    let asset = release.asset(mode.wasm_file())?;
    downloader
        .download(&asset.browser_download_url, &dest, None)
        .await?;
    Ok(dest)
}

/// Download and unpack the chatbot web UI into `work_dir/chatbot-ui`
pub async fn fetch_chatbot_ui(
    github: &GithubClient,
    downloader: &Downloader,
    repo: &str,
    work_dir: &Path,
    refresh: bool,
) -> RunnerResult<PathBuf> {
    let ui_dir = work_dir.join(CHATBOT_UI_DIR);
    if tokio::fs::try_exists(&ui_dir).await? {
        if !refresh {
            tracing::info!(path = ?ui_dir, "Chatbot UI already present");
            return Ok(ui_dir);
        }
        tokio::fs::remove_dir_all(&ui_dir).await?;
    }

    let release = github.latest_release(repo).await?;
    let asset = release.asset(CHATBOT_UI_ASSET)?;
    let archive_path = work_dir.join(CHATBOT_UI_ASSET);
    downloader
        .download(&asset.browser_download_url, &archive_path, None)
        .await?;

    let unpacked = unpack_staged(&archive_path, work_dir, &ui_dir).await;
    if let Err(e) = tokio::fs::remove_file(&archive_path).await {
        tracing::warn!(path = ?archive_path, error = %e, "Could not remove the UI archive");
    }
    let files = unpacked?;

    tracing::info!(path = ?ui_dir, files = files, "Chatbot UI unpacked");
    Ok(ui_dir)
}

/// Unpack into a staging dir inside `work_dir`, moved to `ui_dir` only once
/// every entry is written
async fn unpack_staged(archive_path: &Path, work_dir: &Path, ui_dir: &Path) -> RunnerResult<usize> {
    let staging = tempfile::Builder::new()
        .prefix(".chatbot-ui-")
        .tempdir_in(work_dir)?;

    let unpack_from = archive_path.to_path_buf();
    let unpack_to = staging.path().to_path_buf();
    let files = tokio::task::spawn_blocking(move || {
        archive::extract_tar_gz(&unpack_from, &unpack_to)
    })
    .await
    .map_err(|e| RunnerError::Io(std::io::Error::other(e)))??;

    tokio::fs::rename(staging.path(), ui_dir).await?;
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release() -> Release {
        serde_json::from_str(
            r#"{
                "tag_name": "0.14.3",
                "name": "LlamaEdge 0.14.3",
                "assets": [
                    {"name": "llama-api-server.wasm", "size": 10240,
                     "browser_download_url": "https://github.com/LlamaEdge/LlamaEdge/releases/download/0.14.3/llama-api-server.wasm"},
                    {"name": "llama-chat.wasm", "size": 8192,
                     "browser_download_url": "https://github.com/LlamaEdge/LlamaEdge/releases/download/0.14.3/llama-chat.wasm"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_select_asset() {
        let release = release();
        let asset = release.asset(RunMode::Chat.wasm_file()).unwrap();
        assert_eq!(asset.size, 8192);
        assert!(asset.browser_download_url.ends_with("/llama-chat.wasm"));
    }

    #[test]
    fn test_missing_asset() {
        let err = release().asset("llama-simple.wasm").unwrap_err();
        assert_eq!(
            err.to_string(),
            "release 0.14.3 has no asset named llama-simple.wasm"
        );
    }

    #[test]
    fn test_release_without_assets() {
        let release: Release = serde_json::from_str(r#"{"tag_name": "v1"}"#).unwrap();
        assert!(release.assets.is_empty());
        assert!(release.asset(CHATBOT_UI_ASSET).is_err());
    }
}
