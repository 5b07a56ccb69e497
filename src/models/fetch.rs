//! Fetching verified weights into the work directory

use super::checksum;
use super::download::Downloader;
use super::hub::{HfRepo, HubClient, ModelFile};
use crate::error::{RunnerError, RunnerResult};
use std::path::{Path, PathBuf};

/// Whether the weights were downloaded or already present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded,
    AlreadyPresent,
}

/// Make sure `file` from `repo` is in `work_dir` and matches its checksum
///
/// The expected digest comes from the listing or, failing that, the blob
/// page. Without any published digest the downloaded bytes are trusted and
/// their digest recorded so later runs can skip the download.
pub async fn ensure_model(
    hub: &HubClient,
    downloader: &Downloader,
    repo: &HfRepo,
    file: &ModelFile,
    work_dir: &Path,
) -> RunnerResult<(PathBuf, FetchOutcome)> {
    let dest = work_dir.join(file.file_name());

    let expected = match &file.sha256 {
        Some(sha) => Some(sha.clone()),
        None => hub.fetch_checksum(repo, &file.name).await.unwrap_or_else(|e| {
            tracing::warn!(file = %file.name, error = %e, "Could not look up published checksum");
            None
        }),
    };

    if is_present(&dest, expected.as_deref()).await? {
        tracing::info!(path = ?dest, "Weights already present and verified");
        return Ok((dest, FetchOutcome::AlreadyPresent));
    }

    let url = hub.resolve_url(repo, &file.name);
    let downloaded = downloader.download(&url, &dest, hub.token()).await?;

    if let Some(expected) = expected
        && expected != downloaded.sha256
    {
        tokio::fs::remove_file(&dest).await?;
        return Err(RunnerError::ChecksumMismatch {
            path: dest,
            expected,
            actual: downloaded.sha256,
        });
    }

    checksum::write_record(&dest, &downloaded.sha256).await?;
    Ok((dest, FetchOutcome::Downloaded))
}

/// Check an existing file against its record and the expected digest
async fn is_present(dest: &Path, expected: Option<&str>) -> RunnerResult<bool> {
    if !tokio::fs::try_exists(dest).await? {
        return Ok(false);
    }

    let recorded = checksum::read_record(dest).await;
    match (recorded.as_deref(), expected) {
        (Some(recorded), Some(expected)) if recorded == expected => return Ok(true),
        (Some(recorded), None) => {
            // Trust the record only if it still describes the file
            let actual = checksum::sha256_file(dest).await?;
            return Ok(actual == recorded);
        }
        _ => {}
    }

    if let Some(expected) = expected {
        tracing::info!(path = ?dest, "Verifying existing weights");
        let actual = checksum::sha256_file(dest).await?;
        if actual == expected {
            checksum::write_record(dest, &actual).await?;
            return Ok(true);
        }
        tracing::warn!(path = ?dest, expected = %expected, actual = %actual, "Existing weights do not match, downloading again");
    }

    tokio::fs::remove_file(dest).await?;
    Ok(false)
}
