//! Streaming downloads with resume and progress reporting
//!
//! Files are written to `<dest>.part` first and renamed once complete. A
//! leftover `.part` from an interrupted run is resumed with an HTTP `Range`
//! request; servers that ignore the range answer 200 and the file is
//! fetched from scratch.

use super::checksum::{hash_file_into, hex_digest};
use crate::error::{RunnerError, RunnerResult};
use crate::http::with_token;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode, header};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Result of a completed download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

/// Path of the in-progress file for `dest`
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// HTTP downloader shared by the model, app and UI steps
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    show_progress: bool,
}

impl Downloader {
    pub fn new(client: Client, show_progress: bool) -> Self {
        Self {
            client,
            show_progress,
        }
    }

    fn progress_bar(&self, total: Option<u64>, label: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = match total {
            Some(total) => {
                let pb = ProgressBar::new(total);
                pb.set_style(
                    ProgressStyle::with_template(
                        "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::with_template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb
            }
        };
        pb.set_message(label.to_string());
        pb
    }

    /// Download `url` to `dest`, returning its size and SHA-256
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        token: Option<&str>,
    ) -> RunnerResult<Downloaded> {
        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part = part_path(dest);
        let mut resume_from = match tokio::fs::metadata(&part).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => 0,
        };

        let response = loop {
            let mut req = with_token(self.client.get(url), token);
            if resume_from > 0 {
                req = req.header(header::RANGE, format!("bytes={}-", resume_from));
            }

            let resp = req.send().await?;
            match resp.status() {
                StatusCode::PARTIAL_CONTENT if resume_from > 0 => break resp,
                StatusCode::RANGE_NOT_SATISFIABLE if resume_from > 0 => {
                    tracing::warn!(path = ?part, "Partial file does not match the remote, restarting");
                    tokio::fs::remove_file(&part).await?;
                    resume_from = 0;
                }
                status if status.is_success() => {
                    resume_from = 0;
                    break resp;
                }
                status => return Err(RunnerError::http_status(url, status)),
            }
        };

        // The digest has to cover bytes already on disk
        let mut hasher = Sha256::new();
        let mut file = if resume_from > 0 {
            tracing::info!(url = %url, offset = resume_from, "Resuming download");
            hash_file_into(&mut hasher, &part).await?;
            tokio::fs::OpenOptions::new().append(true).open(&part).await?
        } else {
            tracing::info!(url = %url, dest = ?dest, "Starting download");
            tokio::fs::File::create(&part).await?
        };

        let total = response.content_length().map(|len| len + resume_from);
        let label = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pb = self.progress_bar(total, &label);
        pb.set_position(resume_from);

        let mut downloaded = resume_from;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        file.flush().await?;
        drop(file);
        pb.finish_and_clear();

        if let Some(total) = total
            && downloaded != total
        {
            return Err(RunnerError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("download of {} stopped at {} of {} bytes", url, downloaded, total),
            )));
        }

        tokio::fs::rename(&part, dest).await?;

        let sha256 = hex_digest(hasher);
        tracing::info!(dest = ?dest, bytes = downloaded, sha256 = %sha256, "Download complete");

        Ok(Downloaded {
            path: dest.to_path_buf(),
            bytes: downloaded,
            sha256,
        })
    }
}
