//! Hugging Face repository listing
//!
//! Lists the GGUF files of a model repository. The JSON tree API is tried
//! first because it carries the LFS SHA-256 of every file; when it is not
//! reachable (mirrors, older endpoints) the HTML tree page is scraped for
//! `blob` links and the sizes displayed next to them.

use crate::error::{RunnerError, RunnerResult};
use crate::http::{send_checked, token_from_env, with_token};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::sync::LazyLock;

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(Bytes|bytes|B|kB|KB|MB|GB|TB)\b").expect("valid size regex")
});

static SHA256_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"SHA256:\s*(?:<[^>]*>\s*)*([0-9a-f]{64})").expect("valid sha256 regex")
});

/// Quantization tags, longest first so `Q4_K_M` wins over `Q4_K`
const QUANTIZATIONS: &[&str] = &[
    "IQ2_XXS", "IQ3_XXS", "IQ2_XS", "IQ3_XS", "IQ4_XS", "IQ4_NL", "Q3_K_S", "Q3_K_M", "Q3_K_L",
    "Q4_K_S", "Q4_K_M", "Q5_K_S", "Q5_K_M", "IQ1_S", "IQ1_M", "IQ2_S", "IQ2_M", "IQ3_S", "IQ3_M",
    "Q2_K", "Q6_K", "Q4_0", "Q4_1", "Q5_0", "Q5_1", "Q8_0", "F16", "F32",
];

/// Quantization preferred when picking the default weights file
pub const PREFERRED_QUANTIZATION: &str = "Q5_K_M";

/// A Hugging Face model repository at a given revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HfRepo {
    pub owner: String,
    pub name: String,
    pub revision: String,
}

impl HfRepo {
    /// Parse `owner/name` or a repository URL
    ///
    /// Accepts `https://huggingface.co/owner/name` optionally followed by
    /// `/tree/<rev>`, `/blob/<rev>/...` or `/resolve/<rev>/...`.
    pub fn parse(input: &str) -> RunnerResult<Self> {
        let invalid = || RunnerError::InvalidInput(format!("not a Hugging Face repository: {input:?}"));

        let trimmed = input.trim();
        let path = match trimmed.split_once("://") {
            Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
            None => trimmed
                .strip_prefix("huggingface.co/")
                .or_else(|| trimmed.strip_prefix("hf.co/"))
                .unwrap_or(trimmed),
        };
        let path = path.split(['?', '#']).next().unwrap_or("");

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 2 {
            return Err(invalid());
        }

        let owner = segments[0];
        let name = segments[1].trim_end_matches(".git");
        let valid = |s: &str| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(owner) || !valid(name) {
            return Err(invalid());
        }

        let revision = match segments.get(2) {
            Some(&("tree" | "blob" | "resolve")) => segments.get(3).copied().ok_or_else(invalid)?,
            Some(_) => return Err(invalid()),
            None => "main",
        };

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            revision: revision.to_string(),
        })
    }

    /// `owner/name`
    pub fn id(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for HfRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.revision)
    }
}

/// A GGUF file offered by a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFile {
    /// Path inside the repository
    pub name: String,
    pub size_bytes: Option<u64>,
    /// Lowercase hex SHA-256, when the listing provides it
    pub sha256: Option<String>,
}

impl ModelFile {
    /// File name without any repository subdirectory
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn quantization(&self) -> Option<&'static str> {
        let upper = self.name.to_uppercase();
        QUANTIZATIONS.iter().copied().find(|q| upper.contains(q))
    }

    /// Menu line: name and size
    pub fn label(&self) -> String {
        match self.size_bytes {
            Some(size) => format!("{} ({})", self.name, format_size(size)),
            None => self.name.clone(),
        }
    }
}

/// Index of the file to offer as the default choice
pub fn default_choice(files: &[ModelFile]) -> usize {
    files
        .iter()
        .position(|f| f.quantization() == Some(PREFERRED_QUANTIZATION))
        .unwrap_or(0)
}

/// Format a byte count with decimal units, the way the Hub displays it
pub fn format_size(bytes: u64) -> String {
    const UNITS: [(&str, f64); 4] = [("TB", 1e12), ("GB", 1e9), ("MB", 1e6), ("kB", 1e3)];
    let value = bytes as f64;
    for (unit, scale) in UNITS {
        if value >= scale {
            return format!("{:.2} {}", value / scale, unit);
        }
    }
    format!("{} Bytes", bytes)
}

/// Parse a displayed size such as `4.78 GB` or `745 Bytes`
pub fn parse_size(text: &str) -> Option<u64> {
    let caps = SIZE_RE.captures(text)?;
    let value: f64 = caps[1].parse().ok()?;
    let scale = match &caps[2] {
        "Bytes" | "bytes" | "B" => 1.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some((value * scale).round() as u64)
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    lfs: Option<LfsInfo>,
}

#[derive(Debug, Deserialize)]
struct LfsInfo {
    oid: String,
    size: u64,
}

fn is_gguf(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".gguf")
}

/// Extract GGUF files from a JSON tree API response
pub fn parse_tree_json(body: &str) -> RunnerResult<Vec<ModelFile>> {
    let entries: Vec<TreeEntry> = serde_json::from_str(body)?;
    Ok(entries
        .into_iter()
        .filter(|e| e.kind == "file" && is_gguf(&e.path))
        .map(|e| {
            let (size_bytes, sha256) = match e.lfs {
                Some(lfs) => (Some(lfs.size), Some(lfs.oid.to_lowercase())),
                None => (e.size, None),
            };
            ModelFile {
                name: e.path,
                size_bytes,
                sha256,
            }
        })
        .collect())
}

/// Extract GGUF files from an HTML tree page
pub fn parse_tree_html(html: &str, repo: &HfRepo) -> Vec<ModelFile> {
    let link_re = match Regex::new(&format!(
        r#"href="/{}/blob/{}/([^"?#]+\.(?i:gguf))(?:[?#][^"]*)?""#,
        regex::escape(&repo.id()),
        regex::escape(&repo.revision)
    )) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(error = %e, repo = %repo, "Cannot build listing pattern");
            return Vec::new();
        }
    };

    let links: Vec<(String, usize, usize)> = link_re
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = urlencoding::decode(&caps[1])
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| caps[1].to_string());
            Some((name, whole.start(), whole.end()))
        })
        .collect();

    let mut files: Vec<ModelFile> = Vec::new();
    for (i, (name, _, end)) in links.iter().enumerate() {
        let window_end = links.get(i + 1).map(|(_, start, _)| *start).unwrap_or(html.len());
        let size_bytes = parse_size(&html[*end..window_end]);

        match files.iter_mut().find(|f| &f.name == name) {
            Some(existing) => {
                if existing.size_bytes.is_none() {
                    existing.size_bytes = size_bytes;
                }
            }
            None => files.push(ModelFile {
                name: name.clone(),
                size_bytes,
                sha256: None,
            }),
        }
    }
    files
}

/// Extract the SHA-256 shown on a file's blob page
pub fn parse_blob_sha256(html: &str) -> Option<String> {
    SHA256_RE.captures(html).map(|caps| caps[1].to_string())
}

/// Client for the Hugging Face Hub
#[derive(Clone)]
pub struct HubClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HubClient {
    /// Client authenticated with `HF_TOKEN` when it is set
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self::with_bearer(
            client,
            endpoint,
            token_from_env(&["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"]),
        )
    }

    pub fn with_bearer(client: Client, endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get_text(&self, url: &str) -> RunnerResult<String> {
        let req = with_token(self.client.get(url), self.token.as_deref());
        Ok(send_checked(req, url).await?.text().await?)
    }

    /// List the GGUF files of a repository
    pub async fn list_gguf_files(&self, repo: &HfRepo) -> RunnerResult<Vec<ModelFile>> {
        let files = match self.list_via_api(repo).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(
                    repo = %repo,
                    error = %e,
                    "Tree API unavailable, falling back to the HTML listing"
                );
                self.list_via_html(repo).await?
            }
        };

        if files.is_empty() {
            return Err(RunnerError::NoModelFiles(repo.to_string()));
        }

        tracing::info!(repo = %repo, count = files.len(), "Found GGUF files");
        Ok(files)
    }

    async fn list_via_api(&self, repo: &HfRepo) -> RunnerResult<Vec<ModelFile>> {
        let url = format!(
            "{}/api/models/{}/tree/{}",
            self.endpoint,
            repo.id(),
            urlencoding::encode(&repo.revision)
        );
        tracing::debug!(url = %url, "Listing repository via tree API");
        parse_tree_json(&self.get_text(&url).await?)
    }

    async fn list_via_html(&self, repo: &HfRepo) -> RunnerResult<Vec<ModelFile>> {
        let url = format!("{}/{}/tree/{}", self.endpoint, repo.id(), repo.revision);
        tracing::debug!(url = %url, "Listing repository via HTML page");
        Ok(parse_tree_html(&self.get_text(&url).await?, repo))
    }

    /// Look up the SHA-256 of a file on its blob page
    pub async fn fetch_checksum(&self, repo: &HfRepo, file: &str) -> RunnerResult<Option<String>> {
        let url = format!(
            "{}/{}/blob/{}/{}",
            self.endpoint,
            repo.id(),
            repo.revision,
            encode_path(file)
        );
        let html = self.get_text(&url).await?;
        Ok(parse_blob_sha256(&html))
    }

    /// Direct download URL of a file
    pub fn resolve_url(&self, repo: &HfRepo, file: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.endpoint,
            repo.id(),
            urlencoding::encode(&repo.revision),
            encode_path(file)
        )
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Percent-encode each segment of a repository path
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
