//! Model weights management
//!
//! Provides functionality for:
//! - Listing GGUF files in a Hugging Face repository
//! - Downloading files with resume and progress reporting
//! - Recording and verifying SHA-256 checksums next to the weights

pub mod checksum;
pub mod download;
pub mod fetch;
pub mod hub;

pub use download::{Downloaded, Downloader};
pub use fetch::{FetchOutcome, ensure_model};
pub use hub::{HfRepo, HubClient, ModelFile, default_choice, format_size};
