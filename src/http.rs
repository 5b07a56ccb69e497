//! Shared HTTP client setup

use crate::error::{RunnerError, RunnerResult};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

pub const USER_AGENT: &str = concat!("run-llm/", env!("CARGO_PKG_VERSION"));

/// Build the client used for every request
///
/// Only the connect phase has a timeout; model downloads run for a long time.
pub fn build_client() -> RunnerResult<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(RunnerError::from)
}

/// Read a bearer token from the first environment variable that is set
pub fn token_from_env(vars: &[&str]) -> Option<String> {
    vars.iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
}

/// Attach a bearer token when one is configured
pub fn with_token(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => req.bearer_auth(token),
        None => req,
    }
}

/// Send a request and turn any non-2xx status into an error
pub async fn send_checked(req: RequestBuilder, url: &str) -> RunnerResult<Response> {
    let resp = req.send().await?;
    if !resp.status().is_success() {
        return Err(RunnerError::http_status(url, resp.status()));
    }
    Ok(resp)
}
