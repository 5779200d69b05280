//! HTTP transport with bounded retry.

use anyhow::{anyhow, Result};
use reqwest::blocking::multipart::Form;
use reqwest::blocking::{Client, Response};
use std::time::Duration;

use crate::color_utils::{colors, symbols};

/// Total attempts per request before the failure becomes terminal.
pub const MAX_ATTEMPTS: u32 = 5;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A blocking HTTP client that retries network-level failures.
///
/// Only failures to obtain a response at all (connect errors, resets,
/// timeouts) are retried; a response with any HTTP status ends the retry
/// loop and is handed back to the caller. There is no delay between
/// attempts.
pub struct Transport {
    client: Client,
    max_attempts: u32,
}

impl Transport {
    pub fn new() -> Result<Self> {
        Self::with_max_attempts(MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(max_attempts: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            max_attempts,
        })
    }

    /// POST a multipart body to `url`, retrying network-level failures.
    ///
    /// `build_form` is invoked once per attempt: multipart bodies are
    /// consumed by the request and cannot be reused.
    pub fn post_multipart<F>(&self, url: &str, build_form: F) -> Result<Response>
    where
        F: Fn() -> Result<Form>,
    {
        let mut last_error: Option<reqwest::Error> = None;

        for attempt in 1..=self.max_attempts {
            let form = build_form()?;
            match self.client.post(url).multipart(form).send() {
                Ok(response) => {
                    log::debug!(
                        "📡 {url}: HTTP {} (attempt {attempt}/{})",
                        response.status(),
                        self.max_attempts
                    );
                    return Ok(response);
                }
                Err(e) => {
                    log::warn!(
                        "{} Attempt {attempt}/{} failed for {url}: {}",
                        symbols::warning(),
                        self.max_attempts,
                        colors::error_level(&e.to_string())
                    );
                    last_error = Some(e);
                }
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts were made".to_string());
        Err(anyhow!(
            "Retries exhausted after {} attempts for {}: {}",
            self.max_attempts,
            url,
            detail
        ))
    }
}
