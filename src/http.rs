use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

const BODY_EXCERPT_CHARS: usize = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub attempts: usize,
    pub retry_delay: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HttpFailure {
    #[error("request failed: HTTP status {status}{}", body_suffix(.body))]
    Status { status: u16, body: String },
    #[error("request failed after {attempts} attempt(s): HTTP status {status}{}", body_suffix(.body))]
    StatusExhausted {
        attempts: usize,
        status: u16,
        body: String,
    },
    #[error("request failed after {attempts} attempt(s): transport error: {detail}")]
    Transport { attempts: usize, detail: String },
    #[error("request failed: response decode failed: {0}")]
    Decode(String),
}

impl HttpFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::StatusExhausted { status, .. } => Some(*status),
            Self::Transport { .. } | Self::Decode(_) => None,
        }
    }
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" ({body})")
    }
}

fn is_transient(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

/// POSTs a JSON document and returns the response body.
///
/// 408, 429, 5xx and transport errors are retried up to `policy.attempts`
/// times; every other status is returned immediately.
pub fn post_json_with_retries(
    url: &str,
    body: &str,
    policy: &RequestPolicy,
) -> Result<String, HttpFailure> {
    let attempts = policy.attempts.max(1);
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(policy.connect_timeout)
        .timeout_read(policy.read_timeout)
        .timeout_write(policy.read_timeout)
        .build();

    let mut attempt = 1;
    loop {
        let sent = agent
            .post(url)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
            .send_string(body);

        let failure = match sent {
            Ok(response) => {
                return response
                    .into_string()
                    .map_err(|err| HttpFailure::Decode(err.to_string()));
            }
            Err(ureq::Error::Status(status, response)) => {
                let raw = response.into_string().unwrap_or_default();
                let body: String = raw.trim().chars().take(BODY_EXCERPT_CHARS).collect();
                if !is_transient(status) {
                    return Err(HttpFailure::Status { status, body });
                }
                HttpFailure::StatusExhausted {
                    attempts,
                    status,
                    body,
                }
            }
            Err(ureq::Error::Transport(err)) => HttpFailure::Transport {
                attempts,
                detail: err.to_string(),
            },
        };

        if attempt >= attempts {
            return Err(failure);
        }
        debug!(url, attempt, status = ?failure.status(), "transient request failure; retrying");
        attempt += 1;
        thread::sleep(policy.retry_delay);
    }
}
