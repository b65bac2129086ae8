use thiserror::Error;
use tracing::error;

use super::notify::Notifier;

/// Why a handler did not complete.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub(crate) enum CoreError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("media {media_id} is not a trackable anime")]
    LookupMiss { media_id: u64 },
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("settings were never configured")]
    MissingSetup,
}

impl CoreError {
    pub(crate) fn persistence(err: &anyhow::Error) -> Self {
        Self::Persistence(format!("{err:#}"))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::LookupMiss { .. } => "lookup_miss",
            Self::Persistence(_) => "persistence",
            Self::MissingSetup => "missing_setup",
        }
    }
}

/// Logs a handler failure with its method scope and raises a single error toast.
pub(crate) fn report_failure(
    notifier: &dyn Notifier,
    method: &'static str,
    toast: &str,
    err: &anyhow::Error,
) -> CoreError {
    let classified = CoreError::persistence(err);
    error!(method, kind = classified.kind(), error = %format!("{err:#}"), "handler failed");
    notifier.error(toast);
    classified
}
