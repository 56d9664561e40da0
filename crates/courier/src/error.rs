use courier_registry::RegistryError;
use thiserror::Error;

/// Why a notification, or a whole batch, could not be delivered.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// A setup problem that will not resolve itself; never queued for resend
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The liveness probe failed before any call was made
    #[error("registry {registry} is unreachable")]
    Unreachable { registry: String },

    /// The registry call itself failed
    #[error("delivery to {registry} failed")]
    Delivery {
        registry: String,
        #[source]
        source: RegistryError,
    },

    /// The history of one build could not be read
    #[error("failed to read pending entries of build #{build}")]
    Aggregation {
        build: u64,
        #[source]
        source: anyhow::Error,
    },

    /// Local persistence failed
    #[error("{context}")]
    Storage {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl NotifyError {
    pub fn storage(context: impl Into<String>, source: anyhow::Error) -> Self {
        NotifyError::Storage {
            context: context.into(),
            source,
        }
    }

    /// Whether a later resend can be expected to succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NotifyError::Unreachable { .. }
                | NotifyError::Delivery { .. }
                | NotifyError::Storage { .. }
        )
    }
}
