use thiserror::Error;

/// Failures surfaced by the gateway and the layers above it.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credential exchange with the token endpoint failed.
    #[error("failed to authenticate with the content API: {0}")]
    Auth(String),

    /// A content API call failed: transport error, timeout, non-2xx or an
    /// undecodable body.
    #[error(
        "{operation} failed upstream{}: {message}",
        status.map(|s| format!(" ({s})")).unwrap_or_default()
    )]
    Upstream {
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },

    /// Input rejected before any cache or upstream work.
    #[error("invalid request: {0}")]
    Validation(String),
}

impl GatewayError {
    pub(crate) fn upstream(
        operation: &'static str,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::Upstream {
            operation,
            status,
            message: message.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether retrying the same request could succeed.
    ///
    /// Invalid input never becomes valid, and a 4xx from upstream (other than
    /// 408/429) means the request itself is wrong.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Auth(_) => true,
            Self::Upstream { status: None, .. } => true,
            Self::Upstream {
                status: Some(status),
                ..
            } => *status >= 500 || *status == 408 || *status == 429,
            Self::Validation(_) => false,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
