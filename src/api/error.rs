use serde::Deserialize;

/// Errors produced at the transport boundary. The poll-error classifier
/// pattern-matches this closed set; nothing downstream inspects HTTP
/// libraries or probes error shapes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A gateway timeout or a network-level failure with no response at all.
    /// Presumed likely to self-resolve if retried.
    #[error("transient transport failure: {detail}")]
    TransientTransport { detail: String },
    /// Any other non-2xx response, or a 2xx envelope with `success == false`.
    #[error("request failed with status {status}: {message}")]
    RequestFailure { status: u16, message: String },
    /// The body of an otherwise healthy response failed to parse.
    #[error("failed to decode response body: {detail}")]
    Decode { detail: String },
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::TransientTransport { .. })
    }
}

pub(crate) fn from_ureq(err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::Status(504, response) => ApiError::TransientTransport {
            detail: format!("504 {}", response.status_text()),
        },
        ureq::Error::Status(status, response) => {
            let status_text = response.status_text().to_string();
            let body = response.into_string().unwrap_or_default();
            let message = if body.trim().is_empty() {
                status_text
            } else {
                body
            };
            ApiError::RequestFailure { status, message }
        }
        ureq::Error::Transport(transport) => ApiError::TransientTransport {
            detail: transport.to_string(),
        },
    }
}

/// Standard response wrapper used by every endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    /// Unwraps the payload of a 2xx response, turning a server-side
    /// rejection (`success == false`) into a non-retryable failure.
    pub fn into_data(self, context: &str) -> Result<T, ApiError> {
        if !self.success {
            return Err(ApiError::RequestFailure {
                status: 200,
                message: self
                    .error
                    .unwrap_or_else(|| format!("{context} reported failure without detail")),
            });
        }
        self.data.ok_or_else(|| ApiError::Decode {
            detail: format!("{context} returned a successful envelope without data"),
        })
    }

    /// For endpoints whose payload carries no information beyond success.
    pub fn into_ack(self, context: &str) -> Result<(), ApiError> {
        if !self.success {
            return Err(ApiError::RequestFailure {
                status: 200,
                message: self
                    .error
                    .unwrap_or_else(|| format!("{context} reported failure without detail")),
            });
        }
        Ok(())
    }
}
