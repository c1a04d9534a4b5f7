use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GatewayApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("The gateway did not respond in time. {0}")]
    Timeout(String),
    #[error("Could not reach the gateway. {0}")]
    Transport(String),
    #[error("The gateway is unavailable. Error {status}. {message}")]
    Unavailable { status: u16, message: String },
    #[error("The gateway rejected the request. Error {status} ({code}). {description}")]
    Rejected { status: u16, code: String, description: String },
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Invalid gateway identifier: {0}")]
    InvalidIdentifier(String),
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl GatewayApiError {
    /// Translates a non-2xx response into a uniform error.
    ///
    /// The gateway reports failures as `{"error": {"code": "...", "description": "..."}}`. Anything else (proxies,
    /// load balancers, HTML error pages) is kept verbatim in the message.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
        let description = parsed
            .as_ref()
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| body.trim().to_string());
        if status >= 500 || status == 429 {
            return Self::Unavailable { status, message: description };
        }
        let code = parsed.and_then(|e| e.code).unwrap_or_else(|| "UNKNOWN".to_string());
        Self::Rejected { status, code, description }
    }

    pub fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }

    /// Whether the same request could succeed if repeated later. Rejections are final for the given input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_) | Self::Unavailable { .. })
    }

    /// A short, human-readable explanation suitable for storing on a record or returning to an operator.
    pub fn description(&self) -> String {
        match self {
            Self::Rejected { description, .. } => description.clone(),
            Self::Unavailable { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }
}
