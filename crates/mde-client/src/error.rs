use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteApiError {
    /// The request never produced a response (DNS, TLS, connect, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response whose body did not carry a vendor error object.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Well-formed response carrying an `error` object.
    #[error("vendor API error: {message}")]
    Vendor {
        code: Option<String>,
        message: String,
    },

    /// Body was not JSON, or an expected field was missing.
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl RemoteApiError {
    /// `true` for network and HTTP-level failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Http { .. })
    }

    /// `true` for failures reported by the vendor API itself. Malformed
    /// bodies are classed with these.
    pub fn is_vendor(&self) -> bool {
        matches!(self, Self::Vendor { .. } | Self::Malformed(_))
    }

    /// The vendor's `error.code`, when the body carried one.
    pub fn vendor_code(&self) -> Option<&str> {
        match self {
            Self::Vendor { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}
