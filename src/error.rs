pub type FramecastResult<T> = Result<T, FramecastError>;

#[derive(thiserror::Error, Debug)]
pub enum FramecastError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("page never signaled readiness within {timeout_ms}ms")]
    ReadinessTimeout { timeout_ms: u64 },

    #[error("no frames were captured (page never rendered?)")]
    NoFramesCaptured,

    #[error("encode error: {0}")]
    EncodeFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FramecastError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::EncodeFailed(msg.into())
    }
}
