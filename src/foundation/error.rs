pub type CamflowResult<T> = Result<T, CamflowError>;

/// Engine error taxonomy.
///
/// `Render` is transient: the render loop logs it and keeps going. `DeviceLost` is fatal: the
/// engine stops rendering and every later render request reports it until the engine is rebuilt.
#[derive(thiserror::Error, Debug)]
pub enum CamflowError {
    #[error("initialization error: {0}")]
    Initialization(String),

    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("asset error: {0}")]
    Asset(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("device lost: {0}")]
    DeviceLost(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CamflowError {
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    pub fn invalid_handle(msg: impl Into<String>) -> Self {
        Self::InvalidHandle(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn device_lost(msg: impl Into<String>) -> Self {
        Self::DeviceLost(msg.into())
    }

    /// `true` for errors after which the engine can no longer render.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceLost(_))
    }
}
