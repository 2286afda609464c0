pub type LipwaveResult<T> = Result<T, LipwaveError>;

#[derive(thiserror::Error, Debug)]
pub enum LipwaveError {
    #[error("mapping error: {0}")]
    Mapping(String),

    #[error("unknown label: {0}")]
    UnknownLabel(String),

    #[error("empty timeline: {0}")]
    EmptyTimeline(String),

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("external tool error: {0}")]
    External(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LipwaveError {
    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::Mapping(msg.into())
    }

    pub fn unknown_label(msg: impl Into<String>) -> Self {
        Self::UnknownLabel(msg.into())
    }

    pub fn empty_timeline(msg: impl Into<String>) -> Self {
        Self::EmptyTimeline(msg.into())
    }

    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::External(msg.into())
    }
}
