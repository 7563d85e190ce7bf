pub type CartazResult<T> = Result<T, CartazError>;

#[derive(thiserror::Error, Debug)]
pub enum CartazError {
    #[error("validation error: {0}")]
    Validation(String),

    /// Required event-data fields are absent. Carries the wire names of the
    /// missing fields so callers can surface them verbatim.
    #[error("validation error: missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CartazError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Missing-field list accessor for callers that report partial failures.
    pub fn missing_fields(&self) -> Option<&[String]> {
        match self {
            Self::MissingFields(fields) => Some(fields),
            _ => None,
        }
    }
}
