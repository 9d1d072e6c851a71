use std::fmt::{self, Display};

/// Errors produced while describing a resource.
#[derive(Debug)]
pub enum ModelError {
    /// The resource payload is missing a field required to identify it.
    MissingField(&'static str),
    Serialization(serde_json::Error),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::MissingField(field) => {
                write!(f, "resource is missing required field `{field}`")
            }
            ModelError::Serialization(err) => write!(f, "serialization error: {err}"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Serialization(err) => Some(err),
            ModelError::MissingField(_) => None,
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err)
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
