use http::StatusCode;
use thiserror::Error;

/// Raised when a content type has no registered decoder or encoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Content type {content_type} is not supported by this framework.\n\n\
     Please implement input_fn to deserialize the request data or an output_fn to\n\
     serialize the response."
)]
pub struct UnsupportedFormatError {
    pub content_type: String,
}

impl UnsupportedFormatError {
    pub fn new(content_type: impl Into<String>) -> Self {
        UnsupportedFormatError {
            content_type: content_type.into(),
        }
    }
}

/// A failure that already knows how it should be reported to the client.
///
/// Handler code returns this (or converts its own error types into it) to pick the
/// response status and phrase instead of the generic internal server error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ToolkitError {
    pub status: StatusCode,
    pub message: String,
    pub phrase: String,
}

impl ToolkitError {
    pub fn new(status: StatusCode, message: impl Into<String>, phrase: impl Into<String>) -> Self {
        ToolkitError {
            status,
            message: message.into(),
            phrase: phrase.into(),
        }
    }

    /// Catch-all wrapper for failures that are not expressed as a `ToolkitError`.
    ///
    /// The message defaults to "Invalid Request" and the phrase to the message.
    pub fn generic(status: StatusCode, message: Option<String>, phrase: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Invalid Request".to_string());
        let phrase = phrase
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| message.clone());
        ToolkitError {
            status,
            message,
            phrase,
        }
    }
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormatError),

    #[error(transparent)]
    Toolkit(#[from] ToolkitError),

    /// A default handler capability was invoked without being overridden.
    #[error("{0}")]
    NotImplemented(String),

    /// The user module or a registered handler is set up incorrectly.
    #[error("{0}")]
    Config(String),

    #[error("{name} takes {declared} arguments but {given} were given.")]
    Arity {
        name: String,
        declared: usize,
        given: usize,
    },

    /// A value that cannot be converted by an encoder.
    #[error("{0}")]
    Type(String),

    /// A payload that does not parse in its declared format.
    #[error("{0}")]
    Codec(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InferenceError {
    pub fn codec(message: impl Into<String>) -> Self {
        InferenceError::Codec(message.into())
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        InferenceError::Type(message.into())
    }

    /// Typed toolkit failure carried by this error, if any.
    ///
    /// Handler code that propagates a `ToolkitError` through `anyhow` keeps its status.
    pub fn as_toolkit(&self) -> Option<&ToolkitError> {
        match self {
            InferenceError::Toolkit(err) => Some(err),
            InferenceError::Other(err) => err.downcast_ref::<ToolkitError>(),
            _ => None,
        }
    }
}

impl From<std::string::FromUtf8Error> for InferenceError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        InferenceError::Codec(format!("Payload is not valid UTF-8: {err}"))
    }
}

impl From<std::io::Error> for InferenceError {
    fn from(err: std::io::Error) -> Self {
        InferenceError::Other(err.into())
    }
}

pub type HandlerResult<T, E = InferenceError> = Result<T, E>;

#[macro_export]
macro_rules! bail_toolkit {
    ($status:expr, $message:expr) => {{
        let message: String = $message.into();
        return Err($crate::error::ToolkitError::new($status, message.clone(), message).into());
    }};
    ($status:expr, $fmt:expr $(, $arg:expr)+) => {{
        let message = format!($fmt $(, $arg)+);
        return Err($crate::error::ToolkitError::new($status, message.clone(), message).into());
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_error_defaults() {
        let err = ToolkitError::generic(StatusCode::BAD_REQUEST, None, None);
        assert_eq!(err.message, "Invalid Request");
        assert_eq!(err.phrase, "Invalid Request");

        let err = ToolkitError::generic(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some("model exploded".into()),
            None,
        );
        assert_eq!(err.phrase, "model exploded");
    }

    #[test]
    fn unsupported_format_names_content_type() {
        let err = UnsupportedFormatError::new("application/x-foo");
        assert!(err.to_string().contains("application/x-foo"));
    }

    #[test]
    fn toolkit_error_survives_anyhow() {
        let err: InferenceError =
            anyhow::Error::new(ToolkitError::new(StatusCode::FORBIDDEN, "nope", "Nope")).into();
        assert_eq!(err.as_toolkit().map(|e| e.status), Some(StatusCode::FORBIDDEN));
    }

    #[test]
    fn arity_message_names_function() {
        let err = InferenceError::Arity {
            name: "predict_fn".into(),
            declared: 4,
            given: 2,
        };
        assert_eq!(err.to_string(), "predict_fn takes 4 arguments but 2 were given.");
    }
}
