use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

pub type SupervisorResult<T> = Result<T, SupervisorError>;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("executable '{program}' not found")]
    ExecutableMissing { program: String },
    #[error("failed to spawn '{label}': {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot prepare directory {path:?}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl SupervisorError {
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn is_missing_executable(&self) -> bool {
        matches!(self, Self::ExecutableMissing { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{message}")]
    Message { message: String },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ConfigError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_executable_is_detectable() {
        let err = SupervisorError::ExecutableMissing {
            program: "ffmpeg".into(),
        };
        assert!(err.is_missing_executable());
        assert_eq!(err.to_string(), "executable 'ffmpeg' not found");
    }

    #[test]
    fn context_error_keeps_source_message() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::with_context("writing config.toml", io);
        assert_eq!(err.to_string(), "writing config.toml: denied");
        assert!(err.source().is_some());
    }
}
