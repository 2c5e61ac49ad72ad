use std::path::PathBuf;

use thiserror::Error;

/// Broad category of an [`Error`], for callers that want to branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad options or configuration; raised before anything is running.
    Configuration,
    /// A handler directory could not be scanned at all.
    Load,
    /// An event name could not be resolved to something to listen on.
    Binding,
    /// Failure reported by serenity or the Lua runtime.
    Platform,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("\"activities\" must be a non-empty list")]
    InvalidActivities,

    #[error("presence interval must be greater than zero")]
    InvalidInterval,

    #[error("unknown presence status {0:?}")]
    InvalidStatus(String),

    #[error("\"max\" must be a number, got {0:?}")]
    InvalidListenerLimit(String),

    #[error(
        "variable folder is not set; enable the \"variable\" option to create variables"
    )]
    VariableFolderUnset,

    #[error("the variable folder {0:?} does not exist")]
    MissingVariableFolder(PathBuf),

    #[error("invalid variable name {0:?}")]
    InvalidVariableName(String),

    #[error("unknown gateway intent {0:?}")]
    UnknownIntent(String),

    #[error("expected authentication.discord_token to be filled in config")]
    MissingToken,

    #[error("failed to read handler directory {path:?}: {source}")]
    LoadRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event {0:?} not found in the events directory or the gateway's native events")]
    EventNotFound(String),

    #[error("invalid event descriptor {path:?}: {message}")]
    InvalidDescriptor { path: PathBuf, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to load config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to save config: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("discord error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("lua error: {0}")]
    Lua(#[from] mlua::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidActivities
            | Error::InvalidInterval
            | Error::InvalidStatus(_)
            | Error::InvalidListenerLimit(_)
            | Error::VariableFolderUnset
            | Error::MissingVariableFolder(_)
            | Error::InvalidVariableName(_)
            | Error::UnknownIntent(_)
            | Error::MissingToken
            | Error::Io(_)
            | Error::Json(_)
            | Error::Toml(_)
            | Error::TomlSer(_) => ErrorKind::Configuration,
            Error::LoadRoot { .. } => ErrorKind::Load,
            Error::EventNotFound(_) | Error::InvalidDescriptor { .. } => ErrorKind::Binding,
            Error::Discord(_) | Error::Lua(_) => ErrorKind::Platform,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_failure_category() {
        assert_eq!(Error::InvalidActivities.kind(), ErrorKind::Configuration);
        assert_eq!(
            Error::EventNotFound("nope".into()).kind(),
            ErrorKind::Binding
        );
        assert_eq!(
            Error::LoadRoot {
                path: "commands".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }
            .kind(),
            ErrorKind::Load
        );
    }
}
