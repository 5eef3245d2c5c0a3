use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("torch error: {0}")]
    Tch(#[from] tch::TchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("plotting failed: {message}")]
    Plot { message: String },

    #[error("attribute {0} already exists")]
    DuplicateAttribute(String),

    #[error("no such attribute: {0}")]
    UnknownAttribute(String),

    #[error("{field} has {actual} elements, expected {expected}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("cannot sample from an empty replay buffer")]
    EmptyBuffer,

    #[error("variable {0} missing from source network")]
    MissingVariable(String),
}

impl Error {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
