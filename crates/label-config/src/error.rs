use thiserror::Error;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config document root is not an object")]
    NotAnObject,

    #[error("unknown config section: {0}")]
    UnknownSection(String),

    #[error("directory not registered: {0}")]
    UnknownDirectory(String),
}
