mod defaults;
mod document;
mod error;
mod sections;
mod store;

pub use defaults::*;
pub use document::{DirectoryEntry, Document};
pub use error::{ConfigError, ConfigResult};
pub use sections::*;
pub use store::{normalize_directory, ConfigStore, CONFIG_FILE_NAME};
