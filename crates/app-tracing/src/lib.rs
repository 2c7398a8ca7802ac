use dotenvy::dotenv;
use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_NAME: &str = "app.log";
const DEFAULT_DIRECTIVE: &str = "info";

fn init_env_layer(default_directive: Option<&str>) -> EnvFilter {
    match dotenv() {
        Ok(path) => eprintln!(".env read successfully from {}", path.display()),
        Err(e) => eprintln!("Could not load .env file: {e}"),
    };

    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive.unwrap_or(DEFAULT_DIRECTIVE).into())
}

/// `RUST_LOG` wins over `default_directive`, which falls back to `info`.
pub fn init_tracing_to_stdout(default_directive: Option<&str>) {
    let env_layer = init_env_layer(default_directive);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_writer(std::io::stderr);

    if let Err(e) = tracing_subscriber::registry()
        .with(env_layer)
        .with(stdout_layer)
        .try_init()
    {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }
}

fn create_log_file(log_dir: &Path) -> std::io::Result<std::fs::File> {
    std::fs::create_dir_all(log_dir)?;
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))
}

pub fn init_tracing_to_file(log_dir: PathBuf, default_directive: Option<&str>) {
    let file = match create_log_file(&log_dir) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to create log file in {}: {}", log_dir.display(), e);
            init_tracing_to_stdout(default_directive); // fallback to stdout tracing
            return;
        }
    };

    let env_layer = init_env_layer(default_directive);
    let file_log_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false);

    if let Err(e) = tracing_subscriber::registry()
        .with(env_layer)
        .with(file_log_layer)
        .try_init()
    {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_log_file_is_created_in_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs").join("labeler");

        create_log_file(&log_dir).unwrap();
        assert!(log_dir.join(LOG_FILE_NAME).is_file());

        // appending keeps earlier runs
        std::fs::write(log_dir.join(LOG_FILE_NAME), "earlier\n").unwrap();
        create_log_file(&log_dir).unwrap();
        assert_eq!(
            std::fs::read_to_string(log_dir.join(LOG_FILE_NAME)).unwrap(),
            "earlier\n"
        );
    }
}
