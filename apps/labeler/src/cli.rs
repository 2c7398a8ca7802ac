use clap::{ArgAction, Args, Parser, Subcommand};
use label_config::LabelerKind;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "labeler",
    version,
    about = "Caption image folders with cloud or local vision models and keep the captions as .txt sidecars"
)]
pub struct Cli {
    /// Configuration file, defaults to the user config directory
    #[arg(long, global = true, env = "LABELER_CONFIG")]
    pub config: Option<PathBuf>,
    /// Write logs to `app.log` in this directory instead of stderr
    #[arg(long, global = true, env = "LABELER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
    /// Debug level logging unless RUST_LOG is set
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the remembered image directories
    #[command(subcommand)]
    Dirs(DirsCommand),
    /// Inspect or change backend settings
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Caption and translate a directory
    Run(RunArgs),
    /// Print the rows of a directory
    Show(ShowArgs),
}

#[derive(Subcommand, Debug)]
pub enum DirsCommand {
    /// List directories and whether they carry their own prompt
    List,
    /// Remember a directory
    Add {
        path: String,
        /// Caption instruction for this directory
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Forget a directory
    Remove { path: String },
    /// Print the prompt of a directory, or replace it when TEXT is given
    Prompt {
        path: String,
        /// New prompt, an empty string restores the default
        text: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the whole document or one section
    Show { section: Option<String> },
    /// Set one key of a section, VALUE is read as JSON when it parses
    Set {
        section: String,
        key: String,
        value: String,
    },
    /// Store the Zhipu key for both captioning and translation
    SetZhipuKey { api_key: String },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    pub dir: PathBuf,
    /// Captioning backend for this run
    #[arg(long)]
    pub backend: Option<LabelerKind>,
    /// Caption every row without a caption
    #[arg(long, action = ArgAction::SetTrue)]
    pub label_all: bool,
    /// Caption one row, may be repeated
    #[arg(long = "label", value_name = "ROW")]
    pub label: Vec<usize>,
    /// Translate every captioned row without a translation
    #[arg(long, action = ArgAction::SetTrue)]
    pub translate_all: bool,
    /// Translate one row, may be repeated
    #[arg(long = "translate", value_name = "ROW")]
    pub translate: Vec<usize>,
    /// With --label-all, caption rows that already have text too
    #[arg(long, action = ArgAction::SetTrue)]
    pub overwrite: bool,
    /// Trigger word prepended to new captions, replaces the detected one
    #[arg(long, value_name = "WORD")]
    pub trigger: Option<String>,
    /// Write captions to their sidecar files when done
    #[arg(long, action = ArgAction::SetTrue)]
    pub save: bool,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub dir: PathBuf,
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "labeler",
            "run",
            "/data/set",
            "--backend",
            "gemini",
            "--label",
            "0",
            "--label",
            "3",
            "--translate-all",
            "--trigger",
            "ohwx",
            "--save",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.dir, PathBuf::from("/data/set"));
        assert_eq!(args.backend, Some(LabelerKind::Gemini));
        assert_eq!(args.label, vec![0, 3]);
        assert!(args.translate_all);
        assert!(!args.label_all);
        assert_eq!(args.trigger.as_deref(), Some("ohwx"));
        assert!(args.save);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(Cli::try_parse_from(["labeler", "run", ".", "--backend", "florence"]).is_err());
    }

    #[test]
    fn test_parse_config_set() {
        let cli =
            Cli::try_parse_from(["labeler", "config", "set", "gemini_config", "temperature", "0.4"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommand::Set { ref section, .. }) if section == "gemini_config"
        ));
    }
}
