use crate::cli::commands::{ConfigAction, ParseCommand, RunCommand};
use crate::cli::config::FileConfig;
use crate::cli::error::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Run an API test tool and follow its steps as they finish
#[derive(Parser, Debug)]
#[command(name = "steprun", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (also passed to the tool)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file to use instead of the default location
    #[arg(long = "config", global = true, env = "STEPRUN_CONFIG")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a collection and report each step as it finishes
    Run(RunCommand),

    /// Rebuild the step report from a captured log file
    Parse(ParseCommand),

    /// Manage configuration settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    /// Whether the command reads settings from the config file
    fn reads_config(&self) -> bool {
        match self {
            Commands::Run(_) | Commands::Parse(_) => true,
            Commands::Config { action } => matches!(action, ConfigAction::Show),
            Commands::Completion { .. } => false,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config_path = match &self.config_file {
            Some(path) => path.clone(),
            None => FileConfig::default_path()?,
        };

        let file_config = match &self.command {
            Commands::Config {
                action: ConfigAction::Show,
            } => FileConfig::load_from_file(&config_path)?,
            command if command.reads_config() => load_or_default(&config_path),
            _ => FileConfig::default(),
        }
        .merge_with_cli_args(&self);

        if !file_config.output.color {
            colored::control::set_override(false);
        }

        match self.command {
            Commands::Run(cmd) => cmd.execute(file_config, self.verbose).await,
            Commands::Parse(cmd) => cmd.execute(file_config).await,
            Commands::Config { action } => action.execute(&config_path, &file_config),
            Commands::Completion { shell } => {
                generate_completion(shell);
                Ok(())
            }
        }
    }
}

fn load_or_default(path: &Path) -> FileConfig {
    FileConfig::load_from_file(path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "using default configuration");
        FileConfig::default()
    })
}

fn generate_completion(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_global_flags() {
        let cli = Cli::parse_from([
            "steprun",
            "run",
            "users.yaml",
            "--tags",
            "smoke,auth",
            "--verbose",
            "--no-color",
        ]);

        assert!(cli.verbose);
        assert!(cli.no_color);
        match cli.command {
            Commands::Run(cmd) => {
                assert_eq!(cmd.target, PathBuf::from("users.yaml"));
                assert_eq!(cmd.tags, vec!["smoke", "auth"]);
                assert!(!cmd.stream_logs);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_only_run_parse_and_show_read_the_file() {
        let parse = |args: &[&str]| {
            let argv = std::iter::once("steprun").chain(args.iter().copied());
            Cli::parse_from(argv).command
        };

        assert!(parse(&["run", "a.yaml"]).reads_config());
        assert!(parse(&["parse", "run.log"]).reads_config());
        assert!(parse(&["config", "show"]).reads_config());
        assert!(!parse(&["config", "init"]).reads_config());
        assert!(!parse(&["config", "path"]).reads_config());
        assert!(!parse(&["completion", "bash"]).reads_config());
    }

    #[test]
    fn test_no_color_disables_color() {
        let cli = Cli::parse_from(["steprun", "--no-color", "config", "path"]);
        let config = FileConfig::default().merge_with_cli_args(&cli);
        assert!(!config.output.color);
    }
}
