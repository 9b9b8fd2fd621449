use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::cli::config::FileConfig;
use crate::cli::error::{CliError, Result};
use crate::cli::output;
use crate::core::config::Config;
use crate::core::types::RunOptions;
use crate::runtime::aggregator::{AggregatedView, Aggregator};
use crate::runtime::events::SessionEventKind;
use crate::runtime::parser::{ParserOptions, StreamParser};

/// Run a collection through the external tool
#[derive(Args, Debug, Clone)]
pub struct RunCommand {
    /// File or collection passed to the tool
    pub target: PathBuf,

    /// Ask the tool to plan the run without sending requests
    #[arg(long)]
    pub dry_run: bool,

    /// Only run steps with this priority
    #[arg(long)]
    pub priority: Option<String>,

    /// Only run steps carrying these tags (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Executable to launch instead of the configured one
    #[arg(long)]
    pub executable: Option<String>,

    /// Working directory for the tool
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Print the final view as JSON
    #[arg(long)]
    pub json: bool,

    /// Echo the tool's output while it runs
    #[arg(long)]
    pub stream_logs: bool,
}

impl RunCommand {
    pub fn options(&self, verbose: bool) -> RunOptions {
        let mut options = RunOptions::new(&self.target)
            .verbose(verbose)
            .dry_run(self.dry_run)
            .tags(self.tags.iter().cloned());
        if let Some(priority) = &self.priority {
            options = options.priority(priority.clone());
        }
        options
    }

    /// Runtime configuration with this command's overrides applied
    pub fn config(&self, file_config: FileConfig) -> Result<Config> {
        file_config
            .with_overrides(self.executable.as_deref(), self.cwd.as_deref())
            .into_config()
    }

    pub async fn execute(self, file_config: FileConfig, verbose: bool) -> Result<()> {
        let json = self.json || file_config.output.json;
        let stream_logs = self.stream_logs || file_config.output.stream_logs;
        let options = self.options(verbose);
        options.validate()?;
        let config = self.config(file_config)?;

        let aggregator = Aggregator::builder().config(config).handle("cli").build();
        let printer = if json {
            None
        } else {
            let mut events = aggregator.sessions().subscribe();
            Some(tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match event.kind {
                        SessionEventKind::Log { level, message } if stream_logs => {
                            println!("{}", output::format_log(level, &message));
                        }
                        SessionEventKind::Step {
                            position,
                            total,
                            step,
                        } => println!("{}", output::format_step(position, total, &step)),
                        kind if kind.is_terminal() => break,
                        _ => {}
                    }
                }
            }))
        };

        let result = run_until_interrupted(&aggregator, options).await;
        let view = match (result, printer) {
            (Ok(view), Some(printer)) => {
                if let Err(e) = printer.await {
                    warn!(error = %e, "output task failed");
                }
                view
            }
            (Ok(view), None) => view,
            (Err(e), printer) => {
                if let Some(printer) = printer {
                    printer.abort();
                }
                return Err(e);
            }
        };

        if json {
            output::print_json(&view)?;
        } else {
            println!("{}", output::format_summary(&view));
        }
        outcome(&view)
    }
}

/// Execute, cancelling the run on the first Ctrl-C
async fn run_until_interrupted(
    aggregator: &Aggregator,
    options: RunOptions,
) -> Result<AggregatedView> {
    let run = aggregator.execute(options);
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => Ok(result?),
        _ = tokio::signal::ctrl_c() => {
            let stopped = aggregator.cancel().await;
            info!(success = stopped.success, "{}", stopped.message);
            Ok(run.await?)
        }
    }
}

/// Exit status of a finished run
pub fn outcome(view: &AggregatedView) -> Result<()> {
    if view.passed() && view.failed_steps() == 0 {
        return Ok(());
    }
    let reason = match (&view.last_error, view.failed_steps()) {
        (Some(error), _) => error.clone(),
        (None, failed) => format!("{} of {} steps failed", failed, view.steps.len()),
    };
    Err(CliError::run_failed(reason))
}

/// Rebuild the step report from a captured log
#[derive(Args, Debug, Clone)]
pub struct ParseCommand {
    /// Log file written by an earlier run of the tool
    pub log_file: PathBuf,

    /// Print steps as JSON
    #[arg(long)]
    pub json: bool,
}

impl ParseCommand {
    pub async fn execute(self, file_config: FileConfig) -> Result<()> {
        let json = self.json || file_config.output.json;
        let options = ParserOptions::from(&file_config.into_config()?);
        let steps = parse_log(&self.log_file, options).await?;

        if json {
            output::print_json(&steps)
        } else if steps.is_empty() {
            println!("No steps found in {}", self.log_file.display());
            Ok(())
        } else {
            println!("{}", output::format_steps(&steps));
            Ok(())
        }
    }
}

/// Replay a log file through the parser
pub async fn parse_log(
    path: &Path,
    options: ParserOptions,
) -> Result<Vec<crate::core::types::StepRecord>> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        CliError::invalid_input(format!("cannot read '{}': {}", path.display(), e))
    })?;

    let mut parser = StreamParser::with_options(options);
    parser.push_chunk(&String::from_utf8_lossy(&bytes));
    Ok(parser.get_steps())
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print the active configuration as TOML
    Show,

    /// Print the config file location
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl ConfigAction {
    pub fn execute(self, path: &Path, file_config: &FileConfig) -> Result<()> {
        match self {
            ConfigAction::Show => {
                let text = toml::to_string_pretty(file_config).map_err(|e| {
                    CliError::configuration(format!("Failed to serialize config: {}", e))
                })?;
                print!("{}", text);
            }
            ConfigAction::Path => println!("{}", path.display()),
            ConfigAction::Init { force } => {
                if path.exists() && !force {
                    return Err(CliError::invalid_input(format!(
                        "'{}' already exists; pass --force to overwrite it",
                        path.display()
                    )));
                }
                FileConfig::default().save_to_file(path)?;
                println!("Wrote {}", path.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{StepStatus, TerminalResult};
    use tempfile::tempdir;

    fn run_command(args: &[&str]) -> RunCommand {
        use clap::Parser;

        #[derive(Parser)]
        struct Harness {
            #[command(flatten)]
            run: RunCommand,
        }

        let argv = std::iter::once("steprun").chain(args.iter().copied());
        Harness::parse_from(argv).run
    }

    #[test]
    fn test_run_flags_become_options() {
        let cmd = run_command(&[
            "users.yaml",
            "--dry-run",
            "--priority",
            "high",
            "--tags",
            "smoke,auth",
        ]);
        let options = cmd.options(true);

        assert_eq!(
            options.to_args(),
            vec![
                "users.yaml",
                "--verbose",
                "--dry-run",
                "--priority",
                "high",
                "--tags",
                "smoke,auth"
            ]
        );
    }

    #[test]
    fn test_run_overrides_config() {
        let dir = tempdir().unwrap();
        let cwd = dir.path().to_string_lossy().into_owned();
        let cmd = run_command(&["users.yaml", "--executable", "newman", "--cwd", &cwd]);

        let config = cmd.config(FileConfig::default()).unwrap();
        assert_eq!(config.executable, "newman");
        assert_eq!(config.working_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_outcome() {
        let mut view = AggregatedView {
            terminal_result: Some(TerminalResult {
                success: true,
                exit_code: Some(0),
                duration_ms: 10,
            }),
            ..Default::default()
        };
        assert!(outcome(&view).is_ok());

        view.last_error = Some("Process exited with code 1".to_string());
        view.terminal_result = None;
        let err = outcome(&view).unwrap_err();
        assert_eq!(err.to_string(), "Run failed: Process exited with code 1");
    }

    #[tokio::test]
    async fn test_parse_log_replays_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        std::fs::write(
            &path,
            "[STEP 1/2] Create user\n\
             POST https://api.example.com/users\n\
             ✓ status_code: expected 201, got 201\n\
             [STEP 2/2] Fetch user\n\
             ✗ status_code: expected 200, got 404",
        )
        .unwrap();

        let steps = parse_log(&path, ParserOptions::default()).await.unwrap();

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].status, StepStatus::Passed);
        assert_eq!(steps[1].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_parse_log_missing_file() {
        let err = parse_log(Path::new("/nonexistent/run.log"), ParserOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::InvalidInput(_)));
    }

    #[test]
    fn test_config_init_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = FileConfig::default();

        ConfigAction::Init { force: false }.execute(&path, &config).unwrap();
        assert!(path.exists());

        let err = ConfigAction::Init { force: false }
            .execute(&path, &config)
            .unwrap_err();
        assert!(matches!(err, CliError::InvalidInput(_)));
        ConfigAction::Init { force: true }.execute(&path, &config).unwrap();
    }
}
