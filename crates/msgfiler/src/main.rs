//! `msgfiler` - rename and relocate exported message files.
//!
//! Front end for `msgfiler-core`: preview a target name, move a saved message
//! file to its derived name, or set a file's timestamps.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use chrono::{DateTime, FixedOffset};
use clap::{Args, Parser, Subcommand};
use msgfiler_core::{
    ArchiverConfig, FileOperationOutcome, FileRelocator, FileTimeKind, FilenamePlan,
    KnownSendersTable, MessageFields, Relocation, extract_metadata, plan_filename,
    set_creation_time, set_modification_time,
};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "msgfiler")]
#[command(about = "Rename and relocate exported message files", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline steps at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the file name a message would be stored under
    Plan {
        /// Directory the file would be stored in
        #[arg(long)]
        dir: Option<PathBuf>,

        #[command(flatten)]
        message: MessageArgs,
    },
    /// Move a saved message file to its derived name
    Rename {
        /// Saved message file
        #[arg(required = true)]
        file: PathBuf,

        #[command(flatten)]
        message: MessageArgs,
    },
    /// Set a file's modification or creation time
    Touch {
        /// File to update
        #[arg(required = true)]
        file: PathBuf,

        /// Modification time, `YYYY-MM-DD HH:MM:SS` (local time)
        #[arg(long)]
        modified: Option<String>,

        /// Creation time, `YYYY-MM-DD HH:MM:SS` (local time)
        #[arg(long)]
        created: Option<String>,
    },
}

/// Message metadata given on the command line.
#[derive(Args)]
struct MessageArgs {
    /// Subject line
    #[arg(long)]
    subject: Option<String>,

    /// Raw sender, e.g. `Jane Doe <jane@example.com>`
    #[arg(long)]
    sender: Option<String>,

    /// Send date (RFC 3339, e.g. `2024-03-05T14:30:00+01:00`)
    #[arg(long, value_parser = parse_sent)]
    sent: Option<DateTime<FixedOffset>>,

    /// Known-senders CSV (overrides the configured one)
    #[arg(long)]
    known_senders: Option<PathBuf>,
}

impl MessageArgs {
    fn fields(&self) -> MessageFields {
        MessageFields {
            subject: self.subject.clone(),
            sender: self.sender.clone(),
            sent_at: self.sent,
            ..MessageFields::default()
        }
    }
}

fn parse_sent(value: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(value).map_err(|e| format!("invalid RFC 3339 date: {e}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "msgfiler=debug,msgfiler_core=debug"
    } else {
        "msgfiler=info,msgfiler_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Runs a command. `Ok(false)` means the file operation itself failed.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan { dir, message } => {
            let known = load_known_senders(&config, &message)?;
            let dir = dir.unwrap_or_else(|| config.export_dir.clone());
            let plan = plan_for(&config, &message, known.as_ref(), &dir)?;
            print_plan(&plan);
            Ok(true)
        }
        Commands::Rename { file, message } => {
            let (plan, relocation) = rename_file(&config, &file, &message)?;
            println!("{}", relocation.outcome);
            if relocation.is_done() {
                println!("{}", plan.target_path.display());
            }
            Ok(relocation.is_done())
        }
        Commands::Touch {
            file,
            modified,
            created,
        } => {
            let results = touch_file(&file, modified.as_deref(), created.as_deref())?;
            for (kind, outcome) in &results {
                println!("{}: {outcome}", kind.as_str());
            }
            Ok(results
                .iter()
                .all(|(_, outcome)| touch_succeeded(*outcome)))
        }
    }
}

fn rename_file(
    config: &ArchiverConfig,
    file: &Path,
    message: &MessageArgs,
) -> anyhow::Result<(FilenamePlan, Relocation)> {
    let known = load_known_senders(config, message)?;
    let dir = file
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let plan = plan_for(config, message, known.as_ref(), &dir)?;
    if plan.is_truncated {
        info!(name = %plan.truncated_name, "Target name truncated");
    }

    let relocation = FileRelocator::new(config.move_policy()).relocate(file, &plan.target_path);
    Ok((plan, relocation))
}

fn touch_file(
    file: &Path,
    modified: Option<&str>,
    created: Option<&str>,
) -> anyhow::Result<Vec<(FileTimeKind, FileOperationOutcome)>> {
    if modified.is_none() && created.is_none() {
        bail!("nothing to do: pass --modified and/or --created");
    }
    let mut results = Vec::new();
    if let Some(date) = modified {
        results.push((FileTimeKind::Modified, set_modification_time(file, date)));
    }
    if let Some(date) = created {
        results.push((FileTimeKind::Created, set_creation_time(file, date)));
    }
    Ok(results)
}

const fn touch_succeeded(outcome: FileOperationOutcome) -> bool {
    matches!(
        outcome,
        FileOperationOutcome::Success | FileOperationOutcome::TimestampAlreadyMatches
    )
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ArchiverConfig> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => ArchiverConfig::default_path(),
    };
    let config = match path {
        Some(path) => ArchiverConfig::load_or_default(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => ArchiverConfig::default(),
    };
    let config = config.with_env_overrides();
    config.validate()?;
    debug!(?config, "Configuration");
    Ok(config)
}

fn load_known_senders(
    config: &ArchiverConfig,
    message: &MessageArgs,
) -> anyhow::Result<Option<KnownSendersTable>> {
    let Some(path) = message
        .known_senders
        .as_ref()
        .or(config.known_senders_path.as_ref())
    else {
        return Ok(None);
    };
    let table = KnownSendersTable::load(path)
        .with_context(|| format!("failed to load known senders from {}", path.display()))?;
    Ok(Some(table))
}

fn plan_for(
    config: &ArchiverConfig,
    message: &MessageArgs,
    known: Option<&KnownSendersTable>,
    dir: &Path,
) -> anyhow::Result<FilenamePlan> {
    let metadata = extract_metadata(&message.fields());
    if !metadata.is_success() {
        bail!("no file name can be derived: pass at least one of --subject, --sender, --sent");
    }
    Ok(plan_filename(&metadata, known, dir, &config.length_limit()))
}

fn print_plan(plan: &FilenamePlan) {
    println!("sender:    {} <{}>", plan.sender.name, plan.sender.email);
    println!("timestamp: {}", plan.timestamp);
    println!("subject:   {}", plan.sanitized_subject);
    println!("composed:  {}", plan.composed_name);
    if plan.is_truncated {
        let note = if plan.clamped { " (clamped)" } else { "" };
        println!("truncated: {}{note}", plan.truncated_name);
    }
    println!("target:    {}", plan.target_path.display());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_rename_args() {
        let cli = Cli::try_parse_from([
            "msgfiler",
            "-v",
            "rename",
            "export/1.msg",
            "--subject",
            "Hello",
            "--sent",
            "2024-03-05T14:30:00+01:00",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Rename { file, message } = cli.command else {
            panic!("expected rename");
        };
        assert_eq!(file, PathBuf::from("export/1.msg"));
        let fields = message.fields();
        assert_eq!(fields.subject.as_deref(), Some("Hello"));
        assert_eq!(fields.sent_at.unwrap().to_rfc3339(), "2024-03-05T14:30:00+01:00");
    }

    #[test]
    fn test_bad_sent_date_is_rejected() {
        assert!(Cli::try_parse_from(["msgfiler", "plan", "--sent", "yesterday"]).is_err());
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("msgfiler").chain(args.iter().copied())).unwrap()
    }

    /// Prepends `--config`; tests pass a path that does not exist, so the
    /// defaults apply.
    fn with_default_config<'a>(config: &'a str, args: &[&'a str]) -> Vec<&'a str> {
        let mut all = vec!["--config", config];
        all.extend_from_slice(args);
        all
    }

    #[test]
    fn test_rename_moves_file_and_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("missing-config.json");
        let source = dir.path().join("1.msg");
        std::fs::write(&source, "body").unwrap();

        let done = run(parse(&with_default_config(
            config.to_str().unwrap(),
            &[
                "rename",
                source.to_str().unwrap(),
                "--subject",
                "Status update",
                "--sender",
                "Jane Doe <jane@example.com>",
                "--sent",
                "2024-03-05T14:30:00+01:00",
            ],
        )))
        .unwrap();

        assert!(done);
        assert!(!source.exists());
        let target = dir
            .path()
            .join("20240305-14uhr30_jane@example.com_Status_update.msg");
        assert_eq!(std::fs::read_to_string(target).unwrap(), "body");
    }

    #[test]
    fn test_rename_onto_existing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("missing-config.json");
        let source = dir.path().join("1.msg");
        let target = dir.path().join("__Hello.msg");
        std::fs::write(&source, "new").unwrap();
        std::fs::write(&target, "old").unwrap();

        let done = run(parse(&with_default_config(
            config.to_str().unwrap(),
            &["rename", source.to_str().unwrap(), "--subject", "Hello"],
        )))
        .unwrap();

        assert!(!done);
        assert_eq!(std::fs::read_to_string(&source).unwrap(), "new");
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
    }

    #[test]
    fn test_rename_reports_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("1.msg");
        let Commands::Rename { message, .. } = parse(&["rename", "x", "--subject", "Hello"]).command
        else {
            panic!("expected rename");
        };

        let (plan, relocation) =
            rename_file(&ArchiverConfig::default(), &source, &message).unwrap();

        assert_eq!(plan.target_path, dir.path().join("__Hello.msg"));
        assert_eq!(relocation.outcome, FileOperationOutcome::NotFound);
        assert!(!relocation.is_done());
    }

    #[test]
    fn test_touch_sets_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("missing-config.json");
        let file = dir.path().join("1.msg");
        std::fs::write(&file, "body").unwrap();
        let args = with_default_config(
            config.to_str().unwrap(),
            &["touch", file.to_str().unwrap(), "--modified", "2023-11-08 12:00:00"],
        );

        assert!(run(parse(&args)).unwrap());
        // Running again only reports that the timestamp already matches.
        assert_eq!(
            touch_file(&file, Some("2023-11-08 12:00:00"), None).unwrap(),
            [(
                FileTimeKind::Modified,
                FileOperationOutcome::TimestampAlreadyMatches
            )]
        );
        assert!(run(parse(&args)).unwrap());
    }

    #[test]
    fn test_touch_failures() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("missing-config.json");
        let file = dir.path().join("1.msg");
        std::fs::write(&file, "body").unwrap();
        let config = config.to_str().unwrap();
        let file = file.to_str().unwrap();

        let bad_date = with_default_config(config, &["touch", file, "--modified", "yesterday"]);
        assert!(!run(parse(&bad_date)).unwrap());

        let missing = dir.path().join("missing.msg");
        let missing_file = with_default_config(
            config,
            &["touch", missing.to_str().unwrap(), "--modified", "2023-11-08 12:00:00"],
        );
        assert!(!run(parse(&missing_file)).unwrap());

        assert!(run(parse(&with_default_config(config, &["touch", file]))).is_err());
    }

    #[test]
    fn test_plan_needs_some_metadata() {
        let cli = Cli::try_parse_from(["msgfiler", "plan"]).unwrap();
        let Commands::Plan { message, .. } = cli.command else {
            panic!("expected plan");
        };
        let err = plan_for(&ArchiverConfig::default(), &message, None, Path::new("out"));
        assert!(err.is_err());
    }
}
