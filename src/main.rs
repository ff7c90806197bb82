//! CLI entry point for `mboxfetch`.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mboxfetch::config::Config;
use mboxfetch::model::outcome::RunOutcome;
use mboxfetch::pipeline::Pipeline;
use mboxfetch::pop3::Pop3Connector;
use mboxfetch::store::MboxArchive;

/// Download every message from a POP3S mailbox into an MBOX file, then
/// delete it from the server.
#[derive(Parser)]
#[command(name = "mboxfetch", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// POP3S server hostname
    #[arg(long, env = "MBOXFETCH_HOST")]
    host: Option<String>,

    /// POP3S server port [default: 995]
    #[arg(long)]
    port: Option<u16>,

    /// Username for authentication
    #[arg(short, long, env = "MBOXFETCH_USERNAME")]
    username: Option<String>,

    /// Password for authentication
    #[arg(long, env = "MBOXFETCH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Path to the output MBOX file [default: ./messages.mbox]
    #[arg(long, value_name = "FILE")]
    mbox: Option<PathBuf>,

    /// Download messages without deleting them from the server
    #[arg(long)]
    dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(*shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        None => {}
    }

    let config = mboxfetch::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    cmd_fetch(&cli, &config)
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mboxfetch::config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mboxfetch.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mboxfetch", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Merge flags over the config file and check the required settings.
fn build_connector(cli: &Cli, config: &Config) -> anyhow::Result<Pop3Connector> {
    fn required(
        flag: Option<&String>,
        configured: Option<&String>,
        name: &str,
    ) -> anyhow::Result<String> {
        match flag.or(configured) {
            Some(v) if !v.is_empty() => Ok(v.clone()),
            _ => anyhow::bail!("--{name} is required (or set server.{name} in the config file)"),
        }
    }

    let server = &config.server;
    Ok(Pop3Connector {
        host: required(cli.host.as_ref(), server.host.as_ref(), "host")?,
        port: cli.port.unwrap_or(server.port),
        username: required(cli.username.as_ref(), server.username.as_ref(), "username")?,
        password: required(cli.password.as_ref(), server.password.as_ref(), "password")?,
        timeout: server.timeout(),
    })
}

/// Run the retrieval pipeline and print the outcome.
fn cmd_fetch(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let connector = build_connector(cli, config)?;
    let mbox_path = cli
        .mbox
        .clone()
        .unwrap_or_else(|| config.archive.path.clone());
    let archive = MboxArchive::with_envelope_sender(&mbox_path, &config.archive.envelope_sender);

    if !cli.json {
        println!("  Connecting to {}:{}...", connector.host, connector.port);
    }

    let mut pipeline = Pipeline::new(connector, archive).keep_on_server(cli.dry_run);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Fetching [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    if cli.json {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let result = pipeline.run(Some(&|current, total| {
        pb.set_length(total as u64);
        pb.set_position(current as u64);
    }));
    pb.finish_and_clear();
    let outcome = result?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome_table(&outcome, &mbox_path);
    }

    if let Some(err) = outcome.deletion_error() {
        anyhow::bail!(
            "{} message(s) could not be deleted from the server; first error: {err}",
            outcome.deletion_failures.len()
        );
    }
    Ok(())
}

/// Print the run outcome in a human-readable table.
fn print_outcome_table(outcome: &RunOutcome, mbox_path: &std::path::Path) {
    use humansize::{format_size, BINARY};

    println!();
    if outcome.is_empty() {
        println!("  No messages to download");
        println!();
        return;
    }

    println!(
        "  {:<25} {} ({})",
        "Retrieved",
        outcome.retrieved,
        format_size(outcome.retrieved_bytes, BINARY)
    );
    println!("  {:<25} {}", "Duplicates skipped", outcome.duplicates);
    println!("  {:<25} {}", "Newly archived", outcome.archived);
    if outcome.kept_on_server {
        println!("  {:<25} dry run, messages kept on server", "Deleted");
    } else {
        println!("  {:<25} {}", "Deleted", outcome.deleted);
        if !outcome.deletion_failures.is_empty() {
            println!(
                "  {:<25} {}",
                "Deletion failures",
                outcome.deletion_failures.len()
            );
            for failure in &outcome.deletion_failures {
                println!("    #{:<6} {}", failure.number, failure.error);
            }
        }
    }
    println!("  {:<25} {}", "Archive", mbox_path.display());
    println!();
}
