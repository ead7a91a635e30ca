use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_scholar_sync::app::App;
use kira_scholar_sync::config::{ConfigLoader, ResolvedConfig};
use kira_scholar_sync::dblp::DblpHttpClient;
use kira_scholar_sync::error::KiraError;
use kira_scholar_sync::output::{ConsoleOutput, JsonOutput, OutputMode};
use kira_scholar_sync::vault::Vault;

#[derive(Parser)]
#[command(name = "kira-ss")]
#[command(about = "Sync DBLP author profiles into a Markdown note vault")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Sync a DBLP profile into the vault")]
    Sync(SyncArgs),
    #[command(about = "Show how an affiliation would resolve against known organizations")]
    Match(MatchArgs),
}

#[derive(Args, Clone)]
struct VaultArgs {
    #[arg(long)]
    vault: Option<String>,

    #[arg(long)]
    config: Option<String>,
}

#[derive(Args, Clone)]
struct SyncArgs {
    /// DBLP pid (e.g. `d/DoeJ`) or profile URL.
    profile: String,

    /// Vault-relative path of the person's own note.
    #[arg(long)]
    note: String,

    #[command(flatten)]
    vault: VaultArgs,
}

#[derive(Args, Clone)]
struct MatchArgs {
    affiliation: String,

    #[command(flatten)]
    vault: VaultArgs,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::InvalidPid(_) | KiraError::ConfigRead(_) | KiraError::ConfigParse(_) => 2,
        KiraError::ProfileFetch(_)
        | KiraError::DblpHttp(_)
        | KiraError::DblpStatus { .. }
        | KiraError::ProfileParse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Sync(args) => run_sync(args, output_mode),
        Commands::Match(args) => run_match(args, output_mode),
    }
}

fn build_app(args: &VaultArgs) -> miette::Result<App<DblpHttpClient, Vault>> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let vault = open_vault(args.vault.as_deref(), &config)?;
    let client = DblpHttpClient::new(&config.dblp_base_url)?;
    Ok(App::new(client, vault, config))
}

fn open_vault(flag: Option<&str>, config: &ResolvedConfig) -> miette::Result<Vault> {
    match flag.map(Utf8PathBuf::from).or_else(|| config.vault.clone()) {
        Some(root) => {
            if !root.as_std_path().is_dir() {
                return Err(miette::Report::msg(format!("vault directory not found: {root}")));
            }
            Ok(Vault::new(root))
        }
        None => Ok(Vault::current_dir()?),
    }
}

fn run_sync(args: SyncArgs, output_mode: OutputMode) -> miette::Result<()> {
    let app = build_app(&args.vault)?;
    match output_mode {
        OutputMode::Interactive => {
            let report = app.sync_profile(&args.profile, &args.note, &ConsoleOutput)?;
            ConsoleOutput::print_sync(&report);
        }
        OutputMode::NonInteractive => {
            let report = app.sync_profile(&args.profile, &args.note, &JsonOutput)?;
            JsonOutput::print_sync(&report).into_diagnostic()?;
        }
    }
    Ok(())
}

fn run_match(args: MatchArgs, output_mode: OutputMode) -> miette::Result<()> {
    let app = build_app(&args.vault)?;
    let report = app.match_affiliation(&args.affiliation)?;
    match output_mode {
        OutputMode::Interactive => ConsoleOutput::print_match(&report),
        OutputMode::NonInteractive => JsonOutput::print_match(&report).into_diagnostic()?,
    }
    Ok(())
}
