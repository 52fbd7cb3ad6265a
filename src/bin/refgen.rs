use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use refgen_fetch::app::{App, FetchPlan};
use refgen_fetch::config::{
    ConfigLoader, Credentials, GenomeRequest, default_ledger, default_output_dir,
};
use refgen_fetch::domain::{AccessionId, DEFAULT_DATABASE, RecordFormat};
use refgen_fetch::entrez::{EntrezHttpClient, RetryPolicy};
use refgen_fetch::error::RefgenError;
use refgen_fetch::output::{JsonOutput, OutputMode, TextProgress, print_fetch_summary};
use refgen_fetch::summary::SummaryResolver;

#[derive(Parser)]
#[command(name = "refgen")]
#[command(about = "Download reference genomes from NCBI and keep a CSV ledger of every file")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Give up on a request after this many transient failures (default: never).
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Pause between retries, in milliseconds.
    #[arg(long, global = true, default_value_t = 0)]
    backoff_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch genomes and record them in the ledger")]
    Fetch(FetchArgs),
    #[command(about = "Show the document summary of one accession")]
    Summary(SummaryArgs),
    #[command(about = "List identifiers linked across Entrez databases")]
    Link(LinkArgs),
}

#[derive(Args)]
struct FetchArgs {
    accessions: Vec<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    ledger: Option<Utf8PathBuf>,

    #[arg(long)]
    out_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    format: Option<RecordFormat>,

    #[arg(long)]
    db: Option<String>,

    #[arg(long, conflicts_with = "force")]
    extend: bool,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    log: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct SummaryArgs {
    accession: String,

    #[arg(long, default_value = DEFAULT_DATABASE)]
    db: String,
}

#[derive(Args)]
struct LinkArgs {
    #[arg(required = true)]
    ids: Vec<String>,

    #[arg(long = "from", default_value = "protein")]
    db_from: String,

    #[arg(long = "to", default_value = DEFAULT_DATABASE)]
    db_to: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<RefgenError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RefgenError) -> u8 {
    match error {
        RefgenError::MissingConfig
        | RefgenError::ConfigRead(_)
        | RefgenError::ConfigParse(_)
        | RefgenError::InvalidAccession(_)
        | RefgenError::InvalidFormat(_)
        | RefgenError::LedgerExists(_)
        | RefgenError::ConflictingLedgerMode => 2,
        RefgenError::Transient(_)
        | RefgenError::EntrezHttp(_)
        | RefgenError::EntrezStatus { .. }
        | RefgenError::RetriesExhausted { .. }
        | RefgenError::Reconciliation(_) => 3,
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
    let policy = match cli.max_attempts {
        Some(max) => RetryPolicy::bounded(max),
        None => RetryPolicy::unbounded(),
    }
    .with_backoff(Duration::from_millis(cli.backoff_ms));

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, policy, output_mode),
        Commands::Summary(args) => run_summary(args, policy, output_mode),
        Commands::Link(args) => run_link(args, policy, output_mode),
    }
}

fn run_fetch(args: FetchArgs, policy: RetryPolicy, output_mode: OutputMode) -> miette::Result<()> {
    let (mut plan, credentials) = if args.config.is_some() || args.accessions.is_empty() {
        let resolved = ConfigLoader::resolve(args.config.as_deref())?;
        let credentials = resolved.credentials.clone();
        (FetchPlan::from(resolved), credentials)
    } else {
        (default_plan(), Credentials::default().with_env())
    };

    for accession in &args.accessions {
        plan.genomes.push(GenomeRequest {
            accession: accession.parse::<AccessionId>()?,
            path: None,
        });
    }
    if let Some(ledger) = args.ledger {
        plan.ledger = ledger;
    }
    if let Some(out_dir) = args.out_dir {
        plan.output_dir = out_dir;
    }
    if let Some(format) = args.format {
        plan.format = format;
    }
    if let Some(db) = args.db {
        plan.database = db;
    }
    if args.extend {
        plan.extend = true;
        plan.force = false;
    }
    if args.force {
        plan.force = true;
        plan.extend = false;
    }
    if args.log.is_some() {
        plan.log = args.log;
    }

    let client = EntrezHttpClient::new(credentials)?;
    let app = App::with_policy(client, policy);
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.fetch(&plan, &JsonOutput)?;
            JsonOutput::print_fetch(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result = app.fetch(&plan, &TextProgress)?;
            print_fetch_summary(&result);
            Ok(())
        }
    }
}

fn run_summary(
    args: SummaryArgs,
    policy: RetryPolicy,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let accession: AccessionId = args.accession.parse()?;
    let app = App::with_policy(EntrezHttpClient::new(Credentials::default().with_env())?, policy);
    let gateway = app.gateway();
    let summary = SummaryResolver::for_database(&gateway, &args.db).resolve(&accession)?;
    match (output_mode, &summary) {
        (OutputMode::NonInteractive, _) => JsonOutput::print_summary(&summary).into_diagnostic(),
        (OutputMode::Interactive, None) => {
            println!("{accession}: no summary available");
            Ok(())
        }
        (OutputMode::Interactive, Some(summary)) => {
            let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
            println!("{accession}");
            println!("  title:     {}", show(&summary.title));
            println!("  organism:  {} (taxid {})", show(&summary.organism), show(&summary.taxid));
            println!("  genome:    {}", show(&summary.genome));
            println!("  topology:  {}", show(&summary.topology));
            println!("  length:    {}", show(&summary.slen));
            println!("  source:    {}", show(&summary.sourcedb));
            println!("  updated:   {}", show(&summary.updatedate));
            Ok(())
        }
    }
}

fn run_link(args: LinkArgs, policy: RetryPolicy, output_mode: OutputMode) -> miette::Result<()> {
    let app = App::with_policy(EntrezHttpClient::new(Credentials::default().with_env())?, policy);
    let gateway = app.gateway();
    let ids: Vec<&str> = args.ids.iter().map(String::as_str).collect();
    let links = SummaryResolver::new(&gateway).links(&args.db_from, &args.db_to, &ids)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_links(&links).into_diagnostic(),
        OutputMode::Interactive => {
            for link in &links {
                println!("{link}");
            }
            Ok(())
        }
    }
}

fn default_plan() -> FetchPlan {
    FetchPlan {
        ledger: Utf8PathBuf::from(default_ledger()),
        output_dir: Utf8PathBuf::from(default_output_dir()),
        database: DEFAULT_DATABASE.to_string(),
        format: RecordFormat::default(),
        extend: false,
        force: false,
        genomes: Vec::new(),
        log: None,
        dataset_name: None,
        taxa: Vec::new(),
        max_per_taxon: None,
    }
}
