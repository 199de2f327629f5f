//! apiprop CLI - property-based conformance testing for OpenAPI services

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use apiprop_core::config::{AuthConfig, AuthType, Config, Phase, Verbosity};
use apiprop_core::filter::{PartialFilter, resolve};
use apiprop_core::plan::validate_config;
use apiprop_core::report::{RunReport, generate_schema, to_http_file};
use apiprop_core::verdict::{EXIT_FAIL, EXIT_FATAL, EXIT_OK};
use apiprop_runner::{CheckSet, HttpTransport, Runner, RunnerConfig, SchemaSource, load, plan};

#[derive(Parser)]
#[command(name = "apiprop")]
#[command(about = "Property-based conformance testing for OpenAPI-described HTTP services")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate cases for every selected operation and check the responses
    Run(Box<RunArgs>),

    /// Write an example config file
    Init {
        /// Destination
        #[arg(default_value = ".apiprop.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Export the JSON Schema of the JSON report
    Schema,
}

#[derive(Args)]
struct RunArgs {
    /// Schema file path or URI (default: `schema` from the config)
    schema: Option<String>,

    /// Server to test (default: config, then the server declared in the schema)
    #[arg(long)]
    base_url: Option<String>,

    /// Comma-separated check names
    #[arg(long, value_delimiter = ',')]
    checks: Vec<String>,

    /// Only operations whose path matches (literal substring or regex)
    #[arg(long = "endpoint")]
    endpoints: Vec<String>,

    /// Only operations with this HTTP method
    #[arg(long = "method")]
    methods: Vec<String>,

    /// Extra request header, `Key: Value`
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,

    /// Credentials, `USER:PASSWORD`
    #[arg(long)]
    auth: Option<String>,

    #[arg(long)]
    auth_type: Option<AuthTypeArg>,

    /// Random cases per operation
    #[arg(long)]
    max_examples: Option<u32>,

    /// Derive seeds from operation identity
    #[arg(long)]
    derandomize: bool,

    #[arg(long)]
    seed: Option<u64>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    request_timeout: Option<u64>,

    /// Comma-separated phases to run
    #[arg(long, value_delimiter = ',')]
    phases: Option<Vec<PhaseArg>>,

    #[arg(long)]
    verbosity: Option<VerbosityArg>,

    /// Config file (default: .apiprop.toml, .apiprop.json or apiprop.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show the plan without sending requests
    #[arg(long)]
    dry_run: bool,

    /// Where to write reproductions of failing cases
    #[arg(long, default_value = "apiprop-failures.http")]
    http_file: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AuthTypeArg {
    Basic,
    Digest,
}

impl From<AuthTypeArg> for AuthType {
    fn from(arg: AuthTypeArg) -> Self {
        match arg {
            AuthTypeArg::Basic => Self::Basic,
            AuthTypeArg::Digest => Self::Digest,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PhaseArg {
    Explicit,
    Boundary,
    Generate,
    Shrink,
}

impl From<PhaseArg> for Phase {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Explicit => Self::Explicit,
            PhaseArg::Boundary => Self::Boundary,
            PhaseArg::Generate => Self::Generate,
            PhaseArg::Shrink => Self::Shrink,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VerbosityArg {
    Quiet,
    Normal,
    Verbose,
}

impl From<VerbosityArg> for Verbosity {
    fn from(arg: VerbosityArg) -> Self {
        match arg {
            VerbosityArg::Quiet => Self::Quiet,
            VerbosityArg::Normal => Self::Normal,
            VerbosityArg::Verbose => Self::Verbose,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(u8::try_from(EXIT_FATAL).unwrap_or(2))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run(args) => run_tests(&args, cli.output),

        Commands::Init { path, force } => {
            if path.exists() && !force {
                eprintln!("{} already exists (use --force to overwrite)", path.display());
                return Ok(EXIT_FAIL);
            }
            std::fs::write(&path, Config::example())
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Created {}", path.display());
            println!("\nEdit the file to configure:");
            println!("  - schema: path or URL of your OpenAPI document");
            println!("  - base_url: server to test");
            println!("  - headers: auth tokens, API keys");
            Ok(EXIT_OK)
        }

        Commands::Schema => {
            println!("{}", generate_schema()?);
            Ok(EXIT_OK)
        }
    }
}

fn run_tests(args: &RunArgs, output: OutputFormat) -> Result<i32> {
    let mut cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default(&std::env::current_dir()?)?,
    };
    apply_overrides(&mut cfg, args)?;

    let location = args
        .schema
        .clone()
        .or_else(|| cfg.schema.clone())
        .context("no schema given: pass SCHEMA or set `schema` in the config")?;
    let catalog = load(&SchemaSource::parse(&location)?)?;

    let base_url = cfg
        .base_url
        .clone()
        .or_else(|| catalog.server_origin().map(str::to_string));

    let mut cli_layer = PartialFilter::new();
    if !args.methods.is_empty() {
        cli_layer = cli_layer.with_methods(&args.methods)?;
    }
    if !args.endpoints.is_empty() {
        cli_layer = cli_layer.with_endpoints(&args.endpoints);
    }
    let filter = resolve(&[cfg.filter_layer()?, cli_layer]);
    let checks = CheckSet::from_names(cfg.checks.as_slice())?;

    if args.dry_run {
        let plan = plan(&filter.select(&catalog), &cfg.generation)
            .with_validations(validate_config(&cfg, base_url.as_deref()));
        match output {
            OutputFormat::Terminal => println!("{}", plan.to_terminal()),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        }
        return Ok(if plan.has_errors() { EXIT_FATAL } else { EXIT_OK });
    }

    let Some(base_url) = base_url else {
        bail!("no base URL: pass --base-url, set `base_url`, or declare a server in the schema");
    };

    let transport = HttpTransport::new(cfg.request_timeout(), cfg.auth.as_ref())?;
    let mut runner = Runner::new(RunnerConfig::from_config(&cfg, base_url.clone()), transport);

    let started = Instant::now();
    let stats = runner.execute(&catalog, &filter, &checks).snapshot();
    tracing::info!(elapsed = ?started.elapsed(), "run finished");

    let report = RunReport::new(base_url, runner.seed(), stats);
    match output {
        OutputFormat::Terminal => println!("{}", report.to_terminal(cfg.generation.verbosity)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.stats.samples().next().is_some() {
        let content = to_http_file(&report.stats, "base_url");
        match std::fs::write(&args.http_file, content) {
            Ok(()) => eprintln!("Reproductions: {}", args.http_file.display()),
            Err(e) => tracing::warn!(path = %args.http_file.display(), error = %e, "failed to write .http file"),
        }
    }

    Ok(report.verdict.exit_code)
}

/// CLI flags win over config values.
fn apply_overrides(cfg: &mut Config, args: &RunArgs) -> Result<()> {
    if let Some(url) = &args.base_url {
        cfg.base_url = Some(url.clone());
    }
    if !args.checks.is_empty() {
        cfg.checks.clone_from(&args.checks);
    }
    for raw in &args.headers {
        let (key, value) = parse_header(raw)?;
        cfg.headers.insert(key, value);
    }
    if let Some(raw) = &args.auth {
        cfg.auth = Some(parse_auth(raw, args.auth_type.map(AuthType::from))?);
    } else if let (Some(auth), Some(kind)) = (cfg.auth.as_mut(), args.auth_type) {
        auth.kind = kind.into();
    }
    if let Some(timeout) = args.request_timeout {
        cfg.request_timeout = timeout;
    }

    let generation = &mut cfg.generation;
    if let Some(n) = args.max_examples {
        generation.max_examples = n;
    }
    if args.derandomize {
        generation.derandomize = true;
    }
    if let Some(seed) = args.seed {
        generation.seed = Some(seed);
    }
    if let Some(phases) = &args.phases {
        generation.phases = phases.iter().copied().map(Phase::from).collect();
    }
    if let Some(v) = args.verbosity {
        generation.verbosity = v.into();
    }
    Ok(())
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let Some((key, value)) = raw.split_once(':') else {
        bail!("invalid header {raw:?}: expected `Key: Value`");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("invalid header {raw:?}: empty name");
    }
    Ok((key.to_string(), value.trim().to_string()))
}

fn parse_auth(raw: &str, kind: Option<AuthType>) -> Result<AuthConfig> {
    let Some((username, password)) = raw.split_once(':') else {
        bail!("invalid --auth value: expected `USER:PASSWORD`");
    };
    Ok(AuthConfig {
        username: username.to_string(),
        password: password.to_string(),
        kind: kind.unwrap_or_default(),
    })
}
