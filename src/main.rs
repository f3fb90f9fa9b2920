use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand};

use runscope_logs::{CursorCache, LogStorageRetriever, QueryScope, RunStepKey};
use runscope_loki::{LokiConfig, LokiQueryParameters, LokiRetriever, logs_view_header};

mod config;
mod filter;
mod session;

use config::{Overrides, Settings};
use filter::{FilteredWriter, LineFilter};
use session::SessionStore;

/// Runscope - stream CI pipeline logs out of Loki
#[derive(Parser, Debug)]
#[command(name = "runscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/runscope/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Loki base URL
    #[arg(long, global = true)]
    url: Option<String>,

    /// Loki tenant, sent as X-Scope-OrgID
    #[arg(long, global = true)]
    tenant: Option<String>,

    /// Lines requested per query
    #[arg(long, global = true)]
    page_size: Option<usize>,

    /// Maximum number of queries per log
    #[arg(long, global = true)]
    max_queries: Option<u32>,

    /// Log more to stderr (-v info, -vv debug); RUST_LOG also applies
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that Loki is reachable with the configured credentials
    Check,

    /// Print the log of a pipeline run or step
    Cat {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Resume after this many bytes of a previous read in the same session
        #[arg(long, default_value = "0")]
        skip: u64,

        /// Session whose cursor cache is loaded and saved
        #[arg(long)]
        session: Option<String>,

        /// Only print lines matching this regex
        #[arg(long)]
        grep: Option<String>,

        /// Match --grep case-insensitively
        #[arg(short = 'i', long, requires = "grep")]
        ignore_case: bool,

        /// Print lines NOT matching --grep
        #[arg(long, requires = "grep")]
        invert_match: bool,
    },

    /// Show the LogQL and request URL for a log without fetching it
    Query {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Delete a saved session, or only one log's offsets in it
    Forget {
        session: String,

        /// Pipeline id of the log to forget
        #[arg(long, requires = "run")]
        pipeline: Option<String>,

        /// Run number of the log to forget
        #[arg(long, requires = "pipeline")]
        run: Option<u64>,

        /// Step of the log to forget
        #[arg(long, requires = "run")]
        step: Option<String>,
    },
}

#[derive(ClapArgs, Debug)]
struct ScopeArgs {
    /// Pipeline id, e.g. "my-war/master"
    pipeline: String,

    /// Run number
    run: u64,

    /// Trace id of the run
    #[arg(long)]
    trace: String,

    /// Run start time (RFC 3339)
    #[arg(long)]
    start: DateTime<Utc>,

    /// Run end time (RFC 3339); omit while the run is in progress
    #[arg(long)]
    end: Option<DateTime<Utc>>,

    /// Restrict to one step of the run
    #[arg(long)]
    step: Option<String>,
}

impl ScopeArgs {
    fn to_scope(&self) -> QueryScope {
        let mut scope = QueryScope::new(&self.pipeline, self.run, &self.trace, self.start);
        scope.end_time = self.end;
        if let Some(step) = &self.step {
            scope = scope.with_step(step);
        }
        scope
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args);

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

fn load_config(args: &Args) -> Result<LokiConfig> {
    let mut config = Settings::load(args.config.as_deref())?.loki;
    Overrides {
        url: args.url.clone(),
        tenant: args.tenant.clone(),
        page_size: args.page_size,
        max_queries: args.max_queries,
    }
    .apply(&mut config);
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    match args.command {
        Command::Check => check(config),
        Command::Query { scope } => query(config, &scope.to_scope()),
        Command::Forget {
            session,
            pipeline,
            run,
            step,
        } => {
            let store = SessionStore::default_location().context("no cache directory")?;
            let key = match (pipeline, run) {
                (Some(pipeline), Some(run)) => Some(RunStepKey::new(pipeline, run, step)),
                _ => None,
            };
            forget(&store, &session, key.as_ref())
        }
        Command::Cat {
            scope,
            skip,
            session,
            grep,
            ignore_case,
            invert_match,
        } => {
            let filter = match grep {
                Some(pattern) => {
                    let filter = LineFilter::new(&pattern, ignore_case)
                        .with_context(|| format!("invalid --grep pattern '{}'", pattern))?;
                    Some(if invert_match { filter.inverted() } else { filter })
                }
                None => None,
            };
            cat(config, &scope.to_scope(), skip, session.as_deref(), filter)
        }
    }
}

fn check(config: LokiConfig) -> Result<()> {
    let retriever = LokiRetriever::new(config)?;
    let validations = retriever.check_setup();
    for validation in &validations {
        println!("{}", validation);
    }
    if validations.iter().all(|v| v.is_ok()) {
        Ok(())
    } else {
        anyhow::bail!("setup check failed")
    }
}

fn query(config: LokiConfig, scope: &QueryScope) -> Result<()> {
    config.validate()?;
    let params = LokiQueryParameters::from_config(scope.clone(), &config);
    let url = params.request_url(
        config.base_url(),
        params.initial_window_start(),
        config.page_size,
    )?;
    let header = logs_view_header(&config, scope, Utc::now());

    println!("{}", params.logql());
    println!("{}", url);
    println!("{}: {}", header.message(), header.url);
    Ok(())
}

fn forget(store: &SessionStore, session: &str, key: Option<&RunStepKey>) -> Result<()> {
    let Some(key) = key else {
        if !store.clear(session)? {
            eprintln!("no saved session '{}'", session);
        }
        return Ok(());
    };

    let cursors = store.load(session)?;
    if cursors.forget(key) {
        store
            .save(session, &cursors)
            .with_context(|| format!("failed to save session '{}'", session))?;
    } else {
        eprintln!("no offsets for {} in session '{}'", key, session);
    }
    Ok(())
}

fn cat(
    config: LokiConfig,
    scope: &QueryScope,
    skip: u64,
    session: Option<&str>,
    filter: Option<LineFilter>,
) -> Result<()> {
    let store = match session {
        Some(_) => Some(SessionStore::default_location().context("no cache directory")?),
        None => None,
    };
    let cursors = match (&store, session) {
        (Some(store), Some(name)) => store.load(name)?,
        _ => CursorCache::new(),
    };
    if skip > 0 && cursors.get(&scope.key(), skip).is_none() {
        tracing::warn!(skip, stream = %scope.key(), "offset not in session, printing from the start");
    }

    let retriever = LokiRetriever::new(config)?;
    let mut result = retriever.retrieve(scope, &cursors).map_err(|e| {
        if e.is_setup_error() {
            anyhow::Error::new(e).context("run `runscope check` to verify the Loki setup")
        } else {
            e.into()
        }
    })?;
    tracing::info!(
        backend = retriever.backend_name(),
        complete = result.complete,
        "{}: {}",
        result.header.message(),
        result.header.url
    );

    let stdout = io::stdout();
    let mut out = FilteredWriter::new(stdout.lock(), filter);
    let copied = result.stream.write_log_to(skip, &mut out);
    result.stream.close();
    out.into_inner()?;

    if let (Some(store), Some(name)) = (&store, session) {
        store
            .save(name, &cursors)
            .with_context(|| format!("failed to save session '{}'", name))?;
    }

    let offset = copied?;
    eprintln!("offset: {}", offset);
    Ok(())
}
