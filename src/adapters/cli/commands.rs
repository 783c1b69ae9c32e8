//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the Nexus Terminal console.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::firebase;
use crate::adapters::local::{self, LocalIdentityProvider};
use crate::application::{
    Console, FlushOutcome, GateHandle, IngestDraft, QueueSnapshot, SignalQueueService,
    QUEUE_FLUSHED_MESSAGE,
};
use crate::config::{load_config, Backend, Config};
use crate::domain::license::validate_credentials;
use crate::domain::{
    generate_access_key, parse_expiry, LicenseRecord, SuperAdminPolicy, ACCESS_KEY_COLLECTION,
    ACTIVITY_COLLECTION, DEFAULT_ACTIVITY_LIMIT, SIGNAL_COLLECTION,
};
use crate::ports::{CollectionQuery, DocumentStore, IdentityProvider};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/console.toml";

/// Nexus Terminal - Super-admin console for the trading-signal service
#[derive(Parser, Debug)]
#[command(
    name = "nexus",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Super-admin console for the trading-signal distribution service",
    long_about = "Nexus Terminal manages the daily trading-signal queue, user identities \
                  and license keys. Only the designated super-admin can open a session."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Operator email (falls back to NEXUS_OPERATOR_EMAIL)
    #[arg(long, global = true, value_name = "EMAIL")]
    pub email: Option<String>,

    /// Operator password (falls back to NEXUS_OPERATOR_PASSWORD)
    #[arg(long, global = true, value_name = "PASSWORD")]
    pub password: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show configuration diagnostics and collection counts
    Status,

    /// Manage the daily signal queue
    #[command(subcommand)]
    Signals(SignalsCmd),

    /// Manage provisioned user identities
    #[command(subcommand)]
    Users(UsersCmd),

    /// Manage license keys
    #[command(subcommand)]
    Licenses(LicensesCmd),

    /// Show recent operator activity
    Activity(ActivityCmd),

    /// Create an account on the local backend (bootstrap)
    LocalAccount(CredentialsArgs),
}

#[derive(Subcommand, Debug)]
pub enum SignalsCmd {
    /// Print the current queue
    Show,

    /// Replace the queue with a JSON array of signals
    Inject(InjectCmd),

    /// Delete the queue document
    Flush(ConfirmArgs),

    /// Follow queue changes until Ctrl+C
    Watch,
}

/// Bulk injection input; reads stdin when neither flag is given
#[derive(Args, Debug)]
pub struct InjectCmd {
    /// Read the JSON array from a file
    #[arg(short, long, value_name = "FILE", conflicts_with = "json")]
    pub file: Option<PathBuf>,

    /// JSON array given inline
    #[arg(long, value_name = "JSON")]
    pub json: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConfirmArgs {
    /// Confirm without prompting
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct CredentialsArgs {
    #[arg(long, value_name = "EMAIL")]
    pub email: String,

    #[arg(long, value_name = "PASSWORD")]
    pub password: String,
}

#[derive(Subcommand, Debug)]
pub enum UsersCmd {
    /// List identities, most recently provisioned first
    List,

    /// Create an identity with a 30-day license
    Provision(CredentialsArgs),

    /// Override the stored password of a record
    SetPassword {
        #[arg(long, value_name = "ID")]
        id: String,

        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },

    /// Delete an identity record
    Purge(PurgeArgs),
}

#[derive(Args, Debug)]
pub struct PurgeArgs {
    /// Record id (the identity uid)
    #[arg(long, value_name = "ID")]
    pub id: String,

    /// Confirm without prompting
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum LicensesCmd {
    /// List license records
    List,

    /// Set the access token and expiry of a record
    Update(UpdateLicenseCmd),

    /// Delete a license record
    Purge(PurgeArgs),

    /// Print a fresh access key
    Keygen,
}

#[derive(Args, Debug)]
pub struct UpdateLicenseCmd {
    #[arg(long, value_name = "ID")]
    pub id: String,

    /// Access token to store (upper-cased)
    #[arg(long, value_name = "TOKEN", required_unless_present = "generate", conflicts_with = "generate")]
    pub token: Option<String>,

    /// Generate a fresh QX-XXXX-XXXX-XXXX token
    #[arg(long)]
    pub generate: bool,

    /// Expiry: RFC 3339, YYYY-MM-DDTHH:MM or YYYY-MM-DD (UTC)
    #[arg(long, value_name = "WHEN")]
    pub expires: String,
}

#[derive(Args, Debug)]
pub struct ActivityCmd {
    /// Number of entries to show
    #[arg(short, long, value_name = "N", default_value_t = DEFAULT_ACTIVITY_LIMIT)]
    pub limit: usize,
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let config = resolve_config(&app.config)?;

    // Initialize logging based on flags
    init_logging(app.verbose, app.debug, &config.logging.level)?;

    let session = SessionArgs {
        config,
        email: app.email.or_else(|| std::env::var("NEXUS_OPERATOR_EMAIL").ok()),
        password: app.password.or_else(|| std::env::var("NEXUS_OPERATOR_PASSWORD").ok()),
    };

    match app.command {
        Command::Status => status_command(&session).await,
        Command::Signals(cmd) => signals_command(&session, cmd).await,
        Command::Users(cmd) => users_command(&session, cmd).await,
        Command::Licenses(cmd) => licenses_command(&session, cmd).await,
        Command::Activity(cmd) => activity_command(&session, cmd).await,
        Command::LocalAccount(cmd) => local_account_command(&session.config, cmd),
    }
}

/// Load the config file; a missing default file means built-in defaults
fn resolve_config(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }
    load_config(path).with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Initialize logging system
fn init_logging(verbose: bool, debug: bool, default_level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        default_level
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

struct SessionArgs {
    config: Config,
    email: Option<String>,
    password: Option<String>,
}

impl SessionArgs {
    fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.email, &self.password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }

    /// Build the console and sign the operator in
    async fn open(&self) -> Result<(Console, GateHandle)> {
        let console = build_console(&self.config)?;
        let Some((email, password)) = self.credentials() else {
            bail!(
                "Operator credentials required.\n\n\
                 Pass --email and --password, or set NEXUS_OPERATOR_EMAIL and \
                 NEXUS_OPERATOR_PASSWORD (a .env file works too)."
            );
        };

        let wait = Duration::from_secs(self.config.console.auth_wait_secs);
        let (gate, _) = console
            .open_session(email, password, wait)
            .await
            .context("Failed to open console session")?;
        Ok((console, gate))
    }
}

/// Wire providers and policy according to the configured backend
pub fn build_console(config: &Config) -> Result<Console> {
    let policy = Arc::new(SuperAdminPolicy::new(config.access.get_super_admin_email()));

    let (identity, store): (Arc<dyn IdentityProvider>, Arc<dyn DocumentStore>) =
        match config.provider.backend {
            Backend::Local => {
                let data_dir = config.provider.get_data_dir();
                tracing::info!("Using local backend at {}", data_dir.display());
                let (identity, store) = local::open_backend(&data_dir)
                    .with_context(|| format!("Failed to open local backend at {}", data_dir.display()))?;
                let identity: Arc<dyn IdentityProvider> = Arc::new(identity);
                let store: Arc<dyn DocumentStore> = Arc::new(store);
                (identity, store)
            }
            Backend::Firebase => {
                let section = config.firebase.resolved();
                tracing::info!("Using Firebase project {}", section.project_id);
                let (auth, store) = firebase::connect(section.options())
                    .context("Failed to create Firebase clients")?;
                let identity: Arc<dyn IdentityProvider> = auth;
                let store: Arc<dyn DocumentStore> = Arc::new(store);
                (identity, store)
            }
        };

    Ok(Console::new(identity, store, policy))
}

async fn close(console: &Console, gate: GateHandle) -> Result<()> {
    console.close_session(gate).await.context("Failed to sign out")?;
    Ok(())
}

/// Ask the operator to type `word`; true when confirmed
fn confirm(word: &str, warning: &str) -> Result<bool> {
    println!();
    println!("WARNING: {}", warning);
    println!();
    print!("Type '{}' to confirm (or use --yes to skip this prompt): ", word);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim() == word)
}

async fn status_command(session: &SessionArgs) -> Result<()> {
    let config = &session.config;

    println!("======================================");
    println!("    Nexus Terminal - Status");
    println!("======================================");
    println!();
    println!("  Super admin:  {}", config.access.get_super_admin_email());
    match config.provider.backend {
        Backend::Local => {
            println!("  Backend:      local");
            println!("  Data dir:     {}", config.provider.get_data_dir().display());
        }
        Backend::Firebase => {
            let section = config.firebase.resolved();
            println!("  Backend:      firebase");
            println!();
            println!("  Credentials:");
            for field in section.diagnostics() {
                let mark = if field.present { "OK     " } else if field.required { "MISSING" } else { "unset  " };
                println!("    [{}] {:<20} ({})", mark, field.field, field.env_var);
            }
        }
    }
    println!();

    if session.credentials().is_none() {
        println!("  Sign in (--email/--password) to include collection counts.");
        return Ok(());
    }

    let (console, gate) = session.open().await?;
    let store = console.store();
    for (label, collection) in [
        ("Queue documents", SIGNAL_COLLECTION),
        ("Access keys", ACCESS_KEY_COLLECTION),
        ("Activity entries", ACTIVITY_COLLECTION),
    ] {
        let count = store
            .query(&CollectionQuery::new(collection))
            .await
            .with_context(|| format!("Failed to read {}", collection))?
            .len();
        println!("  {:<18} {}", format!("{}:", label), count);
    }
    if let Some(queue) = console.signals().current().await? {
        println!("  {:<18} {}", "Signals today:", queue.document.len());
    }

    close(&console, gate).await
}

async fn signals_command(session: &SessionArgs, cmd: SignalsCmd) -> Result<()> {
    let (console, gate) = session.open().await?;
    let signals = console.signals();

    match cmd {
        SignalsCmd::Show => print_queue(signals.current().await?.as_ref()),
        SignalsCmd::Inject(input) => {
            let raw = read_injection(&input)?;
            let mut draft = IngestDraft::new(raw);
            let result = draft.submit(signals).await;
            if let Some(status) = draft.status() {
                println!("{}", status);
            }
            match result {
                Ok(receipt) => println!(
                    "  {} signals -> {}/{}",
                    receipt.signals, SIGNAL_COLLECTION, receipt.document_id
                ),
                Err(e) => {
                    close(&console, gate).await?;
                    return Err(e).context("Queue left unchanged");
                }
            }
        }
        SignalsCmd::Flush(args) => {
            if !args.yes && !confirm("FLUSH", "This deletes today's entire signal queue.")? {
                println!("Aborted. Queue left unchanged.");
            } else {
                match signals.flush().await? {
                    FlushOutcome::Flushed(id) => println!("{} ({})", QUEUE_FLUSHED_MESSAGE, id),
                    FlushOutcome::NothingToFlush => println!("Queue is already empty."),
                }
            }
        }
        SignalsCmd::Watch => watch_queue(signals, &gate).await?,
    }

    close(&console, gate).await
}

fn read_injection(input: &InjectCmd) -> Result<String> {
    if let Some(json) = &input.json {
        return Ok(json.clone());
    }
    if let Some(path) = &input.file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }

    if io::stdin().is_terminal() {
        eprintln!("Paste a JSON array of {{pair, time, type}} objects, then press Ctrl+D:");
    }
    let mut raw = String::new();
    io::stdin().read_to_string(&mut raw).context("Failed to read stdin")?;
    Ok(raw)
}

fn print_queue(queue: Option<&QueueSnapshot>) {
    let Some(queue) = queue else {
        println!("No active queue.");
        return;
    };

    let doc = &queue.document;
    println!("Queue {} (v{})", queue.id, doc.version);
    println!("  Date:         {}", doc.signal_date);
    println!("  Last updated: {}", doc.last_updated);
    println!("  Signals:      {}", doc.len());
    println!();
    for (i, signal) in doc.trading_queue.iter().enumerate() {
        println!("  #{:02}  {:<10} {:<8} {}", i + 1, signal.pair, signal.time, signal.signal_type);
    }
}

async fn watch_queue(signals: &SignalQueueService, gate: &GateHandle) -> Result<()> {
    let mut updates = signals.watch();
    let mut gate_state = gate.subscribe();

    println!("Watching {} (Ctrl+C to stop)", SIGNAL_COLLECTION);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = gate_state.changed() => {
                if changed.is_err() || !gate_state.borrow().is_authorized() {
                    println!("Session ended.");
                    break;
                }
            }
            snapshot = updates.recv() => {
                let Some(snapshot) = snapshot else { break };
                println!();
                println!("--- {} ---", Utc::now().format("%H:%M:%S"));
                match snapshot {
                    Ok(docs) => print_queue(SignalQueueService::snapshot_of(&docs)?.as_ref()),
                    Err(e) => println!("Read failed: {}", e),
                }
            }
        }
    }
    Ok(())
}

async fn users_command(session: &SessionArgs, cmd: UsersCmd) -> Result<()> {
    let (console, gate) = session.open().await?;
    let users = console.identities();

    match cmd {
        UsersCmd::List => print_records(&users.list().await?),
        UsersCmd::Provision(args) => {
            let record = users.provision(&args.email, &args.password).await?;
            println!("Node Deployed: {}", record.email);
            println!("  UID:     {}", record.uid);
            println!("  Expires: {}", record.end_date.as_deref().unwrap_or("-"));
        }
        UsersCmd::SetPassword { id, password } => {
            users.override_password(&id, &password).await?;
            println!("Password override applied to {}", id);
        }
        UsersCmd::Purge(args) => {
            if !args.yes && !confirm("PURGE", &format!("This deletes the record {}.", args.id))? {
                println!("Aborted.");
            } else {
                users.purge(&args.id).await?;
                println!("Purged {}", args.id);
            }
        }
    }

    close(&console, gate).await
}

async fn licenses_command(session: &SessionArgs, cmd: LicensesCmd) -> Result<()> {
    if let LicensesCmd::Keygen = cmd {
        println!("{}", generate_access_key(&mut rand::thread_rng()));
        return Ok(());
    }

    let (console, gate) = session.open().await?;
    let licenses = console.licenses();

    match cmd {
        LicensesCmd::List => print_records(&licenses.list().await?),
        LicensesCmd::Update(args) => {
            let expires = parse_expiry(&args.expires)?;
            let token = match args.token {
                Some(token) => token,
                None => licenses.generate_key(),
            };
            let stored = licenses.update(&args.id, &token, expires).await?;
            println!("License {} updated", args.id);
            println!("  Key:     {}", stored);
            println!("  Expires: {}", expires.to_rfc3339());
        }
        LicensesCmd::Purge(args) => {
            if !args.yes && !confirm("PURGE", &format!("This deletes the license {}.", args.id))? {
                println!("Aborted.");
            } else {
                licenses.purge(&args.id).await?;
                println!("Purged {}", args.id);
            }
        }
        LicensesCmd::Keygen => {}
    }

    close(&console, gate).await
}

fn print_records(records: &[LicenseRecord]) {
    if records.is_empty() {
        println!("No records.");
        return;
    }

    let now = Utc::now();
    println!(
        "{:<30} {:<28} {:<19} {:<9} {}",
        "ID", "EMAIL", "ACCESS KEY", "STATUS", "EXPIRES"
    );
    for record in records {
        let key = if record.is_idle() { "IDLE" } else { record.today_user_access_key.as_str() };
        let status = record
            .status_at(now)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<30} {:<28} {:<19} {:<9} {}",
            record.id,
            record.email,
            key,
            status,
            record.end_date.as_deref().unwrap_or("-")
        );
    }
}

async fn activity_command(session: &SessionArgs, cmd: ActivityCmd) -> Result<()> {
    let (console, gate) = session.open().await?;

    let entries = console.activity().recent(cmd.limit).await?;
    if entries.is_empty() {
        println!("No activity recorded.");
    }
    for entry in &entries {
        println!(
            "{}  {:<10} {}  [{}]",
            entry.timestamp,
            entry.action,
            entry.detail,
            entry.admin.as_deref().unwrap_or("-")
        );
    }

    close(&console, gate).await
}

fn local_account_command(config: &Config, cmd: CredentialsArgs) -> Result<()> {
    if config.provider.backend != Backend::Local {
        bail!("local-account only applies to the local backend");
    }
    validate_credentials(&cmd.email, &cmd.password)?;

    let path = config.provider.get_data_dir().join(local::ACCOUNTS_FILE);
    let identity = LocalIdentityProvider::open(&path)?;
    let uid = identity.register(&cmd.email, &cmd.password)?;

    println!("Created local account {} ({})", cmd.email, uid);
    if cmd.email != config.access.get_super_admin_email() {
        println!("Note: only {} can open console sessions.", config.access.get_super_admin_email());
    }
    Ok(())
}
