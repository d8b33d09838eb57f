//! chartguard: local credential and field-encryption CLI
//!
//! Commands:
//!   status                 - show whether an account exists and its record metadata
//!   init --username <name> - create the account (prompts for a new password)
//!   login                  - check a password against the stored record
//!   passwd                 - change the password; existing fields stay readable
//!   seal                   - encrypt text as one field and print the field JSON
//!   open                   - decrypt a field JSON and print the plaintext
//!   reset --yes            - delete the credential record
//!   config show            - display current configuration
//!
//! Passwords are read from CHARTGUARD_PASSWORD / CHARTGUARD_NEW_PASSWORD when
//! set, otherwise prompted for on the terminal without echo.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};

use chartguard_auth::{AuthError, AuthResult, CredentialStore, Session};
use chartguard_core::config::expand_tilde;
use chartguard_core::{AuthResponse, ChartguardConfig, UserInfo};
use chartguard_crypto::EncryptedField;

const PASSWORD_ENV: &str = "CHARTGUARD_PASSWORD";
const NEW_PASSWORD_ENV: &str = "CHARTGUARD_NEW_PASSWORD";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "chartguard",
    version,
    about = "Zero-knowledge local credential store and field encryption",
    long_about = "chartguard: password-derived envelope encryption for locally stored clinical notes"
)]
struct Cli {
    /// Path to chartguard.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "CHARTGUARD_CONFIG",
        default_value = "~/.config/chartguard/config.toml"
    )]
    config: PathBuf,

    /// Override the data directory holding the credential record
    #[arg(long, env = "CHARTGUARD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level or EnvFilter directive (overrides config)
    #[arg(long, env = "CHARTGUARD_LOG")]
    log: Option<String>,

    /// Log output format (overrides config)
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show whether an account exists and when its password last changed
    Status,

    /// Create the account for this installation
    Init {
        /// Display name stored alongside the record
        #[arg(long, short = 'u')]
        username: String,
    },

    /// Verify a password against the stored record
    Login,

    /// Change the password without re-encrypting any data
    Passwd,

    /// Encrypt text as one field and print it as JSON
    Seal {
        /// Text to encrypt (default: read stdin)
        #[arg(long, short = 't')]
        text: Option<String>,
    },

    /// Decrypt a field produced by `seal`
    Open {
        /// File holding the field JSON (default: read stdin)
        input: Option<PathBuf>,
    },

    /// Delete the credential record. Everything encrypted under it is lost.
    Reset {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

// ── Entry point ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = expand_tilde(&cli.config);
    let mut config = ChartguardConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .unwrap_or_else(|| LogFormat::from_config(&config.log.format));
    init_logging(&level, format);

    let store = CredentialStore::from_config(&config).context("invalid [kdf] configuration")?;
    let session = Arc::new(Session::new(store));
    tracing::debug!(path = %session.store().path().display(), "credential record path");

    match cli.command {
        Commands::Status => cmd_status(&session, cli.json),
        Commands::Init { username } => cmd_init(session, username, cli.json).await,
        Commands::Login => cmd_login(session, cli.json).await,
        Commands::Passwd => cmd_passwd(session, cli.json).await,
        Commands::Seal { text } => cmd_seal(session, text).await,
        Commands::Open { input } => cmd_open(session, input.as_deref()).await,
        Commands::Reset { yes } => cmd_reset(&session, yes),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output; logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Password input ─────────────────────────────────────────────────────────────

fn read_password(prompt: &str) -> Result<SecretString> {
    if let Ok(value) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(value));
    }
    let value = rpassword::prompt_password(prompt).context("reading password")?;
    Ok(SecretString::from(value))
}

fn read_new_password(env_var: &str) -> Result<SecretString> {
    if let Ok(value) = std::env::var(env_var) {
        return Ok(SecretString::from(value));
    }
    let first = SecretString::from(
        rpassword::prompt_password("New password: ").context("reading password")?,
    );
    let second = SecretString::from(
        rpassword::prompt_password("Confirm new password: ").context("reading password")?,
    );
    if first.expose_secret() != second.expose_secret() {
        anyhow::bail!("passwords do not match");
    }
    Ok(first)
}

// ── Blocking work ──────────────────────────────────────────────────────────────

/// Run Argon2 and file I/O off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("blocking task failed")
}

/// Print the login-screen view of an auth result and turn failures into a
/// non-zero exit. Detail beyond the generic message goes to the log only.
fn report(result: AuthResult<UserInfo>, success: &str, json: bool) -> Result<UserInfo> {
    let response = match &result {
        Ok(user) => AuthResponse::success(success, user.clone()),
        Err(e) => {
            tracing::debug!(error = %e, "auth command failed");
            AuthResponse::failure(e.user_message())
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if let Some(user) = &response.user {
        println!("{} ({}, id {})", response.message, user.username, user.user_id);
    }

    result.map_err(|e| anyhow::anyhow!(e.user_message()))
}

async fn sign_in(session: &Arc<Session>) -> Result<UserInfo> {
    let password = read_password("Password: ")?;
    let session = Arc::clone(session);
    blocking(move || session.authenticate(&password))
        .await?
        .map_err(|e| {
            tracing::debug!(error = %e, "sign-in failed");
            anyhow::anyhow!(e.user_message())
        })
}

// ── Commands ───────────────────────────────────────────────────────────────────

fn cmd_status(session: &Session, json: bool) -> Result<()> {
    let store = session.store();
    let path = store.path().display().to_string();

    if !store.exists() {
        if json {
            let body = serde_json::json!({ "initialized": false, "path": path });
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else {
            println!("no account at {path}");
            println!("run `chartguard init --username <name>` to create one");
        }
        return Ok(());
    }

    let record = match store.load() {
        Ok(record) => record,
        Err(e @ AuthError::RecordCorrupt(_)) => {
            anyhow::bail!("credential record at {path} is unreadable: {e}")
        }
        Err(e) => return Err(e).with_context(|| format!("loading {path}")),
    };

    if json {
        let body = serde_json::json!({
            "initialized": true,
            "path": path,
            "user": record.user_info(),
            "created_at": record.created_at,
            "last_password_change": record.last_password_change,
            "kdf": record.kdf.params,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        let params = &record.kdf.params;
        println!("record:          {path}");
        println!("username:        {}", record.user.username);
        println!("user id:         {}", record.user_id);
        println!("created:         {}", record.created_at.to_rfc3339());
        println!("password changed: {}", record.last_password_change.to_rfc3339());
        println!(
            "kdf:             argon2id m={}KiB t={} p={}",
            params.memory_kib, params.iterations, params.parallelism
        );
    }
    Ok(())
}

async fn cmd_init(session: Arc<Session>, username: String, json: bool) -> Result<()> {
    if session.exists() {
        return report(Err(AuthError::AlreadyInitialized), "", json).map(drop);
    }
    let password = read_new_password(PASSWORD_ENV)?;

    let worker = Arc::clone(&session);
    let result = blocking(move || worker.register(&username, &password)).await?;
    report(result, "account created", json)?;
    Ok(())
}

async fn cmd_login(session: Arc<Session>, json: bool) -> Result<()> {
    let password = read_password("Password: ")?;

    let worker = Arc::clone(&session);
    let result = blocking(move || worker.authenticate(&password)).await?;
    report(result, "signed in", json)?;
    session.logout();
    Ok(())
}

async fn cmd_passwd(session: Arc<Session>, json: bool) -> Result<()> {
    let current = read_password("Current password: ")?;
    let new = read_new_password(NEW_PASSWORD_ENV)?;

    let worker = Arc::clone(&session);
    let result = blocking(move || -> AuthResult<UserInfo> {
        let user = worker.authenticate(&current)?;
        worker.change_password(&current, &new)?;
        Ok(user)
    })
    .await?;
    report(result, "password changed", json)?;
    session.logout();
    Ok(())
}

async fn cmd_seal(session: Arc<Session>, text: Option<String>) -> Result<()> {
    let plaintext = match text {
        Some(text) => text,
        None => read_stdin()?,
    };
    sign_in(&session).await?;

    let field = session
        .encrypt_field(&plaintext)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("{}", serde_json::to_string_pretty(&field)?);
    session.logout();
    Ok(())
}

async fn cmd_open(session: Arc<Session>, input: Option<&Path>) -> Result<()> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => read_stdin()?,
    };
    let field: EncryptedField =
        serde_json::from_str(&raw).context("input is not an encrypted field")?;
    sign_in(&session).await?;

    let result = session.decrypt_field(&field);
    session.logout();
    let plaintext = result.map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("{plaintext}");
    Ok(())
}

fn cmd_reset(session: &Session, yes: bool) -> Result<()> {
    let path = session.store().path().display().to_string();
    if !yes {
        anyhow::bail!(
            "refusing to delete {path} without --yes; all data encrypted under this account becomes unreadable"
        );
    }
    if session.reset_account()? {
        println!("deleted {path}");
    } else {
        println!("no account at {path}");
    }
    Ok(())
}

fn cmd_config_show(config: &ChartguardConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Utilities ──────────────────────────────────────────────────────────────────

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("reading stdin")?;
    Ok(buf.trim_end_matches(['\r', '\n']).to_string())
}
