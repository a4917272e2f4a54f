//! agora - command-line front end for the governance session layer.
//!
//! Signs in, issues authenticated calls with transparent token refresh,
//! and tears the session down again.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agora_core::api::HttpTransport;
use agora_core::auth::{CredentialStore, SessionEvent};
use agora_core::cache::CacheManager;
use agora_core::models::CredentialBundle;
use agora_core::{ApiError, Config, Outcome, RestStack};

const USAGE: &str = "\
Usage: agora <command> [args]

Commands:
  login [handle]                          Sign in and cache the session
  import <identity> <address> <key-file>  Import a credential bundle
  whoami                                  Show the signed-in profile
  get <path>                              Authenticated GET, prints the JSON payload
  status                                  Show session and cache state
  logout                                  Sign out and forget stored credentials";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and to a daily file in the cache directory. The returned
/// guard flushes the file writer and must live until exit.
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_appender = tracing_appender::rolling::daily(log_dir, "agora.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(filter)
        .init();

    guard
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = std::env::var("AGORA_API_URL") {
        config.api_base_url = url;
    }
    if let Ok(url) = std::env::var("AGORA_SERVICE_URL") {
        config.service_url = url;
    }
    if let Ok(handle) = std::env::var("AGORA_HANDLE") {
        config.last_handle = Some(handle);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().cloned() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let mut config = Config::load()?;
    apply_env_overrides(&mut config);
    if command == "login" {
        if let Some(handle) = args.get(1) {
            config.last_handle = Some(handle.clone());
        }
    }

    let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
    let cache = Arc::new(CacheManager::new(cache_dir.clone())?);
    let _guard = init_tracing(&cache_dir);
    info!(command = %command, "agora starting");

    let (tx, mut events) = mpsc::unbounded_channel();
    let stack = RestStack::new(
        &config,
        cache.clone(),
        Arc::new(HttpTransport::new()?),
        Arc::new(tx),
    );
    stack.context.restore();

    let result = match command.as_str() {
        "login" => login(&stack, &mut config).await,
        "import" => import(&cache, &args[1..]),
        "whoami" => whoami(&stack).await,
        "get" => get(&stack, args.get(1)).await,
        "status" => status(&stack, &cache),
        "logout" => logout(&stack, &mut config),
        _ => Err(anyhow::anyhow!("Unknown command: {}\n\n{}", command, USAGE)),
    };

    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Refreshed(session) => {
                info!(identity = %session.identity_id, "Session refreshed during command");
            }
            SessionEvent::LoggedOut if command != "logout" => {
                eprintln!("Session ended. Run `agora login` to sign in again.");
            }
            SessionEvent::LoggedOut => {}
        }
    }

    result
}

async fn login(stack: &RestStack, config: &mut Config) -> Result<()> {
    let handle = match config.last_handle.clone() {
        Some(handle) => handle,
        None => prompt("Handle: ")?,
    };

    let password = match std::env::var("AGORA_PASSWORD") {
        Ok(password) => password,
        Err(_) => match CredentialStore::get_password(&handle) {
            Ok(Some(password)) => password,
            Ok(None) => rpassword::prompt_password("Password: ")?,
            Err(e) => {
                warn!(error = %e, "Keychain unavailable");
                rpassword::prompt_password("Password: ")?
            }
        },
    };

    let session = stack
        .sign_in(&handle, &password)
        .await
        .context("Sign-in failed")?;

    if let Err(e) = CredentialStore::store(&handle, &password) {
        warn!(error = %e, "Failed to store credentials");
    }

    config.last_handle = Some(handle);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Signed in as @{} ({})", session.display_handle, session.identity_id);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn import(cache: &CacheManager, args: &[String]) -> Result<()> {
    let [identity, address, key_file] = args else {
        anyhow::bail!("import needs <identity> <address> <key-file>");
    };
    let signing_key = std::fs::read_to_string(key_file)
        .with_context(|| format!("Failed to read key file: {}", key_file))?;

    let bundle = CredentialBundle {
        identity_id: identity.clone(),
        external_address: address.clone(),
        signing_key: signing_key.trim().to_string(),
    };
    cache.save_credential_bundle(&bundle)?;
    println!("Imported {}", bundle);
    Ok(())
}

async fn whoami(stack: &RestStack) -> Result<()> {
    let session = stack
        .context
        .session()
        .ok_or(ApiError::Unauthenticated)?;

    match stack.client.fetch_profile(&session.identity_id).await {
        Ok(Outcome::Data(profile)) => {
            if let Err(e) = stack.context.cache().save_profile_snapshot(&profile) {
                warn!(error = %e, "Failed to cache profile");
            }
            println!("{} ({})", profile.display(), profile.identity_id);
        }
        Ok(Outcome::Redirect(_)) => println!("@{} (no profile yet)", session.display_handle),
        Err(e) if !e.is_session_expired() => {
            let cached = stack.context.cache().load_profile_snapshot()?;
            match cached {
                Some(profile) => {
                    warn!(error = %e, "Showing cached profile");
                    println!("{} ({}) [cached]", profile.display(), profile.identity_id);
                }
                None => return Err(e.into()),
            }
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn get(stack: &RestStack, path: Option<&String>) -> Result<()> {
    let path = path.ok_or_else(|| anyhow::anyhow!("get needs a <path>"))?;
    match stack.client.get::<serde_json::Value>(path).await? {
        Outcome::Data(data) => println!("{}", serde_json::to_string_pretty(&data)?),
        Outcome::Redirect(_) => anyhow::bail!("Not found: {}", path),
    }
    Ok(())
}

fn status(stack: &RestStack, cache: &CacheManager) -> Result<()> {
    match stack.context.session() {
        Some(session) => println!(
            "Signed in as @{} ({}){}",
            session.display_handle,
            session.identity_id,
            if session.active { "" } else { " [deactivated]" }
        ),
        None => println!("Not signed in"),
    }
    match cache.load_credential_bundle()? {
        Some(bundle) => println!("Credential bundle: {}", bundle),
        None => println!("Credential bundle: none"),
    }
    println!("Cache: {}", cache.dir().display());
    Ok(())
}

fn logout(stack: &RestStack, config: &mut Config) -> Result<()> {
    stack.context.sign_out();
    if let Some(handle) = config.forget_handle() {
        if let Err(e) = CredentialStore::delete(&handle) {
            warn!(error = %e, "Failed to delete stored password");
        }
        if let Err(e) = config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }
    println!("Signed out");
    Ok(())
}
