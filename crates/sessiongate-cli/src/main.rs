//! sessiongate - command-line front end for the identity backend.
//!
//! Each subcommand stands in for one page of the web client: login,
//! signup, dashboard, forgot/update password and logout. `watch` keeps a
//! session alive in the foreground the way the dashboard does.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sessiongate_core::auth::AuthState;
use sessiongate_core::flows::{LoginOutcome, SignupOutcome, UpdateOutcome};
use sessiongate_core::{App, Config, Navigator, Route};

// ============================================================================
// Constants
// ============================================================================

/// Log file name prefix used when `SESSIONGATE_LOG_DIR` is set
const LOG_FILE_PREFIX: &str = "sessiongate.log";

const DEFAULT_OAUTH_PROVIDER: &str = "google";

#[derive(Parser)]
#[command(name = "sessiongate", version, about = "Sign in, check and keep alive a session with the identity backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
        /// Keep the tokens after this process exits
        #[arg(long)]
        remember: bool,
        /// Stay running and watch the session after logging in
        #[arg(long)]
        watch: bool,
    },
    /// Print the URL that starts an OAuth login
    LoginOauth {
        #[arg(long, default_value = DEFAULT_OAUTH_PROVIDER)]
        provider: String,
    },
    /// Create an account
    Signup {
        #[arg(long)]
        email: Option<String>,
    },
    /// Show who is signed in
    Dashboard,
    /// Check the session, then watch it until signed out or interrupted
    Watch,
    /// Send a password reset email
    ForgotPassword {
        #[arg(long)]
        email: Option<String>,
    },
    /// Set a new password for the signed-in user
    UpdatePassword,
    /// Sign out and forget stored tokens
    Logout,
}

/// Prints redirects in place of a browser navigation.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: Route) {
        info!(%route, "Redirect");
        eprintln!("-> {}", route);
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var("SESSIONGATE_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let cli = Cli::parse();

    let config = Config::load().context("Failed to load config")?;
    let app = App::new(config, Arc::new(TerminalNavigator))?;

    match cli.command {
        Command::Login {
            email,
            remember,
            watch,
        } => login(app, email, remember, watch).await,
        Command::LoginOauth { provider } => {
            let url = app
                .login_flow()
                .oauth_url(&provider, &app.config.dashboard_url)?;
            println!("Open this URL to continue with {}:\n{}", provider, url);
            Ok(ExitCode::SUCCESS)
        }
        Command::Signup { email } => signup(&app, email).await,
        Command::Dashboard => {
            dashboard(&app).await;
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch => watch(&app).await,
        Command::ForgotPassword { email } => {
            let email = prompt_email(email, app.config.last_email.as_deref())?;
            let outcome = app.password_flow().request_reset(&email).await;
            println!("{}", outcome.message());
            Ok(ExitCode::SUCCESS)
        }
        Command::UpdatePassword => update_password(&app).await,
        Command::Logout => {
            app.logout_flow().logout().await;
            println!("Logged out");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn login(app: App, email: Option<String>, remember: bool, watch_after: bool) -> Result<ExitCode> {
    let email = prompt_email(email, app.config.last_email.as_deref())?;
    let password = rpassword::prompt_password("Password: ")?;
    let remember_me = remember || app.config.remember_me;

    let outcome = app.login_flow().submit(&email, &password, remember_me).await;
    print_dialog(outcome.title(), &outcome.message());

    match outcome {
        LoginOutcome::Success { .. } => {
            if let Err(e) = Config::remember_email(&email) {
                warn!(error = %e, "Failed to save config");
            }
            app.navigator.navigate(Route::Dashboard);
            if watch_after {
                return watch(&app).await;
            }
            Ok(ExitCode::SUCCESS)
        }
        LoginOutcome::VerificationRequired | LoginOutcome::Failed { .. } => Ok(ExitCode::FAILURE),
    }
}

async fn signup(app: &App, email: Option<String>) -> Result<ExitCode> {
    let email = prompt_email(email, None)?;
    let password = rpassword::prompt_password("Password: ")?;

    let outcome = app.signup_flow().submit(&email, &password).await;
    print_dialog(outcome.title(), outcome.message());

    match outcome {
        SignupOutcome::VerificationSent => {
            app.navigator.navigate(Route::Login);
            Ok(ExitCode::SUCCESS)
        }
        SignupOutcome::AlreadyRegistered | SignupOutcome::Failed { .. } => Ok(ExitCode::FAILURE),
    }
}

async fn dashboard(app: &App) -> AuthState {
    let state = app.reconciler().reconcile().await;
    match state.email() {
        Some(email) => println!("Welcome, {}!", email),
        None => println!("Not logged in"),
    }
    state
}

async fn watch(app: &App) -> Result<ExitCode> {
    if !dashboard(app).await.is_authenticated() {
        return Ok(ExitCode::FAILURE);
    }

    let mut handle = app.watcher().spawn();
    eprintln!("Watching session (Ctrl+C to stop)");

    let signed_out = tokio::select! {
        _ = handle.finished() => true,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            false
        }
    };

    if signed_out {
        println!("Session ended");
    } else {
        handle.teardown().await;
    }
    Ok(ExitCode::SUCCESS)
}

async fn update_password(app: &App) -> Result<ExitCode> {
    // The managed session only lives in this process; restore it first
    if !app.reconciler().reconcile().await.is_authenticated() {
        println!("Not logged in");
        return Ok(ExitCode::FAILURE);
    }

    let password = rpassword::prompt_password("New password: ")?;
    let outcome = app.password_flow().update_password(&password).await;
    println!("{}", outcome.message());
    match outcome {
        UpdateOutcome::Updated => Ok(ExitCode::SUCCESS),
        UpdateOutcome::Failed { .. } => Ok(ExitCode::FAILURE),
    }
}

fn print_dialog(title: &str, message: &str) {
    println!("{}\n{}", title, message);
}

fn prompt_email(given: Option<String>, last: Option<&str>) -> Result<String> {
    if let Some(email) = given.filter(|e| !e.trim().is_empty()) {
        return Ok(email.trim().to_string());
    }

    match last {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), last) {
        (false, _) => Ok(input.to_string()),
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => Err(anyhow::anyhow!("Email required")),
    }
}
