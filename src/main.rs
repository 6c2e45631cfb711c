use std::io::{self, BufRead, Write};

use clap::{Parser, Subcommand};
use incubator_console::{ApiRequest, ClientError, ConfigError, ConsoleConfig, ConsoleState, GuardDecision, StateError};
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to initialise console state: {0}")]
    State(#[from] StateError),
    #[error("not logged in; run `incubator-console login` (redirected to {location})")]
    NotLoggedIn { location: String },
    #[error("session expired; run `incubator-console login` again")]
    SessionExpired,
    #[error("server returned HTTP {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error(transparent)]
    Client(ClientError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("failed to read password: {0}")]
    Io(#[from] io::Error),
}

impl From<ClientError> for CliError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::SessionExpired(_) => Self::SessionExpired,
            ClientError::Status { status, body } => Self::ServerError { status, body },
            other => Self::Client(other),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "incubator-console", about = "Incubator console auth and API CLI")]
struct Cli {
    #[arg(long, env = "CONSOLE_API_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "CONSOLE_STATE_DIR")]
    state_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session locally.
    Login {
        email: String,
        #[arg(long, env = "CONSOLE_PASSWORD", hide_env_values = true, help = "Read from stdin when omitted")]
        password: Option<String>,
    },
    /// End the session on the backend and locally.
    Logout,
    /// Fetch the current user's profile.
    Whoami,
    /// Show the locally stored auth state without calling the backend.
    Status,
    /// Evaluate the route guard for a console path.
    Guard { path: String },
    /// Authenticated GET.
    Get { path: String },
    /// Authenticated POST with a JSON body.
    Post {
        path: String,
        #[arg(long)]
        data: String,
    },
    /// Authenticated DELETE.
    Delete { path: String },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = ConsoleConfig::from_vars(|key| match key {
        "CONSOLE_API_BASE_URL" => cli.base_url.clone(),
        "CONSOLE_STATE_DIR" => cli.state_dir.clone(),
        _ => std::env::var(key).ok(),
    })?;

    let state = ConsoleState::from_config(config)?;
    state.restore_cookies();

    let logging_out = matches!(cli.command, Command::Logout);
    let result = run(&state, cli.command).await;
    if !logging_out {
        state.save_cookies();
    }
    result
}

async fn run(state: &ConsoleState, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login { email, password } => run_login(state, &email, password).await,
        Command::Logout => run_logout(state).await,
        Command::Whoami => {
            enter_protected_area(state)?;
            let session = state.auth.fetch_profile().await?;
            print_json(&serde_json::to_value(&session)?)
        }
        Command::Status => run_status(state),
        Command::Guard { path } => {
            match state.guard.check(&path) {
                GuardDecision::Allow => println!("allow {path}"),
                GuardDecision::Redirect { location } => println!("redirect {location}"),
            }
            Ok(())
        }
        Command::Get { path } => {
            enter_protected_area(state)?;
            let value: Value = state.client.get_json(&path).await?;
            print_json(&value)
        }
        Command::Post { path, data } => {
            enter_protected_area(state)?;
            let body: Value = serde_json::from_str(&data)?;
            let value: Value = state.client.post_json(&path, &body).await?;
            print_json(&value)
        }
        Command::Delete { path } => {
            enter_protected_area(state)?;
            let response = state.client.send(ApiRequest::delete(&path)).await?.error_for_status()?;
            if response.body().is_empty() {
                println!("deleted {path}");
                Ok(())
            } else {
                print_json(&response.json::<Value>()?)
            }
        }
    }
}

async fn run_login(state: &ConsoleState, email: &str, password: Option<String>) -> Result<(), CliError> {
    state.navigation.navigate(state.config.routes.login_route.clone());
    let password = match password {
        Some(password) => password,
        None => read_password()?,
    };
    let session = state.auth.login(email, &password).await?;
    println!("logged in as {} ({})", session.display_name(), session.role);
    Ok(())
}

async fn run_logout(state: &ConsoleState) -> Result<(), CliError> {
    let message = state.auth.logout().await;
    state.forget_cookies();
    println!("{}", message.unwrap_or_else(|| "logged out".to_owned()));
    Ok(())
}

fn run_status(state: &ConsoleState) -> Result<(), CliError> {
    let snapshot = state.store.snapshot();
    print_json(&json!({
        "authenticated": snapshot.token.is_some(),
        "logged_in_flag": state.store.login_flag().is_set(),
        "session": snapshot.session,
    }))
}

/// Navigate into the console the way the UI does on page load: the guard
/// runs first, and API calls are made from inside the protected area.
fn enter_protected_area(state: &ConsoleState) -> Result<(), CliError> {
    let home = state
        .config
        .routes
        .protected_prefixes
        .first()
        .cloned()
        .unwrap_or_else(|| "/".to_owned());
    if let GuardDecision::Redirect { location } = state.guard.check(&home) {
        state.navigation.navigate(location.clone());
        return Err(CliError::NotLoggedIn { location });
    }
    state.navigation.navigate(home);
    Ok(())
}

fn read_password() -> Result<String, CliError> {
    eprint!("password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
