mod config;

use std::sync::Arc;

use anyhow::{Context, bail};
use serde_json::Value;
use sf_auth::{FileStorage, SessionManager, SessionState, TokenStore};
use sf_request::{DispatcherConfig, Method, RequestController, RequestDispatcher};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;

const USAGE: &str = "usage: securet-flow <login | logout | whoami | refresh | get PATH | request METHOD PATH [JSON]>";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Login,
    Logout,
    WhoAmI,
    Refresh,
    Request {
        method: String,
        path: String,
        body: Option<String>,
    },
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let command = args.next().context(USAGE)?;
        Ok(match command.as_str() {
            "login" => Self::Login,
            "logout" => Self::Logout,
            "whoami" => Self::WhoAmI,
            "refresh" => Self::Refresh,
            "get" => Self::Request {
                method: "GET".to_string(),
                path: args.next().context(USAGE)?,
                body: None,
            },
            "request" => Self::Request {
                method: args.next().context(USAGE)?,
                path: args.next().context(USAGE)?,
                body: args.next(),
            },
            other => bail!("unknown command `{other}`\n{USAGE}"),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn,securet_flow=info"))
        .context("Invalid log filter")?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let command = Command::parse(std::env::args().skip(1))?;
    let app = AppConfig::load().await?;

    let session_config = app.session_config()?;
    let storage = FileStorage::new(app.storage_dir()?)?;
    let session = SessionManager::builder(session_config.clone())
        .token_store(TokenStore::single(Arc::new(storage)))
        .build()?;

    if session.restore() {
        info!(api = %session_config.api_base, "Restored session");
    }

    match command {
        Command::Login => {
            let response = login(&session, &app).await?;
            println!("{}", serde_json::to_string_pretty(&response.user)?);
        }
        Command::Logout => {
            session.logout().await;
            println!("Logged out");
        }
        Command::WhoAmI => match session.state() {
            SessionState::Anonymous => println!("Not logged in"),
            SessionState::Authenticated => {
                let user = session.fetch_profile().await?;
                println!("{}", serde_json::to_string_pretty(&user)?);
            }
        },
        Command::Refresh => match session.refresh_token().await? {
            Some(token) => println!("Token refreshed, expires in {}s", token.expires_in),
            None => bail!("Refresh rejected, session cleared"),
        },
        Command::Request { method, path, body } => {
            if !session.is_authenticated() {
                login(&session, &app).await?;
            }

            let dispatcher = RequestDispatcher::new(DispatcherConfig::from_session(&session_config))?
                .with_auth(session.clone());
            let mut options = app.request_options();
            if let Some(body) = body {
                let body: Value = serde_json::from_str(&body).context("Request body is not valid JSON")?;
                options = options.with_body(body);
            }

            let controller = RequestController::<Value>::new();
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method `{method}`"))?;
            if let Err(e) = controller.fetch(&dispatcher, method, &path, options).await {
                bail!("{path}: {e}");
            }
            println!("{:#}", controller.data().unwrap_or(Value::Null));
        }
    }

    // Nothing outlives the process; leave no timer armed.
    session.cancel_refresh();
    Ok(())
}

async fn login(session: &SessionManager, app: &AppConfig) -> anyhow::Result<sf_auth::LoginResponse> {
    let (Some(email), Some(password)) = (&app.email, &app.password) else {
        bail!(
            "No session; set {} and {} to log in",
            config::EMAIL_ENV,
            config::PASSWORD_ENV
        );
    };

    match session.login(email, password).await {
        Ok(response) => {
            info!(user = %response.user.id, "Logged in");
            Ok(response)
        }
        Err(e) => {
            warn!("Login failed: {}", e);
            Err(e).context("Login failed")
        }
    }
}
