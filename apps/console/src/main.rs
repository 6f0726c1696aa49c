use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, table::TableDefaults, Credentials, FileTokenStore, Order, SessionController,
    SessionEvent, SessionState, SortMode, TableState, TokenStore,
};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Admin console for the storage rental service")]
struct Cli {
    /// Overrides the configured server URL.
    #[arg(long)]
    server_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Whoami,
    /// GET an API path with the current session and print the JSON body.
    Get { path: String },
    /// Fetch one page of a list endpoint.
    List {
        path: String,
        /// Key holding the rows inside the reply, e.g. `storageSpaces`.
        #[arg(long, default_value = "rows")]
        rows_key: String,
        /// Zero-based page.
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        rows_per_page: Option<usize>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        desc: bool,
        /// Keep the server's ordering instead of sorting locally.
        #[arg(long)]
        server_sort: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    let token_path = settings.resolved_token_path();
    debug!(path = %token_path.display(), "console: using token file");
    let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(token_path));
    let table_defaults = TableDefaults::from_settings(&settings);
    let session =
        SessionController::new(settings, store).context("failed to build session controller")?;
    let mut events = session.subscribe_events();

    let outcome = run(&session, cli.command, table_defaults).await;
    report_navigation(&mut events);
    outcome
}

async fn run(
    session: &Arc<SessionController>,
    command: Command,
    table_defaults: TableDefaults,
) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let user = session
                .login(&Credentials::new(email, password))
                .await
                .context("login failed")?;
            println!("signed in as {} ({})", user.label(), user.id);
        }
        Command::Logout => {
            session.logout().await;
            println!("signed out");
        }
        Command::Whoami => match session.restore_session().await {
            SessionState::Authenticated(user) => {
                println!("{}", serde_json::to_string_pretty(&user)?);
            }
            _ => println!("not signed in"),
        },
        Command::Get { path } => {
            require_session(session).await?;
            let body: Value = session
                .pipeline()
                .get_json(&path)
                .await
                .with_context(|| format!("GET {path} failed"))?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::List {
            path,
            rows_key,
            page,
            rows_per_page,
            sort,
            desc,
            server_sort,
        } => {
            require_session(session).await?;
            let mut table: TableState = TableState::new(table_defaults);
            if let Some(rows_per_page) = rows_per_page {
                table.on_change_rows_per_page(rows_per_page);
            }
            table.on_change_page(page);
            if let Some(sort) = sort {
                table.set_order_by(sort);
            }
            table.set_order(if desc { Order::Desc } else { Order::Asc });
            if server_sort {
                table.set_sort_mode(SortMode::Server);
            }

            let reply = session
                .pipeline()
                .fetch_page::<_, Value>(&path, &table.page_query(), &rows_key)
                .await
                .with_context(|| format!("listing {path} failed"))?;
            let rows = table.sort_rows(reply.rows);
            for row in &rows {
                println!("{}", serde_json::to_string(row)?);
            }
            println!(
                "page {} of {} rows ({} per page, sorted by {} {:?})",
                table.page() + 1,
                reply.total,
                table.rows_per_page(),
                table.order_by(),
                table.order(),
            );
        }
    }
    Ok(())
}

async fn require_session(session: &Arc<SessionController>) -> Result<()> {
    if session.restore_session().await.is_authenticated() {
        return Ok(());
    }
    bail!("not signed in; run `console login` first")
}

fn report_navigation(events: &mut broadcast::Receiver<SessionEvent>) {
    for notice in navigation_notices(events) {
        eprintln!("{notice}");
    }
}

fn navigation_notices(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<String> {
    let mut notices = Vec::new();
    loop {
        match events.try_recv() {
            Ok(SessionEvent::SessionExpired) => notices.push("session expired".to_string()),
            Ok(SessionEvent::SignInRequired { path }) => {
                notices.push(format!("sign in again ({path})"))
            }
            Ok(SessionEvent::StateChanged(state)) => {
                debug!(?state, "console: session state changed")
            }
            Err(TryRecvError::Lagged(skipped)) => {
                debug!(skipped, "console: session events dropped")
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    notices
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
