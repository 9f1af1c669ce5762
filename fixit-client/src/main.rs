//! FixIt command-line client
//!
//! Signs in to the FixIt ticketing API and lists tickets from a terminal.
//! The session is kept in a JSON state file between invocations.

use std::io;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fixit_client::{AuthSession, Browser, Config, Ticket};
use fixit_session_core::{Capability, GuardView};

#[derive(Parser)]
#[command(name = "fixit", about = "FixIt campus maintenance ticketing client")]
struct Cli {
    /// Base URL of the FixIt API
    #[arg(long, env = "FIXIT_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        /// Prompted for without echo when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out and clear the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Show whether protected pages would open
    Status,
    /// List tickets
    Tickets {
        #[arg(value_enum, default_value_t = TicketView::All)]
        view: TicketView,
    },
    /// Show one ticket
    Ticket { id: u64 },
}

#[derive(Clone, Copy, ValueEnum)]
enum TicketView {
    All,
    Mine,
    Assigned,
    Unassigned,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fixit_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    tracing::debug!(?config, "Loaded configuration");

    let command = match cli.command {
        Command::Login {
            email,
            password: None,
        } => Command::Login {
            email,
            password: Some(prompt_password()?),
        },
        command => command,
    };

    let browser = Browser::with_state_file(config)?;
    let tab = browser.open_tab()?;

    let outcome = run(&tab, command).await;
    let outcome = outcome.map_err(|e| anyhow!(tab.describe(&e)));
    tab.teardown();
    outcome
}

async fn run(tab: &AuthSession, command: Command) -> fixit_client::Result<()> {
    match command {
        Command::Login { email, password } => {
            let password = password.unwrap_or_default();
            let profile = tab.login(&email, &password).await?;
            println!(
                "Signed in as {} ({})",
                profile.full_name.as_deref().unwrap_or(&profile.email),
                profile.role.name
            );
        }
        Command::Logout => {
            tab.logout().await?;
            println!("Signed out");
        }
        Command::Whoami => match tab.restore().await? {
            Some(profile) => {
                println!("{} <{}>", profile.full_name.as_deref().unwrap_or("-"), profile.email);
                println!("Role: {}", profile.role.name);
                let capabilities: Vec<String> = Capability::ALL
                    .iter()
                    .filter(|c| profile.can(**c))
                    .map(|c| format!("{:?}", c))
                    .collect();
                println!("Capabilities: {}", capabilities.join(", "));
                let features: Vec<&str> = profile.features().iter().map(|f| f.as_str()).collect();
                println!("Features: {}", features.join(", "));
            }
            None if tab.store().is_expired() => {
                println!("Your session has expired. Please log in again to continue.")
            }
            None => println!("Not signed in"),
        },
        Command::Status => {
            let guard = tab.verify_route().await;
            let verdict = match guard.view() {
                GuardView::Protected => "authorized",
                GuardView::SessionExpired => "session expired",
                GuardView::RedirectToLogin => "not signed in",
                GuardView::Loading => "checking",
            };
            println!("{}", verdict);
        }
        Command::Tickets { view } => {
            let api = tab.api();
            let tickets = match view {
                TicketView::All => api.tickets().await?,
                TicketView::Mine => api.my_reports().await?,
                TicketView::Assigned => api.assigned_tickets().await?,
                TicketView::Unassigned => api.unassigned_tickets().await?,
            };
            if tickets.is_empty() {
                println!("No tickets");
            }
            for ticket in &tickets {
                print_ticket_line(ticket);
            }
        }
        Command::Ticket { id } => {
            let ticket = tab.api().ticket(id).await?;
            print_ticket_line(&ticket);
            if let Some(location) = &ticket.location_name {
                println!("  Location: {}", location);
            }
            println!("  {}", ticket.description);
        }
    }
    Ok(())
}

fn print_ticket_line(ticket: &Ticket) {
    println!(
        "#{:<5} {:<17} {:<9} {:<12} {}",
        ticket.id,
        format!("{:?}", ticket.status),
        format!("{:?}", ticket.urgency),
        ticket.category,
        ticket.title
    );
}

fn prompt_password() -> Result<String> {
    Ok(rpassword::prompt_password("Password: ")?)
}
