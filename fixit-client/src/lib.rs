//! FixIt Client
//!
//! Talks to the FixIt campus ticketing REST API on behalf of a signed-in
//! user. Access tokens are attached to private requests, refreshed silently
//! when they lapse, and kept in step across every tab of a browser context.

pub mod api;
pub mod browser;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod refresh;
pub mod scope;
pub mod session;
pub mod sync;

pub use api::{
    Ack, AuditLogEntry, Escalation, Location, NewTicket, Registration, Resolution, RoleRecord,
    Ticket, TicketStatus, Urgency, UserSummary,
};
pub use browser::Browser;
pub use client::ApiClient;
pub use config::Config;
pub use error::{ClientError, Result};
pub use refresh::RefreshCoordinator;
pub use scope::ViewScope;
pub use session::AuthSession;
