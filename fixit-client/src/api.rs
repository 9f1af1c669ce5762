//! Typed access to the FixIt REST resources
//!
//! These wrappers only shape requests and responses; ticket workflow rules
//! (who may assign, close or reopen) are enforced by the backend and come
//! back as validation errors.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::ApiClient;
use crate::endpoints;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    Created,
    Assigned,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Needs Assistance")]
    NeedsAssistance,
    Resolved,
    Closed,
    Reopened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    Standard,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Escalation {
    None,
    Secondary,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    pub description: String,
    pub category: String,
    pub urgency: Urgency,
    pub status: TicketStatus,
    #[serde(default, rename = "escalation_level")]
    pub escalation: Option<Escalation>,
    #[serde(default)]
    pub location: Option<u64>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub reporter: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A maintenance report to submit
#[derive(Debug, Clone, Serialize)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub category: String,
    pub urgency: Urgency,
    pub location: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: u64,
    pub building_name: String,
    pub floor_number: String,
    pub room_identifier: String,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - Floor {} - {}",
            self.building_name, self.floor_number, self.room_identifier
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: u64,
    pub action: String,
    #[serde(default)]
    pub performed_by: Option<UserSummary>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub id: u64,
    pub ticket: u64,
    pub resolution_note: String,
    #[serde(default)]
    pub resolved_by: Option<UserSummary>,
}

/// Self-service registration form
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

/// Message-only acknowledgement returned by action endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}

/// List responses come either bare or wrapped in a paginated envelope
#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Plain(Vec<T>),
    Page { results: Vec<T> },
}

impl<T> From<ListBody<T>> for Vec<T> {
    fn from(body: ListBody<T>) -> Self {
        match body {
            ListBody::Plain(items) | ListBody::Page { results: items } => items,
        }
    }
}

impl ApiClient {
    async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let body: ListBody<T> = self.get_json(path).await?;
        Ok(body.into())
    }

    pub async fn tickets(&self) -> Result<Vec<Ticket>> {
        self.list("/tickets/").await
    }

    pub async fn ticket(&self, id: u64) -> Result<Ticket> {
        self.get_json(&format!("/tickets/{}/", id)).await
    }

    pub async fn my_reports(&self) -> Result<Vec<Ticket>> {
        self.list("/tickets/my_reports/").await
    }

    pub async fn assigned_tickets(&self) -> Result<Vec<Ticket>> {
        self.list("/tickets/assigned/").await
    }

    pub async fn unassigned_tickets(&self) -> Result<Vec<Ticket>> {
        self.list("/tickets/unassigned/").await
    }

    pub async fn report_issue(&self, ticket: &NewTicket) -> Result<Ticket> {
        self.post_json("/tickets/report_issue/", ticket).await
    }

    pub async fn assign_ticket(&self, id: u64, assignee_id: u64) -> Result<Ack> {
        self.post_json(
            &format!("/tickets/{}/assign/", id),
            &json!({ "assignee_id": assignee_id }),
        )
        .await
    }

    pub async fn eligible_fixers(&self, id: u64) -> Result<Vec<UserSummary>> {
        self.list(&format!("/tickets/{}/eligible_fixers/", id)).await
    }

    pub async fn resolve_ticket(&self, id: u64, note: &str) -> Result<Resolution> {
        self.post_json(
            &format!("/tickets/{}/resolve/", id),
            &json!({ "resolution_note": note }),
        )
        .await
    }

    pub async fn close_ticket(&self, id: u64) -> Result<Ack> {
        self.post_json(&format!("/tickets/{}/close/", id), &json!({})).await
    }

    pub async fn reopen_ticket(&self, id: u64) -> Result<Ack> {
        self.post_json(&format!("/tickets/{}/reopen/", id), &json!({})).await
    }

    pub async fn locations(&self) -> Result<Vec<Location>> {
        self.list("/locations/").await
    }

    pub async fn users(&self) -> Result<Vec<UserSummary>> {
        self.list("/users/").await
    }

    pub async fn roles(&self) -> Result<Vec<RoleRecord>> {
        self.list("/roles/").await
    }

    pub async fn audit_logs(&self) -> Result<Vec<AuditLogEntry>> {
        self.list("/audit-logs/").await
    }

    pub async fn register(&self, form: &Registration) -> Result<Ack> {
        self.post_json(endpoints::REGISTER, form).await
    }

    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<Ack> {
        self.post_json(endpoints::VERIFY_OTP, &json!({ "email": email, "otp": otp }))
            .await
    }

    pub async fn resend_otp(&self, email: &str) -> Result<Ack> {
        self.post_json(endpoints::RESEND_OTP, &json!({ "email": email }))
            .await
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<Ack> {
        self.post_json(endpoints::FORGOT_PASSWORD_OTP, &json!({ "email": email }))
            .await
    }

    pub async fn confirm_password_reset(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<Ack> {
        let body: Value = json!({
            "email": email,
            "code": code,
            "new_password": new_password,
        });
        self.post_json(endpoints::RESET_PASSWORD_OTP, &body).await
    }
}
