//! User profiles and capabilities
//!
//! The backend returns the profile of the signed-in user from `/profile/`
//! (and embeds it in login/refresh responses). Older backends describe
//! permissions only through a `features` string list and send the role as a
//! bare string; newer ones send boolean capability flags and a role object.
//! Both shapes are normalized here, once, into a [`UserProfile`] carrying a
//! closed set of [`Capabilities`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A permission the backend grants to a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Submit maintenance reports
    Report,
    /// Work on tickets assigned to you
    Fix,
    /// Assign tickets to fixers
    Assign,
    /// Admin-level actions (close, escalate, reports)
    AdminLevel,
    /// Create and manage user accounts
    ManageUsers,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Report,
        Capability::Fix,
        Capability::Assign,
        Capability::AdminLevel,
        Capability::ManageUsers,
    ];
}

/// The capability flags of a profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub can_report: bool,
    pub can_fix: bool,
    pub can_assign: bool,
    pub is_admin_level: bool,
    pub can_manage_users: bool,
}

impl Capabilities {
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Report => self.can_report,
            Capability::Fix => self.can_fix,
            Capability::Assign => self.can_assign,
            Capability::AdminLevel => self.is_admin_level,
            Capability::ManageUsers => self.can_manage_users,
        }
    }

    /// Capabilities implied by a legacy `features` list
    pub fn from_features<S: AsRef<str>>(features: &[S]) -> Self {
        let has = |names: &[&str]| features.iter().any(|f| names.contains(&f.as_ref()));
        Self {
            can_report: has(&["canReport"]),
            can_fix: has(&["assignedTickets"]),
            can_assign: has(&["assignTickets"]),
            is_admin_level: has(&["closeTickets", "reportsView"]),
            can_manage_users: has(&["manageUsers"]),
        }
    }
}

/// A view or action the front end exposes to a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    CanReport,
    MyReports,
    Notifications,
    AssignedTickets,
    UploadProof,
    UpdateStatus,
    WorkHistory,
    Overview,
    AssignTickets,
    ReviewProof,
    Escalate,
    ManageUsers,
    ReportsView,
    CloseTickets,
    SystemSettings,
    AiReports,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::CanReport => "canReport",
            Feature::MyReports => "myReports",
            Feature::Notifications => "notifications",
            Feature::AssignedTickets => "assignedTickets",
            Feature::UploadProof => "uploadProof",
            Feature::UpdateStatus => "updateStatus",
            Feature::WorkHistory => "workHistory",
            Feature::Overview => "overview",
            Feature::AssignTickets => "assignTickets",
            Feature::ReviewProof => "reviewProof",
            Feature::Escalate => "escalate",
            Feature::ManageUsers => "manageUsers",
            Feature::ReportsView => "reportsView",
            Feature::CloseTickets => "closeTickets",
            Feature::SystemSettings => "systemSettings",
            Feature::AiReports => "aiReports",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: Option<u64>,
    pub name: String,
    pub description: Option<String>,
}

impl Role {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
        }
    }

    /// Super admins and university admins get the system-wide views
    pub fn is_system_admin(&self) -> bool {
        let name = self.name.trim().to_lowercase();
        name == "super admin" || name == "university admin"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub full_name: String,
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub year_level: Option<u32>,
    #[serde(default)]
    pub student_id: String,
}

/// The signed-in user's profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireProfile", into = "WireProfile")]
pub struct UserProfile {
    pub id: u64,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub email_verified: bool,
    pub email_domain: Option<String>,
    pub capabilities: Capabilities,
    pub allowed_categories: Vec<String>,
    pub student: Option<StudentProfile>,
}

impl UserProfile {
    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.has(capability)
    }

    /// Features unlocked by this profile, in menu order without duplicates
    pub fn features(&self) -> Vec<Feature> {
        let caps = &self.capabilities;
        let mut features = Vec::new();
        let mut push = |items: &[Feature]| {
            for item in items {
                if !features.contains(item) {
                    features.push(*item);
                }
            }
        };

        if caps.can_report {
            push(&[Feature::CanReport, Feature::MyReports, Feature::Notifications]);
        }
        if caps.can_fix {
            push(&[
                Feature::AssignedTickets,
                Feature::UploadProof,
                Feature::UpdateStatus,
                Feature::WorkHistory,
            ]);
        }
        if caps.can_assign {
            push(&[
                Feature::Overview,
                Feature::AssignTickets,
                Feature::ReviewProof,
                Feature::Escalate,
            ]);
        }
        if caps.can_manage_users {
            push(&[Feature::ManageUsers]);
        }
        if caps.is_admin_level {
            push(&[Feature::ReportsView, Feature::Escalate, Feature::CloseTickets]);
        }
        if self.role.is_system_admin() {
            push(&[Feature::SystemSettings, Feature::AiReports]);
        }

        features
    }

    /// Parse a profile payload as returned by the backend
    pub fn from_json(value: serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(value).map_err(|e| Error::InvalidProfile(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WireRole {
    Name(String),
    Object {
        #[serde(default)]
        id: Option<u64>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

/// Profile as sent over the wire and kept in durable storage
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireProfile {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    full_name: Option<String>,
    #[serde(default)]
    role: Option<WireRole>,
    #[serde(default)]
    is_email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email_domain: Option<String>,
    #[serde(default)]
    can_report: Option<bool>,
    #[serde(default)]
    can_fix: Option<bool>,
    #[serde(default)]
    can_assign: Option<bool>,
    #[serde(default)]
    can_manage_users: Option<bool>,
    #[serde(default)]
    is_admin_level: Option<bool>,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    allowed_categories: Vec<String>,
    #[serde(default)]
    student_profile: Option<StudentProfile>,
}

impl TryFrom<WireProfile> for UserProfile {
    type Error = Error;

    fn try_from(wire: WireProfile) -> Result<Self, Self::Error> {
        let id = wire
            .id
            .ok_or_else(|| Error::InvalidProfile("missing id".into()))?;
        let email = wire
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::InvalidProfile("missing email".into()))?;

        let role = match wire.role {
            Some(WireRole::Name(name)) => Role::named(name),
            Some(WireRole::Object {
                id,
                name: Some(name),
                description,
            }) => Role {
                id,
                name,
                description,
            },
            Some(WireRole::Object { name: None, .. }) | None => {
                return Err(Error::InvalidProfile("missing role".into()));
            }
        };

        // Explicit flags win; anything absent falls back to the features list
        let legacy = Capabilities::from_features(&wire.features);
        let capabilities = Capabilities {
            can_report: wire.can_report.unwrap_or(legacy.can_report),
            can_fix: wire.can_fix.unwrap_or(legacy.can_fix),
            can_assign: wire.can_assign.unwrap_or(legacy.can_assign),
            is_admin_level: wire.is_admin_level.unwrap_or(legacy.is_admin_level),
            can_manage_users: wire.can_manage_users.unwrap_or(legacy.can_manage_users),
        };

        let full_name = wire
            .full_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| wire.student_profile.as_ref().map(|s| s.full_name.clone()));

        Ok(Self {
            id,
            email,
            full_name,
            role,
            email_verified: wire.is_email_verified,
            email_domain: wire.email_domain,
            capabilities,
            allowed_categories: wire.allowed_categories,
            student: wire.student_profile,
        })
    }
}

impl From<UserProfile> for WireProfile {
    fn from(profile: UserProfile) -> Self {
        let features = profile.features().iter().map(|f| f.to_string()).collect();
        let caps = profile.capabilities;
        Self {
            id: Some(profile.id),
            email: Some(profile.email),
            full_name: profile.full_name,
            role: Some(WireRole::Object {
                id: profile.role.id,
                name: Some(profile.role.name),
                description: profile.role.description,
            }),
            is_email_verified: profile.email_verified,
            email_domain: profile.email_domain,
            can_report: Some(caps.can_report),
            can_fix: Some(caps.can_fix),
            can_assign: Some(caps.can_assign),
            can_manage_users: Some(caps.can_manage_users),
            is_admin_level: Some(caps.is_admin_level),
            features,
            allowed_categories: profile.allowed_categories,
            student_profile: profile.student,
        }
    }
}
