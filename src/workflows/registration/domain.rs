use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Store row key for a persisted application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub i64);

/// Public registration identifier (NIU) issued at intake, e.g. `2026_LEV_001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationCode(pub String);

impl RegistrationCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Academic session an application belongs to, rendered as `2026-2027`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionTag(pub String);

impl SessionTag {
    pub fn for_year(year: i32) -> Self {
        Self(format!("{}-{}", year, year + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Stable catalog code referenced by applications and audit entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub String);

impl StatusCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated admin operator acting on applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorId(pub i64);

/// Applicant identity captured by the intake form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantIdentity {
    pub surname: String,
    pub given_name: String,
    pub email: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub birth_place: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub street_address: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub passport_number: Option<String>,
}

fn default_currency() -> String {
    "EUR".to_string()
}

/// Declared household finances and scholarship amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialDetails {
    #[serde(default)]
    pub monthly_income: Option<f64>,
    #[serde(default = "default_currency")]
    pub income_currency: String,
    #[serde(default)]
    pub family_allowance: Option<f64>,
    #[serde(default)]
    pub monthly_rent: Option<f64>,
    #[serde(default)]
    pub possible_contribution: Option<f64>,
    #[serde(default = "default_currency")]
    pub contribution_currency: String,
    #[serde(default)]
    pub scholarship_requested: Option<f64>,
    #[serde(default)]
    pub scholarship_proposed: Option<f64>,
    #[serde(default)]
    pub scholarship_validated: Option<f64>,
}

impl Default for FinancialDetails {
    fn default() -> Self {
        Self {
            monthly_income: None,
            income_currency: default_currency(),
            family_allowance: None,
            monthly_rent: None,
            possible_contribution: None,
            contribution_currency: default_currency(),
            scholarship_requested: None,
            scholarship_proposed: None,
            scholarship_validated: None,
        }
    }
}

/// Free-form form answers kept alongside the typed columns.
pub type ApplicationPayload = Map<String, Value>;

/// Intake request as submitted by the public form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationSubmission {
    pub applicant: ApplicantIdentity,
    #[serde(default)]
    pub finances: FinancialDetails,
    #[serde(default)]
    pub payload: ApplicationPayload,
}

/// Values the store needs to persist a fresh application.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub code: RegistrationCode,
    pub session: SessionTag,
    pub status: StatusCode,
    pub created_at: DateTime<Utc>,
    pub applicant: ApplicantIdentity,
    pub finances: FinancialDetails,
    pub payload: ApplicationPayload,
}

/// Persisted application with its current workflow status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub code: RegistrationCode,
    pub session: SessionTag,
    pub status: StatusCode,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub applicant: ApplicantIdentity,
    pub finances: FinancialDetails,
    pub payload: ApplicationPayload,
}

/// One stage of the admin workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    pub label: String,
    pub color: String,
    pub order: i32,
    pub active: bool,
}

/// Status change requested against an application, checked by the store as a
/// compare-and-set on `previous`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub application: ApplicationId,
    pub previous: StatusCode,
    pub next: StatusCode,
    pub reason: Option<String>,
    pub actor: OperatorId,
    pub origin: String,
    pub at: DateTime<Utc>,
}

/// Immutable audit entry written for every applied status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub sequence: i64,
    pub application: RegistrationCode,
    pub previous_status: Option<StatusCode>,
    pub new_status: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub actor: OperatorId,
    pub origin: String,
    pub recorded_at: DateTime<Utc>,
}

impl TransitionRecord {
    /// Short `RECU → VALIDE` label for operator feedback.
    pub fn summary(&self) -> String {
        match &self.previous_status {
            Some(previous) => format!("{} → {}", previous, self.new_status),
            None => format!("∅ → {}", self.new_status),
        }
    }
}

/// Admin account allowed to work the status workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}
