use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the output of an export ultimately lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Destination {
    /// Exported to a staging area, then downloaded by a follow-up transfer.
    LocalStaging,
    /// Exported straight into the provider's asset store.
    RemoteAsset,
}

impl Destination {
    /// Display name used in every status description.
    pub fn label(&self) -> &'static str {
        match self {
            Self::LocalStaging => "local staging area",
            Self::RemoteAsset => "remote asset store",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalStaging => "local-staging",
            Self::RemoteAsset => "remote-asset",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local-staging" => Ok(Self::LocalStaging),
            "remote-asset" => Ok(Self::RemoteAsset),
            other => Err(format!("unknown destination: {}", other)),
        }
    }
}

/// Native job state as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawJobState {
    Unsubmitted,
    Ready,
    Running,
    Completed,
    Failed,
    CancelRequested,
    Cancelled,
    /// Any state this build does not know about yet.
    #[serde(other)]
    Unknown,
}

/// A point-in-time view of a job, as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawJobSnapshot {
    pub id: String,
    #[serde(default)]
    pub task_type: String,
    #[serde(default)]
    pub description: String,
    pub state: RawJobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RawJobSnapshot {
    pub fn new(id: impl Into<String>, state: RawJobState) -> Self {
        Self {
            id: id.into(),
            task_type: "EXPORT_IMAGE".to_string(),
            description: String::new(),
            state,
            error_message: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusState {
    Active,
    Completed,
    Failed,
    Canceled,
}

impl StatusState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// Sub-phase of an active export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportStep {
    Exporting,
    Exported,
}

impl fmt::Display for ExportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exporting => write!(f, "EXPORTING"),
            Self::Exported => write!(f, "EXPORTED"),
        }
    }
}

/// The status record handed to listeners.
///
/// Only constructible through the associated functions, which keep `step`
/// absent for every state other than [`StatusState::Active`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedStatus {
    state: StatusState,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<ExportStep>,
}

impl NormalizedStatus {
    pub fn active(description: impl Into<String>, step: ExportStep) -> Self {
        Self {
            state: StatusState::Active,
            description: description.into(),
            step: Some(step),
        }
    }

    pub fn completed() -> Self {
        Self {
            state: StatusState::Completed,
            description: "Completed".to_string(),
            step: None,
        }
    }

    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            state: StatusState::Failed,
            description: description.into(),
            step: None,
        }
    }

    pub fn canceled() -> Self {
        Self {
            state: StatusState::Canceled,
            description: "Canceled".to_string(),
            step: None,
        }
    }

    pub fn state(&self) -> StatusState {
        self.state
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn step(&self) -> Option<ExportStep> {
        self.step
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

impl fmt::Display for NormalizedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            Some(step) => write!(f, "[{}/{}] {}", self.state, step, self.description),
            None => write!(f, "[{}] {}", self.state, self.description),
        }
    }
}

/// Access credentials bound to a provider session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
