use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AtomError, Result};

/// Lifecycle status of a complaint. Any status is reachable from any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplaintStatus {
    Pending,
    InProgress,
    Resolved,
}

impl ComplaintStatus {
    pub const ALL: [ComplaintStatus; 3] = [
        ComplaintStatus::Pending,
        ComplaintStatus::InProgress,
        ComplaintStatus::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Pending => "PENDING",
            ComplaintStatus::InProgress => "IN_PROGRESS",
            ComplaintStatus::Resolved => "RESOLVED",
        }
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplaintStatus {
    type Err = AtomError;

    fn from_str(s: &str) -> Result<Self> {
        ComplaintStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AtomError::Validation(format!("unknown status '{}'", s)))
    }
}

/// Complaint domain model - the only persisted entity
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Complaint {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: ComplaintStatus,
    pub is_anonymous: bool,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Only ever linked while the complaint is RESOLVED; kept on a later
    /// status change.
    pub image_url: Option<String>,
}

/// Raw submission as it arrives from the form.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct SubmitComplaintPayload {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub student_email: Option<String>,
}

/// A submission that passed validation. Only [`SubmitComplaintPayload::validate`]
/// builds one, so stores can persist it without re-checking.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct NewComplaint {
    pub title: String,
    pub description: String,
    pub is_anonymous: bool,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
}

impl SubmitComplaintPayload {
    /// Trims text fields and enforces the anonymity invariant: anonymous
    /// submissions drop whatever identity was supplied, named ones need both
    /// a name and an email.
    pub fn validate(self) -> Result<NewComplaint> {
        let title = self.title.trim().to_string();
        let description = self.description.trim().to_string();

        if title.is_empty() {
            return Err(AtomError::Validation("title is required".into()));
        }
        if description.is_empty() {
            return Err(AtomError::Validation("description is required".into()));
        }

        if self.is_anonymous {
            return Ok(NewComplaint {
                title,
                description,
                is_anonymous: true,
                student_name: None,
                student_email: None,
            });
        }

        let student_name = trimmed(self.student_name)
            .ok_or_else(|| AtomError::Validation("student name is required".into()))?;
        let student_email = trimmed(self.student_email)
            .ok_or_else(|| AtomError::Validation("student email is required".into()))?;
        if !student_email.contains('@') {
            return Err(AtomError::Validation(
                "student email must be a valid address".into(),
            ));
        }

        Ok(NewComplaint {
            title,
            description,
            is_anonymous: false,
            student_name: Some(student_name),
            student_email: Some(student_email),
        })
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusPayload {
    pub status: ComplaintStatus,
}

/// Per-status totals shown on the administrative summary.
#[derive(Debug, Serialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub resolved: usize,
}

impl StatusCounts {
    pub fn tally(complaints: &[Complaint]) -> Self {
        complaints
            .iter()
            .fold(StatusCounts::default(), |mut counts, complaint| {
                match complaint.status {
                    ComplaintStatus::Pending => counts.pending += 1,
                    ComplaintStatus::InProgress => counts.in_progress += 1,
                    ComplaintStatus::Resolved => counts.resolved += 1,
                }
                counts
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change notification on the complaint collection.
///
/// `old_status` is absent for inserts, `new_status` for deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub id: String,
    pub old_status: Option<ComplaintStatus>,
    pub new_status: Option<ComplaintStatus>,
}

impl ChangeEvent {
    pub fn inserted(complaint: &Complaint) -> Self {
        Self {
            kind: ChangeKind::Insert,
            id: complaint.id.clone(),
            old_status: None,
            new_status: Some(complaint.status),
        }
    }

    pub fn updated(before: &Complaint, after: &Complaint) -> Self {
        Self {
            kind: ChangeKind::Update,
            id: after.id.clone(),
            old_status: Some(before.status),
            new_status: Some(after.status),
        }
    }

    pub fn deleted(complaint: &Complaint) -> Self {
        Self {
            kind: ChangeKind::Delete,
            id: complaint.id.clone(),
            old_status: Some(complaint.status),
            new_status: None,
        }
    }

    /// True when either image of the row carries `status`.
    pub fn touches_status(&self, status: ComplaintStatus) -> bool {
        self.old_status == Some(status) || self.new_status == Some(status)
    }
}

/// Store timestamps carry microsecond precision so the persisted string and
/// the in-memory value compare equal.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// `updated_at` for a write over a row last stamped `previous`. Always at
/// least one microsecond later, even within one clock tick or on a lagging
/// clock.
pub fn next_updated_at(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    now.max(previous + Duration::microseconds(1))
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AtomError::Store(format!("invalid timestamp '{}': {}", value, e)))
}
