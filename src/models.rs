use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an application email. The taxonomy is fixed; anything
/// the classifier cannot place lands in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Applied,
    Interview,
    #[serde(rename = "OA")]
    Oa,
    Rejected,
    Offer,
    Other,
}

impl Status {
    pub fn all() -> [Status; 6] {
        [
            Status::Applied,
            Status::Interview,
            Status::Oa,
            Status::Rejected,
            Status::Offer,
            Status::Other,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Applied => "Applied",
            Status::Interview => "Interview",
            Status::Oa => "OA",
            Status::Rejected => "Rejected",
            Status::Offer => "Offer",
            Status::Other => "Other",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "applied" => Ok(Status::Applied),
            "interview" => Ok(Status::Interview),
            "oa" => Ok(Status::Oa),
            "rejected" => Ok(Status::Rejected),
            "offer" => Ok(Status::Offer),
            "other" => Ok(Status::Other),
            _ => Err(anyhow::anyhow!("Unknown status '{}'", s)),
        }
    }
}

/// Output of one engine pass over a single message. Every field is total:
/// extraction degrades to defaults, it never fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub status: Status,
    pub company: String,
    pub role: String,
    pub date_applied: DateTime<Utc>,
    pub source_message_id: String,
    pub thread_id: String,
}

/// One row of the ledger, keyed uniquely by `email_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRow {
    pub timestamp: String,
    pub company: String,
    pub role: String,
    pub date_applied: String,
    pub status: Status,
    pub source: String,
    pub email_id: String,
    pub thread_id: String,
    pub followup_due: String,
    pub notes: String,
}

impl LedgerRow {
    /// Derive a ledger row from an extracted record. Dates are rendered as
    /// plain calendar dates; the record keeps the full timestamps.
    pub fn from_record(
        record: &ExtractedRecord,
        timestamp: String,
        date_applied: String,
        followup_due: String,
    ) -> Self {
        Self {
            timestamp,
            company: record.company.clone(),
            role: record.role.clone(),
            date_applied,
            status: record.status,
            source: "Email".to_string(),
            email_id: record.source_message_id.clone(),
            thread_id: record.thread_id.clone(),
            followup_due,
            notes: String::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub fetched: usize,
    pub skipped: usize,
    pub processed: usize,
}
