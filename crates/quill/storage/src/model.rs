use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::StorageError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random id.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Wrap a known id.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque identifier of a document.
    DocumentId
);
string_id!(
    /// Opaque identifier of an edit proposal.
    ProposalId
);
string_id!(
    /// Caller-supplied user identity.
    UserId
);

/// A published text document. The owner never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub body: String,
    pub form: Option<String>,
    pub tone: Option<String>,
    pub owner_id: UserId,
    pub owner_name: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Direct owner edit. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub form: Option<String>,
    pub tone: Option<String>,
    pub is_public: Option<bool>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.form.is_none()
            && self.tone.is_none()
            && self.is_public.is_none()
    }

    pub(crate) fn apply(&self, document: &mut Document, updated_at: DateTime<Utc>) {
        if let Some(title) = &self.title {
            document.title = title.clone();
        }
        if let Some(body) = &self.body {
            document.body = body.clone();
        }
        if let Some(form) = &self.form {
            document.form = Some(form.clone());
        }
        if let Some(tone) = &self.tone {
            document.tone = Some(tone.clone());
        }
        if let Some(is_public) = self.is_public {
            document.is_public = is_public;
        }
        document.updated_at = later_than(document.updated_at, updated_at);
    }
}

/// `candidate`, or one microsecond past `previous` if that is later.
pub(crate) fn later_than(previous: DateTime<Utc>, candidate: DateTime<Utc>) -> DateTime<Utc> {
    candidate.max(previous + Duration::microseconds(1))
}

/// Lifecycle status of a proposal. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = StorageError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(StorageError::InvalidInput(format!(
                "unknown proposal status `{other}`"
            ))),
        }
    }
}

/// A request by a non-owner to replace a document's title and body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub document_id: DocumentId,
    /// Document body when the proposal was opened. Display only.
    pub original_body: String,
    pub proposed_body: String,
    pub proposed_title: String,
    pub proposer_id: UserId,
    pub proposer_name: String,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub review_message: Option<String>,
}

/// Conjunctive proposal filter. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ProposalFilter {
    pub status: Option<ProposalStatus>,
    pub proposer_id: Option<UserId>,
    pub document_ids: Option<Vec<DocumentId>>,
}

impl ProposalFilter {
    pub fn for_document(document_id: DocumentId) -> Self {
        Self {
            document_ids: Some(vec![document_id]),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: ProposalStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_proposer(mut self, proposer_id: UserId) -> Self {
        self.proposer_id = Some(proposer_id);
        self
    }

    pub fn matches(&self, proposal: &Proposal) -> bool {
        if let Some(status) = self.status {
            if proposal.status != status {
                return false;
            }
        }
        if let Some(proposer_id) = &self.proposer_id {
            if &proposal.proposer_id != proposer_id {
                return false;
            }
        }
        if let Some(document_ids) = &self.document_ids {
            if !document_ids.contains(&proposal.document_id) {
                return false;
            }
        }
        true
    }
}

/// Review fields written by a terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewStamp {
    pub reviewed_at: DateTime<Utc>,
    pub review_message: Option<String>,
}

/// Everything an approval writes, applied as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeCommit {
    pub proposal_id: ProposalId,
    pub document_id: DocumentId,
    pub body: String,
    /// New title, only when it differs from the current one.
    pub title: Option<String>,
    pub reviewed_at: DateTime<Utc>,
    pub review_message: Option<String>,
}
