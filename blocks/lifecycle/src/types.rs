use icrs_atoms::complaints::{Complaint, ComplaintStatus, SubmitComplaintPayload};
use icrs_atoms::media::UploadFile;
use serde::Serialize;

/// Everything a view can ask the lifecycle controller to do.
#[derive(Debug, Clone)]
pub enum Intent {
    Submit(SubmitComplaintPayload),
    ChangeStatus {
        id: String,
        status: ComplaintStatus,
    },
    UploadImage {
        id: String,
        file: UploadFile,
    },
    Delete {
        id: String,
    },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Submit(_) => "submit",
            Intent::ChangeStatus { .. } => "change_status",
            Intent::UploadImage { .. } => "upload_image",
            Intent::Delete { .. } => "delete",
        }
    }
}

/// Server-confirmed result of an intent; views only update from these.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Submitted { complaint: Complaint },
    StatusChanged { complaint: Complaint },
    ImageAttached { complaint: Complaint },
    Deleted { id: String },
}

impl Outcome {
    pub fn complaint(&self) -> Option<&Complaint> {
        match self {
            Outcome::Submitted { complaint }
            | Outcome::StatusChanged { complaint }
            | Outcome::ImageAttached { complaint } => Some(complaint),
            Outcome::Deleted { .. } => None,
        }
    }
}
