use icrs_atoms::complaints::{
    Complaint, ComplaintRepository, ComplaintStatus, ComplaintStore, SubmitComplaintPayload,
};
use icrs_atoms::media::{AttachmentManager, ObjectStorage, UploadFile};
use icrs_atoms::{AtomError, Result};

use crate::types::{Intent, Outcome};

/// Validates intents against the current record and runs their persistence
/// steps strictly in sequence. No step is applied optimistically: each one
/// runs only after the previous one was confirmed.
pub struct LifecycleController<S, O> {
    complaints: ComplaintRepository<S>,
    attachments: AttachmentManager<O>,
}

impl<S, O> Clone for LifecycleController<S, O> {
    fn clone(&self) -> Self {
        Self {
            complaints: self.complaints.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

impl<S: ComplaintStore, O: ObjectStorage> LifecycleController<S, O> {
    pub fn new(complaints: ComplaintRepository<S>, attachments: AttachmentManager<O>) -> Self {
        Self {
            complaints,
            attachments,
        }
    }

    pub fn complaints(&self) -> &ComplaintRepository<S> {
        &self.complaints
    }

    pub async fn dispatch(&self, intent: Intent) -> Result<Outcome> {
        let name = intent.name();
        let outcome = match intent {
            Intent::Submit(payload) => Outcome::Submitted {
                complaint: self.submit(payload).await?,
            },
            Intent::ChangeStatus { id, status } => Outcome::StatusChanged {
                complaint: self.change_status(&id, status).await?,
            },
            Intent::UploadImage { id, file } => Outcome::ImageAttached {
                complaint: self.upload_image(&id, &file).await?,
            },
            Intent::Delete { id } => {
                self.delete(&id).await?;
                Outcome::Deleted { id }
            }
        };
        tracing::debug!(intent = name, "Intent completed");
        Ok(outcome)
    }

    /// Runs once when an administrative view opens, before any upload.
    pub async fn prepare_admin_view(&self) -> Result<()> {
        self.attachments.ensure_bucket().await
    }

    /// Validation happens before any backend call; the readiness probe gates
    /// the write.
    pub async fn submit(&self, payload: SubmitComplaintPayload) -> Result<Complaint> {
        let complaint = payload.validate()?;
        self.complaints.check_connection().await?;
        self.complaints.submit_complaint(complaint).await
    }

    /// Free transitions. Leaving RESOLVED keeps any linked image.
    pub async fn change_status(&self, id: &str, status: ComplaintStatus) -> Result<Complaint> {
        let updated = self.complaints.update_status(id, status).await?;
        tracing::info!(complaint_id = id, status = %status, "Status updated");
        Ok(updated)
    }

    /// Upload, then link. The link step only runs after the upload
    /// succeeded; a failed link leaves an unlinked object and surfaces the
    /// error for a manual retry. A replaced image is removed best-effort once
    /// the new one is linked.
    pub async fn upload_image(&self, id: &str, file: &UploadFile) -> Result<Complaint> {
        let current = self.complaints.get_complaint(id).await?;
        if current.status != ComplaintStatus::Resolved {
            return Err(AtomError::InvalidState(format!(
                "complaint {} is {}; images can only be attached to RESOLVED complaints",
                id, current.status
            )));
        }

        let url = self.attachments.upload(id, file).await?;

        match self.complaints.update_image_url(id, &url).await {
            Ok(complaint) => {
                tracing::info!(complaint_id = id, image_url = %url, "Image linked");
                if let Some(previous) = current.image_url.as_deref().filter(|old| *old != url) {
                    self.attachments.remove_by_url(previous).await;
                }
                Ok(complaint)
            }
            Err(e) => {
                tracing::error!(complaint_id = id, image_url = %url, error = %e, "Upload error: image stored but not linked");
                Err(e)
            }
        }
    }

    /// Best-effort image cleanup first, then the record. Only a failed
    /// record delete fails the intent.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let current = self.complaints.get_complaint(id).await?;

        if let Some(url) = current.image_url.as_deref() {
            self.attachments.remove_by_url(url).await;
        }

        self.complaints.delete_complaint(id).await?;
        tracing::info!(complaint_id = id, "Complaint deleted");
        Ok(())
    }
}
