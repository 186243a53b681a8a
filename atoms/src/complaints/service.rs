use std::sync::Arc;

use super::model::{Complaint, ComplaintStatus, NewComplaint, StatusCounts};
use super::store::ComplaintStore;
use crate::error::Result;
use crate::retry::RetryPolicy;

/// Size of the public "recently resolved" feed.
pub const RESOLVED_FEED_LIMIT: usize = 6;

/// Typed operations on the complaint collection. Every call goes through the
/// retry policy.
pub struct ComplaintRepository<S> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S> Clone for ComplaintRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry,
        }
    }
}

impl<S: ComplaintStore> ComplaintRepository<S> {
    pub fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Readiness probe used before accepting submissions.
    pub async fn check_connection(&self) -> Result<()> {
        let store = &self.store;
        self.retry.run(|| store.probe()).await
    }

    pub async fn submit_complaint(&self, complaint: NewComplaint) -> Result<Complaint> {
        let store = &self.store;
        let created = self
            .retry
            .run(|| store.insert(complaint.clone()))
            .await?;
        tracing::info!(
            complaint_id = %created.id,
            anonymous = created.is_anonymous,
            "Complaint submitted"
        );
        Ok(created)
    }

    /// All complaints, newest first.
    pub async fn load_complaints(&self) -> Result<Vec<Complaint>> {
        let store = &self.store;
        self.retry.run(|| store.scan_all()).await
    }

    /// Most recently resolved complaints, newest `updated_at` first.
    pub async fn load_resolved_complaints(&self, limit: usize) -> Result<Vec<Complaint>> {
        let store = &self.store;
        self.retry.run(|| store.query_resolved(limit)).await
    }

    pub async fn get_complaint(&self, id: &str) -> Result<Complaint> {
        let store = &self.store;
        self.retry.run(|| store.fetch(id)).await
    }

    /// Any status may follow any other; only enum membership is checked,
    /// which the type already guarantees.
    pub async fn update_status(&self, id: &str, status: ComplaintStatus) -> Result<Complaint> {
        let store = &self.store;
        self.retry.run(|| store.set_status(id, status)).await
    }

    pub async fn update_image_url(&self, id: &str, url: &str) -> Result<Complaint> {
        let store = &self.store;
        self.retry.run(|| store.set_image_url(id, url)).await
    }

    /// Deletes the record only. Stored images are the caller's to remove first.
    pub async fn delete_complaint(&self, id: &str) -> Result<()> {
        let store = &self.store;
        self.retry.run(|| store.delete(id)).await
    }

    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let complaints = self.load_complaints().await?;
        Ok(StatusCounts::tally(&complaints))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complaints::model::SubmitComplaintPayload;
    use crate::error::AtomError;
    use crate::memory::MemoryComplaintStore;

    fn repository() -> (Arc<MemoryComplaintStore>, ComplaintRepository<MemoryComplaintStore>) {
        let store = Arc::new(MemoryComplaintStore::new());
        let repo = ComplaintRepository::new(Arc::clone(&store), RetryPolicy::default());
        (store, repo)
    }

    fn anonymous(title: &str) -> NewComplaint {
        SubmitComplaintPayload {
            title: title.into(),
            description: "Loud AC".into(),
            is_anonymous: true,
            ..Default::default()
        }
        .validate()
        .unwrap()
    }

    #[tokio::test]
    async fn submit_returns_the_persisted_record() {
        let (_, repo) = repository();

        let created = repo.submit_complaint(anonymous("Noise")).await.unwrap();

        assert!(!created.id.is_empty());
        assert_eq!(created.status, ComplaintStatus::Pending);
        assert_eq!(created.created_at, created.updated_at);
        assert_eq!(repo.get_complaint(&created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let (_, repo) = repository();
        let a = repo.submit_complaint(anonymous("A")).await.unwrap();
        let b = repo.submit_complaint(anonymous("B")).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn update_status_bumps_updated_at() {
        let (_, repo) = repository();
        let created = repo.submit_complaint(anonymous("Noise")).await.unwrap();

        for status in [
            ComplaintStatus::InProgress,
            ComplaintStatus::Resolved,
            ComplaintStatus::Pending,
            ComplaintStatus::Pending,
        ] {
            let before = repo.get_complaint(&created.id).await.unwrap();
            repo.update_status(&created.id, status).await.unwrap();
            let after = repo.get_complaint(&created.id).await.unwrap();

            assert_eq!(after.status, status);
            assert!(after.updated_at > before.updated_at);
            assert_eq!(after.created_at, before.created_at);
        }
    }

    #[tokio::test]
    async fn missing_ids_are_not_found_without_retry() {
        let (store, repo) = repository();

        let err = repo
            .update_status("missing", ComplaintStatus::Resolved)
            .await
            .unwrap_err();
        assert_eq!(err, AtomError::NotFound("missing".into()));
        assert_eq!(store.calls(), 1);

        assert!(matches!(
            repo.delete_complaint("missing").await,
            Err(AtomError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (_, repo) = repository();
        let first = repo.submit_complaint(anonymous("first")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = repo.submit_complaint(anonymous("second")).await.unwrap();

        let ids: Vec<String> = repo
            .load_complaints()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn resolved_feed_is_limited_and_ordered_by_update() {
        let (_, repo) = repository();
        let mut resolved = Vec::new();
        for i in 0..8 {
            let c = repo.submit_complaint(anonymous(&format!("c{}", i))).await.unwrap();
            repo.update_status(&c.id, ComplaintStatus::Resolved).await.unwrap();
            resolved.push(c.id);
        }
        repo.submit_complaint(anonymous("still pending")).await.unwrap();

        let feed = repo
            .load_resolved_complaints(RESOLVED_FEED_LIMIT)
            .await
            .unwrap();

        assert_eq!(feed.len(), RESOLVED_FEED_LIMIT);
        assert!(feed.iter().all(|c| c.status == ComplaintStatus::Resolved));
        assert!(feed.windows(2).all(|w| w[0].updated_at >= w[1].updated_at));
    }

    #[tokio::test]
    async fn status_counts_tally_every_status() {
        let (_, repo) = repository();
        let a = repo.submit_complaint(anonymous("a")).await.unwrap();
        let b = repo.submit_complaint(anonymous("b")).await.unwrap();
        repo.submit_complaint(anonymous("c")).await.unwrap();
        repo.update_status(&a.id, ComplaintStatus::InProgress).await.unwrap();
        repo.update_status(&b.id, ComplaintStatus::Resolved).await.unwrap();

        let counts = repo.status_counts().await.unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                pending: 1,
                in_progress: 1,
                resolved: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_store_failures_are_retried() {
        let (store, repo) = repository();
        store.fail_next(3);

        repo.check_connection().await.unwrap();
        assert_eq!(store.calls(), 4);

        store.fail_next(4);
        assert!(matches!(
            repo.check_connection().await,
            Err(AtomError::Store(_))
        ));
    }
}
