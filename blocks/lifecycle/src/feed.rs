use std::future::Future;

use icrs_atoms::complaints::{
    ChangeEvent, Complaint, ComplaintRepository, ComplaintStatus, ComplaintStore,
    RESOLVED_FEED_LIMIT,
};
use icrs_atoms::Result;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Where a refreshed resolved feed goes: an in-process watch channel or the
/// websocket connections of open views.
pub trait FeedPublisher: Send + Sync {
    fn publish(&self, complaints: &[Complaint]) -> impl Future<Output = Result<()>> + Send;
}

impl FeedPublisher for watch::Sender<Vec<Complaint>> {
    async fn publish(&self, complaints: &[Complaint]) -> Result<()> {
        self.send_replace(complaints.to_vec());
        Ok(())
    }
}

/// Keeps the public "recently resolved" feed current by re-fetching it
/// whenever a change touches a RESOLVED row. No diffing: every matching
/// notification is a full re-fetch.
pub struct LiveFeed<S> {
    repo: ComplaintRepository<S>,
    limit: usize,
}

impl<S> Clone for LiveFeed<S> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            limit: self.limit,
        }
    }
}

impl<S: ComplaintStore + 'static> LiveFeed<S> {
    pub fn new(repo: ComplaintRepository<S>) -> Self {
        Self::with_limit(repo, RESOLVED_FEED_LIMIT)
    }

    pub fn with_limit(repo: ComplaintRepository<S>, limit: usize) -> Self {
        Self { repo, limit }
    }

    pub async fn refresh(&self) -> Result<Vec<Complaint>> {
        self.repo.load_resolved_complaints(self.limit).await
    }

    /// True when any event has RESOLVED on either side, so rows leaving the
    /// feed count too.
    pub fn matches(events: &[ChangeEvent]) -> bool {
        events
            .iter()
            .any(|event| event.touches_status(ComplaintStatus::Resolved))
    }

    /// Re-fetches and publishes once per batch of change events. Returns
    /// whether anything was published.
    pub async fn handle_changes<P: FeedPublisher>(
        &self,
        events: &[ChangeEvent],
        publisher: &P,
    ) -> Result<bool> {
        if !Self::matches(events) {
            tracing::debug!(events = events.len(), "No resolved changes in batch");
            return Ok(false);
        }

        self.publish_to(publisher).await?;
        Ok(true)
    }

    /// Unconditional re-fetch and publish.
    pub async fn publish_to<P: FeedPublisher>(&self, publisher: &P) -> Result<()> {
        let complaints = self.refresh().await?;
        publisher.publish(&complaints).await?;
        tracing::info!(count = complaints.len(), "Published resolved feed");
        Ok(())
    }

    /// Starts a standing subscription for one view-session. The initial
    /// snapshot is published right away, then again after every matching
    /// change.
    pub fn subscribe(&self, mut changes: broadcast::Receiver<ChangeEvent>) -> FeedSubscription {
        let (sender, receiver) = watch::channel(Vec::new());
        let feed = self.clone();

        let task = tokio::spawn(async move {
            feed.republish(&sender).await;
            loop {
                match changes.recv().await {
                    Ok(event) => {
                        if event.touches_status(ComplaintStatus::Resolved) {
                            feed.republish(&sender).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Feed subscriber lagged, re-fetching");
                        feed.republish(&sender).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Change channel closed, feed subscription ended");
        });

        FeedSubscription {
            receiver,
            task: Some(task),
        }
    }

    // A failed re-fetch keeps the previous feed
    async fn republish(&self, sender: &watch::Sender<Vec<Complaint>>) {
        match self.refresh().await {
            Ok(complaints) => {
                let _ = sender.publish(&complaints).await;
            }
            Err(e) => tracing::error!(error = %e, "Error fetching resolved complaints"),
        }
    }
}

/// Handle on a running feed subscription. Dropping it unsubscribes.
pub struct FeedSubscription {
    receiver: watch::Receiver<Vec<Complaint>>,
    task: Option<JoinHandle<()>>,
}

impl FeedSubscription {
    /// Last published feed; empty until the first snapshot lands.
    pub fn current(&self) -> Vec<Complaint> {
        self.receiver.borrow().clone()
    }

    /// Waits for the next publish. `None` once the subscription has ended.
    pub async fn changed(&mut self) -> Option<Vec<Complaint>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Unconditional and idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Feed subscription closed");
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
