use std::future::Future;
use std::sync::Arc;

use aws_sdk_apigatewaymanagement::error::DisplayErrorContext;
use aws_sdk_apigatewaymanagement::primitives::Blob;
use aws_sdk_apigatewaymanagement::Client as ApiGwClient;
use futures::future::join_all;
use icrs_atoms::complaints::Complaint;
use icrs_atoms::{AtomError, Result};
use lifecycle_block::FeedPublisher;

use super::connections::ConnectionRegistry;
use super::messages::BroadcastMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostFailure {
    /// The connection no longer exists on the API Gateway side.
    Gone,
    Other(String),
}

/// Delivers one payload to one websocket connection.
pub trait ConnectionPoster: Send + Sync {
    fn post(
        &self,
        connection_id: &str,
        payload: &[u8],
    ) -> impl Future<Output = std::result::Result<(), PostFailure>> + Send;
}

impl ConnectionPoster for ApiGwClient {
    async fn post(&self, connection_id: &str, payload: &[u8]) -> std::result::Result<(), PostFailure> {
        self.post_to_connection()
            .connection_id(connection_id)
            .data(Blob::new(payload.to_vec()))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_gone_exception()) {
                    PostFailure::Gone
                } else {
                    PostFailure::Other(format!(
                        "PostToConnection error: {}",
                        DisplayErrorContext(&e)
                    ))
                }
            })
    }
}

/// Pushes the resolved feed to every registered view over the API Gateway
/// management API. Connections reported gone are pruned from the registry.
pub struct WebSocketBroadcaster<R, C = ApiGwClient> {
    poster: C,
    registry: Arc<R>,
}

impl<R, C: Clone> Clone for WebSocketBroadcaster<R, C> {
    fn clone(&self) -> Self {
        Self {
            poster: self.poster.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<R: ConnectionRegistry, C: ConnectionPoster> WebSocketBroadcaster<R, C> {
    pub fn new(poster: C, registry: Arc<R>) -> Self {
        Self { poster, registry }
    }

    /// Sends one payload to one connection. A gone connection is removed
    /// and reported as `Ok(false)`.
    pub async fn send_to(&self, connection_id: &str, payload: &[u8]) -> Result<bool> {
        match self.poster.post(connection_id, payload).await {
            Ok(()) => Ok(true),
            Err(PostFailure::Gone) => {
                self.prune(connection_id).await;
                Ok(false)
            }
            Err(PostFailure::Other(e)) => Err(AtomError::Store(e)),
        }
    }

    async fn prune(&self, connection_id: &str) {
        tracing::info!(connection_id, "Pruning gone connection");
        if let Err(e) = self.registry.remove(connection_id).await {
            tracing::warn!(connection_id, error = %e, "Failed to prune connection");
        }
    }
}

impl<R: ConnectionRegistry, C: ConnectionPoster> FeedPublisher for WebSocketBroadcaster<R, C> {
    /// Only a failed registry read fails the publish; individual posts are
    /// best-effort.
    async fn publish(&self, complaints: &[Complaint]) -> Result<()> {
        let payload = BroadcastMessage::resolved_feed(complaints)
            .to_bytes()
            .map_err(|e| AtomError::Store(format!("Feed serialization error: {}", e)))?;
        let connections = self.registry.list().await?;

        let results = join_all(
            connections
                .iter()
                .map(|id| self.poster.post(id, &payload)),
        )
        .await;

        let mut delivered = 0;
        for (connection_id, result) in connections.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(PostFailure::Gone) => self.prune(connection_id).await,
                Err(PostFailure::Other(e)) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "Feed delivery failed")
                }
            }
        }

        tracing::info!(
            connections = connections.len(),
            delivered,
            "Broadcast resolved feed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryRegistry {
        ids: Mutex<BTreeSet<String>>,
        fail_list: bool,
    }

    impl MemoryRegistry {
        fn with(ids: &[&str]) -> Self {
            Self {
                ids: Mutex::new(ids.iter().map(|id| id.to_string()).collect()),
                fail_list: false,
            }
        }
    }

    impl ConnectionRegistry for MemoryRegistry {
        async fn register(&self, connection_id: &str) -> Result<()> {
            self.ids.lock().unwrap().insert(connection_id.to_string());
            Ok(())
        }

        async fn remove(&self, connection_id: &str) -> Result<()> {
            self.ids.lock().unwrap().remove(connection_id);
            Ok(())
        }

        async fn list(&self) -> Result<Vec<String>> {
            if self.fail_list {
                return Err(AtomError::Store("scan failed".into()));
            }
            Ok(self.ids.lock().unwrap().iter().cloned().collect())
        }
    }

    /// Records delivered payloads; listed connections fail the given way.
    #[derive(Default)]
    struct RecordingPoster {
        failures: HashMap<String, PostFailure>,
        delivered: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl RecordingPoster {
        fn failing(failures: &[(&str, PostFailure)]) -> Self {
            Self {
                failures: failures
                    .iter()
                    .map(|(id, failure)| (id.to_string(), failure.clone()))
                    .collect(),
                delivered: Mutex::default(),
            }
        }

        fn delivered_to(&self) -> Vec<String> {
            let mut ids: Vec<String> = self
                .delivered
                .lock()
                .unwrap()
                .iter()
                .map(|(id, _)| id.clone())
                .collect();
            ids.sort();
            ids
        }
    }

    impl ConnectionPoster for RecordingPoster {
        async fn post(&self, connection_id: &str, payload: &[u8]) -> std::result::Result<(), PostFailure> {
            if let Some(failure) = self.failures.get(connection_id) {
                return Err(failure.clone());
            }
            self.delivered
                .lock()
                .unwrap()
                .push((connection_id.to_string(), payload.to_vec()));
            Ok(())
        }
    }

    fn resolved(id: &str) -> Complaint {
        let now = icrs_atoms::complaints::model::now_micros();
        Complaint {
            id: id.into(),
            title: "Broken fan".into(),
            description: "Room 12".into(),
            status: icrs_atoms::complaints::ComplaintStatus::Resolved,
            is_anonymous: true,
            student_name: None,
            student_email: None,
            created_at: now,
            updated_at: now,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn publish_fans_out_to_every_connection() {
        let registry = Arc::new(MemoryRegistry::with(&["a", "b", "c"]));
        let broadcaster = WebSocketBroadcaster::new(RecordingPoster::default(), Arc::clone(&registry));

        broadcaster.publish(&[resolved("c-1")]).await.unwrap();

        assert_eq!(broadcaster.poster.delivered_to(), vec!["a", "b", "c"]);
        let delivered = broadcaster.poster.delivered.lock().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&delivered[0].1).unwrap();
        assert_eq!(json["type"], "resolved_feed");
        assert_eq!(json["complaints"][0]["id"], "c-1");
    }

    #[tokio::test]
    async fn gone_connections_are_pruned_and_failures_skipped() {
        let registry = Arc::new(MemoryRegistry::with(&["gone", "flaky", "ok"]));
        let poster = RecordingPoster::failing(&[
            ("gone", PostFailure::Gone),
            ("flaky", PostFailure::Other("throttled".into())),
        ]);
        let broadcaster = WebSocketBroadcaster::new(poster, Arc::clone(&registry));

        broadcaster.publish(&[resolved("c-1")]).await.unwrap();

        assert_eq!(broadcaster.poster.delivered_to(), vec!["ok"]);
        assert_eq!(registry.list().await.unwrap(), vec!["flaky", "ok"]);
    }

    #[tokio::test]
    async fn registry_failure_fails_the_publish() {
        let registry = Arc::new(MemoryRegistry {
            fail_list: true,
            ..Default::default()
        });
        let broadcaster = WebSocketBroadcaster::new(RecordingPoster::default(), registry);

        let err = broadcaster.publish(&[]).await.unwrap_err();
        assert!(matches!(err, AtomError::Store(_)));
    }

    #[tokio::test]
    async fn send_to_reports_gone_connections() {
        let registry = Arc::new(MemoryRegistry::with(&["gone", "ok"]));
        let poster = RecordingPoster::failing(&[("gone", PostFailure::Gone)]);
        let broadcaster = WebSocketBroadcaster::new(poster, Arc::clone(&registry));

        assert!(broadcaster.send_to("ok", b"{}").await.unwrap());
        assert!(!broadcaster.send_to("gone", b"{}").await.unwrap());
        assert_eq!(registry.list().await.unwrap(), vec!["ok"]);

        // Removing an already pruned connection is still fine
        assert!(!broadcaster.send_to("gone", b"{}").await.unwrap());
    }
}
