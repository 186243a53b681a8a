use std::future::Future;

use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::{types::AttributeValue, Client as DynamoClient};
use icrs_atoms::complaints::model::{format_timestamp, now_micros};
use icrs_atoms::{AtomError, Result, RetryPolicy};

/// Open websocket view-sessions. One row per connection id.
pub trait ConnectionRegistry: Send + Sync {
    fn register(&self, connection_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Idempotent: removing an unknown connection succeeds.
    fn remove(&self, connection_id: &str) -> impl Future<Output = Result<()>> + Send;

    fn list(&self) -> impl Future<Output = Result<Vec<String>>> + Send;
}

#[derive(Clone)]
pub struct DynamoConnectionRegistry {
    client: DynamoClient,
    table_name: String,
    retry: RetryPolicy,
}

impl DynamoConnectionRegistry {
    pub fn new(client: DynamoClient, table_name: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            retry,
        }
    }

    async fn put(&self, connection_id: &str) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("connection_id", AttributeValue::S(connection_id.to_string()))
            .item("connected_at", AttributeValue::S(format_timestamp(&now_micros())))
            .send()
            .await
            .map_err(|e| AtomError::Store(format!("DynamoDB put error: {}", DisplayErrorContext(&e))))?;
        Ok(())
    }

    async fn delete(&self, connection_id: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("connection_id", AttributeValue::S(connection_id.to_string()))
            .send()
            .await
            .map_err(|e| {
                AtomError::Store(format!("DynamoDB delete error: {}", DisplayErrorContext(&e)))
            })?;
        Ok(())
    }

    async fn scan_ids(&self) -> Result<Vec<String>> {
        let items: Vec<_> = self
            .client
            .scan()
            .table_name(&self.table_name)
            .projection_expression("connection_id")
            .into_paginator()
            .items()
            .send()
            .collect::<std::result::Result<_, _>>()
            .await
            .map_err(|e| AtomError::Store(format!("DynamoDB scan error: {}", DisplayErrorContext(&e))))?;

        Ok(items
            .iter()
            .filter_map(|item| item.get("connection_id"))
            .filter_map(|value| value.as_s().ok())
            .cloned()
            .collect())
    }
}

impl ConnectionRegistry for DynamoConnectionRegistry {
    async fn register(&self, connection_id: &str) -> Result<()> {
        self.retry.run(|| self.put(connection_id)).await?;
        tracing::info!(connection_id, "View connected");
        Ok(())
    }

    async fn remove(&self, connection_id: &str) -> Result<()> {
        self.retry.run(|| self.delete(connection_id)).await?;
        tracing::info!(connection_id, "View disconnected");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        self.retry.run(|| self.scan_ids()).await
    }
}
