use std::collections::HashMap;
use std::future::Future;

use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client as DynamoClient;

use super::model::{
    format_timestamp, next_updated_at, now_micros, parse_timestamp, Complaint, ComplaintStatus,
    NewComplaint,
};
use crate::error::{AtomError, Result};

/// Compare-and-set rounds before an update gives up on a hot row.
const STAMP_ATTEMPTS: u32 = 5;

/// Seam between the repository and the managed datastore.
///
/// Implementations assign ids and timestamps ("server side") and report a
/// missing row as [`AtomError::NotFound`].
pub trait ComplaintStore: Send + Sync {
    /// Reads at most one row.
    fn probe(&self) -> impl Future<Output = Result<()>> + Send;

    fn insert(&self, complaint: NewComplaint) -> impl Future<Output = Result<Complaint>> + Send;

    fn fetch(&self, id: &str) -> impl Future<Output = Result<Complaint>> + Send;

    /// All rows, newest `created_at` first.
    fn scan_all(&self) -> impl Future<Output = Result<Vec<Complaint>>> + Send;

    /// RESOLVED rows, newest `updated_at` first, at most `limit`.
    fn query_resolved(&self, limit: usize)
        -> impl Future<Output = Result<Vec<Complaint>>> + Send;

    /// Overwrites `status`. `updated_at` ends strictly later than before.
    fn set_status(
        &self,
        id: &str,
        status: ComplaintStatus,
    ) -> impl Future<Output = Result<Complaint>> + Send;

    /// Sets `image_url`. `updated_at` ends strictly later than before.
    fn set_image_url(&self, id: &str, url: &str)
        -> impl Future<Output = Result<Complaint>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// DynamoDB-backed complaint collection.
///
/// Table key: `id` (S). The resolved feed reads a GSI partitioned on `status`
/// and sorted on `updated_at`.
#[derive(Debug, Clone)]
pub struct DynamoComplaintStore {
    client: DynamoClient,
    table_name: String,
    resolved_index: String,
}

impl DynamoComplaintStore {
    pub fn new(
        client: DynamoClient,
        table_name: impl Into<String>,
        resolved_index: impl Into<String>,
    ) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            resolved_index: resolved_index.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// `SET {assignments}` plus a fresh `updated_at`, applied only while the
    /// row still carries the `updated_at` that was just read. The new stamp
    /// is therefore strictly later than the one it replaces, whatever the
    /// writer's clock says. A concurrent write forces a re-read.
    async fn update_stamped(
        &self,
        id: &str,
        assignments: &str,
        names: &[(&str, &str)],
        values: &[(&str, AttributeValue)],
    ) -> Result<Complaint> {
        for _ in 0..STAMP_ATTEMPTS {
            let previous = self.fetch(id).await?;
            let stamp = next_updated_at(previous.updated_at, now_micros());

            let mut request = self
                .client
                .update_item()
                .table_name(&self.table_name)
                .key("id", AttributeValue::S(id.to_string()))
                .update_expression(format!("SET {}, updated_at = :updated_at", assignments))
                .condition_expression("updated_at = :previous")
                .expression_attribute_values(
                    ":previous",
                    AttributeValue::S(format_timestamp(&previous.updated_at)),
                )
                .expression_attribute_values(":updated_at", AttributeValue::S(format_timestamp(&stamp)))
                .return_values(ReturnValue::AllNew);
            for (placeholder, name) in names {
                request = request.expression_attribute_names(*placeholder, *name);
            }
            for (placeholder, value) in values {
                request = request.expression_attribute_values(*placeholder, value.clone());
            }

            match request.send().await {
                Ok(output) => {
                    return output
                        .attributes()
                        .ok_or_else(|| AtomError::Store("DynamoDB update_item returned no row".into()))
                        .and_then(complaint_from_item);
                }
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
                {
                    // Changed or deleted since the read; the next fetch tells which
                    tracing::debug!(complaint_id = id, "Complaint changed during update, re-reading");
                }
                Err(err) => return Err(store_error("update_item", err)),
            }
        }

        Err(AtomError::Store(format!(
            "complaint {} kept changing during update",
            id
        )))
    }
}

fn store_error(operation: &str, err: impl std::error::Error) -> AtomError {
    AtomError::Store(format!(
        "DynamoDB {} error: {}",
        operation,
        DisplayErrorContext(err)
    ))
}

impl ComplaintStore for DynamoComplaintStore {
    async fn probe(&self) -> Result<()> {
        self.client
            .scan()
            .table_name(&self.table_name)
            .projection_expression("id")
            .limit(1)
            .send()
            .await
            .map_err(|e| store_error("scan", e))?;
        Ok(())
    }

    async fn insert(&self, complaint: NewComplaint) -> Result<Complaint> {
        let now = now_micros();
        let record = Complaint {
            id: uuid::Uuid::new_v4().to_string(),
            title: complaint.title,
            description: complaint.description,
            status: ComplaintStatus::Pending,
            is_anonymous: complaint.is_anonymous,
            student_name: complaint.student_name,
            student_email: complaint.student_email,
            created_at: now,
            updated_at: now,
            image_url: None,
        };

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(complaint_to_item(&record)))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| store_error("put_item", e))?;

        Ok(record)
    }

    async fn fetch(&self, id: &str) -> Result<Complaint> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| store_error("get_item", e))?;

        match result.item() {
            Some(item) => complaint_from_item(item),
            None => Err(AtomError::NotFound(id.to_string())),
        }
    }

    async fn scan_all(&self) -> Result<Vec<Complaint>> {
        let items: Vec<HashMap<String, AttributeValue>> = self
            .client
            .scan()
            .table_name(&self.table_name)
            .into_paginator()
            .items()
            .send()
            .collect::<std::result::Result<Vec<_>, _>>()
            .await
            .map_err(|e| store_error("scan", e))?;

        let mut complaints = items
            .iter()
            .map(complaint_from_item)
            .collect::<Result<Vec<_>>>()?;
        // Scan order is undefined
        complaints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(complaints)
    }

    async fn query_resolved(&self, limit: usize) -> Result<Vec<Complaint>> {
        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(&self.resolved_index)
            .key_condition_expression("#status = :status")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(
                ":status",
                AttributeValue::S(ComplaintStatus::Resolved.as_str().to_string()),
            )
            .scan_index_forward(false)
            .limit(i32::try_from(limit).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|e| store_error("query", e))?;

        result.items().iter().map(complaint_from_item).collect()
    }

    async fn set_status(&self, id: &str, status: ComplaintStatus) -> Result<Complaint> {
        self.update_stamped(
            id,
            "#status = :status",
            &[("#status", "status")],
            &[(":status", AttributeValue::S(status.as_str().to_string()))],
        )
        .await
    }

    async fn set_image_url(&self, id: &str, url: &str) -> Result<Complaint> {
        self.update_stamped(
            id,
            "image_url = :image_url",
            &[],
            &[(":image_url", AttributeValue::S(url.to_string()))],
        )
        .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .condition_expression("attribute_exists(id)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_conditional_check_failed_exception())
                    .unwrap_or(false);
                if missing {
                    Err(AtomError::NotFound(id.to_string()))
                } else {
                    Err(store_error("delete_item", err))
                }
            }
        }
    }
}

/// Absent optional attributes are left out of the item rather than stored as NULL.
pub fn complaint_to_item(complaint: &Complaint) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::from([
        ("id".to_string(), AttributeValue::S(complaint.id.clone())),
        ("title".to_string(), AttributeValue::S(complaint.title.clone())),
        (
            "description".to_string(),
            AttributeValue::S(complaint.description.clone()),
        ),
        (
            "status".to_string(),
            AttributeValue::S(complaint.status.as_str().to_string()),
        ),
        (
            "is_anonymous".to_string(),
            AttributeValue::Bool(complaint.is_anonymous),
        ),
        (
            "created_at".to_string(),
            AttributeValue::S(format_timestamp(&complaint.created_at)),
        ),
        (
            "updated_at".to_string(),
            AttributeValue::S(format_timestamp(&complaint.updated_at)),
        ),
    ]);

    if let Some(name) = &complaint.student_name {
        item.insert("student_name".to_string(), AttributeValue::S(name.clone()));
    }
    if let Some(email) = &complaint.student_email {
        item.insert("student_email".to_string(), AttributeValue::S(email.clone()));
    }
    if let Some(url) = &complaint.image_url {
        item.insert("image_url".to_string(), AttributeValue::S(url.clone()));
    }

    item
}

pub fn complaint_from_item(item: &HashMap<String, AttributeValue>) -> Result<Complaint> {
    let string = |key: &str| item.get(key).and_then(|v| v.as_s().ok()).map(|s| s.to_string());
    let required = |key: &str| {
        string(key).ok_or_else(|| AtomError::Store(format!("complaint item missing '{}'", key)))
    };

    Ok(Complaint {
        id: required("id")?,
        title: required("title")?,
        description: required("description")?,
        status: required("status")?
            .parse()
            .map_err(|e: AtomError| AtomError::Store(e.to_string()))?,
        is_anonymous: item
            .get("is_anonymous")
            .and_then(|v| v.as_bool().ok())
            .copied()
            .unwrap_or(false),
        student_name: string("student_name"),
        student_email: string("student_email"),
        created_at: parse_timestamp(&required("created_at")?)?,
        updated_at: parse_timestamp(&required("updated_at")?)?,
        image_url: string("image_url"),
    })
}
