use std::sync::{Arc, Once};

use aws_lambda_events::dynamodb::{Event as StreamEvent, EventRecord};
use icrs_atoms::complaints::{ChangeEvent, ChangeKind, ComplaintStatus, ComplaintStore};
use icrs_shared::AppState;
use lambda_runtime::{Error, LambdaEvent};
use lifecycle_block::{FeedPublisher, LiveFeed};
use serde_dynamo::{AttributeValue, Item};

static KEYS_ONLY_WARNING: Once = Once::new();

fn string_attr<'a>(image: &'a Item, name: &str) -> Option<&'a str> {
    match image.get(name) {
        Some(AttributeValue::S(value)) => Some(value.as_str()),
        _ => None,
    }
}

fn status_of(image: &Item) -> Option<ComplaintStatus> {
    let raw = string_attr(image, "status")?;
    match raw.parse() {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(status = raw, error = %e, "Unknown status in stream record");
            None
        }
    }
}

/// KEYS_ONLY streams carry neither image, so the status change is unknown.
fn is_keys_only(record: &EventRecord) -> bool {
    record.change.new_image.is_empty() && record.change.old_image.is_empty()
}

pub fn change_event(record: &EventRecord) -> Option<ChangeEvent> {
    let kind = match record.event_name.as_str() {
        "INSERT" => ChangeKind::Insert,
        "MODIFY" => ChangeKind::Update,
        "REMOVE" => ChangeKind::Delete,
        other => {
            tracing::warn!(event_name = other, "Skipping unknown stream event");
            return None;
        }
    };

    let images = &record.change;
    let id = string_attr(&images.keys, "id")
        .or_else(|| string_attr(&images.new_image, "id"))
        .or_else(|| string_attr(&images.old_image, "id"))?;

    Some(ChangeEvent {
        kind,
        id: id.to_string(),
        old_status: status_of(&images.old_image),
        new_status: status_of(&images.new_image),
    })
}

pub fn change_events(event: &StreamEvent) -> Vec<ChangeEvent> {
    event.records.iter().filter_map(change_event).collect()
}

/// One re-fetch per batch, and only when a record touches RESOLVED. A batch
/// with keys-only records always re-fetches.
pub async fn process_batch<S, P>(
    feed: &LiveFeed<S>,
    publisher: &P,
    event: &StreamEvent,
) -> icrs_atoms::Result<bool>
where
    S: ComplaintStore + 'static,
    P: FeedPublisher,
{
    let events = change_events(event);
    tracing::debug!(
        records = event.records.len(),
        changes = events.len(),
        "Processing stream batch"
    );

    if event.records.iter().any(is_keys_only) {
        KEYS_ONLY_WARNING.call_once(|| {
            tracing::warn!("Stream records carry no images, refreshing the feed on every batch");
        });
        feed.publish_to(publisher).await?;
        return Ok(true);
    }

    feed.handle_changes(&events, publisher).await
}

pub(crate) async fn function_handler(
    event: LambdaEvent<StreamEvent>,
    state: Arc<AppState>,
) -> Result<(), Error> {
    let Some(broadcaster) = state.broadcaster() else {
        tracing::warn!("WEBSOCKET_ENDPOINT not set, dropping stream batch");
        return Ok(());
    };

    // Failing the batch makes DynamoDB Streams redeliver it
    if let Err(e) = process_batch(&state.feed, broadcaster, &event.payload).await {
        tracing::error!(error = %e, "Error refreshing resolved feed");
        return Err(e.into());
    }
    Ok(())
}
