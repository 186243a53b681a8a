use std::sync::Arc;

use aws_lambda_events::apigw::{ApiGatewayProxyResponse, ApiGatewayWebsocketProxyRequest};
use icrs_atoms::complaints::ComplaintStore;
use icrs_atoms::AtomError;
use icrs_shared::sockets::{
    BroadcastMessage, ConnectionRegistry, WebSocketAction, WebSocketMessage,
};
use icrs_shared::AppState;
use lambda_runtime::{Error, LambdaEvent};
use lifecycle_block::LiveFeed;

fn response(status_code: i64) -> ApiGatewayProxyResponse {
    ApiGatewayProxyResponse {
        status_code,
        ..Default::default()
    }
}

/// `$connect` opens a view-session, `$disconnect` closes it. Returns `false`
/// for any other route.
pub async fn handle_lifecycle_route<R: ConnectionRegistry>(
    registry: &R,
    route_key: &str,
    connection_id: &str,
) -> icrs_atoms::Result<bool> {
    match route_key {
        "$connect" => registry.register(connection_id).await.map(|_| true),
        "$disconnect" => registry.remove(connection_id).await.map(|_| true),
        _ => Ok(false),
    }
}

/// Payload to send back for a client message, if any. `subscribe` returns the
/// current resolved feed as the view's initial snapshot.
pub async fn reply_for<S: ComplaintStore + 'static>(
    feed: &LiveFeed<S>,
    body: &str,
) -> icrs_atoms::Result<Vec<u8>> {
    let message: WebSocketMessage = serde_json::from_str(body)
        .map_err(|e| AtomError::Validation(format!("invalid websocket message: {}", e)))?;

    let encoded = match message.action {
        WebSocketAction::Subscribe => {
            let complaints = feed.refresh().await?;
            BroadcastMessage::resolved_feed(&complaints).to_bytes()
        }
        WebSocketAction::Ping => BroadcastMessage::Pong.to_bytes(),
    };
    encoded.map_err(|e| AtomError::Validation(format!("Feed serialization error: {}", e)))
}

pub(crate) async fn function_handler(
    event: LambdaEvent<ApiGatewayWebsocketProxyRequest>,
    state: Arc<AppState>,
) -> Result<ApiGatewayProxyResponse, Error> {
    let request = event.payload;
    let route_key = request.request_context.route_key.as_deref().unwrap_or("$default");
    let Some(connection_id) = request.request_context.connection_id.as_deref() else {
        tracing::warn!(route_key, "Websocket event without connection id");
        return Ok(response(400));
    };
    tracing::info!(route_key, connection_id, "Websocket event");

    match handle_lifecycle_route(state.connections.as_ref(), route_key, connection_id).await {
        Ok(true) => return Ok(response(200)),
        Ok(false) => {}
        Err(e) => {
            tracing::error!(connection_id, error = %e, "Connection registry error");
            return Ok(response(500));
        }
    }

    let body = request.body.as_deref().unwrap_or_default();
    let payload = match reply_for(&state.feed, body).await {
        Ok(payload) => payload,
        Err(AtomError::Validation(e)) => {
            tracing::warn!(connection_id, error = %e, "Ignoring websocket message");
            return Ok(response(400));
        }
        Err(e) => {
            tracing::error!(connection_id, error = %e, "Error fetching resolved complaints");
            return Ok(response(500));
        }
    };

    let Some(broadcaster) = state.broadcaster() else {
        tracing::warn!("WEBSOCKET_ENDPOINT not set, cannot reply");
        return Ok(response(500));
    };
    match broadcaster.send_to(connection_id, &payload).await {
        Ok(_) => Ok(response(200)),
        Err(e) => {
            tracing::error!(connection_id, error = %e, "Failed to reply on websocket");
            Ok(response(500))
        }
    }
}
