use std::sync::Arc;

use aws_lambda_events::apigw::ApiGatewayWebsocketProxyRequest;
use icrs_shared::{init_tracing, AppState};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};

mod socket_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let state = Arc::new(AppState::from_env().await?);

    run(service_fn(
        move |event: LambdaEvent<ApiGatewayWebsocketProxyRequest>| {
            let state = Arc::clone(&state);
            async move { socket_handler::function_handler(event, state).await }
        },
    ))
    .await
}
