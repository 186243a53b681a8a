use std::sync::Arc;

use aws_sdk_apigatewaymanagement::Client as ApiGwClient;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use icrs_atoms::complaints::{ComplaintRepository, DynamoComplaintStore};
use icrs_atoms::media::{AttachmentManager, BucketPolicy, S3ObjectStorage};
use lifecycle_block::{LifecycleController, LiveFeed};
use tokio::sync::OnceCell;

use crate::auth::CognitoSessionProvider;
use crate::config::{AppConfig, ConfigError};
use crate::sockets::{DynamoConnectionRegistry, WebSocketBroadcaster};

pub type Controller = LifecycleController<DynamoComplaintStore, S3ObjectStorage>;
pub type Broadcaster = WebSocketBroadcaster<DynamoConnectionRegistry>;

/// Process-wide state built once per cold start and shared by every
/// invocation.
pub struct AppState {
    pub config: AppConfig,
    pub controller: Controller,
    pub feed: LiveFeed<DynamoComplaintStore>,
    pub sessions: CognitoSessionProvider,
    pub connections: Arc<DynamoConnectionRegistry>,
    broadcaster: Option<Broadcaster>,
    bucket_ready: OnceCell<()>,
}

impl AppState {
    /// Loads config and AWS clients. Fails fast on missing configuration.
    pub async fn from_env() -> Result<Self, ConfigError> {
        let config = AppConfig::from_env()?;
        let sdk_config = aws_config::load_from_env().await;
        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .ok_or(ConfigError::Missing("AWS_REGION"))?;

        let dynamo_client = match &config.dynamodb_endpoint {
            Some(endpoint) => DynamoClient::from_conf(
                aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                    .endpoint_url(endpoint)
                    .build(),
            ),
            None => DynamoClient::new(&sdk_config),
        };
        let s3_client = S3Client::new(&sdk_config);
        let cognito_client = CognitoClient::new(&sdk_config);
        let apigw_client = config.websocket_endpoint.as_ref().map(|endpoint| {
            ApiGwClient::from_conf(
                aws_sdk_apigatewaymanagement::config::Builder::from(&sdk_config)
                    .endpoint_url(endpoint)
                    .build(),
            )
        });

        let store = DynamoComplaintStore::new(
            dynamo_client.clone(),
            &config.complaints_table,
            &config.resolved_index,
        );
        let mut storage = S3ObjectStorage::new(s3_client, &region, BucketPolicy::resolution_images());
        if let Some(base_url) = &config.public_asset_base_url {
            storage = storage.with_public_base_url(base_url);
        }

        let complaints = ComplaintRepository::new(Arc::new(store), config.retry);
        let attachments = AttachmentManager::with_bucket(
            Arc::new(storage),
            &config.resolution_bucket,
            BucketPolicy::resolution_images(),
            config.retry,
        );
        let connections = Arc::new(DynamoConnectionRegistry::new(
            dynamo_client,
            &config.connections_table,
            config.retry,
        ));
        let broadcaster =
            apigw_client.map(|client| WebSocketBroadcaster::new(client, Arc::clone(&connections)));

        tracing::info!(
            table = %config.complaints_table,
            bucket = %config.resolution_bucket,
            region = %region,
            websocket = broadcaster.is_some(),
            "Initialized app state"
        );

        Ok(Self {
            feed: LiveFeed::new(complaints.clone()),
            controller: LifecycleController::new(complaints, attachments),
            sessions: CognitoSessionProvider::new(cognito_client),
            connections,
            broadcaster,
            bucket_ready: OnceCell::new(),
            config,
        })
    }

    /// Ensures the resolution bucket once per process, the first time an
    /// administrative view is served. A failure is logged and retried on the
    /// next admin request; the view itself still loads.
    pub async fn ensure_admin_view_ready(&self) {
        let result = self
            .bucket_ready
            .get_or_try_init(|| self.controller.prepare_admin_view())
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Error creating resolution bucket");
        }
    }

    /// `None` when no websocket endpoint is configured.
    pub fn broadcaster(&self) -> Option<&Broadcaster> {
        self.broadcaster.as_ref()
    }
}
