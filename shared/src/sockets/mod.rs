// Websocket view-sessions for the live resolved feed
pub mod broadcast;
pub mod connections;
pub mod messages;

pub use broadcast::{ConnectionPoster, PostFailure, WebSocketBroadcaster};
pub use connections::{ConnectionRegistry, DynamoConnectionRegistry};
pub use messages::{BroadcastMessage, WebSocketAction, WebSocketMessage};
