//! Complaint lifecycle block: composes the complaint and media atoms into
//! administrator/student intents and keeps the resolved feed live.

pub mod controller;
pub mod feed;
pub mod http;
pub mod types;

pub use controller::LifecycleController;
pub use feed::{FeedPublisher, FeedSubscription, LiveFeed};
pub use types::{Intent, Outcome};
