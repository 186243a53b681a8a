// Re-export model types, the store seam and the repository
pub mod http;
pub mod model;
pub mod service;
pub mod store;

pub use model::{
    ChangeEvent, ChangeKind, Complaint, ComplaintStatus, NewComplaint, StatusCounts,
    SubmitComplaintPayload, UpdateStatusPayload,
};
pub use service::{ComplaintRepository, RESOLVED_FEED_LIMIT};
pub use store::{ComplaintStore, DynamoComplaintStore};
