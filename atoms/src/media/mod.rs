// Resolution images: bucket policy, object storage seam and attachment manager
pub mod model;
pub mod service;
pub mod store;

pub use model::{BucketPolicy, UploadFile, UploadImagePayload, RESOLUTION_BUCKET};
pub use service::{object_key, object_key_from_url, AttachmentManager};
pub use store::{ObjectStorage, S3ObjectStorage};
