use std::sync::Arc;
use std::time::Duration;

use icrs_atoms::complaints::{ComplaintRepository, ComplaintStatus, SubmitComplaintPayload};
use icrs_atoms::media::{object_key_from_url, AttachmentManager, UploadFile, RESOLUTION_BUCKET};
use icrs_atoms::memory::{MemoryComplaintStore, MemoryObjectStorage};
use icrs_atoms::{AtomError, RetryPolicy};
use lifecycle_block::{Intent, LifecycleController, LiveFeed, Outcome};

struct Harness {
    store: Arc<MemoryComplaintStore>,
    storage: Arc<MemoryObjectStorage>,
    controller: LifecycleController<MemoryComplaintStore, MemoryObjectStorage>,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(MemoryComplaintStore::new());
        let storage = Arc::new(MemoryObjectStorage::default());
        let controller = LifecycleController::new(
            ComplaintRepository::new(Arc::clone(&store), RetryPolicy::default()),
            AttachmentManager::new(Arc::clone(&storage), RetryPolicy::default()),
        );
        controller.prepare_admin_view().await.unwrap();
        Self {
            store,
            storage,
            controller,
        }
    }

    async fn submit_noise(&self) -> String {
        let outcome = self
            .controller
            .dispatch(Intent::Submit(SubmitComplaintPayload {
                title: "Noise".into(),
                description: "Loud AC".into(),
                is_anonymous: true,
                student_name: Some("Asha".into()),
                student_email: Some("asha@campus.edu".into()),
            }))
            .await
            .unwrap();
        outcome.complaint().unwrap().id.clone()
    }

    async fn resolve(&self, id: &str) {
        self.controller
            .dispatch(Intent::ChangeStatus {
                id: id.to_string(),
                status: ComplaintStatus::Resolved,
            })
            .await
            .unwrap();
    }

    async fn upload(&self, id: &str, file: UploadFile) -> Result<Outcome, AtomError> {
        self.controller
            .dispatch(Intent::UploadImage {
                id: id.to_string(),
                file,
            })
            .await
    }
}

#[tokio::test]
async fn anonymous_submission_is_pending_without_identity() {
    let h = Harness::new().await;
    let id = h.submit_noise().await;

    let stored = h.controller.complaints().get_complaint(&id).await.unwrap();
    assert_eq!(stored.title, "Noise");
    assert_eq!(stored.description, "Loud AC");
    assert_eq!(stored.status, ComplaintStatus::Pending);
    assert!(stored.is_anonymous);
    assert_eq!(stored.student_name, None);
    assert_eq!(stored.student_email, None);
    assert_eq!(stored.image_url, None);
}

#[tokio::test]
async fn named_submission_keeps_trimmed_text() {
    let h = Harness::new().await;
    let outcome = h
        .controller
        .dispatch(Intent::Submit(SubmitComplaintPayload {
            title: "  Wi-Fi down in Block C ".into(),
            description: "No signal since Monday.\nRouter light is red.".into(),
            is_anonymous: false,
            student_name: Some("Ravi".into()),
            student_email: Some("ravi@campus.edu".into()),
        }))
        .await
        .unwrap();

    let complaint = outcome.complaint().unwrap();
    assert_eq!(complaint.title, "Wi-Fi down in Block C");
    assert_eq!(
        complaint.description,
        "No signal since Monday.\nRouter light is red."
    );
    assert_eq!(complaint.student_name.as_deref(), Some("Ravi"));
}

#[tokio::test]
async fn invalid_submission_never_reaches_the_store() {
    let h = Harness::new().await;
    let err = h
        .controller
        .dispatch(Intent::Submit(SubmitComplaintPayload {
            title: "Noise".into(),
            description: "".into(),
            ..Default::default()
        }))
        .await
        .unwrap_err();

    assert!(matches!(err, AtomError::Validation(_)));
    assert_eq!(h.store.calls(), 0);
}

#[tokio::test]
async fn resolved_complaint_gets_a_public_image() {
    let h = Harness::new().await;
    let id = h.submit_noise().await;
    h.resolve(&id).await;

    let before = h.controller.complaints().get_complaint(&id).await.unwrap();
    let outcome = h
        .upload(&id, UploadFile::new("fixed.jpg", "image/jpeg", vec![0xd8; 500 * 1024]))
        .await
        .unwrap();

    let complaint = outcome.complaint().unwrap();
    let url = complaint.image_url.as_deref().unwrap();
    assert!(url.starts_with("https://"));
    assert!(complaint.updated_at > before.updated_at);

    let key = object_key_from_url(url).unwrap();
    assert!(key.starts_with(&format!("{}-", id)));
    assert!(h.storage.object(RESOLUTION_BUCKET, key).is_some());
}

#[tokio::test]
async fn upload_requires_resolved_status() {
    let h = Harness::new().await;
    let id = h.submit_noise().await;

    let err = h
        .upload(&id, UploadFile::new("fixed.jpg", "image/jpeg", vec![1; 16]))
        .await
        .unwrap_err();

    assert!(matches!(err, AtomError::InvalidState(_)));
    assert!(h.storage.object_keys(RESOLUTION_BUCKET).is_empty());
}

#[tokio::test]
async fn oversized_image_changes_nothing() {
    let h = Harness::new().await;
    let id = h.submit_noise().await;
    h.resolve(&id).await;
    let before = h.controller.complaints().get_complaint(&id).await.unwrap();

    let err = h
        .upload(&id, UploadFile::new("big.png", "image/png", vec![0; 3 * 1024 * 1024]))
        .await
        .unwrap_err();

    assert!(matches!(err, AtomError::StoragePolicy(_)));
    let after = h.controller.complaints().get_complaint(&id).await.unwrap();
    assert_eq!(after, before);
    assert!(h.storage.object_keys(RESOLUTION_BUCKET).is_empty());
}

#[tokio::test]
async fn reopening_keeps_the_image_link() {
    let h = Harness::new().await;
    let id = h.submit_noise().await;
    h.resolve(&id).await;
    h.upload(&id, UploadFile::new("fixed.gif", "image/gif", vec![7; 32]))
        .await
        .unwrap();

    let outcome = h
        .controller
        .dispatch(Intent::ChangeStatus {
            id: id.clone(),
            status: ComplaintStatus::InProgress,
        })
        .await
        .unwrap();
    let complaint = outcome.complaint().unwrap();
    assert_eq!(complaint.status, ComplaintStatus::InProgress);
    assert!(complaint.image_url.is_some());
}

#[tokio::test]
async fn replacing_an_image_removes_the_previous_object() {
    let h = Harness::new().await;
    let id = h.submit_noise().await;
    h.resolve(&id).await;

    let first = h
        .upload(&id, UploadFile::new("a.jpg", "image/jpeg", vec![1; 64]))
        .await
        .unwrap();
    let first_url = first.complaint().unwrap().image_url.clone().unwrap();
    let second = h
        .upload(&id, UploadFile::new("b.png", "image/png", vec![2; 64]))
        .await
        .unwrap();
    let second_url = second.complaint().unwrap().image_url.clone().unwrap();
    assert_ne!(first_url, second_url);

    let keys = h.storage.object_keys(RESOLUTION_BUCKET);
    assert_eq!(keys, vec![object_key_from_url(&second_url).unwrap().to_string()]);

    h.controller
        .dispatch(Intent::Delete { id: id.clone() })
        .await
        .unwrap();
    assert!(h.store.is_empty());
    assert!(h.storage.object_keys(RESOLUTION_BUCKET).is_empty());
}

#[tokio::test]
async fn delete_removes_record_and_image() {
    let h = Harness::new().await;
    let id = h.submit_noise().await;
    h.resolve(&id).await;
    h.upload(&id, UploadFile::new("fixed.jpg", "image/jpeg", vec![1; 1024]))
        .await
        .unwrap();

    let outcome = h
        .controller
        .dispatch(Intent::Delete { id: id.clone() })
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Deleted { id: id.clone() });
    assert!(h.store.is_empty());
    assert!(h.storage.object_keys(RESOLUTION_BUCKET).is_empty());
}

#[tokio::test(start_paused = true)]
async fn delete_survives_storage_failure() {
    let h = Harness::new().await;
    let id = h.submit_noise().await;
    h.resolve(&id).await;
    h.upload(&id, UploadFile::new("fixed.jpg", "image/jpeg", vec![1; 1024]))
        .await
        .unwrap();
    h.storage.fail_deletes(true);

    h.controller
        .dispatch(Intent::Delete { id: id.clone() })
        .await
        .unwrap();

    assert!(h.store.is_empty());
    // Orphaned object stays behind
    assert_eq!(h.storage.object_keys(RESOLUTION_BUCKET).len(), 1);
}

#[tokio::test]
async fn delete_of_missing_complaint_is_not_found() {
    let h = Harness::new().await;
    let err = h
        .controller
        .dispatch(Intent::Delete { id: "gone".into() })
        .await
        .unwrap_err();
    assert_eq!(err, AtomError::NotFound("gone".into()));
}

#[tokio::test]
async fn open_feed_follows_administrator_actions() {
    let h = Harness::new().await;
    let feed = LiveFeed::new(h.controller.complaints().clone());
    let mut view = feed.subscribe(h.store.subscribe_changes());

    let id = h.submit_noise().await;
    h.resolve(&id).await;

    let resolved = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let complaints = view.changed().await.unwrap();
            if !complaints.is_empty() {
                return complaints;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(resolved[0].id, id);

    h.controller
        .dispatch(Intent::Delete { id: id.clone() })
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while !view.changed().await.unwrap().is_empty() {}
    })
    .await
    .unwrap();
    assert!(view.current().is_empty());

    view.unsubscribe();
}
