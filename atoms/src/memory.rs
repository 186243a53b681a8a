//! In-memory stand-ins for DynamoDB and S3.
//!
//! Both honour the same contracts as the AWS implementations (server-side
//! ids and timestamps, not-found on missing rows, bucket policy enforcement)
//! and add knobs to simulate outages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::complaints::model::{
    next_updated_at, now_micros, ChangeEvent, Complaint, ComplaintStatus, NewComplaint,
};
use crate::complaints::store::ComplaintStore;
use crate::error::{AtomError, Result};
use crate::media::model::{BucketPolicy, UploadFile};
use crate::media::store::ObjectStorage;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct MemoryComplaintStore {
    rows: Mutex<HashMap<String, Complaint>>,
    changes: broadcast::Sender<ChangeEvent>,
    pending_failures: AtomicU32,
    calls: AtomicUsize,
}

impl Default for MemoryComplaintStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryComplaintStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            rows: Mutex::new(HashMap::new()),
            changes,
            pending_failures: AtomicU32::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Change notifications for every committed insert/update/delete.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    /// The next `count` calls fail with a transient store error.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.fetch_add(count, Ordering::SeqCst);
    }

    /// Number of calls that reached the store, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Complaint>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AtomError::Store("simulated connection failure".into()));
        }
        Ok(())
    }

    fn emit(&self, event: ChangeEvent) {
        // No receivers is fine
        let _ = self.changes.send(event);
    }

    fn mutate(&self, id: &str, apply: impl FnOnce(&mut Complaint)) -> Result<Complaint> {
        let (before, after) = {
            let mut rows = self.lock();
            let row = rows
                .get_mut(id)
                .ok_or_else(|| AtomError::NotFound(id.to_string()))?;
            let before = row.clone();
            apply(row);
            row.updated_at = next_updated_at(before.updated_at, now_micros());
            (before, row.clone())
        };
        self.emit(ChangeEvent::updated(&before, &after));
        Ok(after)
    }
}

impl ComplaintStore for MemoryComplaintStore {
    async fn probe(&self) -> Result<()> {
        self.enter()
    }

    async fn insert(&self, complaint: NewComplaint) -> Result<Complaint> {
        self.enter()?;
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
        self.lock().insert(record.id.clone(), record.clone());
        self.emit(ChangeEvent::inserted(&record));
        Ok(record)
    }

    async fn fetch(&self, id: &str) -> Result<Complaint> {
        self.enter()?;
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| AtomError::NotFound(id.to_string()))
    }

    async fn scan_all(&self) -> Result<Vec<Complaint>> {
        self.enter()?;
        let mut complaints: Vec<Complaint> = self.lock().values().cloned().collect();
        complaints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(complaints)
    }

    async fn query_resolved(&self, limit: usize) -> Result<Vec<Complaint>> {
        self.enter()?;
        let mut resolved: Vec<Complaint> = self
            .lock()
            .values()
            .filter(|c| c.status == ComplaintStatus::Resolved)
            .cloned()
            .collect();
        resolved.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        resolved.truncate(limit);
        Ok(resolved)
    }

    async fn set_status(&self, id: &str, status: ComplaintStatus) -> Result<Complaint> {
        self.enter()?;
        self.mutate(id, |row| row.status = status)
    }

    async fn set_image_url(&self, id: &str, url: &str) -> Result<Complaint> {
        self.enter()?;
        self.mutate(id, |row| row.image_url = Some(url.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.enter()?;
        let removed = self
            .lock()
            .remove(id)
            .ok_or_else(|| AtomError::NotFound(id.to_string()))?;
        self.emit(ChangeEvent::deleted(&removed));
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryBucket {
    policy: BucketPolicy,
    objects: HashMap<String, Vec<u8>>,
}

#[derive(Debug)]
pub struct MemoryObjectStorage {
    public_base_url: String,
    buckets: Mutex<HashMap<String, MemoryBucket>>,
    bucket_creations: AtomicUsize,
    failing_deletes: AtomicBool,
    pending_failures: AtomicU32,
}

impl Default for MemoryObjectStorage {
    fn default() -> Self {
        Self::new("https://storage.local/object/public")
    }
}

impl MemoryObjectStorage {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
            buckets: Mutex::new(HashMap::new()),
            bucket_creations: AtomicUsize::new(0),
            failing_deletes: AtomicBool::new(false),
            pending_failures: AtomicU32::new(0),
        }
    }

    pub fn bucket_creations(&self) -> usize {
        self.bucket_creations.load(Ordering::SeqCst)
    }

    pub fn bucket_count(&self) -> usize {
        self.lock().len()
    }

    pub fn bucket_policy(&self, bucket: &str) -> Option<BucketPolicy> {
        self.lock().get(bucket).map(|b| b.policy.clone())
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .get(bucket)
            .and_then(|b| b.objects.get(key).cloned())
    }

    pub fn object_keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every delete fails until switched back off.
    pub fn fail_deletes(&self, failing: bool) {
        self.failing_deletes.store(failing, Ordering::SeqCst);
    }

    /// The next `count` calls fail with a transient storage error.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.fetch_add(count, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoryBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self) -> Result<()> {
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AtomError::Storage("simulated storage outage".into()));
        }
        Ok(())
    }
}

impl ObjectStorage for MemoryObjectStorage {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.enter()?;
        Ok(self.lock().contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str, policy: &BucketPolicy) -> Result<()> {
        self.enter()?;
        let mut buckets = self.lock();
        if !buckets.contains_key(bucket) {
            buckets.insert(
                bucket.to_string(),
                MemoryBucket {
                    policy: policy.clone(),
                    objects: HashMap::new(),
                },
            );
            self.bucket_creations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, file: &UploadFile) -> Result<()> {
        self.enter()?;
        let mut buckets = self.lock();
        let target = buckets
            .get_mut(bucket)
            .ok_or_else(|| AtomError::Storage(format!("bucket '{}' does not exist", bucket)))?;
        target.policy.check(file)?;
        target.objects.insert(key.to_string(), file.bytes.clone());
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> Result<String> {
        Ok(format!("{}/{}/{}", self.public_base_url, bucket, key))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.enter()?;
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(AtomError::Storage("simulated delete failure".into()));
        }
        if let Some(target) = self.lock().get_mut(bucket) {
            target.objects.remove(key);
        }
        Ok(())
    }
}
