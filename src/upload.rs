//! Audio object storage.
//!
//! The uploader stage pushes finished audio to S3-compatible object storage
//! and records the resulting public URL on the brief. Access goes through
//! the [`AudioStorage`] trait so tests can substitute an in-memory store.

use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ClientOptions, ObjectStore, PutPayload};

use crate::error::UploadError;

/// Destination for finished brief audio.
#[async_trait]
pub trait AudioStorage: Send + Sync {
    /// Stores audio bytes at `path` and returns the public URL.
    async fn store_audio(&self, path: &str, bytes: Vec<u8>) -> Result<String, UploadError>;
}

/// S3-compatible audio storage via `object_store`.
pub struct ObjectStoreAudioStorage {
    store: Arc<dyn ObjectStore>,
    public_base_url: String,
}

impl ObjectStoreAudioStorage {
    /// Creates storage over an existing object store.
    pub fn new(store: Arc<dyn ObjectStore>, public_base_url: impl Into<String>) -> Self {
        Self {
            store,
            public_base_url: public_base_url.into(),
        }
    }

    /// Creates storage from environment variables.
    ///
    /// Reads:
    /// - `AUDIO_BUCKET`: bucket name (required)
    /// - `AUDIO_PUBLIC_BASE_URL`: base URL briefs link to (required)
    /// - standard AWS variables (`AWS_ACCESS_KEY_ID`, `AWS_ENDPOINT`, ...)
    pub fn from_env() -> Result<Self, UploadError> {
        let bucket = env::var("AUDIO_BUCKET")
            .map_err(|_| UploadError::MissingEnvVar("AUDIO_BUCKET".to_string()))?;
        let public_base_url = env::var("AUDIO_PUBLIC_BASE_URL")
            .map_err(|_| UploadError::MissingEnvVar("AUDIO_PUBLIC_BASE_URL".to_string()))?;

        let client_options = ClientOptions::new()
            .with_connect_timeout(Duration::from_secs(5))
            .with_timeout(Duration::from_secs(60));

        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_client_options(client_options)
            .build()?;

        Ok(Self::new(Arc::new(store), public_base_url))
    }
}

#[async_trait]
impl AudioStorage for ObjectStoreAudioStorage {
    async fn store_audio(&self, path: &str, bytes: Vec<u8>) -> Result<String, UploadError> {
        let location = ObjectPath::from(path);
        self.store.put(&location, PutPayload::from(bytes)).await?;

        Ok(format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            path
        ))
    }
}

/// In-memory audio storage for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryAudioStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    public_base_url: String,
}

impl MemoryAudioStorage {
    /// Creates an empty storage with the given public base URL.
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            public_base_url: public_base_url.into(),
        }
    }

    /// Returns the stored bytes at `path`, if any.
    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .expect("objects mutex poisoned")
            .get(path)
            .cloned()
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().expect("objects mutex poisoned").len()
    }

    /// Returns whether the storage is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AudioStorage for MemoryAudioStorage {
    async fn store_audio(&self, path: &str, bytes: Vec<u8>) -> Result<String, UploadError> {
        self.objects
            .lock()
            .expect("objects mutex poisoned")
            .insert(path.to_string(), bytes);

        Ok(format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            path
        ))
    }
}

/// Object path for a brief's audio asset.
pub fn audio_object_path(user_id: &str, job_id: &str) -> String {
    format!("briefs/{}/{}.mp3", user_id, job_id)
}
