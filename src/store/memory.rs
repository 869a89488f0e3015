//! In-memory store with failure injection, for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::SnapshotStore;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<String, Vec<u8>>,
    get_error: Option<String>,
    put_error: Option<String>,
    puts: usize,
}

/// Clones share the same objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every subsequent `get` fail with a delivery error.
    pub fn fail_gets(&self, error: impl Into<String>) {
        self.lock().get_error = Some(error.into());
    }

    /// Make every subsequent `put` fail with a delivery error.
    pub fn fail_puts(&self, error: impl Into<String>) {
        self.lock().put_error = Some(error.into());
    }

    pub fn heal(&self) {
        let mut inner = self.lock();
        inner.get_error = None;
        inner.put_error = None;
    }

    /// Write directly, bypassing failure injection.
    pub fn insert(&self, key: &str, data: impl Into<Vec<u8>>) {
        self.lock().objects.insert(key.to_string(), data.into());
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).cloned()
    }

    /// Number of successful puts so far.
    pub fn put_count(&self) -> usize {
        self.lock().puts
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let inner = self.lock();
        if let Some(ref error) = inner.get_error {
            return Err(Error::Delivery(error.clone()));
        }
        inner
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        if let Some(ref error) = inner.put_error {
            return Err(Error::Delivery(error.clone()));
        }
        inner.objects.insert(key.to_string(), data.to_vec());
        inner.puts += 1;
        Ok(())
    }
}
