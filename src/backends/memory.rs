//! In-memory repository used by service and handler tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::profiles::repo::{ProfileError, ProfileRepository, RepoResult};
use crate::profiles::repo_types::{ImageAsset, ProfileRecord, UserType};

#[derive(Default)]
pub struct InMemoryProfileRepository {
    records: Arc<Mutex<HashMap<String, ProfileRecord>>>,
    latency: Option<Duration>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call, to exercise timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    async fn pause(&self) {
        if let Some(d) = self.latency {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, record: ProfileRecord) -> RepoResult<ProfileRecord> {
        self.pause().await;
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.email) {
            return Err(ProfileError::AlreadyExists(record.email));
        }
        records.insert(record.email.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<ProfileRecord> {
        self.pause().await;
        self.records
            .lock()
            .unwrap()
            .get(email)
            .cloned()
            .ok_or_else(|| ProfileError::NotFound(email.to_string()))
    }

    async fn update_state(&self, email: &str, state: bool) -> RepoResult<ProfileRecord> {
        self.pause().await;
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(email)
            .ok_or_else(|| ProfileError::NotFound(email.to_string()))?;
        record.state = state;
        Ok(record.clone())
    }

    async fn attach_image(&self, email: &str, asset: ImageAsset) -> RepoResult<ProfileRecord> {
        self.pause().await;
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(email)
            .ok_or_else(|| ProfileError::NotFound(email.to_string()))?;
        record.picture = Some(asset);
        Ok(record.clone())
    }

    async fn delete(&self, email: &str) -> RepoResult<u64> {
        self.pause().await;
        match self.records.lock().unwrap().remove(email) {
            Some(_) => Ok(1),
            None => Err(ProfileError::NotFound(email.to_string())),
        }
    }

    async fn list_all(&self) -> RepoResult<Vec<ProfileRecord>> {
        self.pause().await;
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    async fn list_by_type(&self, user_type: UserType) -> RepoResult<Vec<ProfileRecord>> {
        self.pause().await;
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.user_type == user_type)
            .cloned()
            .collect())
    }

    async fn reset(&self) -> RepoResult<()> {
        self.pause().await;
        self.records.lock().unwrap().clear();
        Ok(())
    }
}
