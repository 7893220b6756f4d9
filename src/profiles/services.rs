use lazy_static::lazy_static;
use regex::Regex;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::profiles::{
    pages::render_profile_page,
    password::hash_password,
    repo::{ProfileError, ProfileRepository, RepoResult},
    repo_types::{ImageAsset, ProfileRecord, UserType},
};
use crate::storage::{file_stem_for, ArtifactStore};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Input of the create use case, before hashing and normalization.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub email: String,
    pub password: String,
    pub user_type: Option<i64>,
    pub state: Option<bool>,
}

/// Use cases on top of a [`ProfileRepository`]. Every repository call is
/// bounded by `store_timeout`.
#[derive(Clone)]
pub struct ProfileService {
    repo: Arc<dyn ProfileRepository>,
    files: Arc<dyn ArtifactStore>,
    store_timeout: Duration,
}

impl ProfileService {
    pub fn new(
        repo: Arc<dyn ProfileRepository>,
        files: Arc<dyn ArtifactStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            files,
            store_timeout,
        }
    }

    pub fn backend(&self) -> &'static str {
        self.repo.backend()
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> RepoResult<T>
    where
        F: Future<Output = RepoResult<T>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => {
                match &e {
                    ProfileError::Store(msg) => {
                        error!(backend = self.repo.backend(), op, error = %msg, "store call failed")
                    }
                    other => debug!(backend = self.repo.backend(), op, error = %other, "store call rejected"),
                }
                Err(e)
            }
            Err(_) => {
                error!(backend = self.repo.backend(), op, timeout = ?self.store_timeout, "store call timed out");
                Err(ProfileError::Timeout(self.store_timeout))
            }
        }
    }

    fn checked_email(raw: &str) -> RepoResult<String> {
        let email = normalize_email(raw);
        if email.is_empty() {
            return Err(ProfileError::Validation("email is required".into()));
        }
        Ok(email)
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create(&self, input: NewProfile) -> RepoResult<ProfileRecord> {
        let email = normalize_email(&input.email);
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(ProfileError::Validation("invalid email".into()));
        }
        if input.password.is_empty() {
            return Err(ProfileError::Validation("password is required".into()));
        }

        match self.bounded("find_by_email", self.repo.find_by_email(&email)).await {
            Ok(_) => {
                warn!(email = %email, "email already registered");
                return Err(ProfileError::AlreadyExists(email));
            }
            Err(ProfileError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let hash = hash_password(&input.password).map_err(ProfileError::store)?;
        let user_type = UserType::normalize(input.user_type);
        let record = ProfileRecord::new(email, hash, input.state.unwrap_or(true), user_type);

        let created = self.bounded("create", self.repo.create(record)).await?;
        info!(email = %created.email, user_type = created.user_type.as_i32(), "profile created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, email: &str) -> RepoResult<ProfileRecord> {
        let email = Self::checked_email(email)?;
        self.bounded("find_by_email", self.repo.find_by_email(&email))
            .await
    }

    #[instrument(skip(self))]
    pub async fn update_state(&self, email: &str, state: bool) -> RepoResult<ProfileRecord> {
        let email = Self::checked_email(email)?;
        let updated = self
            .bounded("update_state", self.repo.update_state(&email, state))
            .await?;
        info!(email = %updated.email, state, "profile state updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, email: &str) -> RepoResult<u64> {
        let email = Self::checked_email(email)?;
        let deleted = self.bounded("delete", self.repo.delete(&email)).await?;
        info!(email = %email, deleted, "profile deleted");
        Ok(deleted)
    }

    pub async fn list_all(&self) -> RepoResult<Vec<ProfileRecord>> {
        self.bounded("list_all", self.repo.list_all()).await
    }

    #[instrument(skip(self))]
    pub async fn list_by_type(&self, raw_type: i64) -> RepoResult<Vec<ProfileRecord>> {
        let user_type = UserType::parse(raw_type).ok_or_else(|| {
            ProfileError::Validation(format!("userType must be 1, 2 or 3, got {}", raw_type))
        })?;
        self.bounded("list_by_type", self.repo.list_by_type(user_type))
            .await
    }

    #[instrument(skip(self, asset), fields(size = asset.data().len(), ext = asset.file_extension()))]
    pub async fn attach_image(&self, email: &str, asset: ImageAsset) -> RepoResult<ProfileRecord> {
        let email = Self::checked_email(email)?;
        let updated = self
            .bounded("attach_image", self.repo.attach_image(&email, asset))
            .await?;
        info!(email = %updated.email, "profile picture attached");
        Ok(updated)
    }

    fn image_file_name(record: &ProfileRecord, asset: &ImageAsset) -> String {
        format!("{}{}", file_stem_for(&record.email), asset.file_extension())
    }

    async fn write_image(
        &self,
        record: &ProfileRecord,
        asset: &ImageAsset,
    ) -> RepoResult<(String, PathBuf)> {
        let name = Self::image_file_name(record, asset);
        let path = self
            .files
            .put_image(&name, asset.data())
            .await
            .map_err(|e| {
                error!(error = %e, file = %name, "writing image file failed");
                ProfileError::store(e)
            })?;
        Ok((name, path))
    }

    /// Writes the stored picture to the images directory.
    #[instrument(skip(self))]
    pub async fn export_image(&self, email: &str) -> RepoResult<PathBuf> {
        let record = self.fetch(email).await?;
        let asset = record
            .picture
            .as_ref()
            .ok_or_else(|| ProfileError::NotFound(format!("{} has no picture", record.email)))?;
        let (_, path) = self.write_image(&record, asset).await?;
        info!(email = %record.email, path = %path.display(), "profile picture exported");
        Ok(path)
    }

    /// Writes the profile page to the pages directory, exporting the picture
    /// next to it so the page's image reference resolves.
    #[instrument(skip(self))]
    pub async fn render_page(&self, email: &str) -> RepoResult<PathBuf> {
        let record = self.fetch(email).await?;
        let href = match &record.picture {
            Some(asset) => {
                let (name, _) = self.write_image(&record, asset).await?;
                Some(self.files.image_href(&name))
            }
            None => None,
        };
        let html = render_profile_page(&record, href.as_deref());
        let page_name = format!("{}.html", file_stem_for(&record.email));
        let path = self
            .files
            .put_page(&page_name, &html)
            .await
            .map_err(ProfileError::store)?;
        info!(email = %record.email, path = %path.display(), "profile page written");
        Ok(path)
    }

    #[instrument(skip(self))]
    pub async fn reset(&self) -> RepoResult<()> {
        self.bounded("reset", self.repo.reset()).await?;
        warn!(backend = self.repo.backend(), "profile store reset");
        Ok(())
    }
}
