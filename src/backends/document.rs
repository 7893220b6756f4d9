use anyhow::Context;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson},
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions, ReturnDocument},
    Client, Collection, IndexModel,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::config::DocumentStoreConfig;
use crate::profiles::repo::{ProfileError, ProfileRepository, RepoResult};
use crate::profiles::repo_types::{ImageAsset, ImageCodec, ProfileRecord, UserType};

const DUPLICATE_KEY: i32 = 11000;

/// Picture sub-document. `data` is stored as a generic BSON binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PictureDocument {
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    pub extension: String,
}

impl ImageCodec for PictureDocument {
    fn encode(asset: &ImageAsset) -> Self {
        Self {
            data: asset.data().to_vec(),
            extension: asset.file_extension().to_string(),
        }
    }

    fn decode(self) -> Result<Option<ImageAsset>, ProfileError> {
        if self.data.is_empty() && self.extension.is_empty() {
            return Ok(None);
        }
        ImageAsset::new(self.data, &self.extension)
            .map(Some)
            .map_err(|e| ProfileError::Store(format!("corrupt picture document: {}", e)))
    }
}

/// One profile, one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<PictureDocument>,
    #[serde(default = "default_state")]
    pub state: bool,
    #[serde(rename = "usertype", default = "default_user_type")]
    pub user_type: i32,
}

fn default_state() -> bool {
    true
}

fn default_user_type() -> i32 {
    UserType::DEFAULT.as_i32()
}

impl From<&ProfileRecord> for ProfileDocument {
    fn from(r: &ProfileRecord) -> Self {
        Self {
            email: r.email.clone(),
            password: r.password_hash.clone(),
            picture: r.picture.as_ref().map(PictureDocument::encode),
            state: r.state,
            user_type: r.user_type.as_i32(),
        }
    }
}

impl TryFrom<ProfileDocument> for ProfileRecord {
    type Error = ProfileError;

    fn try_from(d: ProfileDocument) -> Result<Self, Self::Error> {
        let picture = match d.picture {
            Some(p) => p.decode()?,
            None => None,
        };
        Ok(Self {
            email: d.email,
            password_hash: d.password,
            picture,
            state: d.state,
            user_type: UserType::normalize(Some(d.user_type as i64)),
        })
    }
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY
    )
}

pub struct DocumentStoreRepository {
    collection: Collection<ProfileDocument>,
}

impl DocumentStoreRepository {
    /// Connects, pings the server and makes sure the unique email index exists.
    pub async fn connect(cfg: &DocumentStoreConfig, connect_timeout: Duration) -> anyhow::Result<Self> {
        let mut options = ClientOptions::parse(&cfg.uri)
            .await
            .context("parse mongodb uri")?;
        options.connect_timeout = Some(connect_timeout);
        options.server_selection_timeout = Some(connect_timeout);
        options.app_name = Some("profile-crud".into());

        let client = Client::with_options(options).context("build mongodb client")?;
        let db = client.database(&cfg.database);
        db.run_command(doc! { "ping": 1 })
            .await
            .context("ping mongodb")?;

        let repo = Self {
            collection: db.collection::<ProfileDocument>(&cfg.collection),
        };
        repo.ensure_indexes().await.context("create email index")?;
        info!(database = %cfg.database, collection = %cfg.collection, "document store ready");
        Ok(repo)
    }

    async fn ensure_indexes(&self) -> mongodb::error::Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection.create_index(index).await?;
        Ok(())
    }

    async fn find_one_and_set(&self, email: &str, set: mongodb::bson::Document) -> RepoResult<ProfileRecord> {
        let updated = self
            .collection
            .find_one_and_update(doc! { "email": email }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await
            .map_err(ProfileError::store)?;
        match updated {
            Some(d) => d.try_into(),
            None => Err(ProfileError::NotFound(email.to_string())),
        }
    }

    async fn collect(&self, filter: mongodb::bson::Document) -> RepoResult<Vec<ProfileRecord>> {
        let docs: Vec<ProfileDocument> = self
            .collection
            .find(filter)
            .await
            .map_err(ProfileError::store)?
            .try_collect()
            .await
            .map_err(ProfileError::store)?;
        docs.into_iter().map(ProfileRecord::try_from).collect()
    }
}

#[async_trait]
impl ProfileRepository for DocumentStoreRepository {
    fn backend(&self) -> &'static str {
        "document"
    }

    async fn create(&self, record: ProfileRecord) -> RepoResult<ProfileRecord> {
        let existing = self
            .collection
            .find_one(doc! { "email": record.email.as_str() })
            .await
            .map_err(ProfileError::store)?;
        if existing.is_some() {
            return Err(ProfileError::AlreadyExists(record.email));
        }

        match self.collection.insert_one(ProfileDocument::from(&record)).await {
            Ok(_) => Ok(record),
            Err(e) if is_duplicate_key(&e) => Err(ProfileError::AlreadyExists(record.email)),
            Err(e) => Err(ProfileError::store(e)),
        }
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<ProfileRecord> {
        self.collection
            .find_one(doc! { "email": email })
            .await
            .map_err(ProfileError::store)?
            .ok_or_else(|| ProfileError::NotFound(email.to_string()))?
            .try_into()
    }

    async fn update_state(&self, email: &str, state: bool) -> RepoResult<ProfileRecord> {
        self.find_one_and_set(email, doc! { "state": state }).await
    }

    async fn attach_image(&self, email: &str, asset: ImageAsset) -> RepoResult<ProfileRecord> {
        let picture: Bson =
            mongodb::bson::to_bson(&PictureDocument::encode(&asset)).map_err(ProfileError::store)?;
        self.find_one_and_set(email, doc! { "picture": picture }).await
    }

    async fn delete(&self, email: &str) -> RepoResult<u64> {
        let res = self
            .collection
            .delete_one(doc! { "email": email })
            .await
            .map_err(ProfileError::store)?;
        match res.deleted_count {
            0 => Err(ProfileError::NotFound(email.to_string())),
            n => Ok(n),
        }
    }

    async fn list_all(&self) -> RepoResult<Vec<ProfileRecord>> {
        self.collect(doc! {}).await
    }

    async fn list_by_type(&self, user_type: UserType) -> RepoResult<Vec<ProfileRecord>> {
        self.collect(doc! { "usertype": user_type.as_i32() }).await
    }

    async fn reset(&self) -> RepoResult<()> {
        self.collection.drop().await.map_err(ProfileError::store)?;
        self.ensure_indexes().await.map_err(ProfileError::store)
    }
}
