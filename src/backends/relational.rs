use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use std::time::Duration;
use tracing::info;

use crate::config::RelationalConfig;
use crate::profiles::repo::{ProfileError, ProfileRepository, RepoResult};
use crate::profiles::repo_types::{ImageAsset, ImageCodec, ProfileRecord, UserType};

const TABLE: &str = "user_profiles";

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS user_profiles (
        email             VARCHAR(255) PRIMARY KEY,
        password          VARCHAR(255) NOT NULL,
        picture_data      BYTEA,
        picture_extension VARCHAR(255),
        state             BOOLEAN NOT NULL DEFAULT true,
        user_type         INT8 NOT NULL DEFAULT 1
    )
"#;

/// Only the schema the pool connects into counts.
const TABLE_EXISTS: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM information_schema.tables
        WHERE table_schema = current_schema()
          AND table_name = $1
    )
"#;

const COLUMNS: &str = "email, password, picture_data, picture_extension, state, user_type";

/// Row as stored in `user_profiles`.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileRow {
    pub email: String,
    pub password: String,
    pub picture_data: Option<Vec<u8>>,
    pub picture_extension: Option<String>,
    pub state: bool,
    pub user_type: i64,
}

/// The picture as its two nullable columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PictureColumns {
    pub data: Option<Vec<u8>>,
    pub extension: Option<String>,
}

impl ImageCodec for PictureColumns {
    fn encode(asset: &ImageAsset) -> Self {
        Self {
            data: Some(asset.data().to_vec()),
            extension: Some(asset.file_extension().to_string()),
        }
    }

    fn decode(self) -> Result<Option<ImageAsset>, ProfileError> {
        match (self.data, self.extension) {
            (None, None) => Ok(None),
            (Some(data), Some(ext)) => ImageAsset::new(data, &ext)
                .map(Some)
                .map_err(|e| ProfileError::Store(format!("corrupt picture columns: {}", e))),
            _ => Err(ProfileError::Store(
                "picture data and extension must be set together".into(),
            )),
        }
    }
}

impl TryFrom<ProfileRow> for ProfileRecord {
    type Error = ProfileError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let picture = PictureColumns {
            data: row.picture_data,
            extension: row.picture_extension,
        }
        .decode()?;
        Ok(Self {
            email: row.email,
            password_hash: row.password,
            picture,
            state: row.state,
            user_type: UserType::normalize(Some(row.user_type)),
        })
    }
}

fn into_records(rows: Vec<ProfileRow>) -> RepoResult<Vec<ProfileRecord>> {
    rows.into_iter().map(ProfileRecord::try_from).collect()
}

pub struct RelationalRepository {
    db: PgPool,
}

impl RelationalRepository {
    pub async fn connect(cfg: &RelationalConfig, connect_timeout: Duration) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(connect_timeout)
            .connect(&cfg.database_url)
            .await
            .context("connect to database")?;
        let version: String = sqlx::query_scalar("SELECT version()")
            .fetch_one(&db)
            .await
            .context("query server version")?;
        info!(%version, "relational store connected");

        let repo = Self { db };
        repo.ensure_schema().await.context("create profile table")?;
        Ok(repo)
    }

    pub async fn table_exists(&self) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(TABLE_EXISTS)
        .bind(TABLE)
        .fetch_one(&self.db)
        .await
    }

    /// Creates the table unless it is already there.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        if self.table_exists().await? {
            info!(table = TABLE, "profile table already present");
            return Ok(());
        }
        sqlx::query(CREATE_TABLE).execute(&self.db).await?;
        info!(table = TABLE, "profile table created");
        Ok(())
    }

    /// Drops the table and recreates it empty.
    pub async fn drop_and_recreate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("DROP TABLE IF EXISTS user_profiles")
            .execute(&self.db)
            .await?;
        sqlx::query(CREATE_TABLE).execute(&self.db).await?;
        info!(table = TABLE, "profile table dropped and recreated");
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for RelationalRepository {
    fn backend(&self) -> &'static str {
        "relational"
    }

    async fn create(&self, record: ProfileRecord) -> RepoResult<ProfileRecord> {
        let picture = record
            .picture
            .as_ref()
            .map(PictureColumns::encode)
            .unwrap_or_default();
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            r#"
            INSERT INTO user_profiles ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(picture.data)
        .bind(picture.extension)
        .bind(record.state)
        .bind(i64::from(record.user_type.as_i32()))
        .fetch_optional(&self.db)
        .await
        .map_err(ProfileError::store)?;

        match row {
            Some(row) => row.try_into(),
            None => Err(ProfileError::AlreadyExists(record.email)),
        }
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<ProfileRecord> {
        sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {COLUMNS} FROM user_profiles WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(ProfileError::store)?
        .ok_or_else(|| ProfileError::NotFound(email.to_string()))?
        .try_into()
    }

    async fn update_state(&self, email: &str, state: bool) -> RepoResult<ProfileRecord> {
        sqlx::query_as::<_, ProfileRow>(&format!(
            "UPDATE user_profiles SET state = $2 WHERE email = $1 RETURNING {COLUMNS}"
        ))
        .bind(email)
        .bind(state)
        .fetch_optional(&self.db)
        .await
        .map_err(ProfileError::store)?
        .ok_or_else(|| ProfileError::NotFound(email.to_string()))?
        .try_into()
    }

    async fn attach_image(&self, email: &str, asset: ImageAsset) -> RepoResult<ProfileRecord> {
        let picture = PictureColumns::encode(&asset);
        sqlx::query_as::<_, ProfileRow>(&format!(
            r#"
            UPDATE user_profiles
               SET picture_data = $2, picture_extension = $3
             WHERE email = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(email)
        .bind(picture.data)
        .bind(picture.extension)
        .fetch_optional(&self.db)
        .await
        .map_err(ProfileError::store)?
        .ok_or_else(|| ProfileError::NotFound(email.to_string()))?
        .try_into()
    }

    async fn delete(&self, email: &str) -> RepoResult<u64> {
        let res = sqlx::query("DELETE FROM user_profiles WHERE email = $1")
            .bind(email)
            .execute(&self.db)
            .await
            .map_err(ProfileError::store)?;
        match res.rows_affected() {
            0 => Err(ProfileError::NotFound(email.to_string())),
            n => Ok(n),
        }
    }

    async fn list_all(&self) -> RepoResult<Vec<ProfileRecord>> {
        let rows = sqlx::query_as::<_, ProfileRow>(&format!("SELECT {COLUMNS} FROM user_profiles"))
            .fetch_all(&self.db)
            .await
            .map_err(ProfileError::store)?;
        into_records(rows)
    }

    async fn list_by_type(&self, user_type: UserType) -> RepoResult<Vec<ProfileRecord>> {
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {COLUMNS} FROM user_profiles WHERE user_type = $1"
        ))
        .bind(i64::from(user_type.as_i32()))
        .fetch_all(&self.db)
        .await
        .map_err(ProfileError::store)?;
        into_records(rows)
    }

    async fn reset(&self) -> RepoResult<()> {
        self.drop_and_recreate().await.map_err(ProfileError::store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> ProfileRow {
        ProfileRow {
            email: "a@x.com".into(),
            password: "h".into(),
            picture_data: None,
            picture_extension: None,
            state: true,
            user_type: 2,
        }
    }

    #[test]
    fn row_without_picture() {
        let record = ProfileRecord::try_from(row()).unwrap();
        assert!(record.picture.is_none());
        assert_eq!(record.user_type.as_i32(), 2);
        assert_eq!(record.password_hash, "h");
    }

    #[test]
    fn row_with_picture_columns() {
        let mut r = row();
        r.picture_data = Some(vec![1, 2, 3]);
        r.picture_extension = Some(".png".into());
        let pic = ProfileRecord::try_from(r).unwrap().picture.unwrap();
        assert_eq!(pic.data(), &[1, 2, 3]);
        assert_eq!(pic.file_extension(), ".png");
    }

    #[test]
    fn half_set_picture_columns_are_rejected() {
        let mut r = row();
        r.picture_data = Some(vec![1]);
        assert!(matches!(
            ProfileRecord::try_from(r),
            Err(ProfileError::Store(_))
        ));
    }

    #[test]
    fn out_of_range_user_type_column_is_normalized() {
        let mut r = row();
        r.user_type = 0;
        assert_eq!(ProfileRecord::try_from(r).unwrap().user_type, UserType::DEFAULT);
    }

    #[test]
    fn picture_columns_roundtrip_through_codec() {
        let asset = ImageAsset::new(vec![5; 10], "jpg").unwrap();
        let cols = PictureColumns::encode(&asset);
        assert_eq!(cols.extension.as_deref(), Some(".jpg"));
        assert_eq!(cols.decode().unwrap(), Some(asset));
        assert_eq!(PictureColumns::default().decode().unwrap(), None);
    }

    fn declared_type(column: &str) -> String {
        CREATE_TABLE
            .lines()
            .map(str::trim)
            .find(|l| l.split_whitespace().next() == Some(column))
            .and_then(|l| l.split_whitespace().nth(1))
            .map(|t| t.trim_end_matches(',').to_string())
            .unwrap()
    }

    #[test]
    fn user_type_column_decodes_into_row_field() {
        use sqlx::{Postgres, Type, TypeInfo};

        let field = <i64 as Type<Postgres>>::type_info();
        assert_eq!(declared_type("user_type"), field.name());
        // a bare INTEGER is INT8 on CockroachDB, which an i32 field rejects
        assert!(!<i32 as Type<Postgres>>::compatible(&field));
    }

    #[test]
    fn table_lookup_is_scoped_to_current_schema() {
        assert!(TABLE_EXISTS.contains("table_schema = current_schema()"));
        assert!(TABLE_EXISTS.contains("table_name = $1"));
    }

    #[test]
    fn schema_keys_on_email() {
        assert!(CREATE_TABLE.contains("email             VARCHAR(255) PRIMARY KEY"));
        assert!(CREATE_TABLE.contains("picture_data      BYTEA"));
        assert!(COLUMNS.split(", ").all(|c| CREATE_TABLE.contains(c)));
    }
}
