mod codec;
mod statements;

use anyhow::Context;
use async_trait::async_trait;
use futures::TryStreamExt;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::response::query_result::QueryResult;
use scylla::statement::prepared::PreparedStatement;
use scylla::value::{CqlValue, Row};
use std::time::Duration;
use tracing::{debug, info};

pub use codec::PictureCell;
use statements::{Statement, USERS};

use crate::config::WideColumnConfig;
use crate::profiles::repo::{ProfileError, ProfileRepository, RepoResult};
use crate::profiles::repo_types::{ImageAsset, ImageCodec, ProfileRecord, UserType};

/// Rows fetched per page when scanning the table.
const SCAN_PAGE_SIZE: i32 = 100;

/// Column order of [`USERS`]: email, password, picture, state, usertype.
type UserRow = (String, Option<String>, Option<Vec<u8>>, Option<bool>, Option<i32>);

fn record_from_row(row: UserRow) -> RepoResult<ProfileRecord> {
    let (email, password, picture, state, user_type) = row;
    Ok(ProfileRecord {
        email,
        password_hash: password.unwrap_or_default(),
        picture: PictureCell(picture).decode()?,
        state: state.unwrap_or(true),
        user_type: UserType::normalize(user_type.map(i64::from)),
    })
}

/// First cell of a conditional write's result row.
fn applied_flag(row: &Row) -> RepoResult<bool> {
    match row.columns.first() {
        Some(Some(CqlValue::Boolean(applied))) => Ok(*applied),
        other => Err(ProfileError::Store(format!(
            "conditional write returned no [applied] flag: {:?}",
            other
        ))),
    }
}

fn was_applied(result: QueryResult) -> RepoResult<bool> {
    let row = result
        .into_rows_result()
        .map_err(ProfileError::store)?
        .first_row::<Row>()
        .map_err(ProfileError::store)?;
    applied_flag(&row)
}

/// One template per repository operation. Bind values are passed in the
/// order of each template's `names`.
struct Templates {
    insert: Statement,
    select_one: Statement,
    select_all: Statement,
    set_state: Statement,
    set_picture: Statement,
    delete: Statement,
}

impl Templates {
    fn users() -> Self {
        Self {
            insert: USERS.insert_if_absent(),
            select_one: USERS.select_by_key(),
            select_all: USERS.select_all(),
            set_state: USERS.update_if_exists(&["state"]),
            set_picture: USERS.update_if_exists(&["picture", "state"]),
            delete: USERS.delete_if_exists(),
        }
    }
}

/// Templates prepared once against the fixed column list at startup.
struct PreparedStatements {
    insert: PreparedStatement,
    select_one: PreparedStatement,
    select_all: PreparedStatement,
    set_state: PreparedStatement,
    set_picture: PreparedStatement,
    delete: PreparedStatement,
}

impl PreparedStatements {
    async fn prepare(session: &Session, t: Templates) -> anyhow::Result<Self> {
        async fn one(session: &Session, s: Statement) -> anyhow::Result<PreparedStatement> {
            debug!(cql = %s.cql, binds = ?s.names, "preparing statement");
            session
                .prepare(s.cql.clone())
                .await
                .with_context(|| format!("prepare `{}`", s.cql))
        }

        let mut select_all = one(session, t.select_all).await?;
        select_all.set_page_size(SCAN_PAGE_SIZE);

        Ok(Self {
            insert: one(session, t.insert).await?,
            select_one: one(session, t.select_one).await?,
            select_all,
            set_state: one(session, t.set_state).await?,
            set_picture: one(session, t.set_picture).await?,
            delete: one(session, t.delete).await?,
        })
    }
}

/// Wide-column adapter.
///
/// Create, state updates and deletes are single conditional writes
/// (`IF NOT EXISTS` / `IF EXISTS`). `attach_image` reads the row, swaps the
/// picture in memory and writes picture and state back, so a state change
/// racing with it on the same email can be lost. Callers that need strict
/// ordering must serialize per email themselves.
pub struct WideColumnRepository {
    session: Session,
    stmts: PreparedStatements,
}

impl WideColumnRepository {
    /// Connects, creates keyspace and table when missing, prepares statements.
    pub async fn connect(cfg: &WideColumnConfig, connect_timeout: Duration) -> anyhow::Result<Self> {
        let session = SessionBuilder::new()
            .known_nodes(&cfg.nodes)
            .connection_timeout(connect_timeout)
            .build()
            .await
            .context("connect to wide-column store")?;

        let create_keyspace = format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
             {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
            cfg.keyspace, cfg.replication_factor
        );
        session
            .query_unpaged(create_keyspace, ())
            .await
            .context("create keyspace")?;
        session
            .use_keyspace(&cfg.keyspace, false)
            .await
            .with_context(|| format!("use keyspace {}", cfg.keyspace))?;
        session
            .query_unpaged(USERS.create_table(), ())
            .await
            .context("create users table")?;

        let stmts = PreparedStatements::prepare(&session, Templates::users()).await?;
        info!(keyspace = %cfg.keyspace, table = USERS.name, "wide-column store ready");
        Ok(Self { session, stmts })
    }

    async fn select_one(&self, email: &str) -> RepoResult<Option<ProfileRecord>> {
        let row = self
            .session
            .execute_unpaged(&self.stmts.select_one, (email,))
            .await
            .map_err(ProfileError::store)?
            .into_rows_result()
            .map_err(ProfileError::store)?
            .maybe_first_row::<UserRow>()
            .map_err(ProfileError::store)?;
        row.map(record_from_row).transpose()
    }

    /// Paged full scan.
    async fn select_all(&self) -> RepoResult<Vec<ProfileRecord>> {
        let rows: Vec<UserRow> = self
            .session
            .execute_iter(self.stmts.select_all.clone(), ())
            .await
            .map_err(ProfileError::store)?
            .rows_stream::<UserRow>()
            .map_err(ProfileError::store)?
            .try_collect()
            .await
            .map_err(ProfileError::store)?;
        rows.into_iter().map(record_from_row).collect()
    }

    async fn load(&self, email: &str) -> RepoResult<ProfileRecord> {
        self.select_one(email)
            .await?
            .ok_or_else(|| ProfileError::NotFound(email.to_string()))
    }
}

#[async_trait]
impl ProfileRepository for WideColumnRepository {
    fn backend(&self) -> &'static str {
        "wide-column"
    }

    async fn create(&self, record: ProfileRecord) -> RepoResult<ProfileRecord> {
        let picture = record.picture.as_ref().map(PictureCell::encode).and_then(|c| c.0);
        let result = self
            .session
            .execute_unpaged(
                &self.stmts.insert,
                (
                    record.email.as_str(),
                    record.password_hash.as_str(),
                    picture,
                    record.state,
                    record.user_type.as_i32(),
                ),
            )
            .await
            .map_err(ProfileError::store)?;
        if !was_applied(result)? {
            return Err(ProfileError::AlreadyExists(record.email));
        }
        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<ProfileRecord> {
        self.load(email).await
    }

    async fn update_state(&self, email: &str, state: bool) -> RepoResult<ProfileRecord> {
        let mut record = self.load(email).await?;
        let result = self
            .session
            .execute_unpaged(&self.stmts.set_state, (state, email))
            .await
            .map_err(ProfileError::store)?;
        if !was_applied(result)? {
            return Err(ProfileError::NotFound(email.to_string()));
        }
        record.state = state;
        Ok(record)
    }

    async fn attach_image(&self, email: &str, asset: ImageAsset) -> RepoResult<ProfileRecord> {
        let mut record = self.load(email).await?;
        record.picture = Some(asset);
        let picture = record.picture.as_ref().map(PictureCell::encode).and_then(|c| c.0);
        let result = self
            .session
            .execute_unpaged(&self.stmts.set_picture, (picture, record.state, email))
            .await
            .map_err(ProfileError::store)?;
        if !was_applied(result)? {
            return Err(ProfileError::NotFound(email.to_string()));
        }
        Ok(record)
    }

    async fn delete(&self, email: &str) -> RepoResult<u64> {
        let result = self
            .session
            .execute_unpaged(&self.stmts.delete, (email,))
            .await
            .map_err(ProfileError::store)?;
        match was_applied(result)? {
            true => Ok(1),
            false => Err(ProfileError::NotFound(email.to_string())),
        }
    }

    async fn list_all(&self) -> RepoResult<Vec<ProfileRecord>> {
        self.select_all().await
    }

    async fn list_by_type(&self, user_type: UserType) -> RepoResult<Vec<ProfileRecord>> {
        let mut records = self.select_all().await?;
        records.retain(|r| r.user_type == user_type);
        Ok(records)
    }

    async fn reset(&self) -> RepoResult<()> {
        self.session
            .query_unpaged(USERS.truncate(), ())
            .await
            .map_err(ProfileError::store)?;
        Ok(())
    }
}
