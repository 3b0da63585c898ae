mod schema;
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "postgres")]
pub mod postgres_schema;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

pub use schema::SCHEMA;

use crate::config::{DatabaseConfig, DatabaseType};
use crate::directory::{
    DirectoryEntry, EntityStatus, EntityType, NewEntry, ProfileData, ProfileSummary,
};
use crate::search::SearchFilter;

/// An entry selected for geocoding, with its document still undecoded.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeCandidate {
    pub id: Uuid,
    pub document: String,
}

/// Persistence operations used by the search engine, the importer and the
/// geocoding backfill.
pub trait DirectoryStore: Send + Sync {
    /// Count matches and fetch one ranked page of summaries for the same filter.
    fn search_profiles(
        &self,
        filter: &SearchFilter,
        limit: u32,
        offset: u32,
    ) -> Result<(u64, Vec<ProfileSummary>)>;

    fn get_profile_detail(&self, id: Uuid) -> Result<Option<DirectoryEntry>>;

    fn get_profile_by_user(&self, user_id: Uuid) -> Result<Option<DirectoryEntry>>;

    /// Insert or update an entry, keyed by owning user when set and by slug otherwise.
    fn upsert_profile(&self, entry: &NewEntry) -> Result<(Uuid, DateTime<Utc>)>;

    /// Entries whose first address has no latitude yet. Entries with fewer failed
    /// geocoding attempts come first, then oldest first.
    fn ungeocoded_candidates(&self, limit: u32) -> Result<Vec<GeocodeCandidate>>;

    /// Count a geocoding attempt that did not produce coordinates, moving the entry
    /// behind the ones not tried as often.
    fn record_geocode_attempt(&self, id: Uuid) -> Result<()>;

    /// Replace the raw profile document of an entry. Returns false if the entry is gone.
    fn update_profile_document(&self, id: Uuid, document: &Value) -> Result<bool>;

    fn count_active(&self) -> Result<u64>;
}

pub(crate) fn parse_entity_type(s: &str) -> Result<EntityType> {
    EntityType::from_str(s).ok_or_else(|| anyhow!("Unknown entity type: {}", s))
}

pub(crate) fn parse_status(s: &str) -> Result<EntityStatus> {
    EntityStatus::from_str(s).ok_or_else(|| anyhow!("Unknown entity status: {}", s))
}

pub(crate) fn decode_document(id: &str, document: &str) -> Result<ProfileData> {
    serde_json::from_str(document)
        .with_context(|| format!("Malformed profile document for entry {}", id))
}

/// Slug for a claimed entry whose plain slug already belongs to someone else.
pub(crate) fn owner_slug(slug: &str, user_id: Uuid) -> String {
    let owner = user_id.simple().to_string();
    format!("{}-{}", slug, &owner[..8])
}

/// Macro to dispatch a method call to the active backend variant.
macro_rules! dispatch {
    ($self:expr, $method:ident($($arg:expr),* $(,)?)) => {
        match &$self.inner {
            DatabaseInner::Sqlite(db) => db.$method($($arg),*),
            #[cfg(feature = "postgres")]
            DatabaseInner::Postgres(db) => db.$method($($arg),*),
        }
    };
}

enum DatabaseInner {
    Sqlite(sqlite::SqliteDb),
    #[cfg(feature = "postgres")]
    Postgres(postgres::PgDb),
}

/// The process-wide store handle. Opened once at startup and shared behind an `Arc`.
pub struct Database {
    inner: DatabaseInner,
}

impl Database {
    /// Open a database connection based on the provided configuration.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        match config.backend {
            DatabaseType::Postgresql => Self::open_postgres(config),
            DatabaseType::Sqlite => {
                let db = sqlite::SqliteDb::open(&config.sqlite_path)?;
                Ok(Self { inner: DatabaseInner::Sqlite(db) })
            }
        }
    }

    #[cfg(feature = "postgres")]
    fn open_postgres(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .postgresql_url
            .as_deref()
            .ok_or_else(|| anyhow!("PostgreSQL URL not configured"))?;
        let pg = postgres::PgDb::open(url, &config.pool)?;
        Ok(Self { inner: DatabaseInner::Postgres(pg) })
    }

    #[cfg(not(feature = "postgres"))]
    fn open_postgres(_config: &DatabaseConfig) -> Result<Self> {
        Err(anyhow!(
            "PostgreSQL backend requested but this build lacks the `postgres` feature"
        ))
    }

    pub fn from_sqlite(db: sqlite::SqliteDb) -> Self {
        Self { inner: DatabaseInner::Sqlite(db) }
    }

    pub fn backend_name(&self) -> &'static str {
        match &self.inner {
            DatabaseInner::Sqlite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            DatabaseInner::Postgres(_) => "postgresql",
        }
    }

    pub fn initialize(&self) -> Result<()> {
        dispatch!(self, initialize())
    }
}

impl DirectoryStore for Database {
    fn search_profiles(
        &self,
        filter: &SearchFilter,
        limit: u32,
        offset: u32,
    ) -> Result<(u64, Vec<ProfileSummary>)> {
        dispatch!(self, search_profiles(filter, limit, offset))
    }

    fn get_profile_detail(&self, id: Uuid) -> Result<Option<DirectoryEntry>> {
        dispatch!(self, get_profile_detail(id))
    }

    fn get_profile_by_user(&self, user_id: Uuid) -> Result<Option<DirectoryEntry>> {
        dispatch!(self, get_profile_by_user(user_id))
    }

    fn upsert_profile(&self, entry: &NewEntry) -> Result<(Uuid, DateTime<Utc>)> {
        dispatch!(self, upsert_profile(entry))
    }

    fn ungeocoded_candidates(&self, limit: u32) -> Result<Vec<GeocodeCandidate>> {
        dispatch!(self, ungeocoded_candidates(limit))
    }

    fn record_geocode_attempt(&self, id: Uuid) -> Result<()> {
        dispatch!(self, record_geocode_attempt(id))
    }

    fn update_profile_document(&self, id: Uuid, document: &Value) -> Result<bool> {
        dispatch!(self, update_profile_document(id, document))
    }

    fn count_active(&self) -> Result<u64> {
        dispatch!(self, count_active())
    }
}
