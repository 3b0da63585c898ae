//! SQLite backend implementation.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;
use uuid::Uuid;

use super::schema::SCHEMA;
use super::{
    decode_document, owner_slug, parse_entity_type, parse_status, DirectoryStore,
    GeocodeCandidate,
};
use crate::directory::{DirectoryEntry, NewEntry, ProfileSummary};
use crate::search::projection::{project_rows, SummaryRow};
use crate::search::SearchFilter;

/// Shared predicate of the count and page queries.
///
/// Rows whose document is not valid JSON never match, so the count and the
/// page agree and one corrupt row cannot fail the whole query.
const SEARCH_FILTER: &str = r#"
    WHERE is_active = 1
      AND json_valid(profile_data)
      AND (?1 IS NULL OR name LIKE ?1 ESCAPE '\')
      AND (?2 IS NULL OR (CASE WHEN json_valid(profile_data)
                               THEN json_extract(profile_data, '$.addresses[0].city')
                          END) LIKE ?2 ESCAPE '\')
      AND (?3 IS NULL
           OR entity_type = ?3
           OR (CASE WHEN json_valid(profile_data)
                    THEN EXISTS (SELECT 1 FROM json_each(profile_data, '$.specialties')
                                 WHERE json_each.value = ?3)
                    ELSE 0
               END))
"#;

const ENTRY_COLUMNS: &str = "id, user_id, entity_type, status, name, slug, profile_data, \
                             rating, review_count, is_active, created_at, updated_at";

pub struct SqliteDb {
    conn: Mutex<Connection>,
}

/// Columns of a full row, before the document and enums are decoded.
struct EntryRow {
    id: String,
    user_id: Option<String>,
    entity_type: String,
    status: String,
    name: String,
    slug: String,
    profile_data: String,
    rating: f64,
    review_count: i64,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            entity_type: row.get(2)?,
            status: row.get(3)?,
            name: row.get(4)?,
            slug: row.get(5)?,
            profile_data: row.get(6)?,
            rating: row.get(7)?,
            review_count: row.get(8)?,
            is_active: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_entry(self) -> Result<DirectoryEntry> {
        Ok(DirectoryEntry {
            id: parse_uuid(&self.id)?,
            user_id: self.user_id.as_deref().map(parse_uuid).transpose()?,
            entity_type: parse_entity_type(&self.entity_type)?,
            status: parse_status(&self.status)?,
            profile_data: decode_document(&self.id, &self.profile_data)?,
            name: self.name,
            slug: self.slug,
            rating: self.rating,
            review_count: self.review_count,
            is_active: self.is_active,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("Invalid entry id: {}", s))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp: {}", s))
}

impl SqliteDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Exclusive access to the connection for the duration of one call.
    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned"))
    }

    fn get_entry_where(&self, column: &str, value: &str) -> Result<Option<DirectoryEntry>> {
        let sql = format!(
            "SELECT {} FROM professional_entities WHERE {} = ?1",
            ENTRY_COLUMNS, column
        );
        let row = self
            .conn()?
            .query_row(&sql, [value], EntryRow::from_row)
            .optional()?;
        row.map(EntryRow::into_entry).transpose()
    }

    #[cfg(test)]
    pub(crate) fn raw_document(&self, id: Uuid) -> Result<String> {
        Ok(self.conn()?.query_row(
            "SELECT profile_data FROM professional_entities WHERE id = ?1",
            [id.to_string()],
            |row| row.get(0),
        )?)
    }

    /// Store a raw document without validation. Only used to simulate corrupt rows.
    #[cfg(test)]
    pub(crate) fn set_raw_document(&self, id: Uuid, document: &str) -> Result<()> {
        self.conn()?.execute(
            "UPDATE professional_entities SET profile_data = ?1 WHERE id = ?2",
            rusqlite::params![document, id.to_string()],
        )?;
        Ok(())
    }
}

impl DirectoryStore for SqliteDb {
    fn search_profiles(
        &self,
        filter: &SearchFilter,
        limit: u32,
        offset: u32,
    ) -> Result<(u64, Vec<ProfileSummary>)> {
        let name = filter.name_pattern();
        let city = filter.city_pattern();
        let tag = filter.tag();

        let conn = self.conn()?;

        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM professional_entities {}", SEARCH_FILTER),
                rusqlite::params![name, city, tag],
                |row| row.get(0),
            )
            .context("Failed to count profiles")?;

        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT id, name, entity_type, rating, review_count,
                   json_valid(profile_data),
                   CASE WHEN json_valid(profile_data) THEN profile_data -> '$.addresses[0]' END
            FROM professional_entities
            {}
            ORDER BY rating DESC, review_count DESC, rowid ASC
            LIMIT ?4 OFFSET ?5
            "#,
            SEARCH_FILTER
        ))?;

        let rows = stmt.query_map(
            rusqlite::params![name, city, tag, limit as i64, offset as i64],
            |row| {
                Ok(SummaryRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    entity_type: row.get(2)?,
                    rating: row.get(3)?,
                    review_count: row.get(4)?,
                    document_ok: row.get(5)?,
                    first_address: row.get(6)?,
                })
            },
        )?;

        let mut raw = Vec::new();
        for row in rows {
            match row {
                Ok(r) => raw.push(r),
                Err(e) => warn!("Skipping unreadable directory row: {}", e),
            }
        }

        Ok((total.max(0) as u64, project_rows(raw)))
    }

    fn get_profile_detail(&self, id: Uuid) -> Result<Option<DirectoryEntry>> {
        self.get_entry_where("id", &id.to_string())
    }

    fn get_profile_by_user(&self, user_id: Uuid) -> Result<Option<DirectoryEntry>> {
        self.get_entry_where("user_id", &user_id.to_string())
    }

    fn upsert_profile(&self, entry: &NewEntry) -> Result<(Uuid, DateTime<Utc>)> {
        // Imports must not overwrite an entry a professional already owns.
        let conflict = if entry.user_id.is_some() {
            r#"
            ON CONFLICT(user_id) DO UPDATE SET
                entity_type = excluded.entity_type,
                status = excluded.status,
                name = excluded.name,
                slug = excluded.slug,
                profile_data = excluded.profile_data,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#
        } else {
            r#"
            ON CONFLICT(slug) DO UPDATE SET
                entity_type = excluded.entity_type,
                profile_data = excluded.profile_data,
                rating = excluded.rating,
                review_count = excluded.review_count,
                updated_at = excluded.updated_at
            WHERE professional_entities.user_id IS NULL
            "#
        };

        let sql = format!(
            r#"
            INSERT INTO professional_entities (
                id, user_id, entity_type, status, name, slug, profile_data,
                rating, review_count, is_active, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            {}
            RETURNING id, created_at
            "#,
            conflict
        );

        let document = serde_json::to_string(&entry.profile_data)?;
        let now = format_timestamp(Utc::now());

        let conn = self.conn()?;

        let slug = match entry.user_id {
            Some(user_id) => {
                let owner: Option<Option<String>> = conn
                    .query_row(
                        "SELECT user_id FROM professional_entities WHERE slug = ?1",
                        [&entry.slug],
                        |row| row.get(0),
                    )
                    .optional()?;
                match owner {
                    Some(owner) if owner != Some(user_id.to_string()) => {
                        owner_slug(&entry.slug, user_id)
                    }
                    _ => entry.slug.clone(),
                }
            }
            None => entry.slug.clone(),
        };

        let returned = conn
            .query_row(
                &sql,
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    entry.user_id.map(|u| u.to_string()),
                    entry.entity_type.as_str(),
                    entry.status.as_str(),
                    entry.name,
                    slug,
                    document,
                    entry.rating,
                    entry.review_count,
                    entry.is_active,
                    now,
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .with_context(|| format!("Failed to upsert profile {}", slug))?;

        let (id, created_at) =
            returned.ok_or_else(|| anyhow!("Slug {} belongs to a claimed entry", slug))?;
        Ok((parse_uuid(&id)?, parse_timestamp(&created_at)?))
    }

    fn ungeocoded_candidates(&self, limit: u32) -> Result<Vec<GeocodeCandidate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, profile_data
            FROM professional_entities
            WHERE CASE WHEN json_valid(profile_data) THEN
                      CASE COALESCE(json_type(profile_data, '$.addresses[0].latitude'), 'null')
                          WHEN 'integer' THEN json_extract(profile_data, '$.addresses[0].latitude') = 0
                          WHEN 'real' THEN json_extract(profile_data, '$.addresses[0].latitude') = 0
                          WHEN 'null' THEN 1
                          ELSE 0
                      END
                  ELSE 0
                  END
            ORDER BY geocode_attempts ASC, rowid ASC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut candidates = Vec::new();
        for row in rows {
            let (id, document) = row?;
            match Uuid::parse_str(&id) {
                Ok(id) => candidates.push(GeocodeCandidate { id, document }),
                Err(e) => warn!("Skipping entry with invalid id {:?}: {}", id, e),
            }
        }
        Ok(candidates)
    }

    fn record_geocode_attempt(&self, id: Uuid) -> Result<()> {
        self.conn()?.execute(
            "UPDATE professional_entities SET geocode_attempts = geocode_attempts + 1 WHERE id = ?1",
            [id.to_string()],
        )?;
        Ok(())
    }

    fn update_profile_document(&self, id: Uuid, document: &Value) -> Result<bool> {
        let document = serde_json::to_string(document)?;
        let changed = self.conn()?.execute(
            "UPDATE professional_entities SET profile_data = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![document, format_timestamp(Utc::now()), id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn count_active(&self) -> Result<u64> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM professional_entities WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}
