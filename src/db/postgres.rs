//! PostgreSQL backend implementation.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use postgres::types::Json;
use postgres::NoTls;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use super::postgres_schema::POSTGRES_SCHEMA;
use super::{owner_slug, parse_entity_type, parse_status, DirectoryStore, GeocodeCandidate};
use crate::config::PoolConfig;
use crate::directory::{DirectoryEntry, NewEntry, ProfileData, ProfileSummary};
use crate::search::projection::{project_rows, SummaryRow};
use crate::search::SearchFilter;

const SEARCH_FILTER: &str = r#"
    WHERE is_active
      AND ($1::text IS NULL OR name ILIKE $1)
      AND ($2::text IS NULL OR profile_data->'addresses'->0->>'city' ILIKE $2)
      AND ($3::text IS NULL
           OR entity_type = $3
           OR profile_data->'specialties' @> jsonb_build_array($3::text))
"#;

const ENTRY_COLUMNS: &str = "id, user_id, entity_type, status, name, slug, profile_data, \
                             rating, review_count, is_active, created_at, updated_at";

pub struct PgDb {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

fn row_to_entry(row: &postgres::Row) -> Result<DirectoryEntry> {
    let id: Uuid = row.try_get(0)?;
    let entity_type: String = row.try_get(2)?;
    let status: String = row.try_get(3)?;
    let Json(profile_data): Json<ProfileData> = row
        .try_get(6)
        .with_context(|| format!("Malformed profile document for entry {}", id))?;

    Ok(DirectoryEntry {
        id,
        user_id: row.try_get(1)?,
        entity_type: parse_entity_type(&entity_type)?,
        status: parse_status(&status)?,
        name: row.try_get(4)?,
        slug: row.try_get(5)?,
        profile_data,
        rating: row.try_get(7)?,
        review_count: row.try_get(8)?,
        is_active: row.try_get(9)?,
        created_at: row.try_get(10)?,
        updated_at: row.try_get(11)?,
    })
}

impl PgDb {
    pub fn open(url: &str, config: &PoolConfig) -> Result<Self> {
        let manager = PostgresConnectionManager::new(url.parse()?, NoTls);
        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_idle))
            .max_lifetime(Some(Duration::from_secs(config.max_lifetime_secs)))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build(manager)
            .context("Failed to connect to PostgreSQL")?;
        Ok(Self { pool })
    }

    pub fn initialize(&self) -> Result<()> {
        let mut client = self.pool.get()?;
        client.batch_execute(POSTGRES_SCHEMA)?;
        Ok(())
    }

    fn get_entry_where(&self, column: &str, value: Uuid) -> Result<Option<DirectoryEntry>> {
        let mut client = self.pool.get()?;
        let row = client.query_opt(
            &format!(
                "SELECT {} FROM professional_entities WHERE {} = $1",
                ENTRY_COLUMNS, column
            ),
            &[&value],
        )?;
        row.as_ref().map(row_to_entry).transpose()
    }
}

impl DirectoryStore for PgDb {
    fn search_profiles(
        &self,
        filter: &SearchFilter,
        limit: u32,
        offset: u32,
    ) -> Result<(u64, Vec<ProfileSummary>)> {
        let name = filter.name_pattern();
        let city = filter.city_pattern();
        let tag = filter.tag().map(str::to_string);

        let mut client = self.pool.get()?;

        let total: i64 = client
            .query_one(
                &format!("SELECT COUNT(*) FROM professional_entities {}", SEARCH_FILTER),
                &[&name, &city, &tag],
            )
            .context("Failed to count profiles")?
            .get(0);

        let rows = client.query(
            &format!(
                r#"
                SELECT id, name, entity_type, rating, review_count,
                       (profile_data->'addresses'->0)::text
                FROM professional_entities
                {}
                ORDER BY rating DESC, review_count DESC, created_at ASC, id ASC
                LIMIT $4 OFFSET $5
                "#,
                SEARCH_FILTER
            ),
            &[&name, &city, &tag, &(limit as i64), &(offset as i64)],
        )?;

        let mut raw = Vec::with_capacity(rows.len());
        for row in &rows {
            let read = || -> Result<SummaryRow, postgres::Error> {
                let id: Uuid = row.try_get(0)?;
                Ok(SummaryRow {
                    id: id.to_string(),
                    name: row.try_get(1)?,
                    entity_type: row.try_get(2)?,
                    rating: row.try_get(3)?,
                    review_count: row.try_get(4)?,
                    document_ok: true,
                    first_address: row.try_get(5)?,
                })
            };
            match read() {
                Ok(r) => raw.push(r),
                Err(e) => warn!("Skipping unreadable directory row: {}", e),
            }
        }

        Ok((total.max(0) as u64, project_rows(raw)))
    }

    fn get_profile_detail(&self, id: Uuid) -> Result<Option<DirectoryEntry>> {
        self.get_entry_where("id", id)
    }

    fn get_profile_by_user(&self, user_id: Uuid) -> Result<Option<DirectoryEntry>> {
        self.get_entry_where("user_id", user_id)
    }

    fn upsert_profile(&self, entry: &NewEntry) -> Result<(Uuid, DateTime<Utc>)> {
        let conflict = if entry.user_id.is_some() {
            r#"
            ON CONFLICT(user_id) DO UPDATE SET
                entity_type = EXCLUDED.entity_type,
                status = EXCLUDED.status,
                name = EXCLUDED.name,
                slug = EXCLUDED.slug,
                profile_data = EXCLUDED.profile_data,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            "#
        } else {
            r#"
            ON CONFLICT(slug) DO UPDATE SET
                entity_type = EXCLUDED.entity_type,
                profile_data = EXCLUDED.profile_data,
                rating = EXCLUDED.rating,
                review_count = EXCLUDED.review_count,
                updated_at = NOW()
            WHERE professional_entities.user_id IS NULL
            "#
        };

        let sql = format!(
            r#"
            INSERT INTO professional_entities (
                id, user_id, entity_type, status, name, slug, profile_data,
                rating, review_count, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
            {}
            RETURNING id, created_at
            "#,
            conflict
        );

        let mut client = self.pool.get()?;

        let slug = match entry.user_id {
            Some(user_id) => {
                let owner: Option<Option<Uuid>> = client
                    .query_opt(
                        "SELECT user_id FROM professional_entities WHERE slug = $1",
                        &[&entry.slug],
                    )?
                    .map(|row| row.try_get(0))
                    .transpose()?;
                match owner {
                    Some(owner) if owner != Some(user_id) => owner_slug(&entry.slug, user_id),
                    _ => entry.slug.clone(),
                }
            }
            None => entry.slug.clone(),
        };

        let row = client
            .query_opt(
                &sql,
                &[
                    &Uuid::new_v4(),
                    &entry.user_id,
                    &entry.entity_type.as_str(),
                    &entry.status.as_str(),
                    &entry.name,
                    &slug,
                    &Json(&entry.profile_data),
                    &entry.rating,
                    &entry.review_count,
                    &entry.is_active,
                ],
            )
            .with_context(|| format!("Failed to upsert profile {}", slug))?
            .ok_or_else(|| anyhow!("Slug {} belongs to a claimed entry", slug))?;

        Ok((row.try_get(0)?, row.try_get(1)?))
    }

    fn ungeocoded_candidates(&self, limit: u32) -> Result<Vec<GeocodeCandidate>> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            r#"
            SELECT id, profile_data::text
            FROM professional_entities
            WHERE CASE COALESCE(jsonb_typeof(profile_data->'addresses'->0->'latitude'), 'null')
                      WHEN 'number' THEN (profile_data->'addresses'->0->>'latitude')::double precision = 0
                      WHEN 'null' THEN TRUE
                      ELSE FALSE
                  END
            ORDER BY geocode_attempts ASC, created_at ASC, id ASC
            LIMIT $1
            "#,
            &[&(limit as i64)],
        )?;

        rows.iter()
            .map(|row| {
                Ok(GeocodeCandidate {
                    id: row.try_get(0)?,
                    document: row.try_get(1)?,
                })
            })
            .collect()
    }

    fn record_geocode_attempt(&self, id: Uuid) -> Result<()> {
        let mut client = self.pool.get()?;
        client.execute(
            "UPDATE professional_entities SET geocode_attempts = geocode_attempts + 1 WHERE id = $1",
            &[&id],
        )?;
        Ok(())
    }

    fn update_profile_document(&self, id: Uuid, document: &Value) -> Result<bool> {
        let mut client = self.pool.get()?;
        let changed = client.execute(
            "UPDATE professional_entities SET profile_data = $1, updated_at = NOW() WHERE id = $2",
            &[&Json(document), &id],
        )?;
        Ok(changed > 0)
    }

    fn count_active(&self) -> Result<u64> {
        let mut client = self.pool.get()?;
        let count: i64 = client
            .query_one(
                "SELECT COUNT(*) FROM professional_entities WHERE is_active",
                &[],
            )?
            .get(0);
        Ok(count.max(0) as u64)
    }
}
