//! Decoding of raw search rows into listing summaries.

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::directory::{Address, EntityType, ProfileSummary};

/// A search row as read from the store, before any decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    pub rating: f64,
    pub review_count: i64,
    /// Whether the stored profile document parses as JSON at all.
    pub document_ok: bool,
    /// JSON text of the first address, `None` when there is none.
    pub first_address: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("invalid id {0:?}")]
    InvalidId(String),

    #[error("unknown entity type {0:?}")]
    UnknownEntityType(String),

    #[error("profile document is not valid JSON")]
    MalformedDocument,

    #[error("first address does not decode: {0}")]
    MalformedAddress(#[from] serde_json::Error),
}

impl SummaryRow {
    pub fn into_summary(self) -> Result<ProfileSummary, ProjectionError> {
        if !self.document_ok {
            return Err(ProjectionError::MalformedDocument);
        }
        let id = Uuid::parse_str(&self.id).map_err(|_| ProjectionError::InvalidId(self.id.clone()))?;
        let entity_type = EntityType::from_str(&self.entity_type)
            .ok_or_else(|| ProjectionError::UnknownEntityType(self.entity_type.clone()))?;

        let address = match self.first_address.as_deref() {
            Some(json) => serde_json::from_str::<Option<Address>>(json)?,
            None => None,
        }
        .unwrap_or_default();

        Ok(ProfileSummary {
            id,
            name: self.name,
            entity_type,
            rating: self.rating,
            review_count: self.review_count,
            city: address.city,
            full_address: address.full_address,
            latitude: address.latitude,
            longitude: address.longitude,
        })
    }
}

/// Decode every row, logging and dropping the ones that do not decode.
pub fn project_rows(rows: Vec<SummaryRow>) -> Vec<ProfileSummary> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            match row.into_summary() {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!("Skipping directory entry {}: {}", id, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(first_address: Option<&str>) -> SummaryRow {
        SummaryRow {
            id: Uuid::new_v4().to_string(),
            name: "Clínica Sol".to_string(),
            entity_type: "CLINIC".to_string(),
            rating: 4.5,
            review_count: 20,
            document_ok: true,
            first_address: first_address.map(str::to_string),
        }
    }

    #[test]
    fn test_summary_reads_first_address() {
        let summary = row(Some(
            r#"{"full_address": "Calle Sol 1", "city": "Madrid", "latitude": 40.41, "longitude": -3.7}"#,
        ))
        .into_summary()
        .unwrap();

        assert_eq!(summary.city, "Madrid");
        assert_eq!(summary.full_address, "Calle Sol 1");
        assert_eq!(summary.latitude, 40.41);
        assert_eq!(summary.longitude, -3.7);
    }

    #[test]
    fn test_missing_address_gives_empty_location() {
        for first in [None, Some("null")] {
            let summary = row(first).into_summary().unwrap();
            assert_eq!(summary.city, "");
            assert_eq!(summary.latitude, 0.0);
        }
    }

    #[test]
    fn test_bad_rows_are_dropped() {
        let mut corrupt = row(None);
        corrupt.document_ok = false;
        let mut unknown = row(None);
        unknown.entity_type = "SHELTER".to_string();
        let bad_address = row(Some(r#"{"latitude": "north"}"#));
        let good = row(None);
        let good_id = good.id.clone();

        let summaries = project_rows(vec![corrupt, unknown, bad_address, good]);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id.to_string(), good_id);
    }
}
