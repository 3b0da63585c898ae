//! Bulk import of clinic datasets.
//!
//! Datasets are JSON arrays scraped from public listings. Numeric fields arrive
//! either as numbers or as strings with decimal commas, so they are read
//! leniently. Records are upserted by slug, which makes re-importing the same
//! file refresh existing rows instead of duplicating them.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use super::{
    entity_type_for_label, Address, ContactInfo, Coordinates, EntityStatus, EntityType,
    NewEntry, ProfileData,
};
use crate::db::DirectoryStore;

/// One record of an imported dataset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportRecord {
    #[serde(default, rename = "nombre")]
    pub name: String,
    #[serde(default, rename = "direccion")]
    pub address: String,
    #[serde(default, rename = "ciudad")]
    pub city: String,
    #[serde(default)]
    pub lat: Value,
    #[serde(default)]
    pub lng: Value,
    #[serde(default, rename = "telefono")]
    pub phone: String,
    #[serde(default)]
    pub rating: Value,
    #[serde(default)]
    pub reviews: Value,
    #[serde(default, rename = "horario")]
    pub opening_hours: String,
    #[serde(default, rename = "tipoFicha")]
    pub category: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub total: usize,
    pub imported: usize,
    pub failed: usize,
}

/// Read a number that may be encoded as a string, with `,` as decimal separator.
fn lenient_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().replace(',', ".").parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

impl ImportRecord {
    pub fn into_entry(self) -> NewEntry {
        let entity_type = entity_type_for_label(&self.category).unwrap_or(EntityType::Clinic);

        let (latitude, longitude) =
            match Coordinates::new(lenient_number(&self.lat), lenient_number(&self.lng)) {
                Ok(c) => (c.latitude, c.longitude),
                Err(e) => {
                    warn!("Dropping coordinates of {}: {}", self.name, e);
                    (0.0, 0.0)
                }
            };

        let opening_hours = Some(self.opening_hours.trim().to_string()).filter(|h| !h.is_empty());

        let mut entry = NewEntry::new(entity_type, &self.name, Some(&self.city));
        entry.status = EntityStatus::Prospect;
        entry.rating = lenient_number(&self.rating);
        entry.review_count = lenient_number(&self.reviews) as i64;
        entry.profile_data = ProfileData {
            addresses: vec![Address {
                full_address: self.address,
                city: self.city,
                postal_code: String::new(),
                latitude,
                longitude,
                is_main: true,
            }],
            contact: ContactInfo {
                phone: self.phone,
                email: String::new(),
            },
            opening_hours,
            ..Default::default()
        };
        entry
    }
}

/// Upsert every record, logging and skipping the ones that fail.
pub fn import_records(store: &dyn DirectoryStore, records: Vec<ImportRecord>) -> ImportReport {
    let mut report = ImportReport {
        total: records.len(),
        ..Default::default()
    };

    info!("Importing {} directory records", report.total);

    for (i, record) in records.into_iter().enumerate() {
        let name = record.name.clone();
        let result = record
            .into_entry()
            .prepare()
            .map_err(anyhow::Error::from)
            .and_then(|entry| store.upsert_profile(&entry));

        match result {
            Ok(_) => report.imported += 1,
            Err(e) => {
                warn!("Failed to import {:?}: {:#}", name, e);
                report.failed += 1;
            }
        }

        if i > 0 && i % 200 == 0 {
            info!("... {} records processed", i);
        }
    }

    info!(
        "Import complete: {} imported, {} failed",
        report.imported, report.failed
    );
    report
}

pub fn import_file(store: &dyn DirectoryStore, path: &Path) -> Result<ImportReport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    let records: Vec<ImportRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse dataset {}", path.display()))?;
    Ok(import_records(store, records))
}
