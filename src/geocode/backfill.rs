//! Batch job that geocodes entries still carrying the (0, 0) sentinel.
//!
//! The job is strictly sequential: one lookup at a time, spaced by a
//! [`Throttle`], with an extra pause after each failure. A record that cannot
//! be geocoded keeps its sentinel and is picked up again by a later run, after
//! the entries that have failed fewer times. Only the coordinates of the first
//! address are written; the rest of the document is stored back as it was read.
//! Running two jobs against the same store at once is not supported.

use serde::Deserialize;
use serde_json::{json, Value};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{Geocoder, Throttle};
use crate::config::BackfillConfig;
use crate::db::{DirectoryStore, GeocodeCandidate};
use crate::directory::Address;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub selected: usize,
    pub geocoded: usize,
    /// Records without a usable address or with an undecodable document.
    pub skipped: usize,
    pub lookup_failures: usize,
    pub persist_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Geocoded,
    Skipped,
    LookupFailed,
    PersistFailed,
}

pub struct Backfill<'a> {
    store: &'a dyn DirectoryStore,
    geocoder: &'a dyn Geocoder,
    config: BackfillConfig,
    throttle: Throttle,
}

impl<'a> Backfill<'a> {
    pub fn new(
        store: &'a dyn DirectoryStore,
        geocoder: &'a dyn Geocoder,
        config: BackfillConfig,
    ) -> Self {
        let throttle = Throttle::new(Duration::from_millis(config.request_interval_ms));
        Self {
            store,
            geocoder,
            config,
            throttle,
        }
    }

    /// Process one batch. Failures are logged and counted, never returned.
    pub fn run(&mut self) -> BackfillReport {
        let mut report = BackfillReport::default();

        let candidates = match self.store.ungeocoded_candidates(self.config.batch_size) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to select entries for geocoding: {:#}", e);
                return report;
            }
        };

        report.selected = candidates.len();
        info!("Geocoding {} entries", report.selected);

        for candidate in &candidates {
            let outcome = self.process(candidate);
            match outcome {
                Outcome::Geocoded => report.geocoded += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::LookupFailed => report.lookup_failures += 1,
                Outcome::PersistFailed => report.persist_failures += 1,
            }
            if matches!(outcome, Outcome::Skipped | Outcome::LookupFailed) {
                if let Err(e) = self.store.record_geocode_attempt(candidate.id) {
                    error!("Failed to record geocoding attempt for {}: {:#}", candidate.id, e);
                }
            }
        }

        info!(
            "Geocoding batch done: {} geocoded, {} skipped, {} lookup failures, {} persist failures",
            report.geocoded, report.skipped, report.lookup_failures, report.persist_failures
        );
        report
    }

    fn process(&mut self, candidate: &GeocodeCandidate) -> Outcome {
        let id = candidate.id;

        let mut document: Value = match serde_json::from_str(&candidate.document) {
            Ok(d) => d,
            Err(e) => {
                warn!("Malformed profile document for entry {}: {}", id, e);
                return Outcome::Skipped;
            }
        };

        let address = match document.pointer("/addresses/0") {
            Some(raw) if raw.is_object() => match Address::deserialize(raw) {
                Ok(a) => a,
                Err(e) => {
                    warn!("Malformed first address for entry {}: {}", id, e);
                    return Outcome::Skipped;
                }
            },
            Some(_) => {
                warn!("First address of entry {} is not an object", id);
                return Outcome::Skipped;
            }
            None => {
                debug!("Entry {} has no address to geocode", id);
                return Outcome::Skipped;
            }
        };

        let Some(query) = address.geocoding_query() else {
            debug!("Entry {} has no address to geocode", id);
            return Outcome::Skipped;
        };

        self.throttle.wait();

        let coords = match self.geocoder.lookup(&query) {
            Ok(matches) => match matches.first() {
                Some(m) => m.coordinates().map_err(anyhow::Error::from),
                None => Err(anyhow::anyhow!("no match")),
            },
            Err(e) => Err(e),
        };

        let coords = match coords {
            Ok(c) => c,
            Err(e) => {
                warn!("Geocoding failed for {:?} (entry {}): {:#}", query, id, e);
                self.backoff();
                return Outcome::LookupFailed;
            }
        };

        // Checked to be an object above.
        if let Some(first) = document
            .pointer_mut("/addresses/0")
            .and_then(Value::as_object_mut)
        {
            first.insert("latitude".to_string(), json!(coords.latitude));
            first.insert("longitude".to_string(), json!(coords.longitude));
        }

        match self.store.update_profile_document(id, &document) {
            Ok(true) => {
                debug!(
                    "Geocoded entry {}: {}, {}",
                    id, coords.latitude, coords.longitude
                );
                Outcome::Geocoded
            }
            Ok(false) => {
                warn!("Entry {} disappeared before its coordinates were saved", id);
                Outcome::PersistFailed
            }
            Err(e) => {
                error!("Failed to save coordinates for entry {}: {:#}", id, e);
                Outcome::PersistFailed
            }
        }
    }

    fn backoff(&self) {
        if self.config.failure_backoff_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.failure_backoff_ms));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteDb;
    use crate::directory::{Address, EntityType, NewEntry};
    use crate::geocode::GeocodeMatch;
    use anyhow::{anyhow, Result};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Replays scripted responses in order and records the queries it saw.
    struct ScriptedGeocoder {
        responses: Mutex<VecDeque<Result<Vec<GeocodeMatch>>>>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedGeocoder {
        fn new(responses: Vec<Result<Vec<GeocodeMatch>>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    impl Geocoder for ScriptedGeocoder {
        fn lookup(&self, query: &str) -> Result<Vec<GeocodeMatch>> {
            self.queries.lock().unwrap().push(query.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn hit(lat: &str, lon: &str) -> Result<Vec<GeocodeMatch>> {
        Ok(vec![GeocodeMatch {
            lat: lat.to_string(),
            lon: lon.to_string(),
        }])
    }

    fn fast_config() -> BackfillConfig {
        BackfillConfig {
            batch_size: 100,
            request_interval_ms: 0,
            failure_backoff_ms: 0,
        }
    }

    fn db() -> SqliteDb {
        let db = SqliteDb::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn add(db: &SqliteDb, name: &str, street: &str, city: &str, lat: f64, lon: f64) -> Uuid {
        let mut entry = NewEntry::new(EntityType::Clinic, name, Some(city));
        entry.profile_data.addresses = vec![
            Address {
                full_address: street.to_string(),
                city: city.to_string(),
                latitude: lat,
                longitude: lon,
                is_main: true,
                ..Default::default()
            },
            Address {
                full_address: "Calle Secundaria 9".to_string(),
                city: "Girona".to_string(),
                ..Default::default()
            },
        ];
        db.upsert_profile(&entry.prepare().unwrap()).unwrap().0
    }

    #[test]
    fn test_geocoded_record_is_written_back_and_leaves_the_scan() {
        let db = db();
        let id = add(&db, "Clínica Diagonal", "Av. Diagonal 1", "Barcelona", 0.0, 0.0);
        add(&db, "Ubicada", "Calle Mayor 1", "Madrid", 40.41, -3.70);

        let geocoder = ScriptedGeocoder::new(vec![hit("41.40", "2.17")]);
        let report = Backfill::new(&db, &geocoder, fast_config()).run();

        assert_eq!(report.selected, 1);
        assert_eq!(report.geocoded, 1);
        assert_eq!(geocoder.queries(), vec!["Av. Diagonal 1, Barcelona"]);

        let entry = db.get_profile_detail(id).unwrap().unwrap();
        let coords = entry.profile_data.addresses[0].coordinates().unwrap();
        assert_eq!(coords.latitude, 41.40);
        assert_eq!(coords.longitude, 2.17);
        // Only the first address is touched.
        assert!(entry.profile_data.addresses[1].coordinates().is_none());

        assert!(db.ungeocoded_candidates(100).unwrap().is_empty());
    }

    #[test]
    fn test_one_failure_does_not_stop_the_batch() {
        let db = db();
        let ids: Vec<Uuid> = (0..5)
            .map(|i| add(&db, &format!("Clínica {}", i), &format!("Calle {}", i), "Madrid", 0.0, 0.0))
            .collect();

        let geocoder = ScriptedGeocoder::new(vec![
            hit("40.1", "-3.1"),
            hit("40.2", "-3.2"),
            Err(anyhow!("timeout")),
            hit("40.4", "-3.4"),
            hit("40.5", "-3.5"),
        ]);
        let report = Backfill::new(&db, &geocoder, fast_config()).run();

        assert_eq!(
            report,
            BackfillReport {
                selected: 5,
                geocoded: 4,
                skipped: 0,
                lookup_failures: 1,
                persist_failures: 0,
            }
        );

        let remaining: Vec<Uuid> = db
            .ungeocoded_candidates(100)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(remaining, vec![ids[2]]);
    }

    #[test]
    fn test_empty_or_invalid_results_leave_the_sentinel() {
        let db = db();
        add(&db, "Sin Resultado", "Calle Perdida 1", "Teruel", 0.0, 0.0);
        add(&db, "Fuera de Rango", "Calle Rara 2", "Teruel", 0.0, 0.0);
        add(&db, "Ilegible", "Calle Rara 3", "Teruel", 0.0, 0.0);

        let geocoder = ScriptedGeocoder::new(vec![
            Ok(Vec::new()),
            hit("123.0", "2.0"),
            hit("north", "east"),
        ]);
        let report = Backfill::new(&db, &geocoder, fast_config()).run();

        assert_eq!(report.lookup_failures, 3);
        assert_eq!(report.geocoded, 0);
        assert_eq!(db.ungeocoded_candidates(100).unwrap().len(), 3);
    }

    #[test]
    fn test_records_without_address_are_skipped_without_lookup() {
        let db = db();
        db.upsert_profile(&NewEntry::new(EntityType::HomeVet, "Sin Dirección", None))
            .unwrap();
        add(&db, "Sin Calle", "  ", "Madrid", 0.0, 0.0);

        let geocoder = ScriptedGeocoder::new(Vec::new());
        let report = Backfill::new(&db, &geocoder, fast_config()).run();

        assert_eq!(report.selected, 2);
        assert_eq!(report.skipped, 2);
        assert!(geocoder.queries().is_empty());
    }

    #[test]
    fn test_unresolvable_records_rotate_behind_untried_ones() {
        let db = db();
        let lost: Vec<Uuid> = (0..3)
            .map(|i| add(&db, &format!("Perdida {}", i), &format!("Calle Perdida {}", i), "Teruel", 0.0, 0.0))
            .collect();
        let good = add(&db, "Clínica Buena", "Calle Real 4", "Huesca", 0.0, 0.0);

        let geocoder = ScriptedGeocoder::new(vec![
            Ok(Vec::new()),
            Ok(Vec::new()),
            Ok(Vec::new()),
            hit("42.14", "-0.41"),
        ]);
        let config = BackfillConfig {
            batch_size: 3,
            ..fast_config()
        };
        let mut backfill = Backfill::new(&db, &geocoder, config);

        let first = backfill.run();
        assert_eq!(first.lookup_failures, 3);
        assert!(db.get_profile_detail(good).unwrap().unwrap().profile_data.addresses[0]
            .coordinates()
            .is_none());

        let second = backfill.run();
        assert_eq!(second.geocoded, 1);
        assert!(geocoder.queries().contains(&"Calle Real 4, Huesca".to_string()));
        let coords = db.get_profile_detail(good).unwrap().unwrap().profile_data.addresses[0]
            .coordinates()
            .unwrap();
        assert_eq!(coords.latitude, 42.14);

        let remaining: Vec<Uuid> = db
            .ungeocoded_candidates(100)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(remaining.len(), 3);
        assert!(lost.iter().all(|id| remaining.contains(id)));
    }

    #[test]
    fn test_write_back_keeps_fields_outside_the_first_address() {
        let db = db();
        let id = add(&db, "Clínica Antigua", "Calle Mayor 1", "Madrid", 0.0, 0.0);
        db.set_raw_document(
            id,
            r#"{"addresses":[{"full_address":"Calle Mayor 1","city":"Madrid","latitude":0,"longitude":0,"is_main":true,"floor":"2B"}],"working_hours":{"opening_hours":"L-V 9-20"},"specialties":"cirugía","legacy_id":7}"#,
        )
        .unwrap();

        let geocoder = ScriptedGeocoder::new(vec![hit("40.41", "-3.70")]);
        let report = Backfill::new(&db, &geocoder, fast_config()).run();
        assert_eq!(report.geocoded, 1);

        let stored: Value = serde_json::from_str(&db.raw_document(id).unwrap()).unwrap();
        assert_eq!(stored["legacy_id"], 7);
        assert_eq!(stored["specialties"], "cirugía");
        assert_eq!(stored["working_hours"]["opening_hours"], "L-V 9-20");
        let first = &stored["addresses"][0];
        assert_eq!(first["floor"], "2B");
        assert_eq!(first["latitude"], 40.41);
        assert_eq!(first["longitude"], -3.70);
        assert!(db.ungeocoded_candidates(100).unwrap().is_empty());
    }

    #[test]
    fn test_batch_size_limits_selection() {
        let db = db();
        for i in 0..4 {
            add(&db, &format!("Clínica {}", i), &format!("Calle {}", i), "Soria", 0.0, 0.0);
        }

        let geocoder = ScriptedGeocoder::new(vec![hit("41.7", "-2.4"), hit("41.8", "-2.5")]);
        let config = BackfillConfig {
            batch_size: 2,
            ..fast_config()
        };
        let report = Backfill::new(&db, &geocoder, config).run();

        assert_eq!(report.selected, 2);
        assert_eq!(report.geocoded, 2);
        assert_eq!(db.ungeocoded_candidates(100).unwrap().len(), 2);
    }

    #[test]
    fn test_lookups_are_throttled() {
        let db = db();
        for i in 0..3 {
            add(&db, &format!("Clínica {}", i), &format!("Calle {}", i), "Soria", 0.0, 0.0);
        }

        let geocoder = ScriptedGeocoder::new(Vec::new());
        let config = BackfillConfig {
            request_interval_ms: 20,
            ..fast_config()
        };
        let start = std::time::Instant::now();
        Backfill::new(&db, &geocoder, config).run();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
