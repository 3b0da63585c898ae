//! Directory entries: the professionals and clinics listed in the marketplace.
//!
//! An entry is a set of scalar columns (name, entity type, rating, status flags)
//! plus a typed profile document persisted as JSON next to them. The document is
//! normalized and validated before every write, so readers can assume that the
//! first address is the main one and that coordinates are in range.

pub mod category;
pub mod claim;
pub mod import;
pub mod slug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

pub use category::{entity_type_for_label, label_for_entity_type, map_search_tag};
pub use claim::ProfessionalProfile;
pub use slug::{slug_for, slugify};

/// Current version of the persisted profile document layout.
pub const PROFILE_SCHEMA_VERSION: u32 = 1;

/// Coarse classification of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Clinic,
    Hospital,
    HomeVet,
    Individual,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Clinic,
        EntityType::Hospital,
        EntityType::HomeVet,
        EntityType::Individual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Clinic => "CLINIC",
            EntityType::Hospital => "HOSPITAL",
            EntityType::HomeVet => "HOME_VET",
            EntityType::Individual => "INDIVIDUAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CLINIC" => Some(EntityType::Clinic),
            "HOSPITAL" => Some(EntityType::Hospital),
            "HOME_VET" => Some(EntityType::HomeVet),
            "INDIVIDUAL" => Some(EntityType::Individual),
            _ => None,
        }
    }
}

/// Lifecycle of an entry, from bulk-imported prospect to verified professional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    Prospect,
    Draft,
    Claimed,
    Verified,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Prospect => "PROSPECT",
            EntityStatus::Draft => "DRAFT",
            EntityStatus::Claimed => "CLAIMED",
            EntityStatus::Verified => "VERIFIED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PROSPECT" => Some(EntityStatus::Prospect),
            "DRAFT" => Some(EntityStatus::Draft),
            "CLAIMED" => Some(EntityStatus::Claimed),
            "VERIFIED" => Some(EntityStatus::Verified),
            _ => None,
        }
    }
}

/// Rejections raised while validating an entry before it is written.
#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("entry name must not be blank")]
    BlankName,

    #[error("coordinates out of range: ({latitude}, {longitude})")]
    CoordinatesOutOfRange { latitude: f64, longitude: f64 },

    #[error("invalid coordinate value: {0:?}")]
    InvalidCoordinate(String),
}

/// A resolved latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ProfileError> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || latitude.abs() > 90.0
            || longitude.abs() > 180.0
        {
            return Err(ProfileError::CoordinatesOutOfRange { latitude, longitude });
        }
        Ok(Self { latitude, longitude })
    }

    /// Parse the textual pair returned by geocoding services.
    pub fn parse(latitude: &str, longitude: &str) -> Result<Self, ProfileError> {
        let lat = latitude
            .trim()
            .parse::<f64>()
            .map_err(|_| ProfileError::InvalidCoordinate(latitude.to_string()))?;
        let lon = longitude
            .trim()
            .parse::<f64>()
            .map_err(|_| ProfileError::InvalidCoordinate(longitude.to_string()))?;
        Self::new(lat, lon)
    }
}

/// Treat an explicit JSON `null` like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, deserialize_with = "nullable")]
    pub full_address: String,
    #[serde(default, deserialize_with = "nullable")]
    pub city: String,
    #[serde(default, deserialize_with = "nullable")]
    pub postal_code: String,
    /// 0.0 together with a zero longitude means "not geocoded yet".
    #[serde(default, deserialize_with = "nullable")]
    pub latitude: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub longitude: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub is_main: bool,
}

impl Address {
    /// Coordinates of this address, or `None` while it still carries the (0, 0) sentinel.
    pub fn coordinates(&self) -> Option<Coordinates> {
        if self.latitude == 0.0 && self.longitude == 0.0 {
            None
        } else {
            Some(Coordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    pub fn set_coordinates(&mut self, coords: Coordinates) {
        self.latitude = coords.latitude;
        self.longitude = coords.longitude;
    }

    /// Free-text query sent to the geocoder, if both parts are present.
    pub fn geocoding_query(&self) -> Option<String> {
        let address = self.full_address.trim();
        let city = self.city.trim();
        if address.is_empty() || city.is_empty() {
            return None;
        }
        Some(format!("{}, {}", address, city))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default, deserialize_with = "nullable")]
    pub phone: String,
    #[serde(default, deserialize_with = "nullable")]
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceItem {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub price: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Specialization {
    #[serde(default, deserialize_with = "nullable")]
    pub specialties: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub experience: String,
    #[serde(default, deserialize_with = "nullable")]
    pub detailed_services: Vec<ServiceItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingDay {
    #[serde(default, deserialize_with = "nullable")]
    pub active: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub start: String,
    #[serde(default, deserialize_with = "nullable")]
    pub end: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default, deserialize_with = "nullable")]
    pub tarifas: Vec<ServiceItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insurance {
    #[serde(default, deserialize_with = "nullable")]
    pub accepts: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub companies: String,
}

fn default_schema_version() -> u32 {
    PROFILE_SCHEMA_VERSION
}

/// The semi-structured part of an entry, stored as a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub license_number: String,
    #[serde(default, deserialize_with = "nullable")]
    pub bio: String,
    #[serde(default, deserialize_with = "nullable")]
    pub logo_url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub addresses: Vec<Address>,
    #[serde(default, deserialize_with = "nullable")]
    pub contact: ContactInfo,
    #[serde(default, deserialize_with = "nullable")]
    pub specialization: Specialization,
    #[serde(default, deserialize_with = "nullable")]
    pub specialties: Vec<String>,
    /// Weekday name to opening window.
    #[serde(default, deserialize_with = "nullable")]
    pub working_hours: BTreeMap<String, WorkingDay>,
    /// Free-text opening hours as found in imported datasets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_hours: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub pricing: Pricing,
    #[serde(default, deserialize_with = "nullable", rename = "insurance_partners")]
    pub insurance: Insurance,
}

impl Default for ProfileData {
    fn default() -> Self {
        Self {
            schema_version: PROFILE_SCHEMA_VERSION,
            license_number: String::new(),
            bio: String::new(),
            logo_url: String::new(),
            addresses: Vec::new(),
            contact: ContactInfo::default(),
            specialization: Specialization::default(),
            specialties: Vec::new(),
            working_hours: BTreeMap::new(),
            opening_hours: None,
            pricing: Pricing::default(),
            insurance: Insurance::default(),
        }
    }
}

impl ProfileData {
    /// The canonical address: the flagged one, or the first when none is flagged.
    pub fn main_address(&self) -> Option<&Address> {
        self.addresses
            .iter()
            .find(|a| a.is_main)
            .or_else(|| self.addresses.first())
    }

    /// Enforce the single-main-address layout: exactly one flagged address, at index 0.
    pub fn normalize(&mut self) {
        if self.addresses.is_empty() {
            return;
        }

        let main_idx = self.addresses.iter().position(|a| a.is_main).unwrap_or(0);
        for (i, address) in self.addresses.iter_mut().enumerate() {
            address.is_main = i == main_idx;
        }
        if main_idx != 0 {
            let main = self.addresses.remove(main_idx);
            self.addresses.insert(0, main);
        }

        self.specialties.retain(|s| !s.trim().is_empty());
        self.schema_version = PROFILE_SCHEMA_VERSION;
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        for address in &self.addresses {
            Coordinates::new(address.latitude, address.longitude)?;
        }
        Ok(())
    }
}

/// A full directory row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub entity_type: EntityType,
    pub status: EntityStatus,
    pub name: String,
    pub slug: String,
    pub profile_data: ProfileData,
    pub rating: f64,
    pub review_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for an upsert. With a `user_id` the conflict target is the owning user,
/// otherwise it is the slug.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub user_id: Option<Uuid>,
    pub entity_type: EntityType,
    pub status: EntityStatus,
    pub name: String,
    pub slug: String,
    pub profile_data: ProfileData,
    pub rating: f64,
    pub review_count: i64,
    pub is_active: bool,
}

impl NewEntry {
    pub fn new(entity_type: EntityType, name: &str, city: Option<&str>) -> Self {
        Self {
            user_id: None,
            entity_type,
            status: EntityStatus::Prospect,
            name: name.trim().to_string(),
            slug: slug_for(name, city),
            profile_data: ProfileData::default(),
            rating: 0.0,
            review_count: 0,
            is_active: true,
        }
    }

    /// Normalize the document and reject values that must never reach the store.
    pub fn prepare(mut self) -> Result<Self, ProfileError> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::BlankName);
        }
        self.profile_data.normalize();
        self.profile_data.validate()?;
        Ok(self)
    }
}

/// Lightweight projection used by the listing and the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub name: String,
    pub entity_type: EntityType,
    pub rating: f64,
    pub review_count: i64,
    pub city: String,
    pub full_address: String,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
}
