//! Professionals creating or claiming their own directory entry.

use serde::Deserialize;
use uuid::Uuid;

use super::{slug_for, EntityStatus, EntityType, NewEntry, ProfileData};

/// What a professional submits for their own entry. One entry per user.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfessionalProfile {
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub status: Option<EntityStatus>,
    #[serde(default)]
    pub profile_data: ProfileData,
}

impl ProfessionalProfile {
    /// Turn the submission into an upsert keyed by the owning user.
    ///
    /// Claimed entries are always active. Prospect status is reserved for
    /// imports, so it is upgraded to verified along with a missing status.
    pub fn into_entry(self, user_id: Uuid) -> NewEntry {
        let status = match self.status {
            Some(EntityStatus::Claimed) => EntityStatus::Claimed,
            Some(EntityStatus::Draft) => EntityStatus::Draft,
            Some(EntityStatus::Verified) | Some(EntityStatus::Prospect) | None => {
                EntityStatus::Verified
            }
        };

        NewEntry {
            user_id: Some(user_id),
            entity_type: self.entity_type,
            status,
            slug: slug_for(&self.name, None),
            name: self.name.trim().to_string(),
            profile_data: self.profile_data,
            rating: 0.0,
            review_count: 0,
            is_active: true,
        }
    }
}
