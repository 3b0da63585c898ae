use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::SearchFilter;
use crate::db::DirectoryStore;
use crate::directory::{map_search_tag, DirectoryEntry, ProfessionalProfile, ProfileSummary};

pub const LISTING_PAGE_SIZE: u32 = 10;
pub const MAP_RESULT_LIMIT: u32 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    /// Matches for the filter, ignoring limit and offset.
    pub total: u64,
    pub profiles: Vec<ProfileSummary>,
}

/// Marketplace listing query. `page` is 1-based.
#[derive(Debug, Clone, Default)]
pub struct ListingRequest {
    pub name: String,
    pub city: String,
    pub tag: String,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingPage {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub profiles: Vec<ProfileSummary>,
}

/// Map query, in the client's category vocabulary.
#[derive(Debug, Clone, Default)]
pub struct MapRequest {
    pub city: String,
    pub category: String,
    pub specialty: String,
}

pub struct SearchEngine {
    store: Arc<dyn DirectoryStore>,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    pub fn search(&self, filter: &SearchFilter, limit: u32, offset: u32) -> Result<SearchPage> {
        let (total, profiles) = self.store.search_profiles(filter, limit, offset)?;
        debug!(
            "search {:?} limit={} offset={}: {} of {} matches",
            filter,
            limit,
            offset,
            profiles.len(),
            total
        );
        Ok(SearchPage { total, profiles })
    }

    pub fn listing(&self, request: &ListingRequest) -> Result<ListingPage> {
        let page = request.page.max(1);
        let offset = (page - 1).saturating_mul(LISTING_PAGE_SIZE);
        let filter = SearchFilter::new(&request.name, &request.city, &request.tag);

        let result = self.search(&filter, LISTING_PAGE_SIZE, offset)?;
        Ok(ListingPage {
            total: result.total,
            page,
            limit: LISTING_PAGE_SIZE,
            profiles: result.profiles,
        })
    }

    pub fn map_pins(&self, request: &MapRequest) -> Result<Vec<ProfileSummary>> {
        let tag = map_search_tag(&request.category, &request.specialty);
        let filter = SearchFilter::new("", &request.city, &tag);
        Ok(self.search(&filter, MAP_RESULT_LIMIT, 0)?.profiles)
    }

    pub fn detail(&self, id: Uuid) -> Result<Option<DirectoryEntry>> {
        self.store.get_profile_detail(id)
    }

    /// Create or update the entry owned by `user_id`.
    pub fn save_professional_profile(
        &self,
        user_id: Uuid,
        profile: ProfessionalProfile,
    ) -> Result<DirectoryEntry> {
        let entry = profile.into_entry(user_id).prepare()?;
        let (id, _) = self.store.upsert_profile(&entry)?;
        self.store
            .get_profile_detail(id)?
            .ok_or_else(|| anyhow::anyhow!("Entry {} vanished after upsert", id))
    }

    pub fn professional_profile_for_user(&self, user_id: Uuid) -> Result<Option<DirectoryEntry>> {
        self.store.get_profile_by_user(user_id)
    }
}
