//! Directory search: the marketplace listing, map pins and profile detail.
//!
//! Both query shapes resolve onto one [`SearchFilter`] and one ranking
//! (rating, then review count, then insertion order), so a listing page and
//! the map always agree on which entries match.

mod engine;
mod filter;
pub mod projection;

pub use engine::{
    ListingPage, ListingRequest, MapRequest, SearchEngine, SearchPage, LISTING_PAGE_SIZE,
    MAP_RESULT_LIMIT,
};
pub use filter::SearchFilter;
