//! Veterimap directory service.
//!
//! Profile search for the marketplace listing and map, plus the geocoding
//! backfill that gives imported entries their coordinates.

pub mod config;
pub mod db;
pub mod directory;
pub mod geocode;
pub mod http;
pub mod logging;
pub mod search;
