//! Address geocoding: the external lookup client and the backfill job that
//! fills in coordinates for entries imported without them.

mod backfill;
mod client;
mod throttle;

pub use backfill::{Backfill, BackfillReport};
pub use client::{GeocodeMatch, Geocoder, NominatimClient};
pub use throttle::Throttle;
