//! Profile editing module.
//!
//! Renames the signed-in account and replaces its profile photo, reusing
//! the cached connection or rehydrating it from the session store.

mod name;
mod operations;
mod photo;

pub use name::{NAME_SEPARATOR, parse_name};
pub use operations::{PhotoReport, ProfileError, ProfileService};
pub use photo::PhotoPayload;
