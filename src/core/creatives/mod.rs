mod library;
mod review;

pub use library::{apply_creative_update, creative_from_input, creative_view, validate_creative_input};
pub use review::{ReviewJob, ReviewPool};
