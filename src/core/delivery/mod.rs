mod report;

pub use report::{DeliveryCache, DeliveryReporter};
