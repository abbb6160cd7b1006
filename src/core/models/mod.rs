pub mod creative;
pub mod media_buy;
pub mod metrics;
pub mod principal;
pub mod product;
pub mod property;
pub mod tenant;
pub mod workflow;
