mod catalog;
mod formats;
mod tenants;

pub use catalog::{DynamicPricingService, ProductCatalog};
pub use formats::FormatLibrary;
pub use tenants::TenantManager;
