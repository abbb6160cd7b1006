mod firestore;
mod memory;

pub use firestore::FirestoreStore;
pub use memory::LocalStore;

use crate::core::models::creative::{Creative, CreativeAssignment};
use crate::core::models::media_buy::{MediaBuy, MediaPackage};
use crate::core::models::metrics::FormatPerformanceMetrics;
use crate::core::models::principal::Principal;
use crate::core::models::product::{CurrencyLimit, Product};
use crate::core::models::property::{AuthorizedProperty, PropertyTag};
use crate::core::models::tenant::Tenant;
use crate::core::models::workflow::{
    ObjectWorkflowMapping, PushNotificationConfig, WorkflowContext, WorkflowStep,
};
use crate::core::spec::formats::Format;
use crate::core::spec::requests::{ListCreativesRequest, ListTasksRequest};
use anyhow::Error;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Persistence port for every entity the engine owns. Implementations
/// are expected to be cheap to clone behind an `Arc` and safe for
/// concurrent use; transactional needs are kept to per-call atomicity,
/// so backends without savepoints qualify.
#[async_trait]
pub trait Store: Send + Sync {
    // Tenants
    async fn upsert_tenant(&self, tenant: Tenant) -> Result<(), Error>;
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, Error>;
    async fn get_tenant_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, Error>;
    async fn get_tenant_by_virtual_host(&self, host: &str) -> Result<Option<Tenant>, Error>;
    async fn list_tenants(&self) -> Result<Vec<Tenant>, Error>;

    // Principals
    async fn upsert_principal(&self, principal: Principal) -> Result<(), Error>;
    async fn get_principal(&self, tenant_id: &str, principal_id: &str) -> Result<Option<Principal>, Error>;
    async fn count_principals(&self, tenant_id: &str) -> Result<usize, Error>;
    async fn find_principal_by_token(&self, tenant_id: &str, token: &str) -> Result<Option<Principal>, Error>;
    async fn find_principal_by_token_global(&self, token: &str) -> Result<Option<Principal>, Error>;

    // Products
    async fn upsert_product(&self, product: Product) -> Result<(), Error>;
    async fn get_product(&self, tenant_id: &str, product_id: &str) -> Result<Option<Product>, Error>;
    async fn list_products(&self, tenant_id: &str) -> Result<Vec<Product>, Error>;

    // Currency limits
    async fn upsert_currency_limit(&self, limit: CurrencyLimit) -> Result<(), Error>;
    async fn get_currency_limit(&self, tenant_id: &str, currency: &str) -> Result<Option<CurrencyLimit>, Error>;
    async fn count_currency_limits(&self, tenant_id: &str) -> Result<usize, Error>;

    // Media buys
    async fn insert_media_buy(&self, buy: MediaBuy) -> Result<(), Error>;
    async fn update_media_buy(&self, buy: MediaBuy) -> Result<(), Error>;
    async fn get_media_buy(&self, tenant_id: &str, media_buy_id: &str) -> Result<Option<MediaBuy>, Error>;
    async fn list_media_buys(&self, tenant_id: &str, principal_id: &str) -> Result<Vec<MediaBuy>, Error>;
    async fn find_media_buy_for_package(&self, tenant_id: &str, package_id: &str)
    -> Result<Option<MediaBuy>, Error>;

    // Media packages
    async fn insert_media_packages(&self, packages: Vec<MediaPackage>) -> Result<(), Error>;
    async fn list_media_packages(&self, media_buy_id: &str) -> Result<Vec<MediaPackage>, Error>;
    async fn update_media_package(&self, package: MediaPackage) -> Result<(), Error>;

    // Creatives
    async fn upsert_creative(&self, creative: Creative) -> Result<(), Error>;
    async fn get_creative(
        &self,
        tenant_id: &str,
        principal_id: &str,
        creative_id: &str,
    ) -> Result<Option<Creative>, Error>;
    /// Filtered, sorted, paginated library query. Returns the page and
    /// the total filtered count.
    async fn query_creatives(
        &self,
        tenant_id: &str,
        principal_id: &str,
        query: &ListCreativesRequest,
    ) -> Result<(Vec<Creative>, usize), Error>;

    // Creative assignments
    async fn insert_assignment(&self, assignment: CreativeAssignment) -> Result<(), Error>;
    async fn list_assignments_for_media_buy(
        &self,
        tenant_id: &str,
        media_buy_id: &str,
    ) -> Result<Vec<CreativeAssignment>, Error>;
    async fn list_assignments_for_creative(
        &self,
        tenant_id: &str,
        creative_id: &str,
    ) -> Result<Vec<CreativeAssignment>, Error>;

    // Workflow
    async fn insert_context(&self, context: WorkflowContext) -> Result<(), Error>;
    async fn get_context(&self, tenant_id: &str, context_id: &str) -> Result<Option<WorkflowContext>, Error>;
    async fn insert_step(&self, step: WorkflowStep) -> Result<(), Error>;
    async fn update_step(&self, step: WorkflowStep) -> Result<(), Error>;
    async fn get_step(&self, tenant_id: &str, step_id: &str) -> Result<Option<WorkflowStep>, Error>;
    async fn query_steps(
        &self,
        tenant_id: &str,
        query: &ListTasksRequest,
    ) -> Result<(Vec<WorkflowStep>, usize), Error>;
    async fn insert_mapping(&self, mapping: ObjectWorkflowMapping) -> Result<(), Error>;
    /// Mappings in insertion order; webhook fan-out depends on it.
    async fn mappings_for_step(&self, step_id: &str) -> Result<Vec<ObjectWorkflowMapping>, Error>;

    // Push notification configs
    async fn upsert_push_config(&self, push_config: PushNotificationConfig) -> Result<(), Error>;
    async fn push_configs_for(
        &self,
        tenant_id: &str,
        principal_id: &str,
    ) -> Result<Vec<PushNotificationConfig>, Error>;

    // Authorized properties and tags
    async fn upsert_property(&self, property: AuthorizedProperty) -> Result<(), Error>;
    async fn list_properties(&self, tenant_id: &str) -> Result<Vec<AuthorizedProperty>, Error>;
    async fn upsert_property_tag(&self, tag: PropertyTag) -> Result<(), Error>;
    async fn list_property_tags(&self, tenant_id: &str) -> Result<Vec<PropertyTag>, Error>;

    // Tenant creative formats
    async fn upsert_creative_format(&self, tenant_id: &str, format: Format) -> Result<(), Error>;
    async fn list_creative_formats(&self, tenant_id: &str) -> Result<Vec<Format>, Error>;

    // Format performance metrics
    async fn upsert_format_metrics(&self, metrics: FormatPerformanceMetrics) -> Result<(), Error>;
    async fn query_format_metrics(
        &self,
        tenant_id: &str,
        country_code: Option<&str>,
        creative_sizes: &[String],
        cutoff: NaiveDate,
    ) -> Result<Vec<FormatPerformanceMetrics>, Error>;
}

/// Composite key joining tenant-scoped identifiers; `\u{1}` cannot
/// appear in ids arriving over the wire.
pub(crate) fn scoped(a: &str, b: &str) -> String {
    format!("{}\u{1}{}", a, b)
}

pub(crate) fn scoped3(a: &str, b: &str, c: &str) -> String {
    format!("{}\u{1}{}\u{1}{}", a, b, c)
}
