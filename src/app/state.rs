use crate::app::config::SageConfig;
use crate::app::pipeline::creatives::context::SyncCreativesContext;
use crate::app::pipeline::creatives::pipeline::{SyncDeps, build_sync_creatives_pipeline};
use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::app::pipeline::media_buy::pipeline::{MediaBuyDeps, build_create_media_buy_pipeline};
use crate::app::pipeline::media_buy::update::context::UpdateMediaBuyContext;
use crate::app::pipeline::media_buy::update::pipeline::build_update_media_buy_pipeline;
use crate::core::adapters::AdClient;
use crate::core::auth::AuthResolver;
use crate::core::creatives::ReviewPool;
use crate::core::delivery::{DeliveryCache, DeliveryReporter};
use crate::core::managers::{FormatLibrary, ProductCatalog, TenantManager};
use crate::core::notify::SlackNotifier;
use crate::core::pipeline::Pipeline;
use crate::core::policy::{PolicyCheckService, SetupChecklist};
use crate::core::store::Store;
use crate::core::workflow::{WebhookDeliverer, WorkflowEngine};
use anyhow::Error;
use std::sync::Arc;

/// Everything a request handler can reach: the store, the managers,
/// the workflow engine, and the prebuilt tool pipelines. Built once at
/// startup and shared.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub resolver: Arc<AuthResolver>,
    pub tenants: Arc<TenantManager>,
    pub formats: Arc<FormatLibrary>,
    pub catalog: Arc<ProductCatalog>,
    pub policy: Arc<PolicyCheckService>,
    pub setup: Arc<SetupChecklist>,
    pub engine: Arc<WorkflowEngine>,
    pub slack: Arc<SlackNotifier>,
    pub review: Arc<ReviewPool>,
    pub cache: Arc<DeliveryCache>,
    pub reporter: Arc<DeliveryReporter>,
    pub http: Arc<AdClient>,

    pub create_pipeline: Pipeline<CreateMediaBuyContext, Error>,
    pub update_pipeline: Pipeline<UpdateMediaBuyContext, Error>,
    pub sync_pipeline: Pipeline<SyncCreativesContext, Error>,

    pub media_buy_deps: MediaBuyDeps,
}

impl AppState {
    pub fn build(config: &SageConfig, store: Arc<dyn Store>) -> Result<Arc<Self>, Error> {
        let tenants = Arc::new(TenantManager::new(store.clone()));
        let resolver = Arc::new(AuthResolver::with_manager(store.clone(), tenants.clone()));
        let formats = Arc::new(FormatLibrary::new(store.clone()));
        let catalog = Arc::new(ProductCatalog::new(store.clone()));
        let policy = Arc::new(PolicyCheckService::new());
        let setup = Arc::new(SetupChecklist::new(store.clone(), config.ai_api_key.is_some()));
        let slack = Arc::new(SlackNotifier::new());
        let webhooks = Arc::new(WebhookDeliverer::new());
        let engine = Arc::new(WorkflowEngine::new(store.clone(), slack.clone(), webhooks));
        let cache = Arc::new(DeliveryCache::new());
        let reporter = Arc::new(DeliveryReporter::new(store.clone(), cache.clone()));
        let http = Arc::new(AdClient::new()?);

        let review = ReviewPool::start(
            config.review.workers,
            config.review.queue_depth,
            store.clone(),
            engine.clone(),
            slack.clone(),
        );

        let media_buy_deps = MediaBuyDeps {
            store: store.clone(),
            engine: engine.clone(),
            slack: slack.clone(),
            setup: setup.clone(),
            formats: formats.clone(),
            cache: cache.clone(),
            http: http.clone(),
            adapter_timeout: config.adapters.call_timeout,
        };

        let sync_deps = SyncDeps {
            store: store.clone(),
            engine: engine.clone(),
            slack: slack.clone(),
            formats: formats.clone(),
            review: review.clone(),
        };

        let create_pipeline = build_create_media_buy_pipeline(&media_buy_deps);
        let update_pipeline = build_update_media_buy_pipeline(&media_buy_deps);
        let sync_pipeline = build_sync_creatives_pipeline(&sync_deps);

        Ok(Arc::new(AppState {
            store,
            resolver,
            tenants,
            formats,
            catalog,
            policy,
            setup,
            engine,
            slack,
            review,
            cache,
            reporter,
            http,
            create_pipeline,
            update_pipeline,
            sync_pipeline,
            media_buy_deps,
        }))
    }
}
