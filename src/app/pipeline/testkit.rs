use crate::app::pipeline::creatives::pipeline::SyncDeps;
use crate::app::pipeline::media_buy::pipeline::MediaBuyDeps;
use crate::core::adapters::AdClient;
use crate::core::creatives::ReviewPool;
use crate::core::delivery::DeliveryCache;
use crate::core::managers::FormatLibrary;
use crate::core::models::principal::Principal;
use crate::core::models::product::{
    CurrencyLimit, DeliveryType, PriceGuidance, PricingModel, PricingOption, Product,
};
use crate::core::models::property::AuthorizedPropertyBuilder;
use crate::core::models::property::VerificationStatus;
use crate::core::models::tenant::{Tenant, TenantBuilder};
use crate::core::notify::SlackNotifier;
use crate::core::policy::SetupChecklist;
use crate::core::spec::formats::FormatRef;
use crate::core::spec::requests::{BudgetInput, CreateMediaBuyRequest, PackageRequest, StartTime};
use crate::core::store::{LocalStore, Store};
use crate::core::workflow::{WebhookDeliverer, WorkflowEngine};
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// A fully seeded in-memory deployment: one tenant on the mock ad
/// server with a fixed-CPM and an auction-CPM product, two buyers, a
/// USD limit and a verified property, so the setup gate passes.
pub(crate) struct Harness {
    pub store: Arc<LocalStore>,
    pub tenant: Arc<Tenant>,
    pub deps: MediaBuyDeps,
    pub sync_deps: SyncDeps,
}

fn fixed_option(rate: f64) -> PricingOption {
    PricingOption {
        pricing_model: PricingModel::Cpm,
        currency: "USD".to_string(),
        is_fixed: true,
        rate: Some(rate),
        price_guidance: None,
        min_spend_per_package: None,
        parameters: None,
        supported: None,
        unsupported_reason: None,
    }
}

fn auction_option(floor: f64) -> PricingOption {
    PricingOption {
        pricing_model: PricingModel::Cpm,
        currency: "USD".to_string(),
        is_fixed: false,
        rate: None,
        price_guidance: Some(PriceGuidance {
            floor,
            p50: Some(floor + 2.0),
            ..Default::default()
        }),
        min_spend_per_package: None,
        parameters: None,
        supported: None,
        unsupported_reason: None,
    }
}

fn product(id: &str, options: Vec<PricingOption>) -> Product {
    Product {
        tenant_id: "acme".to_string(),
        product_id: id.to_string(),
        name: id.to_string(),
        delivery_type: DeliveryType::Guaranteed,
        min_spend: None,
        formats: vec![FormatRef::standard("display_300x250_image")],
        pricing_options: options,
        auto_create_enabled: true,
        implementation_config: None,
        floor_cpm: None,
        recommended_cpm: None,
        estimated_exposures: None,
    }
}

pub(crate) async fn harness() -> Harness {
    harness_with(|_| {}).await
}

/// Same, with a tenant tweak applied before seeding (manual approval
/// flags, approval mode, policies).
pub(crate) async fn harness_with(tweak: impl FnOnce(&mut Tenant)) -> Harness {
    let store = Arc::new(LocalStore::new());

    let mut tenant = TenantBuilder::default()
        .tenant_id("acme".to_string())
        .name("Acme Media".to_string())
        .subdomain("acme".to_string())
        .admin_token("acme_admin_tok".to_string())
        .authorized_emails(vec!["ops@acme.example".to_string()])
        .build()
        .unwrap();
    tweak(&mut tenant);
    store.upsert_tenant(tenant.clone()).await.unwrap();

    for (principal_id, token) in [("buyer_a", "tok_a"), ("buyer_b", "tok_b")] {
        store
            .upsert_principal(Principal {
                tenant_id: "acme".to_string(),
                principal_id: principal_id.to_string(),
                name: format!("Buyer {}", principal_id),
                access_token: token.to_string(),
                platform_mappings: HashMap::new(),
            })
            .await
            .unwrap();
    }

    store
        .upsert_product(product("prod_cpm_fixed", vec![fixed_option(10.0)]))
        .await
        .unwrap();
    store
        .upsert_product(product("prod_cpm_auction", vec![auction_option(8.0)]))
        .await
        .unwrap();

    store
        .upsert_currency_limit(CurrencyLimit {
            tenant_id: "acme".to_string(),
            currency: "USD".to_string(),
            min_package_budget: Some(100.0),
            max_daily_package_spend: Some(1000.0),
        })
        .await
        .unwrap();

    store
        .upsert_property(
            AuthorizedPropertyBuilder::default()
                .tenant_id("acme".to_string())
                .property_id("site_acme".to_string())
                .property_type("website".to_string())
                .name("acme.example".to_string())
                .publisher_domain("acme.example".to_string())
                .verification_status(VerificationStatus::Verified)
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

    let slack = Arc::new(SlackNotifier::new());
    let webhooks = Arc::new(WebhookDeliverer::new());
    let engine = Arc::new(WorkflowEngine::new(store.clone(), slack.clone(), webhooks));
    let setup = Arc::new(SetupChecklist::new(store.clone(), false));
    let formats = Arc::new(FormatLibrary::new(store.clone()));
    let cache = Arc::new(DeliveryCache::new());
    let http = Arc::new(AdClient::new().unwrap());
    let review = ReviewPool::start(1, 16, store.clone(), engine.clone(), slack.clone());

    let deps = MediaBuyDeps {
        store: store.clone(),
        engine: engine.clone(),
        slack: slack.clone(),
        setup,
        formats: formats.clone(),
        cache,
        http,
        adapter_timeout: StdDuration::from_secs(5),
    };

    let sync_deps = SyncDeps {
        store: store.clone(),
        engine,
        slack,
        formats,
        review,
    };

    Harness {
        store,
        tenant: Arc::new(tenant),
        deps,
        sync_deps,
    }
}

/// One-package media buy request with a +1d..+31d flight.
pub(crate) fn buy_request(product_id: &str, budget: f64) -> CreateMediaBuyRequest {
    let now = Utc::now();

    serde_json::from_value(json!({
        "buyer_ref": "bref-1",
        "brand_manifest": {"name": "Acme Widgets 3000"},
        "start_time": (now + Duration::days(1)).to_rfc3339(),
        "end_time": (now + Duration::days(31)).to_rfc3339(),
        "packages": [],
    }))
    .map(|mut req: CreateMediaBuyRequest| {
        req.packages = vec![PackageRequest {
            buyer_ref: Some("bref-1-pkg".to_string()),
            product_id: Some(product_id.to_string()),
            budget: Some(BudgetInput::Total(budget)),
            pricing_model: Some(PricingModel::Cpm),
            ..Default::default()
        }];
        req
    })
    .unwrap()
}

pub(crate) fn asap_request(product_id: &str, budget: f64) -> CreateMediaBuyRequest {
    let mut req = buy_request(product_id, budget);
    req.start_time = StartTime::Asap;
    req
}
