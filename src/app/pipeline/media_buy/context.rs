use crate::core::adapters::{AdServerAdapter, AdapterPackageSpec, MediaBuyResult};
use crate::core::auth::RequestHeaders;
use crate::core::models::media_buy::PricingInfo;
use crate::core::models::principal::Principal;
use crate::core::models::product::{CurrencyLimit, Product};
use crate::core::models::tenant::Tenant;
use crate::core::models::workflow::{WorkflowContext, WorkflowStep};
use crate::core::spec::errors::AdcpError;
use crate::core::spec::requests::CreateMediaBuyRequest;
use crate::core::spec::responses::{CreateMediaBuyResponse, ToolOutcome};
use crate::core::spec::testing::TestingContext;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Shared state of one `create_media_buy` invocation. The request is
/// behind a lock because permanent package ids get injected into it so
/// the stored raw request round-trips them; everything derived is
/// write-once.
pub struct CreateMediaBuyContext {
    pub tenant: Arc<Tenant>,
    pub principal_id: String,
    pub buyer_ref: String,
    pub headers: RequestHeaders,
    pub testing: TestingContext,
    pub now: DateTime<Utc>,

    pub req: RwLock<CreateMediaBuyRequest>,

    pub principal: OnceLock<Principal>,
    pub workflow: OnceLock<WorkflowContext>,
    pub step: OnceLock<WorkflowStep>,

    pub products: OnceLock<HashMap<String, Product>>,
    pub start_time: OnceLock<DateTime<Utc>>,
    pub end_time: OnceLock<DateTime<Utc>>,
    pub total_budget: OnceLock<f64>,
    pub currency: OnceLock<String>,
    pub currency_limit: OnceLock<CurrencyLimit>,

    /// Pricing validated per request-package index, before permanent
    /// ids exist.
    pub pricing_by_index: Mutex<HashMap<usize, PricingInfo>>,
    /// Remapped onto permanent package ids for the adapter.
    pub pricing_by_package: Mutex<HashMap<String, PricingInfo>>,

    pub media_buy_id: OnceLock<String>,
    pub package_specs: Mutex<Vec<AdapterPackageSpec>>,

    pub adapter: OnceLock<Arc<dyn AdServerAdapter>>,
    pub adapter_result: OnceLock<MediaBuyResult>,

    /// Line items awaiting creative association, gathered while
    /// uploading inline creatives.
    pub associations: Mutex<Vec<(String, Vec<String>)>>,

    pub res: OnceLock<ToolOutcome>,
}

impl CreateMediaBuyContext {
    pub fn new(
        tenant: Arc<Tenant>,
        principal_id: String,
        headers: RequestHeaders,
        req: CreateMediaBuyRequest,
    ) -> Self {
        let testing = headers.testing_context();
        let buyer_ref = req.buyer_ref.clone();

        CreateMediaBuyContext {
            tenant,
            principal_id,
            buyer_ref,
            headers,
            testing,
            now: Utc::now(),
            req: RwLock::new(req),
            principal: OnceLock::new(),
            workflow: OnceLock::new(),
            step: OnceLock::new(),
            products: OnceLock::new(),
            start_time: OnceLock::new(),
            end_time: OnceLock::new(),
            total_budget: OnceLock::new(),
            currency: OnceLock::new(),
            currency_limit: OnceLock::new(),
            pricing_by_index: Mutex::new(HashMap::new()),
            pricing_by_package: Mutex::new(HashMap::new()),
            media_buy_id: OnceLock::new(),
            package_specs: Mutex::new(Vec::new()),
            adapter: OnceLock::new(),
            adapter_result: OnceLock::new(),
            associations: Mutex::new(Vec::new()),
            res: OnceLock::new(),
        }
    }

    /// Copied out at construction so failure envelopes never need the
    /// request lock.
    pub fn buyer_ref(&self) -> String {
        self.buyer_ref.clone()
    }

    pub fn step_id(&self) -> Option<String> {
        self.step.get().map(|s| s.step_id.clone())
    }

    /// Records a failure envelope and returns the error that aborts
    /// the rest of the pipeline. The finalizer wrapper moves the open
    /// workflow step to failed afterwards.
    pub fn fail(&self, error: AdcpError) -> anyhow::Error {
        let response = CreateMediaBuyResponse {
            buyer_ref: self.buyer_ref(),
            errors: Some(vec![error.detail()]),
            ..Default::default()
        };

        let _ = self.res.set(ToolOutcome::failed(response));

        anyhow!(error)
    }
}
