use crate::core::adapters::AdServerAdapter;
use crate::core::auth::RequestHeaders;
use crate::core::models::media_buy::MediaBuy;
use crate::core::models::principal::Principal;
use crate::core::models::tenant::Tenant;
use crate::core::models::workflow::{WorkflowContext, WorkflowStep};
use crate::core::spec::errors::AdcpError;
use crate::core::spec::requests::UpdateMediaBuyRequest;
use crate::core::spec::responses::{ToolOutcome, UpdateMediaBuyResponse};
use crate::core::spec::testing::TestingContext;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use std::sync::{Arc, OnceLock};

/// Shared state of one `update_media_buy` invocation.
pub struct UpdateMediaBuyContext {
    pub tenant: Arc<Tenant>,
    pub principal_id: String,
    pub headers: RequestHeaders,
    pub testing: TestingContext,
    pub now: DateTime<Utc>,

    pub req: UpdateMediaBuyRequest,

    pub principal: OnceLock<Principal>,
    pub media_buy: OnceLock<MediaBuy>,
    pub workflow: OnceLock<WorkflowContext>,
    pub step: OnceLock<WorkflowStep>,
    pub adapter: OnceLock<Arc<dyn AdServerAdapter>>,

    pub res: OnceLock<ToolOutcome>,
}

impl UpdateMediaBuyContext {
    pub fn new(
        tenant: Arc<Tenant>,
        principal_id: String,
        headers: RequestHeaders,
        req: UpdateMediaBuyRequest,
    ) -> Self {
        let testing = headers.testing_context();

        UpdateMediaBuyContext {
            tenant,
            principal_id,
            headers,
            testing,
            now: Utc::now(),
            req,
            principal: OnceLock::new(),
            media_buy: OnceLock::new(),
            workflow: OnceLock::new(),
            step: OnceLock::new(),
            adapter: OnceLock::new(),
            res: OnceLock::new(),
        }
    }

    pub fn step_id(&self) -> Option<String> {
        self.step.get().map(|s| s.step_id.clone())
    }

    pub fn fail(&self, error: AdcpError) -> anyhow::Error {
        let response = UpdateMediaBuyResponse {
            media_buy_id: self.req.media_buy_id.clone(),
            buyer_ref: self.req.buyer_ref.clone(),
            errors: Some(vec![error.detail()]),
            ..Default::default()
        };

        let _ = self.res.set(ToolOutcome::failed(response));

        anyhow!(error)
    }
}
