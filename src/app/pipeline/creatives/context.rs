use crate::core::auth::RequestHeaders;
use crate::core::models::tenant::Tenant;
use crate::core::models::workflow::{WorkflowContext, WorkflowStep};
use crate::core::spec::errors::AdcpError;
use crate::core::spec::requests::SyncCreativesRequest;
use crate::core::spec::responses::{SyncCreativeResult, SyncCreativesResponse, ToolOutcome};
use crate::core::spec::testing::TestingContext;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

/// A creative that ended the upsert pending and needs an approval
/// step opened for it.
#[derive(Debug, Clone)]
pub struct ApprovalCandidate {
    pub creative_id: String,
    pub name: String,
    pub format_id: Option<String>,
}

/// Shared state of one `sync_creatives` invocation. Per-creative
/// results accumulate as the batch progresses; one creative's failure
/// never rolls back its siblings.
pub struct SyncCreativesContext {
    pub tenant: Arc<Tenant>,
    pub principal_id: String,
    pub headers: RequestHeaders,
    pub testing: TestingContext,
    pub now: DateTime<Utc>,

    pub req: SyncCreativesRequest,

    pub workflow: OnceLock<WorkflowContext>,
    pub step: OnceLock<WorkflowStep>,

    pub results: Mutex<Vec<SyncCreativeResult>>,
    pub needing_approval: Mutex<Vec<ApprovalCandidate>>,
    pub assignments_created: Mutex<usize>,

    pub res: OnceLock<ToolOutcome>,
}

impl SyncCreativesContext {
    pub fn new(
        tenant: Arc<Tenant>,
        principal_id: String,
        headers: RequestHeaders,
        req: SyncCreativesRequest,
    ) -> Self {
        let testing = headers.testing_context();

        SyncCreativesContext {
            tenant,
            principal_id,
            headers,
            testing,
            now: Utc::now(),
            req,
            workflow: OnceLock::new(),
            step: OnceLock::new(),
            results: Mutex::new(Vec::new()),
            needing_approval: Mutex::new(Vec::new()),
            assignments_created: Mutex::new(0),
            res: OnceLock::new(),
        }
    }

    pub fn fail(&self, error: AdcpError) -> anyhow::Error {
        let _ = self.res.set(ToolOutcome::failed(SyncCreativesResponse {
            message: error.message.clone(),
            errors: Some(vec![error.detail()]),
            dry_run: self.req.dry_run,
            ..Default::default()
        }));

        anyhow!(error)
    }
}
