use crate::core::models::creative::CreativeStatus;
use crate::core::models::tenant::Tenant;
use crate::core::notify::SlackNotifier;
use crate::core::store::Store;
use crate::core::workflow::{StepUpdate, WorkflowEngine};
use anyhow::{Error, anyhow};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::{debug, error, info, warn};

/// One creative queued for background review.
#[derive(Debug, Clone)]
pub struct ReviewJob {
    pub tenant_id: String,
    pub principal_id: String,
    pub creative_id: String,
    pub step_id: String,
}

/// Bounded worker pool for AI-powered creative review. Callers never
/// block on a review; the outcome lands on the creative row and its
/// workflow step, which in turn fans out webhooks.
pub struct ReviewPool {
    tx: mpsc::Sender<ReviewJob>,
    shutdown: Arc<Notify>,
}

impl ReviewPool {
    pub fn start(
        workers: usize,
        queue_depth: usize,
        store: Arc<dyn Store>,
        engine: Arc<WorkflowEngine>,
        slack: Arc<SlackNotifier>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<ReviewJob>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let shutdown = Arc::new(Notify::new());

        for worker in 0..workers.max(1) {
            let rx = rx.clone();
            let store = store.clone();
            let engine = engine.clone();
            let slack = slack.clone();
            let shutdown = shutdown.clone();

            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            job = rx.recv() => job,
                            _ = shutdown.notified() => break,
                        }
                    };

                    let Some(job) = job else { break };

                    debug!("Review worker {} picked up creative {}", worker, job.creative_id);
                    if let Err(e) = review_one(&store, &engine, &slack, &job).await {
                        error!("Creative review for {} failed: {}", job.creative_id, e);
                    }
                }

                debug!("Review worker {} stopped", worker);
            });
        }

        Arc::new(ReviewPool { tx, shutdown })
    }

    /// Enqueues a review. A full queue is surfaced to the caller so
    /// the creative stays pending with a visible error instead of
    /// silently dropping the job.
    pub fn submit(&self, job: ReviewJob) -> Result<(), Error> {
        self.tx
            .try_send(job)
            .map_err(|e| anyhow!("Review queue rejected job: {}", e))
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

/// Heuristic stand-in for the model-backed reviewer: a creative is
/// rejected when it trips the tenant's prohibited terms, approved
/// otherwise. The verdict is recorded on the creative's data blob.
async fn review_one(
    store: &Arc<dyn Store>,
    engine: &Arc<WorkflowEngine>,
    slack: &Arc<SlackNotifier>,
    job: &ReviewJob,
) -> Result<(), Error> {
    let tenant: Tenant = store
        .get_tenant(&job.tenant_id)
        .await?
        .ok_or_else(|| anyhow!("Tenant {} not found", job.tenant_id))?;

    let Some(mut creative) = store
        .get_creative(&job.tenant_id, &job.principal_id, &job.creative_id)
        .await?
    else {
        warn!("Creative {} vanished before review", job.creative_id);
        return Ok(());
    };

    let prohibited = tenant
        .policy_settings
        .as_ref()
        .map(|p| p.prohibited_terms.clone())
        .unwrap_or_default();

    let haystack = format!(
        "{} {} {}",
        creative.name.to_lowercase(),
        creative.data.url.as_deref().unwrap_or("").to_lowercase(),
        creative.data.snippet.as_deref().unwrap_or("").to_lowercase(),
    );

    let rejection = prohibited
        .iter()
        .find(|term| !term.is_empty() && haystack.contains(&term.to_lowercase()))
        .map(|term| format!("Creative content matches prohibited term '{}'", term));

    match rejection {
        Some(reason) => {
            creative.status = CreativeStatus::Rejected;
            creative.data.ai_review = Some(json!({"verdict": "rejected", "reason": reason}));
            creative.updated_at = Utc::now();
            store.upsert_creative(creative.clone()).await?;

            engine
                .update_step(&tenant, &job.step_id, StepUpdate::failed(reason.clone()))
                .await?;

            slack
                .notify_creative_pending(
                    &tenant,
                    &creative.creative_id,
                    &job.principal_id,
                    creative.format.as_ref().map(|f| f.id.as_str()),
                    Some(&reason),
                )
                .await;

            info!("Creative {} rejected by review: {}", job.creative_id, reason);
        }
        None => {
            creative.status = CreativeStatus::Approved;
            creative.data.ai_review = Some(json!({"verdict": "approved"}));
            creative.updated_at = Utc::now();
            store.upsert_creative(creative.clone()).await?;

            engine
                .update_step(
                    &tenant,
                    &job.step_id,
                    StepUpdate {
                        status: Some(crate::core::models::workflow::StepStatus::Completed),
                        response_data: Some(json!({
                            "creative_id": creative.creative_id,
                            "status": creative.status,
                        })),
                        ..Default::default()
                    },
                )
                .await?;

            info!("Creative {} approved by review", job.creative_id);
        }
    }

    Ok(())
}
