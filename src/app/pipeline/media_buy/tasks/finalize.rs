use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::core::notify::SlackNotifier;
use crate::core::observability::AuditLogger;
use crate::core::pipeline::AsyncTask;
use crate::core::spec::responses::{CreateMediaBuyResponse, ToolOutcome};
use crate::core::spec::status::TaskStatus;
use crate::core::workflow::{StepUpdate, WorkflowEngine};
use anyhow::Error;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

/// Builds the success envelope, completes the workflow step, and
/// emits the Slack and audit records. Response packages merge the
/// adapter result with the request package fields; `format_ids`
/// becomes `format_ids_to_provide` on the way out.
pub struct FinalizeTask {
    engine: Arc<WorkflowEngine>,
    slack: Arc<SlackNotifier>,
}

impl FinalizeTask {
    pub fn new(engine: Arc<WorkflowEngine>, slack: Arc<SlackNotifier>) -> Self {
        FinalizeTask { engine, slack }
    }
}

#[async_trait]
impl AsyncTask<CreateMediaBuyContext, Error> for FinalizeTask {
    async fn run(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        let result = context.adapter_result.get().expect("adapter ran before finalize");
        let media_buy_id = result.media_buy_id.clone();

        let response_packages: Vec<Value> = {
            let req = context.req.read();
            result
                .packages
                .iter()
                .enumerate()
                .map(|(i, adapter_package)| {
                    let mut merged = serde_json::to_value(adapter_package).unwrap_or_else(|_| json!({}));

                    if let Some(request_package) = req.packages.get(i)
                        && let (Value::Object(out), Ok(Value::Object(from_request))) =
                            (&mut merged, serde_json::to_value(request_package))
                    {
                        for (key, value) in from_request {
                            if key == "package_id" || value.is_null() {
                                continue;
                            }
                            if key == "format_ids" {
                                out.insert("format_ids_to_provide".to_string(), value);
                                continue;
                            }
                            out.entry(key).or_insert(value);
                        }

                        let has_creatives = request_package
                            .creative_ids
                            .as_ref()
                            .map(|ids| !ids.is_empty())
                            .unwrap_or(false);
                        out.insert(
                            "status".to_string(),
                            json!(if has_creatives {
                                TaskStatus::Completed
                            } else {
                                TaskStatus::Working
                            }),
                        );
                    }

                    merged
                })
                .collect()
        };

        let response = CreateMediaBuyResponse {
            buyer_ref: context.buyer_ref(),
            media_buy_id: Some(media_buy_id.clone()),
            packages: Some(response_packages.clone()),
            creative_deadline: result.creative_deadline,
            ..Default::default()
        };

        if let Some(step) = context.step.get() {
            self.engine
                .update_step(
                    &context.tenant,
                    &step.step_id,
                    StepUpdate {
                        status: Some(crate::core::models::workflow::StepStatus::Completed),
                        response_data: Some(json!({
                            "media_buy_id": media_buy_id,
                            "packages_count": response_packages.len(),
                        })),
                        ..Default::default()
                    },
                )
                .await?;
        }

        let principal_name = context
            .principal
            .get()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| context.principal_id.clone());
        let duration_days = (*context.end_time.get().expect("end resolved")
            - *context.start_time.get().expect("start resolved"))
        .num_days()
            + 1;

        self.slack
            .notify_media_buy_event(
                &context.tenant,
                "created",
                Some(&media_buy_id),
                &principal_name,
                json!({
                    "total_budget": context.total_budget.get(),
                    "duration_days": duration_days,
                    "packages_count": response_packages.len(),
                }),
                true,
            )
            .await;

        AuditLogger::new(&context.tenant.tenant_id).log_operation(
            "create_media_buy",
            &principal_name,
            Some(&context.principal_id),
            true,
            &json!({
                "media_buy_id": media_buy_id,
                "total_budget": context.total_budget.get(),
                "duration_days": duration_days,
                "packages_count": response_packages.len(),
            }),
        );

        info!("Media buy {} created", media_buy_id);

        let _ = context.res.set(ToolOutcome::completed(response));

        Ok(())
    }
}
