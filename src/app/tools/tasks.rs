use crate::app::pipeline::media_buy::approve::execute_approved_media_buy;
use crate::app::state::AppState;
use crate::core::auth::AuthContext;
use crate::core::models::workflow::{ObjectType, StepStatus, WorkflowStep};
use crate::core::observability::AuditLogger;
use crate::core::spec::errors::AdcpError;
use crate::core::spec::requests::{CompleteTaskRequest, GetTaskRequest, ListTasksRequest};
use crate::core::spec::responses::{
    AssociatedObject, CompleteTaskResponse, ListTasksResponse, TaskDetail, TaskSummary, ToolOutcome,
};
use crate::core::workflow::StepUpdate;
use anyhow::Error;
use chrono::Utc;
use serde_json::json;
use tracing::info;

async fn associated_objects(state: &AppState, step_id: &str) -> Result<Vec<AssociatedObject>, Error> {
    Ok(state
        .store
        .mappings_for_step(step_id)
        .await?
        .into_iter()
        .map(|m| AssociatedObject {
            object_type: m.object_type.to_string(),
            id: m.object_id,
            action: m.action.to_string(),
        })
        .collect())
}

pub async fn list_tasks(
    state: &AppState,
    auth: &AuthContext,
    req: ListTasksRequest,
) -> Result<ToolOutcome, Error> {
    let (steps, total) = state.store.query_steps(&auth.tenant.tenant_id, &req).await?;

    let mut tasks = Vec::with_capacity(steps.len());
    for step in &steps {
        tasks.push(TaskSummary {
            task_id: step.step_id.clone(),
            status: step.status.to_string(),
            step_type: step.step_type.clone(),
            tool_name: step.tool_name.clone(),
            owner: step.owner.to_string(),
            context_id: step.context_id.clone(),
            created_at: step.created_at,
            updated_at: step.updated_at,
            associated_objects: associated_objects(state, &step.step_id).await?,
            error_message: step.error_message.clone(),
        });
    }

    let has_more = (req.offset + req.limit) < total as u32;

    Ok(ToolOutcome::completed(ListTasksResponse {
        tasks,
        total,
        offset: req.offset,
        limit: req.limit,
        has_more,
    }))
}

pub async fn get_task(state: &AppState, auth: &AuthContext, req: GetTaskRequest) -> Result<ToolOutcome, Error> {
    let step = state
        .store
        .get_step(&auth.tenant.tenant_id, &req.task_id)
        .await?
        .ok_or_else(|| AdcpError::validation(format!("Task {} not found", req.task_id)))?;

    Ok(ToolOutcome::completed(TaskDetail {
        task_id: step.step_id.clone(),
        context_id: step.context_id.clone(),
        status: step.status.to_string(),
        step_type: step.step_type.clone(),
        tool_name: step.tool_name.clone(),
        owner: step.owner.to_string(),
        created_at: step.created_at,
        updated_at: step.updated_at,
        request_data: step.request_data.clone(),
        response_data: step.response_data.clone(),
        error_message: step.error_message.clone(),
        associated_objects: associated_objects(state, &step.step_id).await?,
    }))
}

/// Whether completing this step means executing a held media buy
/// against the ad server.
async fn pending_media_buy_of(state: &AppState, step: &WorkflowStep) -> Result<Option<String>, Error> {
    if step.step_type != "media_buy_creation" && step.step_type != "approval" {
        return Ok(None);
    }

    let mappings = state.store.mappings_for_step(&step.step_id).await?;
    Ok(mappings
        .into_iter()
        .find(|m| m.object_type == ObjectType::MediaBuy)
        .map(|m| m.object_id))
}

/// Resolves a pending task: the approval override for parked media
/// buys and the generic completion path for everything else. Terminal
/// tasks cannot be completed twice.
pub async fn complete_task(
    state: &AppState,
    auth: &AuthContext,
    req: CompleteTaskRequest,
) -> Result<ToolOutcome, Error> {
    let principal_id = auth
        .principal_id
        .clone()
        .expect("dispatcher enforces auth for complete_task");

    if req.status != "completed" && req.status != "failed" {
        return Err(AdcpError::validation(format!(
            "Invalid status '{}'. Must be 'completed' or 'failed'",
            req.status
        ))
        .into());
    }

    let step = state
        .store
        .get_step(&auth.tenant.tenant_id, &req.task_id)
        .await?
        .ok_or_else(|| AdcpError::validation(format!("Task {} not found", req.task_id)))?;

    if step.status.is_terminal() {
        return Err(AdcpError::validation(format!(
            "Task {} is already {} and cannot be completed",
            req.task_id, step.status
        ))
        .into());
    }

    let mut final_status = req.status.clone();
    let mut error_message = req.error_message.clone();
    let mut response_data = req
        .response_data
        .clone()
        .unwrap_or_else(|| json!({ "manually_completed": true, "completed_by": principal_id }));

    // Approving a parked media buy replays the adapter leg under the
    // same permanent ids before the step is allowed to complete.
    if req.status == "completed"
        && step.status == StepStatus::RequiresApproval
        && let Some(media_buy_id) = pending_media_buy_of(state, &step).await?
    {
        info!("Executing approved media buy {} for task {}", media_buy_id, req.task_id);

        let (success, error) =
            execute_approved_media_buy(&state.media_buy_deps, &media_buy_id, &auth.tenant.tenant_id).await;

        if success {
            response_data = json!({ "media_buy_id": media_buy_id, "approved_by": principal_id });
        } else {
            final_status = "failed".to_string();
            error_message = error;
        }
    }

    let update = if final_status == "completed" {
        StepUpdate {
            status: Some(StepStatus::Completed),
            response_data: Some(response_data),
            ..Default::default()
        }
    } else {
        StepUpdate {
            status: Some(StepStatus::Failed),
            error_message: Some(
                error_message.unwrap_or_else(|| "Task marked as failed manually".to_string()),
            ),
            response_data: req.response_data.clone(),
            ..Default::default()
        }
    };

    let updated = state.engine.update_step(&auth.tenant, &req.task_id, update).await?;

    AuditLogger::new(&auth.tenant.tenant_id).log_operation(
        "complete_task",
        "Manual Completion",
        Some(&principal_id),
        true,
        &json!({
            "task_id": req.task_id,
            "new_status": updated.status.to_string(),
            "task_type": updated.step_type,
        }),
    );

    Ok(ToolOutcome::completed(CompleteTaskResponse {
        task_id: req.task_id.clone(),
        status: updated.status.to_string(),
        message: format!("Task {} marked as {}", req.task_id, updated.status),
        completed_at: Utc::now(),
        completed_by: principal_id,
    }))
}
