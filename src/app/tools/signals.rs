use crate::app::state::AppState;
use crate::core::auth::AuthContext;
use crate::core::models::workflow::{MappingAction, ObjectType, StepOwner, StepStatus};
use crate::core::spec::errors::AdcpError;
use crate::core::spec::requests::{ActivateSignalRequest, GetSignalsRequest};
use crate::core::spec::responses::{ActivateSignalResponse, GetSignalsResponse, SignalView, ToolOutcome};
use crate::core::workflow::StepSpec;
use anyhow::Error;
use serde_json::json;
use uuid::Uuid;

/// Audience/contextual signal discovery over the tenant's configured
/// signal catalog.
pub async fn get_signals(
    _state: &AppState,
    auth: &AuthContext,
    req: GetSignalsRequest,
) -> Result<ToolOutcome, Error> {
    let mut signals: Vec<SignalView> = auth
        .tenant
        .signals
        .iter()
        .filter(|signal| {
            if let Some(spec_text) = &req.signal_spec {
                let needle = spec_text.to_lowercase();
                if !signal.name.to_lowercase().contains(&needle)
                    && !signal.description.to_lowercase().contains(&needle)
                    && !signal.signal_type.to_lowercase().contains(&needle)
                {
                    return false;
                }
            }

            if let Some(filters) = &req.filters {
                if let Some(catalog_types) = &filters.catalog_types
                    && !catalog_types.contains(&signal.signal_type)
                {
                    return false;
                }
                if let Some(providers) = &filters.data_providers
                    && !providers.contains(&signal.data_provider)
                {
                    return false;
                }
                if let Some(max_cpm) = filters.max_cpm
                    && signal.pricing.as_ref().map(|p| p.cpm > max_cpm).unwrap_or(false)
                {
                    return false;
                }
                if let Some(min_coverage) = filters.min_coverage_percentage
                    && signal.coverage_percentage < min_coverage
                {
                    return false;
                }
            }

            true
        })
        .map(|signal| SignalView {
            signal_agent_segment_id: signal.signal_agent_segment_id.clone(),
            name: signal.name.clone(),
            description: signal.description.clone(),
            signal_type: signal.signal_type.clone(),
            data_provider: signal.data_provider.clone(),
            coverage_percentage: signal.coverage_percentage,
            deployments: signal.deployments.clone(),
            pricing: signal.pricing.clone(),
        })
        .collect();

    if let Some(max_results) = req.max_results {
        signals.truncate(max_results);
    }

    Ok(ToolOutcome::completed(GetSignalsResponse { signals }))
}

/// Begins signal activation. Signals flagged for approval park a
/// workflow step for the publisher; the rest start deploying
/// immediately and report `working`.
pub async fn activate_signal(
    state: &AppState,
    auth: &AuthContext,
    req: ActivateSignalRequest,
) -> Result<ToolOutcome, Error> {
    let principal_id = auth
        .principal_id
        .as_deref()
        .expect("dispatcher enforces auth for activate_signal");

    let Some(signal) = auth
        .tenant
        .signals
        .iter()
        .find(|s| s.signal_agent_segment_id == req.signal_id)
    else {
        return Err(AdcpError::validation(format!("Unknown signal: {}", req.signal_id)).into());
    };

    if signal.requires_approval {
        let workflow = state
            .engine
            .get_or_create_context(&auth.tenant.tenant_id, principal_id, None)
            .await?;
        let step = state
            .engine
            .create_step(
                &workflow,
                StepSpec {
                    step_type: "signal_activation".to_string(),
                    owner: StepOwner::Publisher,
                    status: StepStatus::RequiresApproval,
                    tool_name: "activate_signal".to_string(),
                    request_data: serde_json::to_value(&req)?,
                    initial_comment: Some(format!(
                        "Signal {} requires manual approval before activation",
                        req.signal_id
                    )),
                },
            )
            .await?;

        if let Some(media_buy_id) = &req.media_buy_id {
            state
                .engine
                .add_mapping(&step.step_id, ObjectType::MediaBuy, media_buy_id, MappingAction::Update)
                .await?;
        }

        return Ok(ToolOutcome::input_required(ActivateSignalResponse {
            signal_id: req.signal_id,
            message: "Signal requires manual approval before activation".to_string(),
            activation_details: Some(json!({
                "approval_required": true,
                "workflow_step_id": step.step_id,
            })),
            errors: None,
        }));
    }

    let platform_segment_id = format!(
        "seg_{}_{}",
        req.signal_id,
        &Uuid::new_v4().simple().to_string()[..8]
    );
    let duration_minutes = signal
        .deployments
        .iter()
        .filter_map(|d| d.estimated_activation_duration_minutes)
        .max()
        .unwrap_or(15);

    Ok(ToolOutcome::working(ActivateSignalResponse {
        signal_id: req.signal_id,
        message: "Signal activation initiated successfully".to_string(),
        activation_details: Some(json!({
            "platform_segment_id": platform_segment_id,
            "estimated_completion_minutes": duration_minutes,
        })),
        errors: None,
    }))
}
