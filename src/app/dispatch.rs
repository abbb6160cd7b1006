use crate::app::state::AppState;
use crate::app::tools;
use crate::core::auth::{AuthContext, RequestHeaders};
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::spec::responses::ToolOutcome;
use crate::sample_or_attach_root_span;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};
use anyhow::Error;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::{KeyValue, global};
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};
use strum::{Display, EnumString};
use tracing::{Instrument, debug, warn};

static REQUESTS_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    global::meter("sage")
        .u64_counter("tool_requests")
        .with_description("Tool invocations received")
        .with_unit("1")
        .build()
});

static REQUEST_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    global::meter("sage")
        .f64_histogram("http.server.duration")
        .with_description("Tool request duration")
        .with_unit("s")
        .build()
});

/// The fixed tool surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ToolName {
    GetProducts,
    ListCreativeFormats,
    ListAuthorizedProperties,
    GetSignals,
    ActivateSignal,
    CreateMediaBuy,
    UpdateMediaBuy,
    GetMediaBuyDelivery,
    SyncCreatives,
    ListCreatives,
    UpdatePerformanceIndex,
    ListTasks,
    GetTask,
    CompleteTask,
}

impl ToolName {
    /// Discovery tools accept anonymous callers; everything else
    /// requires a principal.
    pub fn auth_required(&self) -> bool {
        !matches!(self, ToolName::GetProducts | ToolName::ListCreativeFormats)
    }
}

fn header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Extracts the honored header set from the transport request.
pub fn extract_headers(req: &HttpRequest) -> RequestHeaders {
    RequestHeaders {
        host: header(req, "host"),
        adcp_tenant: header(req, "x-adcp-tenant"),
        apx_incoming_host: header(req, "apx-incoming-host"),
        auth_token: header(req, "x-adcp-auth"),
        context_id: header(req, "x-context-id"),
        push_notification_url: header(req, "x-push-notification-url"),
        push_notification_auth_scheme: header(req, "x-push-notification-auth-scheme"),
        push_notification_credentials: header(req, "x-push-notification-credentials"),
        dry_run: header(req, "x-dry-run")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false),
        test_session_id: header(req, "x-test-session-id"),
        mock_time: header(req, "x-mock-time"),
        jump_to_event: header(req, "x-jump-to-event"),
    }
}

fn failure_response(error: &AdcpError) -> HttpResponse {
    let outcome = ToolOutcome::failed(json!({ "errors": [error.detail()] }));
    let status = StatusCode::from_u16(error.code.http_status()).unwrap_or(StatusCode::OK);

    HttpResponse::build(status).json(outcome.to_body())
}

fn adcp_error_of(error: Error) -> AdcpError {
    match error.downcast::<AdcpError>() {
        Ok(adcp) => adcp,
        Err(other) => AdcpError::new(ErrorCode::ToolError, other.to_string()),
    }
}

async fn dispatch(
    state: &Arc<AppState>,
    tool: ToolName,
    auth: &AuthContext,
    headers: RequestHeaders,
    body: Value,
) -> Result<ToolOutcome, Error> {
    let testing = headers.testing_context();

    // Malformed bodies answer with a failed envelope, never a 500.
    macro_rules! parse {
        ($ty:ty) => {
            match serde_json::from_value::<$ty>(body.clone()) {
                Ok(req) => req,
                Err(e) => {
                    return Err(AdcpError::validation(format!("Invalid request: {}", e)).into());
                }
            }
        };
    }

    match tool {
        ToolName::GetProducts => tools::discovery::get_products(state, auth, parse!(_), &testing).await,
        ToolName::ListCreativeFormats => {
            tools::discovery::list_creative_formats(state, auth, parse!(_)).await
        }
        ToolName::ListAuthorizedProperties => {
            tools::discovery::list_authorized_properties(state, auth, parse!(_)).await
        }
        ToolName::GetSignals => tools::signals::get_signals(state, auth, parse!(_)).await,
        ToolName::ActivateSignal => tools::signals::activate_signal(state, auth, parse!(_)).await,
        ToolName::CreateMediaBuy => {
            tools::media_buy::create_media_buy(state, auth, headers, parse!(_)).await
        }
        ToolName::UpdateMediaBuy => {
            tools::media_buy::update_media_buy(state, auth, headers, parse!(_)).await
        }
        ToolName::GetMediaBuyDelivery => {
            tools::media_buy::get_media_buy_delivery(state, auth, parse!(_), &testing).await
        }
        ToolName::SyncCreatives => tools::creatives::sync_creatives(state, auth, headers, parse!(_)).await,
        ToolName::ListCreatives => tools::creatives::list_creatives(state, auth, parse!(_)).await,
        ToolName::UpdatePerformanceIndex => {
            tools::media_buy::update_performance_index(state, auth, parse!(_)).await
        }
        ToolName::ListTasks => tools::tasks::list_tasks(state, auth, parse!(_)).await,
        ToolName::GetTask => tools::tasks::get_task(state, auth, parse!(_)).await,
        ToolName::CompleteTask => tools::tasks::complete_task(state, auth, parse!(_)).await,
    }
}

/// The tool endpoint: parses the envelope, authenticates, applies the
/// per-tool auth policy, and runs the handler. Tool-level failures
/// come back as failed envelopes with structured errors.
pub async fn handle_tool(
    state: Arc<AppState>,
    tool_name: String,
    http_req: HttpRequest,
    body: actix_web::web::Bytes,
    span_sample_rate: f32,
) -> HttpResponse {
    let started = std::time::Instant::now();

    let Ok(tool) = tool_name.parse::<ToolName>() else {
        let error = AdcpError::new(ErrorCode::ToolError, format!("Unknown tool: {}", tool_name));
        let body = ToolOutcome::failed(json!({ "errors": [error.detail()] })).to_body();
        return HttpResponse::NotFound().json(body);
    };

    let span = sample_or_attach_root_span!(span_sample_rate, "handle_tool", tool = %tool);

    let response = async {
        let headers = extract_headers(&http_req);

        let auth = match state.resolver.resolve(&headers).await {
            Ok(auth) => auth,
            Err(e) => {
                let error = adcp_error_of(e);
                debug!("Authentication failed: {}", error);
                return (failure_response(&error), "auth_failed");
            }
        };

        if tool.auth_required() && auth.principal_id.is_none() {
            let error = AdcpError::new(
                ErrorCode::AuthenticationError,
                format!("Tool {} requires authentication via the x-adcp-auth header", tool),
            );
            return (failure_response(&error), "auth_required");
        }

        let body: Value = if body.is_empty() {
            json!({})
        } else {
            match serde_json::from_slice(&body) {
                Ok(value) => value,
                Err(e) => {
                    let error = AdcpError::validation(format!("Invalid JSON body: {}", e));
                    return (failure_response(&error), "bad_body");
                }
            }
        };

        match dispatch(&state, tool, &auth, headers, body).await {
            Ok(outcome) => {
                let label = match outcome.status {
                    crate::core::spec::status::TaskStatus::Failed => "failed",
                    crate::core::spec::status::TaskStatus::InputRequired => "input_required",
                    _ => "ok",
                };
                (HttpResponse::Ok().json(outcome.to_body()), label)
            }
            Err(e) => {
                let error = adcp_error_of(e);
                warn!("Tool {} failed: {}", tool, error);
                (failure_response(&error), "failed")
            }
        }
    }
    .instrument(span)
    .await;

    let (response, outcome_label) = response;

    let attrs = [
        KeyValue::new("tool", tool.to_string()),
        KeyValue::new("outcome", outcome_label),
    ];
    REQUESTS_TOTAL.add(1, &attrs);
    REQUEST_DURATION.record(started.elapsed().as_secs_f64(), &attrs);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_parse_from_route() {
        assert_eq!("create_media_buy".parse::<ToolName>().unwrap(), ToolName::CreateMediaBuy);
        assert_eq!("get_products".parse::<ToolName>().unwrap(), ToolName::GetProducts);
        assert!("drop_tables".parse::<ToolName>().is_err());
    }

    #[test]
    fn test_auth_policy() {
        assert!(!ToolName::GetProducts.auth_required());
        assert!(!ToolName::ListCreativeFormats.auth_required());
        assert!(ToolName::ListAuthorizedProperties.auth_required());
        assert!(ToolName::CreateMediaBuy.auth_required());
        assert!(ToolName::SyncCreatives.auth_required());
        assert!(ToolName::GetSignals.auth_required());
    }
}
