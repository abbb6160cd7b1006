use crate::app::state::AppState;
use crate::core::adapters::build_adapter;
use crate::core::auth::AuthContext;
use crate::core::models::workflow::{StepOwner, StepStatus};
use crate::core::observability::AuditLogger;
use crate::core::policy::{PolicyStatus, validate_promoted_offering};
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::spec::requests::{
    GetProductsRequest, ListAuthorizedPropertiesRequest, ListCreativeFormatsRequest,
};
use crate::core::spec::responses::{
    GetProductsResponse, ListAuthorizedPropertiesResponse, ListCreativeFormatsResponse,
    PropertyTagMetadata, PropertyView, ToolOutcome,
};
use crate::core::spec::testing::TestingContext;
use crate::core::workflow::StepSpec;
use anyhow::Error;
use serde_json::json;
use std::collections::HashMap;

/// Product discovery with the brief policy gate and dynamic pricing
/// enrichment. Anonymous callers get the catalog with pricing
/// stripped.
pub async fn get_products(
    state: &AppState,
    auth: &AuthContext,
    req: GetProductsRequest,
    testing: &TestingContext,
) -> Result<ToolOutcome, Error> {
    let tenant = &auth.tenant;
    let audit = AuditLogger::new(&tenant.tenant_id);

    let offering = req
        .brand_manifest
        .as_ref()
        .and_then(|manifest| {
            manifest
                .get("name")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .or_else(|| manifest.as_str().map(|url| format!("Brand at {}", url)))
        })
        .or_else(|| req.promoted_offering.clone());

    let Some(offering) = offering.filter(|o| !o.trim().is_empty()) else {
        return Err(AdcpError::validation(
            "Either brand_manifest or promoted_offering must provide brand information",
        )
        .into());
    };

    if let Some(promoted) = &req.promoted_offering
        && !testing.is_test_session()
        && let Err(message) = validate_promoted_offering(promoted)
    {
        return Err(AdcpError::validation(message).into());
    }

    let policy = state
        .policy
        .check_brief_compliance(
            &req.brief,
            req.promoted_offering.as_deref(),
            req.brand_manifest.as_ref(),
            tenant.policy_settings.as_ref(),
        )
        .await;

    audit.log_operation(
        "policy_check",
        auth.principal_id.as_deref().unwrap_or("anonymous"),
        auth.principal_id.as_deref(),
        policy.status != PolicyStatus::Blocked,
        &json!({
            "brief": req.brief.chars().take(100).collect::<String>(),
            "policy_status": policy.status.to_string(),
            "reason": policy.reason,
        }),
    );

    if policy.status == PolicyStatus::Blocked {
        return Err(AdcpError::new(
            ErrorCode::PolicyViolation,
            policy.reason.unwrap_or_else(|| "Brief violates publisher policy".to_string()),
        )
        .into());
    }

    // Restricted briefs under manual review yield no products until a
    // human clears the request.
    if policy.status == PolicyStatus::Restricted && tenant.requires_manual_review() {
        if let Some(principal_id) = &auth.principal_id {
            let workflow = state
                .engine
                .get_or_create_context(&tenant.tenant_id, principal_id, None)
                .await?;
            state
                .engine
                .create_step(
                    &workflow,
                    StepSpec {
                        step_type: "policy_review".to_string(),
                        owner: StepOwner::Publisher,
                        status: StepStatus::RequiresApproval,
                        tool_name: "get_products".to_string(),
                        request_data: json!({
                            "brief": req.brief,
                            "promoted_offering": req.promoted_offering,
                            "restrictions": policy.restrictions,
                        }),
                        initial_comment: policy.reason.clone(),
                    },
                )
                .await?;
        }

        return Ok(ToolOutcome::completed(GetProductsResponse {
            products: Vec::new(),
            message: "Request pending manual review due to policy restrictions".to_string(),
        }));
    }

    let mut products = state
        .catalog
        .products_for_request(&tenant.tenant_id, req.filters.as_ref(), req.min_exposures)
        .await?;

    products.retain(|product| {
        state
            .policy
            .check_product_eligibility(&policy, product.implementation_config.as_ref())
            .0
    });

    // Annotate pricing options with what the tenant's adapter can
    // actually transact.
    if let Some(principal_id) = &auth.principal_id
        && let Some(principal) = state.store.get_principal(&tenant.tenant_id, principal_id).await?
    {
        let adapter = build_adapter(tenant, &principal, true, state.http.clone());
        let supported = adapter.supported_pricing_models();

        for product in &mut products {
            for option in &mut product.pricing_options {
                let ok = supported.contains(&option.pricing_model);
                option.supported = Some(ok);
                if !ok {
                    option.unsupported_reason = Some(format!(
                        "Current adapter does not support {} pricing",
                        option.pricing_model.to_string().to_uppercase()
                    ));
                }
            }
        }
    }

    let mut message = format!("Found {} matching products", products.len());

    if auth.principal_id.is_none() {
        for product in &mut products {
            product.min_spend = None;
            product.floor_cpm = None;
            product.recommended_cpm = None;
            for option in &mut product.pricing_options {
                option.rate = None;
                option.price_guidance = None;
            }
        }
        message.push_str(". Please connect through an authorized buying agent for pricing data");
    }

    audit.log_operation(
        "get_products",
        auth.principal_id.as_deref().unwrap_or("anonymous"),
        auth.principal_id.as_deref(),
        true,
        &json!({ "result_count": products.len() }),
    );

    Ok(ToolOutcome::completed(GetProductsResponse { products, message }))
}

/// Merged standard + tenant formats, with the discovery filter set.
pub async fn list_creative_formats(
    state: &AppState,
    auth: &AuthContext,
    req: ListCreativeFormatsRequest,
) -> Result<ToolOutcome, Error> {
    let mut formats = state.formats.list_for_tenant(&auth.tenant.tenant_id).await?;

    if let Some(format_type) = &req.format_type {
        formats.retain(|f| f.format_type.to_string() == *format_type);
    }

    if req.standard_only.unwrap_or(false) {
        formats.retain(|f| f.is_standard);
    }

    match req.category.as_deref() {
        Some("standard") => formats.retain(|f| f.is_standard),
        Some("custom") => formats.retain(|f| !f.is_standard),
        _ => {}
    }

    if let Some(format_ids) = &req.format_ids {
        formats.retain(|f| format_ids.contains(&f.format_id));
    }

    let type_count = formats
        .iter()
        .map(|f| f.format_type)
        .collect::<std::collections::HashSet<_>>()
        .len();
    let message = format!(
        "Found {} creative formats across {} format types",
        formats.len(),
        type_count
    );

    AuditLogger::new(&auth.tenant.tenant_id).log_operation(
        "list_creative_formats",
        auth.principal_id.as_deref().unwrap_or("anonymous"),
        auth.principal_id.as_deref(),
        true,
        &json!({
            "format_count": formats.len(),
            "standard_formats": formats.iter().filter(|f| f.is_standard).count(),
            "custom_formats": formats.iter().filter(|f| !f.is_standard).count(),
        }),
    );

    Ok(ToolOutcome::completed(ListCreativeFormatsResponse { formats, message }))
}

/// Verified properties plus the metadata for every referenced tag.
pub async fn list_authorized_properties(
    state: &AppState,
    auth: &AuthContext,
    req: ListAuthorizedPropertiesRequest,
) -> Result<ToolOutcome, Error> {
    use crate::core::models::property::VerificationStatus;

    let mut properties = state.store.list_properties(&auth.tenant.tenant_id).await?;
    properties.retain(|p| p.verification_status == VerificationStatus::Verified);

    if !req.tags.is_empty() {
        properties.retain(|p| p.tags.iter().any(|t| req.tags.contains(t)));
    }

    let mut referenced: std::collections::HashSet<String> = std::collections::HashSet::new();
    for property in &properties {
        referenced.extend(property.tags.iter().cloned());
    }

    let mut tags: HashMap<String, PropertyTagMetadata> = HashMap::new();
    for tag in state.store.list_property_tags(&auth.tenant.tenant_id).await? {
        if referenced.contains(&tag.tag_id) {
            tags.insert(
                tag.tag_id.clone(),
                PropertyTagMetadata {
                    name: tag.name,
                    description: tag.description,
                },
            );
        }
    }

    let views: Vec<PropertyView> = properties
        .into_iter()
        .map(|p| PropertyView {
            property_type: p.property_type,
            name: p.name,
            identifiers: p.identifiers,
            tags: p.tags,
            publisher_domain: p.publisher_domain,
        })
        .collect();

    AuditLogger::new(&auth.tenant.tenant_id).log_operation(
        "list_authorized_properties",
        auth.principal_id.as_deref().unwrap_or("anonymous"),
        auth.principal_id.as_deref(),
        true,
        &json!({ "properties_count": views.len(), "requested_tags": req.tags }),
    );

    Ok(ToolOutcome::completed(ListAuthorizedPropertiesResponse {
        properties: views,
        tags,
    }))
}
