use crate::core::models::tenant::PolicySettings;
use serde_json::Value;
use strum::Display;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PolicyStatus {
    Approved,
    Restricted,
    Blocked,
}

#[derive(Debug, Clone)]
pub struct PolicyResult {
    pub status: PolicyStatus,
    pub reason: Option<String>,
    pub restrictions: Vec<String>,
}

impl PolicyResult {
    fn approved() -> Self {
        PolicyResult {
            status: PolicyStatus::Approved,
            reason: None,
            restrictions: Vec::new(),
        }
    }
}

/// Brief-compliance checker. Blocks briefs touching a tenant's
/// prohibited terms and restricts briefs in prohibited categories;
/// everything else passes.
#[derive(Default)]
pub struct PolicyCheckService;

impl PolicyCheckService {
    pub fn new() -> Self {
        PolicyCheckService
    }

    pub async fn check_brief_compliance(
        &self,
        brief: &str,
        promoted_offering: Option<&str>,
        brand_manifest: Option<&Value>,
        tenant_policies: Option<&PolicySettings>,
    ) -> PolicyResult {
        let Some(policies) = tenant_policies else {
            return PolicyResult::approved();
        };

        let mut haystack = brief.to_lowercase();
        if let Some(offering) = promoted_offering {
            haystack.push(' ');
            haystack.push_str(&offering.to_lowercase());
        }
        if let Some(manifest) = brand_manifest
            && let Some(name) = manifest.get("name").and_then(|v| v.as_str())
        {
            haystack.push(' ');
            haystack.push_str(&name.to_lowercase());
        }

        for term in &policies.prohibited_terms {
            if !term.is_empty() && haystack.contains(&term.to_lowercase()) {
                debug!("Brief blocked on prohibited term '{}'", term);
                return PolicyResult {
                    status: PolicyStatus::Blocked,
                    reason: Some(format!("Brief matches prohibited term '{}'", term)),
                    restrictions: Vec::new(),
                };
            }
        }

        let restrictions: Vec<String> = policies
            .prohibited_categories
            .iter()
            .filter(|category| !category.is_empty() && haystack.contains(&category.to_lowercase()))
            .map(|category| format!("restricted category: {}", category))
            .collect();

        if !restrictions.is_empty() {
            return PolicyResult {
                status: PolicyStatus::Restricted,
                reason: Some("Brief falls into restricted categories".to_string()),
                restrictions,
            };
        }

        PolicyResult::approved()
    }

    /// Whether a product can be offered against the current policy
    /// outcome. Restricted briefs exclude products that opted out of
    /// restricted demand.
    pub fn check_product_eligibility(
        &self,
        policy: &PolicyResult,
        product_config: Option<&Value>,
    ) -> (bool, Option<String>) {
        if policy.status != PolicyStatus::Restricted {
            return (true, None);
        }

        let accepts_restricted = product_config
            .and_then(|c| c.get("accepts_restricted_demand"))
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        if accepts_restricted {
            (true, None)
        } else {
            (false, Some("product does not accept restricted demand".to_string()))
        }
    }
}

/// Shape validation for the promoted offering: needs a brand plus a
/// concrete product, not a bare category. Skipped for test sessions.
pub fn validate_promoted_offering(offering: &str) -> Result<(), String> {
    const GENERIC_TERMS: &[&str] = &[
        "footwear",
        "shoes",
        "clothing",
        "apparel",
        "electronics",
        "food",
        "beverages",
        "automotive",
        "athletic",
    ];

    let words: Vec<&str> = offering.split_whitespace().collect();

    if words.len() < 2 {
        return Err(format!(
            "Invalid promoted_offering: '{}'. Must include both brand and specific product",
            offering
        ));
    }

    let all_generic = words.iter().all(|word| {
        let lower = word.to_lowercase();
        GENERIC_TERMS.contains(&lower.as_str()) || matches!(lower.as_str(), "and" | "or" | "the" | "a" | "an")
    });

    if all_generic {
        return Err(format!(
            "Invalid promoted_offering: '{}'. Must include brand name and specific product, \
             not just generic category",
            offering
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policies(terms: Vec<&str>, categories: Vec<&str>) -> PolicySettings {
        PolicySettings {
            require_manual_review: false,
            prohibited_terms: terms.into_iter().map(|s| s.to_string()).collect(),
            prohibited_categories: categories.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_prohibited_term_blocks() {
        let service = PolicyCheckService::new();
        let result = service
            .check_brief_compliance(
                "promote tobacco products to adults",
                None,
                None,
                Some(&policies(vec!["tobacco"], vec![])),
            )
            .await;

        assert_eq!(result.status, PolicyStatus::Blocked);
        assert!(result.reason.unwrap().contains("tobacco"));
    }

    #[tokio::test]
    async fn test_category_restricts() {
        let service = PolicyCheckService::new();
        let result = service
            .check_brief_compliance(
                "sports betting app launch",
                None,
                None,
                Some(&policies(vec![], vec!["betting"])),
            )
            .await;

        assert_eq!(result.status, PolicyStatus::Restricted);
        assert_eq!(result.restrictions.len(), 1);
    }

    #[tokio::test]
    async fn test_clean_brief_approved() {
        let service = PolicyCheckService::new();
        let result = service
            .check_brief_compliance("running shoes campaign", None, None, None)
            .await;

        assert_eq!(result.status, PolicyStatus::Approved);
    }

    #[test]
    fn test_promoted_offering_shape() {
        assert!(validate_promoted_offering("Nike Air Jordan 2025 basketball shoes").is_ok());
        assert!(validate_promoted_offering("shoes").is_err());
        assert!(validate_promoted_offering("athletic footwear").is_err());
    }
}
