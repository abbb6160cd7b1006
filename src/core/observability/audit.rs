use serde_json::Value;
use tracing::{info, warn};

/// Structured audit trail emitted to the `audit` log target. Entries
/// are best-effort and never gate the operation that produced them.
pub struct AuditLogger {
    tenant_id: String,
}

impl AuditLogger {
    pub fn new(tenant_id: &str) -> Self {
        AuditLogger {
            tenant_id: tenant_id.to_string(),
        }
    }

    pub fn log_operation(
        &self,
        operation: &str,
        principal_name: &str,
        principal_id: Option<&str>,
        success: bool,
        details: &Value,
    ) {
        info!(
            target: "audit",
            tenant_id = %self.tenant_id,
            operation = %operation,
            principal_name = %principal_name,
            principal_id = %principal_id.unwrap_or("anonymous"),
            success = success,
            details = %details,
            "audit"
        );
    }

    pub fn log_failure(
        &self,
        operation: &str,
        principal_name: &str,
        principal_id: Option<&str>,
        error: &str,
    ) {
        warn!(
            target: "audit",
            tenant_id = %self.tenant_id,
            operation = %operation,
            principal_name = %principal_name,
            principal_id = %principal_id.unwrap_or("anonymous"),
            success = false,
            error = %error,
            "audit"
        );
    }

    /// Cross-tenant and cross-principal access attempts are security
    /// events, tagged for alerting on top of the regular audit row.
    pub fn log_security_violation(&self, operation: &str, principal_id: Option<&str>, detail: &str) {
        warn!(
            target: "audit",
            tenant_id = %self.tenant_id,
            operation = %operation,
            principal_id = %principal_id.unwrap_or("anonymous"),
            security_violation = true,
            detail = %detail,
            "security_violation"
        );
    }
}
