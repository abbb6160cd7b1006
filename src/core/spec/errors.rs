use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Error codes returned to callers. The literal wire strings are part
/// of the protocol, including their inconsistent casing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    InvalidDatetime,
    InvalidBudget,
    AuthenticationError,
    InvalidAuthToken,
    PolicyViolation,
    PricingError,
    CurrencyNotSupported,
    BudgetLimitExceeded,
    FormatValidationError,
    CreativesNotFound,
    InvalidConfiguration,
    MediaBuyCreationError,
    AdapterTimeout,
    Deprecated,
    ToolError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::InvalidDatetime => "invalid_datetime",
            ErrorCode::InvalidBudget => "invalid_budget",
            ErrorCode::AuthenticationError => "authentication_error",
            ErrorCode::InvalidAuthToken => "INVALID_AUTH_TOKEN",
            ErrorCode::PolicyViolation => "POLICY_VIOLATION",
            ErrorCode::PricingError => "PRICING_ERROR",
            ErrorCode::CurrencyNotSupported => "currency_not_supported",
            ErrorCode::BudgetLimitExceeded => "budget_limit_exceeded",
            ErrorCode::FormatValidationError => "FORMAT_VALIDATION_ERROR",
            ErrorCode::CreativesNotFound => "CREATIVES_NOT_FOUND",
            ErrorCode::InvalidConfiguration => "invalid_configuration",
            ErrorCode::MediaBuyCreationError => "MEDIA_BUY_CREATION_ERROR",
            ErrorCode::AdapterTimeout => "ADAPTER_TIMEOUT",
            ErrorCode::Deprecated => "DEPRECATED",
            ErrorCode::ToolError => "TOOL_ERROR",
        }
    }

    /// Transport status for the error class. Validation-class errors
    /// intentionally stay 200 with a failed envelope.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::AuthenticationError | ErrorCode::InvalidAuthToken => 401,
            ErrorCode::PolicyViolation => 403,
            ErrorCode::InvalidConfiguration => 412,
            ErrorCode::AdapterTimeout => 502,
            ErrorCode::MediaBuyCreationError => 500,
            _ => 200,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured protocol-level failure, carried through pipelines and
/// serialized into failure envelopes.
#[derive(Debug, Clone)]
pub struct AdcpError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
}

impl AdcpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        AdcpError {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn pricing(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PricingError, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.code.to_string(),
            message: self.message.clone(),
            details: self.details.clone(),
        }
    }
}

impl fmt::Display for AdcpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AdcpError {}

/// Wire shape of a single error inside a response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_strings_keep_casing() {
        assert_eq!(ErrorCode::InvalidAuthToken.as_str(), "INVALID_AUTH_TOKEN");
        assert_eq!(ErrorCode::PricingError.as_str(), "PRICING_ERROR");
        assert_eq!(ErrorCode::CurrencyNotSupported.as_str(), "currency_not_supported");
        assert_eq!(ErrorCode::BudgetLimitExceeded.as_str(), "budget_limit_exceeded");
    }

    #[test]
    fn test_detail_carries_code_string() {
        let err = AdcpError::pricing("bid 5.0 is below floor price 8.0");
        let detail = err.detail();

        assert_eq!(detail.code, "PRICING_ERROR");
        assert!(detail.message.contains("below floor price"));
        assert!(detail.details.is_none());
    }

    #[test]
    fn test_validation_errors_stay_on_transport_200() {
        assert_eq!(ErrorCode::ValidationError.http_status(), 200);
        assert_eq!(ErrorCode::PricingError.http_status(), 200);
        assert_eq!(ErrorCode::InvalidAuthToken.http_status(), 401);
        assert_eq!(ErrorCode::InvalidConfiguration.http_status(), 412);
    }
}
