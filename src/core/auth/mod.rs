mod resolver;

pub use resolver::{AuthContext, AuthResolver};

use crate::core::spec::testing::{CampaignEvent, TestingContext};
use chrono::{DateTime, Utc};

/// The honored request headers, extracted once per request.
#[derive(Debug, Clone, Default)]
pub struct RequestHeaders {
    pub host: Option<String>,
    pub adcp_tenant: Option<String>,
    pub apx_incoming_host: Option<String>,
    pub auth_token: Option<String>,
    pub context_id: Option<String>,
    pub push_notification_url: Option<String>,
    pub push_notification_auth_scheme: Option<String>,
    pub push_notification_credentials: Option<String>,
    pub dry_run: bool,
    pub test_session_id: Option<String>,
    pub mock_time: Option<String>,
    pub jump_to_event: Option<String>,
}

impl RequestHeaders {
    /// Host-header subdomain, when one is present.
    pub fn subdomain(&self) -> Option<&str> {
        let host = self.host.as_deref()?;
        if !host.contains('.') {
            return None;
        }
        host.split('.').next()
    }

    pub fn testing_context(&self) -> TestingContext {
        TestingContext {
            dry_run: self.dry_run,
            test_session_id: self.test_session_id.clone(),
            mock_time: self
                .mock_time
                .as_deref()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            jump_to_event: self
                .jump_to_event
                .as_deref()
                .and_then(|raw| raw.parse::<CampaignEvent>().ok()),
            delivery_jitter: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subdomain_extraction() {
        let headers = RequestHeaders {
            host: Some("acme.sales.example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(headers.subdomain(), Some("acme"));

        let bare = RequestHeaders {
            host: Some("localhost".to_string()),
            ..Default::default()
        };
        assert_eq!(bare.subdomain(), None);

        let none = RequestHeaders::default();
        assert_eq!(none.subdomain(), None);
    }

    #[test]
    fn test_testing_context_parsing() {
        let headers = RequestHeaders {
            dry_run: true,
            mock_time: Some("2030-06-15T12:00:00Z".to_string()),
            jump_to_event: Some("campaign_midpoint".to_string()),
            ..Default::default()
        };

        let ctx = headers.testing_context();
        assert!(ctx.dry_run);
        assert!(ctx.mock_time.is_some());
        assert_eq!(ctx.jump_to_event, Some(CampaignEvent::CampaignMidpoint));
    }
}
