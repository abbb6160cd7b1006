use chrono::{DateTime, Utc};
use strum::{Display, EnumString};

/// A point within a campaign flight that delivery simulation can be
/// jumped to via the `x-jump-to-event` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CampaignEvent {
    CampaignStart,
    CampaignMidpoint,
    CampaignEnd,
}

impl CampaignEvent {
    pub fn resolve(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            CampaignEvent::CampaignStart => start,
            CampaignEvent::CampaignMidpoint => start + (end - start) / 2,
            CampaignEvent::CampaignEnd => end,
        }
    }
}

/// Per-request testing hooks. Dry runs disable external side effects
/// while preserving response shape; mock time and campaign events make
/// delivery reporting deterministic.
#[derive(Debug, Clone, Default)]
pub struct TestingContext {
    pub dry_run: bool,
    pub test_session_id: Option<String>,
    pub mock_time: Option<DateTime<Utc>>,
    pub jump_to_event: Option<CampaignEvent>,
    pub delivery_jitter: Option<f64>,
}

impl TestingContext {
    pub fn is_test_session(&self) -> bool {
        self.dry_run || self.test_session_id.is_some()
    }

    pub fn simulates_delivery(&self) -> bool {
        self.dry_run || self.test_session_id.is_some() || self.mock_time.is_some() || self.jump_to_event.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_event_resolution() {
        let start = Utc::now();
        let end = start + Duration::days(10);

        assert_eq!(CampaignEvent::CampaignStart.resolve(start, end), start);
        assert_eq!(CampaignEvent::CampaignEnd.resolve(start, end), end);
        assert_eq!(
            CampaignEvent::CampaignMidpoint.resolve(start, end),
            start + Duration::days(5)
        );
    }

    #[test]
    fn test_event_parses_from_header_value() {
        assert_eq!(
            "campaign_midpoint".parse::<CampaignEvent>().unwrap(),
            CampaignEvent::CampaignMidpoint
        );
        assert!("not_an_event".parse::<CampaignEvent>().is_err());
    }
}
