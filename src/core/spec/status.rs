use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::error;

/// Protocol envelope status attached to every tool response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum TaskStatus {
    #[serde(rename = "completed")]
    #[strum(serialize = "completed")]
    Completed,
    #[serde(rename = "working")]
    #[strum(serialize = "working")]
    Working,
    #[serde(rename = "input-required")]
    #[strum(serialize = "input-required")]
    InputRequired,
    #[serde(rename = "failed")]
    #[strum(serialize = "failed")]
    Failed,
}

/// Lifecycle status of a media buy. Distinct from [`TaskStatus`],
/// which tracks the workflow around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MediaBuyStatus {
    PendingApproval,
    Ready,
    Active,
    NeedsCreatives,
    Completed,
    Failed,
}

/// Delivery status of a single package within the ad server.
/// Must never be conflated with the workflow [`TaskStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PackageStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

/// Accepts only valid package statuses, mapping anything else to None.
/// A workflow status leaking in here indicates a bug upstream and is
/// logged loudly before being discarded.
pub fn sanitize_package_status(raw: Option<&str>) -> Option<PackageStatus> {
    let raw = raw?;

    match raw.parse::<PackageStatus>() {
        Ok(status) => Some(status),
        Err(_) => {
            error!(
                "Package status '{}' is not a valid package status; it looks like \
                 a workflow state and belongs on the workflow step. Dropping it.",
                raw
            );
            None
        }
    }
}

/// Single source of truth for a media buy's status. Adapters must not
/// invent statuses of their own.
///
/// Priority: pending approval, then missing/unapproved creatives, then
/// the flight window relative to `now`.
pub fn determine_media_buy_status(
    manual_approval_required: bool,
    has_creatives: bool,
    creatives_approved: bool,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> MediaBuyStatus {
    if manual_approval_required {
        return MediaBuyStatus::PendingApproval;
    }

    if !has_creatives || !creatives_approved {
        return MediaBuyStatus::NeedsCreatives;
    }

    if now < start_time {
        MediaBuyStatus::Ready
    } else if now > end_time {
        MediaBuyStatus::Completed
    } else {
        MediaBuyStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn window(now: DateTime<Utc>, start_offset: i64, end_offset: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        (now + Duration::days(start_offset), now + Duration::days(end_offset))
    }

    #[test]
    fn test_pending_approval_wins_over_everything() {
        let now = Utc::now();
        let (start, end) = window(now, -5, 5);
        let status = determine_media_buy_status(true, true, true, start, end, now);
        assert_eq!(status, MediaBuyStatus::PendingApproval);
    }

    #[test]
    fn test_needs_creatives_before_flight_window() {
        let now = Utc::now();
        let (start, end) = window(now, -5, 5);
        assert_eq!(
            determine_media_buy_status(false, false, true, start, end, now),
            MediaBuyStatus::NeedsCreatives
        );
        assert_eq!(
            determine_media_buy_status(false, true, false, start, end, now),
            MediaBuyStatus::NeedsCreatives
        );
    }

    #[test]
    fn test_flight_window_states() {
        let now = Utc::now();

        let (start, end) = window(now, 1, 31);
        assert_eq!(
            determine_media_buy_status(false, true, true, start, end, now),
            MediaBuyStatus::Ready
        );

        let (start, end) = window(now, -5, 5);
        assert_eq!(
            determine_media_buy_status(false, true, true, start, end, now),
            MediaBuyStatus::Active
        );

        let (start, end) = window(now, -31, -1);
        assert_eq!(
            determine_media_buy_status(false, true, true, start, end, now),
            MediaBuyStatus::Completed
        );
    }

    #[test]
    fn test_same_inputs_same_status() {
        let now = Utc::now();
        let (start, end) = window(now, 1, 10);
        let a = determine_media_buy_status(false, true, true, start, end, now);
        let b = determine_media_buy_status(false, true, true, start, end, now);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sanitize_rejects_workflow_statuses() {
        assert_eq!(sanitize_package_status(Some("draft")), Some(PackageStatus::Draft));
        assert_eq!(sanitize_package_status(Some("active")), Some(PackageStatus::Active));
        assert_eq!(sanitize_package_status(Some("input-required")), None);
        assert_eq!(sanitize_package_status(Some("requires_approval")), None);
        assert_eq!(sanitize_package_status(None), None);
    }
}
