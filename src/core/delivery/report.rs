use crate::core::models::media_buy::{MediaBuy, MediaPackage};
use crate::core::spec::requests::GetMediaBuyDeliveryRequest;
use crate::core::spec::responses::{
    AggregatedTotals, DeliveryTotals, GetMediaBuyDeliveryResponse, MediaBuyDeliveryData,
    PackageDelivery, ReportingPeriod,
};
use crate::core::spec::status::MediaBuyStatus;
use crate::core::spec::testing::TestingContext;
use crate::core::store::Store;
use anyhow::Error;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Process-wide cache of media buys for delivery reads. Written from
/// the creation path, never authoritative: misses fall back to the
/// store and repopulate the map.
#[derive(Default)]
pub struct DeliveryCache {
    buys: DashMap<String, MediaBuy>,
}

impl DeliveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, buy: MediaBuy) {
        self.buys.insert(buy.media_buy_id.clone(), buy);
    }

    pub async fn get(
        &self,
        store: &Arc<dyn Store>,
        tenant_id: &str,
        media_buy_id: &str,
    ) -> Result<Option<MediaBuy>, Error> {
        if let Some(buy) = self.buys.get(media_buy_id)
            && buy.tenant_id == tenant_id
        {
            return Ok(Some(buy.clone()));
        }

        let buy = store.get_media_buy(tenant_id, media_buy_id).await?;
        if let Some(buy) = &buy {
            self.buys.insert(buy.media_buy_id.clone(), buy.clone());
        }

        Ok(buy)
    }
}

/// Aggregates per-buy delivery over a reporting window. Real metrics
/// come from the ad server in production deployments; here delivery is
/// synthesized deterministically from budget and elapsed flight
/// fraction, which is also the contract for testing hooks.
pub struct DeliveryReporter {
    store: Arc<dyn Store>,
    cache: Arc<DeliveryCache>,
}

impl DeliveryReporter {
    pub fn new(store: Arc<dyn Store>, cache: Arc<DeliveryCache>) -> Self {
        DeliveryReporter { store, cache }
    }

    pub async fn report(
        &self,
        tenant_id: &str,
        principal_id: &str,
        req: &GetMediaBuyDeliveryRequest,
        testing: &TestingContext,
    ) -> Result<GetMediaBuyDeliveryResponse, Error> {
        let now = Utc::now();
        let (start, end) = reporting_window(req, now);

        let mut targets: Vec<MediaBuy> = Vec::new();

        if let Some(ids) = &req.media_buy_ids {
            for media_buy_id in ids {
                match self.cache.get(&self.store, tenant_id, media_buy_id).await? {
                    Some(buy) if buy.principal_id == principal_id => targets.push(buy),
                    Some(_) => warn!("Skipping {}: not owned by principal", media_buy_id),
                    None => warn!("Media buy {} not found", media_buy_id),
                }
            }
        } else {
            let all = self.store.list_media_buys(tenant_id, principal_id).await?;

            if let Some(buyer_refs) = &req.buyer_refs {
                targets = all
                    .into_iter()
                    .filter(|b| buyer_refs.contains(&b.buyer_ref))
                    .collect();
            } else {
                let statuses = req
                    .status_filter
                    .as_ref()
                    .map(|f| f.values())
                    .unwrap_or_else(|| vec!["active".to_string()]);

                targets = all
                    .into_iter()
                    .filter(|b| statuses.contains(&flight_status(b, end).to_string()))
                    .collect();
            }
        }

        let mut currency = "USD".to_string();
        let mut deliveries = Vec::new();
        let mut total_spend = 0.0;
        let mut total_impressions: u64 = 0;

        for buy in &targets {
            currency = buy.currency.clone();

            let reference = simulation_time(buy, end, testing);
            let status = flight_status(buy, reference);
            let (spend, impressions) = self.synthesize(buy, reference, status, testing).await?;

            let packages = self.store.list_media_packages(&buy.media_buy_id).await?;
            let by_package = split_by_package(buy, &packages, spend, impressions, status);

            debug!(
                "Delivery for {}: status={} spend={:.2} impressions={}",
                buy.media_buy_id, status, spend, impressions
            );

            deliveries.push(MediaBuyDeliveryData {
                media_buy_id: buy.media_buy_id.clone(),
                buyer_ref: Some(buy.buyer_ref.clone()),
                status: status.to_string(),
                totals: DeliveryTotals {
                    impressions,
                    spend,
                },
                by_package,
            });

            total_spend += spend;
            total_impressions += impressions;
        }

        Ok(GetMediaBuyDeliveryResponse {
            reporting_period: ReportingPeriod { start, end },
            currency,
            aggregated_totals: AggregatedTotals {
                impressions: total_impressions,
                spend: total_spend,
                media_buy_count: deliveries.len(),
            },
            deliveries,
            errors: None,
        })
    }

    async fn synthesize(
        &self,
        buy: &MediaBuy,
        reference: DateTime<Utc>,
        status: FlightStatus,
        testing: &TestingContext,
    ) -> Result<(f64, u64), Error> {
        let progress = match status {
            FlightStatus::Pending => 0.0,
            FlightStatus::Completed => 1.0,
            FlightStatus::Active => {
                let total = (buy.end_time - buy.start_time).num_seconds().max(1) as f64;
                let elapsed = (reference - buy.start_time).num_seconds().max(0) as f64;
                (elapsed / total).clamp(0.0, 1.0)
            }
        };

        let mut spend = buy.budget * progress;

        if let Some(jitter) = testing.delivery_jitter
            && jitter > 0.0
            && spend > 0.0
        {
            let factor = 1.0 + (fastrand::f64() * 2.0 - 1.0) * jitter;
            spend *= factor.max(0.0);
        }

        // Impression estimate from the first package's effective rate,
        // falling back to a nominal $1 CPM.
        let packages = self.store.list_media_packages(&buy.media_buy_id).await?;
        let rate = packages
            .iter()
            .filter_map(|p| p.pricing_info())
            .map(|p| p.effective_rate())
            .find(|r| *r > 0.0)
            .unwrap_or(1.0);

        let impressions = (spend / rate * 1000.0).max(0.0) as u64;

        Ok((spend, impressions))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
enum FlightStatus {
    Pending,
    Active,
    Completed,
}

fn flight_status(buy: &MediaBuy, reference: DateTime<Utc>) -> FlightStatus {
    if buy.status == MediaBuyStatus::PendingApproval || reference < buy.start_time {
        FlightStatus::Pending
    } else if reference > buy.end_time {
        FlightStatus::Completed
    } else {
        FlightStatus::Active
    }
}

fn simulation_time(buy: &MediaBuy, window_end: DateTime<Utc>, testing: &TestingContext) -> DateTime<Utc> {
    if let Some(mock_time) = testing.mock_time {
        return mock_time;
    }

    if let Some(event) = testing.jump_to_event {
        return event.resolve(buy.start_time, buy.end_time);
    }

    window_end
}

fn reporting_window(
    req: &GetMediaBuyDeliveryRequest,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let parse = |raw: &str| {
        raw.parse::<NaiveDate>()
            .ok()
            .and_then(|d| d.and_time(NaiveTime::MIN).and_local_timezone(Utc).single())
    };

    match (
        req.start_date.as_deref().and_then(parse),
        req.end_date.as_deref().and_then(parse),
    ) {
        (Some(start), Some(end)) => (start, end),
        _ => (now - Duration::days(30), now),
    }
}

fn split_by_package(
    buy: &MediaBuy,
    packages: &[MediaPackage],
    spend: f64,
    impressions: u64,
    status: FlightStatus,
) -> Vec<PackageDelivery> {
    if packages.is_empty() {
        return Vec::new();
    }

    let budget_total: f64 = packages.iter().filter_map(|p| p.budget).sum();
    let pacing = if status == FlightStatus::Active { 1.0 } else { 0.0 };

    packages
        .iter()
        .map(|package| {
            let share = match (package.budget, budget_total > 0.0) {
                (Some(budget), true) => budget / budget_total,
                _ => 1.0 / packages.len() as f64,
            };

            PackageDelivery {
                package_id: package.package_id.clone(),
                buyer_ref: Some(buy.buyer_ref.clone()),
                impressions: (impressions as f64 * share) as u64,
                spend: spend * share,
                pacing_index: pacing,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spec::status::MediaBuyStatus;
    use crate::core::spec::testing::CampaignEvent;
    use serde_json::json;

    fn buy(id: &str, budget: f64, start_offset: i64, end_offset: i64) -> MediaBuy {
        let now = Utc::now();
        MediaBuy {
            media_buy_id: id.to_string(),
            tenant_id: "acme".to_string(),
            principal_id: "buyer".to_string(),
            buyer_ref: "bref-1".to_string(),
            po_number: None,
            order_name: "order".to_string(),
            advertiser_name: "Buyer".to_string(),
            budget,
            currency: "USD".to_string(),
            start_time: now + Duration::days(start_offset),
            end_time: now + Duration::days(end_offset),
            status: MediaBuyStatus::Active,
            raw_request: json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded() -> (DeliveryReporter, Arc<crate::core::store::LocalStore>) {
        let store = Arc::new(crate::core::store::LocalStore::new());
        let cache = Arc::new(DeliveryCache::new());
        let reporter: DeliveryReporter = DeliveryReporter::new(store.clone(), cache);
        (reporter, store)
    }

    #[tokio::test]
    async fn test_midpoint_event_delivers_half_budget() {
        let (reporter, store) = seeded().await;
        store.insert_media_buy(buy("mb_1", 10_000.0, -10, 10)).await.unwrap();

        let testing = TestingContext {
            jump_to_event: Some(CampaignEvent::CampaignMidpoint),
            ..Default::default()
        };
        let req = GetMediaBuyDeliveryRequest {
            media_buy_ids: Some(vec!["mb_1".to_string()]),
            ..Default::default()
        };

        let response = reporter.report("acme", "buyer", &req, &testing).await.unwrap();
        assert_eq!(response.deliveries.len(), 1);

        let delivery = &response.deliveries[0];
        assert_eq!(delivery.status, "active");
        assert!((delivery.totals.spend - 5000.0).abs() < 1.0, "spend {}", delivery.totals.spend);
        // Nominal $1 CPM without pricing info on the packages.
        assert_eq!(delivery.totals.impressions, (delivery.totals.spend * 1000.0) as u64);
    }

    #[tokio::test]
    async fn test_cross_principal_buys_are_skipped() {
        let (reporter, store) = seeded().await;
        let mut other = buy("mb_other", 5000.0, -5, 5);
        other.principal_id = "someone_else".to_string();
        store.insert_media_buy(other).await.unwrap();

        let req = GetMediaBuyDeliveryRequest {
            media_buy_ids: Some(vec!["mb_other".to_string()]),
            ..Default::default()
        };
        let response = reporter
            .report("acme", "buyer", &req, &TestingContext::default())
            .await
            .unwrap();

        assert!(response.deliveries.is_empty());
        assert_eq!(response.aggregated_totals.media_buy_count, 0);
    }

    #[tokio::test]
    async fn test_status_filter_default_active() {
        let (reporter, store) = seeded().await;
        store.insert_media_buy(buy("mb_active", 1000.0, -5, 5)).await.unwrap();
        store.insert_media_buy(buy("mb_future", 1000.0, 5, 15)).await.unwrap();
        store.insert_media_buy(buy("mb_done", 1000.0, -30, -10)).await.unwrap();

        let response = reporter
            .report(
                "acme",
                "buyer",
                &GetMediaBuyDeliveryRequest::default(),
                &TestingContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(response.deliveries.len(), 1);
        assert_eq!(response.deliveries[0].media_buy_id, "mb_active");
    }

    #[tokio::test]
    async fn test_completed_buy_reports_full_budget() {
        let (reporter, store) = seeded().await;
        store.insert_media_buy(buy("mb_done", 2000.0, -30, -10)).await.unwrap();

        let req = GetMediaBuyDeliveryRequest {
            media_buy_ids: Some(vec!["mb_done".to_string()]),
            ..Default::default()
        };
        let response = reporter
            .report("acme", "buyer", &req, &TestingContext::default())
            .await
            .unwrap();

        let delivery = &response.deliveries[0];
        assert_eq!(delivery.status, "completed");
        assert!((delivery.totals.spend - 2000.0).abs() < f64::EPSILON);
    }
}
