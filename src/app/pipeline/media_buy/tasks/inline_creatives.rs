use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::core::adapters::AdapterAsset;
use crate::core::models::creative::{Creative, CreativeAssignment};
use crate::core::models::media_buy::new_assignment_id;
use crate::core::pipeline::AsyncTask;
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::spec::formats::dimensions_from_format_id;
use crate::core::store::Store;
use anyhow::Error;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the adapter upload shape for a library creative, deriving
/// missing dimensions from the format id (`display_970x250_image`
/// carries its size). Returns None when the creative cannot be
/// uploaded at all.
pub(crate) fn asset_from_creative(creative: &Creative, package_ids: Vec<String>) -> Option<AdapterAsset> {
    let (mut width, mut height) = (creative.data.width, creative.data.height);

    if (width.is_none() || height.is_none())
        && let Some(format) = &creative.format
        && let Some((w, h)) = dimensions_from_format_id(&format.id)
    {
        width = width.or(Some(w));
        height = height.or(Some(h));
    }

    if creative.data.snippet.is_none() {
        if creative.data.url.is_none() {
            warn!("Skipping creative {}: missing content URL", creative.creative_id);
            return None;
        }
        if width.is_none() || height.is_none() {
            warn!(
                "Skipping creative {}: missing dimensions and none derivable from format",
                creative.creative_id
            );
            return None;
        }
    }

    Some(AdapterAsset {
        creative_id: creative.creative_id.clone(),
        name: creative.name.clone(),
        package_assignments: package_ids,
        width,
        height,
        url: creative.data.url.clone(),
        snippet: creative.data.snippet.clone(),
        asset_type: if creative.data.snippet.is_some() {
            "snippet".to_string()
        } else {
            "image".to_string()
        },
    })
}

/// Handles creatives referenced inline by the request packages:
/// assignments are recorded, creatives already known to the ad server
/// are queued for association, the rest are uploaded now and their
/// platform ids persisted.
pub struct InlineCreativesTask {
    store: Arc<dyn Store>,
}

impl InlineCreativesTask {
    pub fn new(store: Arc<dyn Store>) -> Self {
        InlineCreativesTask { store }
    }
}

#[async_trait]
impl AsyncTask<CreateMediaBuyContext, Error> for InlineCreativesTask {
    async fn run(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        let result = context.adapter_result.get().expect("adapter ran before creative handling");
        let adapter = context.adapter.get().expect("adapter built before creative handling");
        let media_buy_id = result.media_buy_id.clone();

        let packages: Vec<(String, Option<String>, Vec<String>)> = {
            let specs = context.package_specs.lock();
            specs
                .iter()
                .enumerate()
                .filter(|(_, spec)| !spec.creative_ids.is_empty())
                .map(|(i, spec)| {
                    let line_item = result
                        .packages
                        .get(i)
                        .and_then(|p| p.platform_line_item_id.clone());
                    (spec.package_id.clone(), line_item, spec.creative_ids.clone())
                })
                .collect()
        };

        if packages.is_empty() {
            return Ok(());
        }

        // Validate every referenced creative exists before touching
        // the adapter.
        let mut creatives: HashMap<String, Creative> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        for (_, _, creative_ids) in &packages {
            for creative_id in creative_ids {
                if creatives.contains_key(creative_id) {
                    continue;
                }
                match self
                    .store
                    .get_creative(&context.tenant.tenant_id, &context.principal_id, creative_id)
                    .await?
                {
                    Some(creative) => {
                        creatives.insert(creative_id.clone(), creative);
                    }
                    None => missing.push(creative_id.clone()),
                }
            }
        }

        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            return Err(context.fail(AdcpError::new(
                ErrorCode::CreativesNotFound,
                format!("Creative IDs not found: {}", missing.join(", ")),
            )));
        }

        for (package_id, line_item_id, creative_ids) in packages {
            let mut platform_ids: Vec<String> = Vec::new();

            for creative_id in &creative_ids {
                let creative = creatives.get_mut(creative_id).expect("validated above");

                if let Some(platform_id) = creative.data.platform_creative_id.clone() {
                    platform_ids.push(platform_id);
                } else if let Some(asset) = asset_from_creative(creative, vec![package_id.clone()]) {
                    match adapter.add_creative_assets(&media_buy_id, &[asset], context.now).await {
                        Ok(statuses) => {
                            if let Some(status) = statuses.first()
                                && let Some(platform_id) = &status.platform_creative_id
                            {
                                creative.data.platform_creative_id = Some(platform_id.clone());
                                creative.updated_at = context.now;
                                self.store.upsert_creative(creative.clone()).await?;
                                platform_ids.push(platform_id.clone());
                                info!(
                                    "Uploaded creative {} as platform creative {}",
                                    creative_id, platform_id
                                );
                            }
                        }
                        Err(e) => {
                            // The assignment still lands; association
                            // can happen once the upload succeeds via
                            // sync_creatives.
                            warn!("Failed to upload creative {}: {}", creative_id, e);
                        }
                    }
                }

                self.store
                    .insert_assignment(CreativeAssignment {
                        assignment_id: new_assignment_id(),
                        tenant_id: context.tenant.tenant_id.clone(),
                        media_buy_id: media_buy_id.clone(),
                        package_id: package_id.clone(),
                        creative_id: creative_id.clone(),
                        weight: 100,
                        created_at: context.now,
                    })
                    .await?;
            }

            match (line_item_id, platform_ids.is_empty()) {
                (Some(line_item), false) => {
                    context.associations.lock().push((line_item, platform_ids));
                }
                (None, false) => {
                    warn!(
                        "Package {} has platform creatives but no line item id from the adapter; \
                         association deferred",
                        package_id
                    );
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::creative::{CreativeData, CreativeStatus};
    use crate::core::spec::formats::FormatRef;
    use chrono::Utc;

    fn creative(url: Option<&str>, width: Option<u32>, format: &str) -> Creative {
        Creative {
            tenant_id: "acme".to_string(),
            principal_id: "buyer".to_string(),
            creative_id: "cr_1".to_string(),
            name: "Banner".to_string(),
            format: Some(FormatRef::standard(format)),
            status: CreativeStatus::Approved,
            data: CreativeData {
                url: url.map(|u| u.to_string()),
                width,
                height: width.map(|_| 250),
                ..Default::default()
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_dimensions_derived_from_format_id() {
        let creative = creative(Some("https://cdn.example/b.png"), None, "display_970x250_image");
        let asset = asset_from_creative(&creative, vec!["pkg_1".to_string()]).unwrap();

        assert_eq!(asset.width, Some(970));
        assert_eq!(asset.height, Some(250));
        assert_eq!(asset.asset_type, "image");
    }

    #[test]
    fn test_asset_without_url_is_skipped() {
        let creative = creative(None, Some(300), "display_300x250_image");
        assert!(asset_from_creative(&creative, vec![]).is_none());
    }

    #[test]
    fn test_asset_without_dimensions_is_skipped() {
        let creative = creative(Some("https://cdn.example/b.png"), None, "native_article");
        assert!(asset_from_creative(&creative, vec![]).is_none());
    }
}
