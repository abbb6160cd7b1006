use crate::core::models::creative::{Creative, CreativeData, CreativeStatus};
use crate::core::spec::requests::CreativeInput;
use crate::core::spec::responses::CreativeView;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Structural validation, run before anything touches the store. A
/// creative is either a hosted asset or a third-party snippet, never
/// both, and always names a format.
pub fn validate_creative_input(input: &CreativeInput) -> Result<(), String> {
    if input.name.as_deref().map(str::trim).unwrap_or("").is_empty() {
        return Err("Creative name cannot be empty".to_string());
    }

    if input.format_id.is_none() {
        return Err("Creative format is required".to_string());
    }

    match (&input.snippet, &input.url) {
        (Some(_), Some(_)) => {
            Err("Creative cannot carry both a snippet and a hosted asset url".to_string())
        }
        (None, None) => Err("Creative requires either a snippet or a hosted asset url".to_string()),
        _ => Ok(()),
    }
}

fn data_from_input(input: &CreativeInput) -> CreativeData {
    CreativeData {
        url: input.url.clone(),
        click_url: input.click_url.clone(),
        width: input.width,
        height: input.height,
        duration: input.duration,
        snippet: input.snippet.clone(),
        snippet_type: input.snippet_type.clone(),
        template_variables: input.template_variables.clone(),
        platform_creative_id: None,
        ai_review: None,
    }
}

/// Builds a fresh creative row. The id is generated when the buyer
/// supplied none.
pub fn creative_from_input(
    tenant_id: &str,
    principal_id: &str,
    input: &CreativeInput,
    now: DateTime<Utc>,
) -> Creative {
    Creative {
        tenant_id: tenant_id.to_string(),
        principal_id: principal_id.to_string(),
        creative_id: input
            .creative_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: input.name.clone().unwrap_or_default(),
        format: input.format_id.clone(),
        status: CreativeStatus::Pending,
        data: data_from_input(input),
        created_at: now,
        updated_at: now,
    }
}

macro_rules! patch_field {
    ($changes:ident, $target:expr, $source:expr, $name:literal) => {
        if let Some(value) = $source.clone()
            && $target.as_ref() != Some(&value)
        {
            $target = Some(value);
            $changes.push($name.to_string());
        }
    };
}

/// Applies an upsert to an existing creative. Patch mode merges only
/// supplied fields; full mode replaces the payload outright. Returns
/// the list of changed field names, which drives the per-creative
/// `updated` vs `unchanged` result.
pub fn apply_creative_update(
    existing: &mut Creative,
    input: &CreativeInput,
    patch: bool,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut changes: Vec<String> = Vec::new();

    if patch {
        if let Some(name) = &input.name
            && *name != existing.name
        {
            existing.name = name.clone();
            changes.push("name".to_string());
        }

        if let Some(format) = &input.format_id
            && existing.format.as_ref() != Some(format)
        {
            existing.format = Some(format.clone());
            changes.push("format".to_string());
        }

        let data = &mut existing.data;
        patch_field!(changes, data.url, input.url, "url");
        patch_field!(changes, data.click_url, input.click_url, "click_url");
        patch_field!(changes, data.width, input.width, "width");
        patch_field!(changes, data.height, input.height, "height");
        patch_field!(changes, data.duration, input.duration, "duration");
        patch_field!(changes, data.snippet, input.snippet, "snippet");
        patch_field!(changes, data.snippet_type, input.snippet_type, "snippet_type");
        patch_field!(
            changes,
            data.template_variables,
            input.template_variables,
            "template_variables"
        );
    } else {
        if input.name.as_deref() != Some(existing.name.as_str()) {
            existing.name = input.name.clone().unwrap_or_default();
            changes.push("name".to_string());
        }

        if existing.format.as_ref() != input.format_id.as_ref() {
            existing.format = input.format_id.clone();
            changes.push("format".to_string());
        }

        let mut replacement = data_from_input(input);
        // The platform id survives a payload replacement; the ad
        // server still knows this creative.
        replacement.platform_creative_id = existing.data.platform_creative_id.clone();

        let before = serde_json::to_value(&existing.data).unwrap_or_default();
        let after = serde_json::to_value(&replacement).unwrap_or_default();
        if before != after {
            for field in ["url", "click_url", "width", "height", "duration"] {
                if before.get(field) != after.get(field) {
                    changes.push(field.to_string());
                }
            }
            if before.get("snippet") != after.get("snippet") {
                changes.push("snippet".to_string());
            }
            existing.data = replacement;
        }
    }

    if !changes.is_empty() {
        existing.updated_at = now;
    }

    changes
}

/// Wire view of a library creative.
pub fn creative_view(creative: &Creative) -> CreativeView {
    CreativeView {
        creative_id: creative.creative_id.clone(),
        name: creative.name.clone(),
        format_id: creative.format.clone(),
        status: creative.status,
        url: creative.data.url.clone(),
        click_url: creative.data.click_url.clone(),
        width: creative.data.width,
        height: creative.data.height,
        duration: creative.data.duration,
        snippet: creative.data.snippet.clone(),
        snippet_type: creative.data.snippet_type.clone(),
        platform_creative_id: creative.data.platform_creative_id.clone(),
        created_at: creative.created_at,
        updated_at: creative.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spec::formats::FormatRef;

    fn input(name: &str, url: Option<&str>, snippet: Option<&str>) -> CreativeInput {
        CreativeInput {
            creative_id: Some("cr_1".to_string()),
            name: Some(name.to_string()),
            format_id: Some(FormatRef::standard("display_300x250_image")),
            url: url.map(|u| u.to_string()),
            snippet: snippet.map(|s| s.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validation_rules() {
        assert!(validate_creative_input(&input("Banner", Some("https://cdn.example/b.png"), None)).is_ok());
        assert!(validate_creative_input(&input("Tag", None, Some("<script></script>"))).is_ok());

        assert!(validate_creative_input(&input("", Some("https://cdn.example/b.png"), None)).is_err());
        assert!(validate_creative_input(&input("Both", Some("u"), Some("s"))).is_err());
        assert!(validate_creative_input(&input("Neither", None, None)).is_err());

        let mut missing_format = input("Banner", Some("https://cdn.example/b.png"), None);
        missing_format.format_id = None;
        assert!(validate_creative_input(&missing_format).is_err());
    }

    #[test]
    fn test_identical_upsert_reports_no_changes() {
        let now = Utc::now();
        let source = input("Banner", Some("https://cdn.example/b.png"), None);
        let mut creative = creative_from_input("acme", "buyer", &source, now);

        let changes = apply_creative_update(&mut creative, &source, false, now);
        assert!(changes.is_empty(), "unexpected changes: {:?}", changes);
    }

    #[test]
    fn test_patch_merges_only_supplied_fields() {
        let now = Utc::now();
        let source = input("Banner", Some("https://cdn.example/b.png"), None);
        let mut creative = creative_from_input("acme", "buyer", &source, now);
        creative.data.click_url = Some("https://example.com/land".to_string());

        let patch = CreativeInput {
            creative_id: Some("cr_1".to_string()),
            width: Some(300),
            ..Default::default()
        };

        let changes = apply_creative_update(&mut creative, &patch, true, now);
        assert_eq!(changes, vec!["width"]);
        // Untouched fields survive.
        assert_eq!(creative.name, "Banner");
        assert_eq!(creative.data.click_url.as_deref(), Some("https://example.com/land"));
    }

    #[test]
    fn test_full_upsert_preserves_platform_id() {
        let now = Utc::now();
        let source = input("Banner", Some("https://cdn.example/b.png"), None);
        let mut creative = creative_from_input("acme", "buyer", &source, now);
        creative.data.platform_creative_id = Some("gam_123".to_string());

        let replacement = input("Banner v2", Some("https://cdn.example/b2.png"), None);
        let changes = apply_creative_update(&mut creative, &replacement, false, now);

        assert!(changes.contains(&"name".to_string()));
        assert!(changes.contains(&"url".to_string()));
        assert_eq!(creative.data.platform_creative_id.as_deref(), Some("gam_123"));
    }
}
