use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use strum::{Display, EnumString};

/// Creative agent hosting the reference format catalog.
pub const DEFAULT_CREATIVE_AGENT_URL: &str = "https://creative.adcontextprotocol.org";

/// A format identifier on the wire is always the `{agent_url, id}`
/// pair, never a bare string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FormatRef {
    pub agent_url: String,
    pub id: String,
}

impl FormatRef {
    pub fn standard(id: impl Into<String>) -> Self {
        FormatRef {
            agent_url: DEFAULT_CREATIVE_AGENT_URL.to_string(),
            id: id.into(),
        }
    }

    /// Normalized (agent_url, id) key for comparisons.
    pub fn key(&self) -> (String, String) {
        (normalize_agent_url(&self.agent_url), self.id.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FormatType {
    Display,
    Video,
    Audio,
    Native,
}

/// A creative format definition, either from the standard registry or
/// a tenant-specific override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Format {
    pub format_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub format_type: FormatType,
    pub is_standard: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Value>,
}

/// Strips transport suffixes so that every spelling of an agent URL
/// compares equal: trailing slashes, `/mcp`, `/a2a`, `/.well-known/*`.
pub fn normalize_agent_url(url: &str) -> String {
    let mut url = url.trim().trim_end_matches('/');

    if let Some(idx) = url.find("/.well-known") {
        url = &url[..idx];
    }

    for suffix in ["/mcp", "/a2a"] {
        if let Some(stripped) = url.strip_suffix(suffix) {
            url = stripped;
        }
    }

    url.trim_end_matches('/').to_string()
}

/// Extracts `WxH` pixel dimensions embedded in a format id such as
/// `display_970x250_image`.
pub fn dimensions_from_format_id(format_id: &str) -> Option<(u32, u32)> {
    for token in format_id.split(['_', '-']) {
        if let Some((w, h)) = token.split_once('x')
            && let (Ok(width), Ok(height)) = (w.parse::<u32>(), h.parse::<u32>())
            && width > 0
            && height > 0
        {
            return Some((width, height));
        }
    }

    None
}

fn display(id: &str, name: &str) -> Format {
    Format {
        format_id: id.to_string(),
        name: name.to_string(),
        format_type: FormatType::Display,
        is_standard: true,
        requirements: None,
    }
}

fn video(id: &str, name: &str) -> Format {
    Format {
        format_id: id.to_string(),
        name: name.to_string(),
        format_type: FormatType::Video,
        is_standard: true,
        requirements: None,
    }
}

/// Standard format registry. Tenant-specific formats stored in the
/// database take precedence on id conflicts.
pub static FORMAT_REGISTRY: LazyLock<Vec<Format>> = LazyLock::new(|| {
    vec![
        display("display_300x250_image", "Medium Rectangle"),
        display("display_728x90_image", "Leaderboard"),
        display("display_970x250_image", "Billboard"),
        display("display_320x50_image", "Mobile Banner"),
        display("display_300x600_image", "Half Page"),
        video("video_1920x1080_15s", "Full HD Video 15s"),
        video("video_1920x1080_30s", "Full HD Video 30s"),
        video("video_640x480_15s", "SD Video 15s"),
        Format {
            format_id: "audio_30s".to_string(),
            name: "Audio Spot 30s".to_string(),
            format_type: FormatType::Audio,
            is_standard: true,
            requirements: None,
        },
        Format {
            format_id: "native_article".to_string(),
            name: "Native Article".to_string(),
            format_type: FormatType::Native,
            is_standard: true,
            requirements: None,
        },
    ]
});

pub fn registry_format(format_id: &str) -> Option<&'static Format> {
    FORMAT_REGISTRY.iter().find(|f| f.format_id == format_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_transport_suffixes() {
        assert_eq!(
            normalize_agent_url("https://example.com/mcp/"),
            "https://example.com"
        );
        assert_eq!(
            normalize_agent_url("https://example.com/a2a"),
            "https://example.com"
        );
        assert_eq!(
            normalize_agent_url("https://example.com/.well-known/adcp.json"),
            "https://example.com"
        );
        assert_eq!(normalize_agent_url("https://example.com///"), "https://example.com");
        assert_eq!(normalize_agent_url("https://example.com"), "https://example.com");
    }

    #[test]
    fn test_refs_compare_equal_after_normalization() {
        let a = FormatRef {
            agent_url: "https://example.com/mcp".to_string(),
            id: "display_300x250_image".to_string(),
        };
        let b = FormatRef {
            agent_url: "https://example.com/".to_string(),
            id: "display_300x250_image".to_string(),
        };
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_dimensions_from_format_id() {
        assert_eq!(dimensions_from_format_id("display_970x250_image"), Some((970, 250)));
        assert_eq!(dimensions_from_format_id("video_1920x1080_30s"), Some((1920, 1080)));
        assert_eq!(dimensions_from_format_id("audio_30s"), None);
        assert_eq!(dimensions_from_format_id("native_article"), None);
        assert_eq!(dimensions_from_format_id("display_0x250"), None);
    }

    #[test]
    fn test_registry_has_standard_formats() {
        assert!(registry_format("display_300x250_image").is_some());
        assert!(registry_format("display_970x250_image").is_some());
        assert!(registry_format("no_such_format").is_none());
        assert!(FORMAT_REGISTRY.iter().all(|f| f.is_standard));
    }
}
