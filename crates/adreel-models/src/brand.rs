//! Brand kit model.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::validation::{require_version, ValidationError, Violations};

/// Brand identity extracted from the product page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BrandKit {
    /// Payload schema version
    pub version: String,

    /// Product or brand name
    pub product_name: String,

    /// Short tagline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,

    /// Color palette as hex strings (`#RRGGBB` or `#RGB`)
    #[serde(default)]
    pub palette: Vec<String>,

    /// Primary font family
    pub font: String,

    /// Blob-store key of the extracted logo, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_key: Option<String>,
}

fn is_hex_color(s: &str) -> bool {
    let Some(rest) = s.strip_prefix('#') else {
        return false;
    };
    matches!(rest.len(), 3 | 6) && rest.chars().all(|c| c.is_ascii_hexdigit())
}

impl BrandKit {
    /// Validate the brand kit, reporting every offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Violations::new();
        require_version(&mut v, &self.version);
        v.check(
            !self.product_name.trim().is_empty(),
            "product_name",
            "must be non-empty",
        );
        for (i, color) in self.palette.iter().enumerate() {
            v.check(
                is_hex_color(color),
                format!("palette[{}]", i),
                format!("'{}' is not a hex color", color),
            );
        }
        v.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brand_kit_validation() {
        let kit = BrandKit {
            version: "1".to_string(),
            product_name: "Evercold Bottle".to_string(),
            tagline: Some("Cold for 48 hours.".to_string()),
            palette: vec!["#0a84ff".to_string(), "#FFF".to_string()],
            font: "Inter".to_string(),
            logo_key: None,
        };
        assert!(kit.validate().is_ok());
    }

    #[test]
    fn test_bad_palette_entry_rejected() {
        let kit = BrandKit {
            version: "1".to_string(),
            product_name: "X".to_string(),
            tagline: None,
            palette: vec!["blue".to_string()],
            font: "Inter".to_string(),
            logo_key: None,
        };
        let err = kit.validate().unwrap_err();
        assert_eq!(err.violations[0].field, "palette[0]");
    }
}
