use serde::{Deserialize, Serialize};

/// A registry's description of a model. Only `id` is interpreted; every
/// other field is carried opaquely so no full schema knowledge is assumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One file descriptor from the registry's tree listing.
#[derive(Debug, Deserialize)]
pub(crate) struct TreeItem {
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// One downloadable binary file representing a specific quantization of a
/// model.
#[derive(Debug, Clone, PartialEq)]
pub struct FileVariant {
    pub filename: String,
    pub remote_path: String,
    pub size_bytes: u64,
    /// Quantization tag recognized in the filename, if any.
    pub quantization: Option<String>,
    pub download_url: String,
}

impl FileVariant {
    pub fn size_gb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// Known quantization tags, most specific first so that substring matching
/// never mistakes Q5_K_M for Q5_K_S.
pub const KNOWN_QUANT_TAGS: &[&str] = &[
    "Q8_0", "Q6_K", "Q5_K_M", "Q5_K_S", "Q4_K_M", "Q4_K_S", "Q4_0", "Q3_K_M", "Q3_K_L", "Q2_K",
];

/// First known tag appearing in `filename` (case-insensitive), or None.
pub fn quantization_tag(filename: &str) -> Option<String> {
    let upper = filename.to_uppercase();
    KNOWN_QUANT_TAGS
        .iter()
        .find(|tag| upper.contains(*tag))
        .map(|tag| tag.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_case_insensitively() {
        assert_eq!(
            quantization_tag("mistral-7b.q4_k_m.gguf"),
            Some("Q4_K_M".to_string())
        );
        assert_eq!(
            quantization_tag("model-Q8_0.gguf"),
            Some("Q8_0".to_string())
        );
    }

    #[test]
    fn first_listed_tag_wins() {
        // Q5_K_M is listed before Q5_K_S and matched first.
        assert_eq!(
            quantization_tag("weird-Q5_K_M-Q2_K.gguf"),
            Some("Q5_K_M".to_string())
        );
    }

    #[test]
    fn unrecognized_filename_has_no_tag() {
        assert_eq!(quantization_tag("model-f16.gguf"), None);
    }
}
