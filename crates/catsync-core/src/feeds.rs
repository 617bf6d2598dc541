use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::catalog::ProductTypeId;
use crate::import::FeedFormat;
use crate::ConfigError;

/// One ERP export the scheduler pulls, bound to a product-type partition.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSourceConfig {
    pub product_type: ProductTypeId,
    pub name: String,
    pub url: String,
    /// Forces the wire format instead of sniffing it from the payload.
    #[serde(default)]
    pub format: Option<FeedFormat>,
}

#[derive(Debug, Deserialize)]
pub struct FeedsFile {
    pub feeds: Vec<FeedSourceConfig>,
}

impl FeedsFile {
    #[must_use]
    pub fn find(&self, product_type: ProductTypeId) -> Option<&FeedSourceConfig> {
        self.feeds.iter().find(|f| f.product_type == product_type)
    }
}

/// Load and validate the feed source configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_feed_sources(path: &Path) -> Result<FeedsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FeedsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_feed_sources(&content)
}

fn parse_feed_sources(content: &str) -> Result<FeedsFile, ConfigError> {
    let feeds_file: FeedsFile = serde_yaml::from_str(content)?;
    validate_feeds(&feeds_file)?;
    Ok(feeds_file)
}

fn validate_feeds(feeds_file: &FeedsFile) -> Result<(), ConfigError> {
    let mut seen_types = HashSet::new();

    for feed in &feeds_file.feeds {
        if feed.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "feed name must be non-empty".to_string(),
            ));
        }

        let url = feed.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "feed '{}' has invalid url {:?}; must be http(s)",
                feed.name, feed.url
            )));
        }

        if !seen_types.insert(feed.product_type) {
            return Err(ConfigError::Validation(format!(
                "duplicate feed for product type {} (feed '{}')",
                feed.product_type, feed.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_file() {
        let yaml = "\
feeds:
  - product_type: 1
    name: doors
    url: https://erp.example/export/doors.xml
  - product_type: 2
    name: hardware
    url: https://erp.example/export/hardware
    format: json
";
        let file = parse_feed_sources(yaml).unwrap();
        assert_eq!(file.feeds.len(), 2);
        assert_eq!(file.feeds[0].format, None);
        assert_eq!(file.feeds[1].format, Some(FeedFormat::Json));
        let hardware = file.find(ProductTypeId::new(2).unwrap()).unwrap();
        assert_eq!(hardware.name, "hardware");
        assert!(file.find(ProductTypeId::new(9).unwrap()).is_none());
    }

    #[test]
    fn rejects_duplicate_product_type() {
        let yaml = "\
feeds:
  - { product_type: 1, name: a, url: 'https://a.example/feed' }
  - { product_type: 1, name: b, url: 'https://b.example/feed' }
";
        let err = parse_feed_sources(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate feed for product type 1"));
    }

    #[test]
    fn rejects_non_http_url() {
        let yaml = "feeds:\n  - { product_type: 1, name: a, url: 'ftp://a.example/feed' }\n";
        let err = parse_feed_sources(yaml).unwrap_err();
        assert!(err.to_string().contains("invalid url"));
    }

    #[test]
    fn rejects_empty_name() {
        let yaml = "feeds:\n  - { product_type: 1, name: '  ', url: 'https://a.example' }\n";
        let err = parse_feed_sources(yaml).unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }

    #[test]
    fn rejects_non_positive_product_type() {
        let yaml = "feeds:\n  - { product_type: 0, name: a, url: 'https://a.example' }\n";
        assert!(matches!(
            parse_feed_sources(yaml),
            Err(ConfigError::FeedsFileParse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_feed_sources(Path::new("/nonexistent/feeds.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::FeedsFileIo { .. }));
    }
}
