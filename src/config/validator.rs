use crate::config::Config;
use crate::error::{GalaxyError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_cache(config, &mut errors);
        Self::validate_upstream(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GalaxyError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.cache.dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "cache.dir",
                "Cache directory path cannot be empty",
            ));
        }

        if config.cache.max_age_hours == 0 {
            errors.push(ValidationError::new(
                "cache.max_age_hours",
                "Freshness window must be greater than 0",
            ));
        }
    }

    fn validate_upstream(config: &Config, errors: &mut Vec<ValidationError>) {
        let url = &config.upstream.archive_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            errors.push(ValidationError::new(
                "upstream.archive_url",
                format!("Archive URL must be http(s), got '{}'", url),
            ));
        }

        if config.upstream.archive_root.is_empty() {
            errors.push(ValidationError::new(
                "upstream.archive_root",
                "Archive root directory name cannot be empty",
            ));
        }

        if config.upstream.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "upstream.timeout_secs",
                "HTTP timeout must be greater than 0",
            ));
        }
    }
}
