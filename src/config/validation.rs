use crate::config::types::{
    ArchiveConfig, Config, CrawlerConfig, ImageConfig, RateConfig, RetryConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
///
/// Every section is checked; a single problem is returned as is, several come back
/// together as [`ConfigError::Multiple`].
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();
    validate_crawler_config(&config.crawler, &mut errors);
    validate_rate_config(&config.rates, &mut errors);
    validate_retry_config(&config.retry, &mut errors);
    validate_image_config(&config.images, &mut errors);
    validate_archive_config(&config.archive, &mut errors);
    validate_user_agent_config(&config.user_agent, &mut errors);

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ConfigError::Multiple(errors)),
    }
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig, errors: &mut Vec<ConfigError>) {
    if config.start_url.trim().is_empty() {
        errors.push(ConfigError::Validation(
            "start_url cannot be empty".to_string(),
        ));
    } else {
        let seed = crate::url::with_default_scheme(&config.start_url);
        match Url::parse(&seed) {
            Err(e) => errors.push(ConfigError::InvalidUrl(format!(
                "Invalid start_url '{}': {}",
                seed, e
            ))),
            Ok(url) if url.scheme() != "http" && url.scheme() != "https" => {
                errors.push(ConfigError::InvalidUrl(format!(
                    "start_url '{}' must use http or https",
                    seed
                )))
            }
            Ok(url) if url.host_str().is_none() => errors.push(ConfigError::InvalidUrl(
                format!("start_url '{}' has no host", seed),
            )),
            Ok(_) => {}
        }
    }

    if config.max_pages < 1 {
        errors.push(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.concurrency < 1 || config.concurrency > 64 {
        errors.push(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.timeout_secs < 1 {
        errors.push(ConfigError::Validation(format!(
            "timeout_secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if let Some(ts) = &config.snapshot_timestamp {
        if ts.is_empty() || ts.len() > 14 || !ts.chars().all(|c| c.is_ascii_digit()) {
            errors.push(ConfigError::Validation(format!(
                "snapshot_timestamp must be 1-14 digits (YYYYMMDDhhmmss), got '{}'",
                ts
            )));
        }
    }
}

/// Validates that every rate is a positive finite number
fn validate_rate_config(config: &RateConfig, errors: &mut Vec<ConfigError>) {
    let rates = [
        ("page_rps", config.page_rps),
        ("image_rps", config.image_rps),
        ("asset_rps", config.asset_rps),
        ("archive_page_rps", config.archive_page_rps),
        ("archive_image_rps", config.archive_image_rps),
        ("archive_asset_rps", config.archive_asset_rps),
    ];

    for (name, rps) in rates {
        if !rps.is_finite() || rps <= 0.0 {
            errors.push(ConfigError::Validation(format!(
                "{} must be a positive number, got {}",
                name, rps
            )));
        }
    }
}

/// Validates retry policy
fn validate_retry_config(config: &RetryConfig, errors: &mut Vec<ConfigError>) {
    if config.max_retries < 1 {
        errors.push(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if !config.backoff_base.is_finite() || config.backoff_base < 1.0 {
        errors.push(ConfigError::Validation(format!(
            "backoff_base must be >= 1.0, got {}",
            config.backoff_base
        )));
    }

    if config.soft_block_markers.iter().any(|m| m.is_empty()) {
        errors.push(ConfigError::Validation(
            "soft_block_markers cannot contain empty strings".to_string(),
        ));
    }
}

/// Validates image probe settings
fn validate_image_config(config: &ImageConfig, errors: &mut Vec<ConfigError>) {
    if config.probe && config.timeout_secs < 1 {
        errors.push(ConfigError::Validation(format!(
            "image timeout_secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.probe_bytes < 16 {
        errors.push(ConfigError::Validation(format!(
            "probe_bytes must be >= 16 to sniff image signatures, got {}",
            config.probe_bytes
        )));
    }
}

/// Validates archive endpoints
fn validate_archive_config(config: &ArchiveConfig, errors: &mut Vec<ConfigError>) {
    match Url::parse(&config.replay_base) {
        Err(e) => errors.push(ConfigError::InvalidUrl(format!("Invalid replay_base: {}", e))),
        Ok(replay) if !replay.path().ends_with("/web/") => {
            errors.push(ConfigError::Validation(format!(
                "replay_base must end with '/web/', got '{}'",
                config.replay_base
            )))
        }
        Ok(_) => {}
    }

    if let Err(e) = Url::parse(&config.index_url) {
        errors.push(ConfigError::InvalidUrl(format!("Invalid index_url: {}", e)));
    }

    if config.max_concurrency < 1 {
        errors.push(ConfigError::Validation(format!(
            "archive max_concurrency must be >= 1, got {}",
            config.max_concurrency
        )));
    }
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig, errors: &mut Vec<ConfigError>) {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        errors.push(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    } else if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        errors.push(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.trim().is_empty() {
        errors.push(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    if let Err(e) = Url::parse(&config.contact_url) {
        errors.push(ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)));
    }
}
