use crate::config::types::{Config, CrawlerConfig, OutputConfig, SearchConfig, SessionConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_search_config(&config.search)?;
    validate_crawler_config(&config.crawler)?;
    validate_session_config(&config.session)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates keywords, dates and threshold
fn validate_search_config(config: &SearchConfig) -> Result<(), ConfigError> {
    if config.keywords.is_empty() {
        return Err(ConfigError::Validation(
            "at least one keyword is required (keywords or keywords-file)".to_string(),
        ));
    }

    if config.keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "keywords cannot be blank".to_string(),
        ));
    }

    if config.start_date > config.end_date {
        return Err(ConfigError::Validation(format!(
            "start-date {} must not be after end-date {}",
            config.start_date, config.end_date
        )));
    }

    if config.further_threshold < 1 {
        return Err(ConfigError::Validation(
            "further-threshold must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_http_url("base-url", &config.base_url)?;
    validate_http_url("ip-lookup-url", &config.ip_lookup_url)?;

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.request_delay < 1000 {
        tracing::warn!(
            "request-delay of {}ms is very short; the backend may throttle the session",
            config.request_delay
        );
    }

    Ok(())
}

/// Validates session headers
fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "session user-agent cannot be empty".to_string(),
        ));
    }

    if config.cookie.trim().is_empty() {
        return Err(ConfigError::Validation(
            "session cookie cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.csv_dir.trim().is_empty() {
        return Err(ConfigError::Validation("csv-dir cannot be empty".to_string()));
    }

    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn search() -> SearchConfig {
        SearchConfig {
            keywords: vec!["春节".to_string()],
            keywords_file: None,
            post_type: Default::default(),
            media_filter: Default::default(),
            regions: vec!["all".to_string()],
            start_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            further_threshold: 46,
        }
    }

    #[test]
    fn test_single_day_range_is_valid() {
        assert!(validate_search_config(&search()).is_ok());
    }

    #[test]
    fn test_search_config_rejections() {
        let mut no_keywords = search();
        no_keywords.keywords.clear();
        assert!(validate_search_config(&no_keywords).is_err());

        let mut blank = search();
        blank.keywords.push("  ".to_string());
        assert!(validate_search_config(&blank).is_err());

        let mut zero = search();
        zero.further_threshold = 0;
        assert!(validate_search_config(&zero).is_err());
    }

    #[test]
    fn test_validate_http_url() {
        assert!(validate_http_url("base-url", "https://s.weibo.com").is_ok());
        assert!(validate_http_url("base-url", "http://127.0.0.1:8080").is_ok());

        assert!(validate_http_url("base-url", "").is_err());
        assert!(validate_http_url("base-url", "ftp://s.weibo.com").is_err());
        assert!(validate_http_url("base-url", "not a url").is_err());
    }

    #[test]
    fn test_session_requires_cookie() {
        let session = SessionConfig {
            user_agent: "Mozilla/5.0".to_string(),
            accept_language: "zh-CN".to_string(),
            cookie: String::new(),
        };
        assert!(matches!(
            validate_session_config(&session),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_crawler_requires_an_attempt() {
        let config = CrawlerConfig {
            max_attempts: 0,
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&config).is_err());
        assert!(validate_crawler_config(&CrawlerConfig::default()).is_ok());
    }
}
