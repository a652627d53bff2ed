//! Query scopes and search URL construction
//!
//! A scope is one search: a keyword, a time window and optionally a province
//! and city. Scopes are immutable; narrowing a scope produces new children.

mod window;

pub use window::{TimeGranularity, TimeWindow};

use crate::config::{Config, MediaFilter, PostType};
use crate::region::WHOLE_PROVINCE;
use std::fmt;
use url::Url;

/// One search query over a keyword, time window and optional region
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryScope {
    keyword: String,
    window: TimeWindow,
    region: Option<u32>,
    sub_region: Option<u32>,
}

impl QueryScope {
    /// Root scope for a keyword, optionally restricted to one province
    pub fn root(keyword: impl Into<String>, window: TimeWindow, region: Option<u32>) -> Self {
        Self {
            keyword: keyword.into(),
            window,
            region,
            sub_region: None,
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    pub fn region(&self) -> Option<u32> {
        self.region
    }

    pub fn sub_region(&self) -> Option<u32> {
        self.sub_region
    }

    /// Same keyword and region over a narrower window
    pub fn with_window(&self, window: TimeWindow) -> Self {
        Self {
            window,
            ..self.clone()
        }
    }

    /// Same keyword and window restricted to a province
    pub fn with_region(&self, province: u32) -> Self {
        Self {
            region: Some(province),
            sub_region: None,
            ..self.clone()
        }
    }

    /// Same keyword, window and province restricted to a city
    pub fn with_sub_region(&self, city: u32) -> Self {
        Self {
            sub_region: Some(city),
            ..self.clone()
        }
    }
}

impl fmt::Display for QueryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "keyword={} window={}", self.keyword, self.window)?;
        if let Some(region) = self.region {
            write!(f, " region={}", region)?;
        }
        if let Some(city) = self.sub_region {
            write!(f, " city={}", city)?;
        }
        Ok(())
    }
}

/// Search-wide URL parameters shared by every scope
#[derive(Debug, Clone)]
pub struct SearchQuery {
    base_url: Url,
    post_type: PostType,
    media_filter: MediaFilter,
}

impl SearchQuery {
    pub fn new(base_url: Url, post_type: PostType, media_filter: MediaFilter) -> Self {
        Self {
            base_url,
            post_type,
            media_filter,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, url::ParseError> {
        Ok(Self::new(
            Url::parse(&config.crawler.base_url)?,
            config.search.post_type,
            config.search.media_filter,
        ))
    }

    /// First result page URL for a scope
    ///
    /// Keywords are percent-encoded by the URL builder, so a `#topic#`
    /// keyword is sent as `%23topic%23`.
    pub fn first_page_url(&self, scope: &QueryScope) -> Url {
        let mut url = self.base_url.clone();
        url.set_path("/weibo");
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("q", scope.keyword());
            if let Some(province) = scope.region() {
                let city = scope.sub_region().unwrap_or(WHOLE_PROVINCE);
                query.append_pair("region", &format!("custom:{}:{}", province, city));
            }
            let (key, value) = self.post_type.query_param();
            query.append_pair(key, value);
            let (key, value) = self.media_filter.query_param();
            query.append_pair(key, value);
            query.append_pair("timescope", &scope.window().timescope());
            query.append_pair("page", "1");
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn window() -> TimeWindow {
        let day = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        TimeWindow::from_dates(day, day)
    }

    fn query() -> SearchQuery {
        SearchQuery::new(
            Url::parse("https://s.weibo.com").unwrap(),
            PostType::Original,
            MediaFilter::Image,
        )
    }

    fn params(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn test_children_do_not_mutate_parent() {
        let root = QueryScope::root("春节", window(), None);
        let child = root.with_region(11).with_sub_region(5);

        assert_eq!(root.region(), None);
        assert_eq!(root.sub_region(), None);
        assert_eq!(child.region(), Some(11));
        assert_eq!(child.sub_region(), Some(5));
        assert_eq!(child.keyword(), "春节");
    }

    #[test]
    fn test_with_region_clears_city() {
        let scope = QueryScope::root("a", window(), Some(11)).with_sub_region(5);
        assert_eq!(scope.with_region(31).sub_region(), None);
    }

    #[test]
    fn test_first_page_url_without_region() {
        let scope = QueryScope::root("春节", window(), None);
        let url = query().first_page_url(&scope);
        let params = params(&url);

        assert_eq!(url.path(), "/weibo");
        assert_eq!(params["q"], "春节");
        assert_eq!(params["scope"], "ori");
        assert_eq!(params["haspic"], "1");
        assert_eq!(params["timescope"], "custom:2025-02-01-0:2025-02-02-0");
        assert_eq!(params["page"], "1");
        assert!(!params.contains_key("region"));
    }

    #[test]
    fn test_first_page_url_with_region_and_city() {
        let scope = QueryScope::root("a", window(), None).with_region(11);
        assert_eq!(
            params(&query().first_page_url(&scope))["region"],
            "custom:11:1000"
        );

        let scope = scope.with_sub_region(8);
        assert_eq!(
            params(&query().first_page_url(&scope))["region"],
            "custom:11:8"
        );
    }

    #[test]
    fn test_hashtag_keyword_is_encoded() {
        let scope = QueryScope::root("#元宵节#", window(), None);
        let url = query().first_page_url(&scope);
        assert!(url.as_str().contains("q=%23"));
        assert_eq!(params(&url)["q"], "#元宵节#");
    }

    #[test]
    fn test_display_names_every_dimension() {
        let scope = QueryScope::root("a", window(), Some(11)).with_sub_region(5);
        let text = scope.to_string();
        assert!(text.contains("keyword=a"));
        assert!(text.contains("region=11"));
        assert!(text.contains("city=5"));
    }
}
