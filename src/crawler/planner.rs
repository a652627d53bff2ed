//! Partition planner
//!
//! Decides for one query scope whether its results can be walked page by
//! page or whether the scope has to be split first. The signal is the number
//! of pagination links on the scope's first result page: the site stops
//! revealing results past a fixed page depth, so a scope rendering at least
//! `threshold` links is assumed to be truncated.
//!
//! Splitting narrows the cheapest axis first:
//!
//! | Scope | Split into |
//! |-------|------------|
//! | window longer than a day | one child per day |
//! | one-day window | 24 one-hour children |
//! | one hour, no region | one child per selected province |
//! | one hour, province | one child per city of the province |
//! | one hour, city | nothing left; walked anyway (lossy) |
//!
//! Children of a split exactly cover their parent with no overlap, which
//! keeps every post in exactly one leaf.

use crate::crawler::fetcher::PageFetcher;
use crate::crawler::oracle::{parse_result_page, ResultPage};
use crate::region::RegionTable;
use crate::scope::{QueryScope, SearchQuery, TimeGranularity};
use crate::Result;
use std::sync::Arc;

/// Outcome of planning one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The site reports no results; nothing to do
    Empty,
    /// Walk the pages starting from the already fetched first page
    WalkPages {
        first_page: ResultPage,
        /// True when the scope is still over the threshold but cannot be
        /// narrowed further
        lossy: bool,
    },
    SplitByTime(Vec<QueryScope>),
    SplitByRegion(Vec<QueryScope>),
    SplitBySubRegion(Vec<QueryScope>),
}

impl Decision {
    /// Child scopes of a split decision, in processing order
    pub fn children(&self) -> &[QueryScope] {
        match self {
            Self::SplitByTime(children)
            | Self::SplitByRegion(children)
            | Self::SplitBySubRegion(children) => children,
            Self::Empty | Self::WalkPages { .. } => &[],
        }
    }

    /// Short name for logging
    pub fn label(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::WalkPages { lossy: false, .. } => "walk",
            Self::WalkPages { lossy: true, .. } => "walk-lossy",
            Self::SplitByTime(_) => "split-time",
            Self::SplitByRegion(_) => "split-region",
            Self::SplitBySubRegion(_) => "split-city",
        }
    }
}

/// The next narrower set of scopes, without any I/O
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Partition {
    Time(Vec<QueryScope>),
    Region(Vec<QueryScope>),
    SubRegion(Vec<QueryScope>),
    /// The scope is at the finest granularity available
    Exhausted,
}

/// Recursive scope planner
#[derive(Debug, Clone)]
pub struct PartitionPlanner {
    threshold: usize,
    provinces: Vec<u32>,
    regions: Arc<RegionTable>,
    query: SearchQuery,
}

impl PartitionPlanner {
    /// Creates a planner
    ///
    /// # Arguments
    ///
    /// * `threshold` - Pagination link count at which a scope is split
    /// * `provinces` - Province codes a region split fans out to, in order
    /// * `regions` - The province → city table
    /// * `query` - Search-wide URL parameters
    pub fn new(
        threshold: u32,
        provinces: Vec<u32>,
        regions: Arc<RegionTable>,
        query: SearchQuery,
    ) -> Self {
        Self {
            threshold: threshold.max(1) as usize,
            provinces,
            regions,
            query,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    /// Fetches the scope's first page and decides what to do with it
    pub async fn plan<F>(&self, fetcher: &F, scope: &QueryScope) -> Result<Decision>
    where
        F: PageFetcher + ?Sized,
    {
        let url = self.query.first_page_url(scope);
        tracing::debug!(scope = %scope, url = %url, "Fetching first page");

        let fetched = fetcher.fetch(&url).await?;
        let page = parse_result_page(&fetched.body, &fetched.url)?;
        Ok(self.decide(scope, page))
    }

    /// Applies the threshold rule to an already fetched first page
    pub fn decide(&self, scope: &QueryScope, first_page: ResultPage) -> Decision {
        if first_page.is_empty() {
            return Decision::Empty;
        }

        let links = first_page.pagination_link_count();
        if links < self.threshold {
            return Decision::WalkPages {
                first_page,
                lossy: false,
            };
        }

        tracing::debug!(
            scope = %scope,
            pagination_links = links,
            threshold = self.threshold,
            "Scope exceeds threshold"
        );

        match self.partition(scope) {
            Partition::Time(children) => Decision::SplitByTime(children),
            Partition::Region(children) => Decision::SplitByRegion(children),
            Partition::SubRegion(children) => Decision::SplitBySubRegion(children),
            Partition::Exhausted => Decision::WalkPages {
                first_page,
                lossy: true,
            },
        }
    }

    /// Narrows a scope along the next available axis
    pub fn partition(&self, scope: &QueryScope) -> Partition {
        let window = scope.window();
        match window.granularity() {
            TimeGranularity::MultiDay => Partition::Time(
                window
                    .split_days()
                    .into_iter()
                    .map(|w| scope.with_window(w))
                    .collect(),
            ),
            TimeGranularity::Day => Partition::Time(
                window
                    .split_hours()
                    .into_iter()
                    .map(|w| scope.with_window(w))
                    .collect(),
            ),
            TimeGranularity::Hour => self.partition_by_region(scope),
        }
    }

    fn partition_by_region(&self, scope: &QueryScope) -> Partition {
        match (scope.region(), scope.sub_region()) {
            (None, _) if !self.provinces.is_empty() => Partition::Region(
                self.provinces
                    .iter()
                    .map(|&code| scope.with_region(code))
                    .collect(),
            ),
            (Some(province), None) => match self.regions.province(province) {
                Some(p) if !p.cities.is_empty() => Partition::SubRegion(
                    p.cities
                        .iter()
                        .map(|city| scope.with_sub_region(city.code))
                        .collect(),
                ),
                _ => Partition::Exhausted,
            },
            _ => Partition::Exhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MediaFilter, PostType};
    use crate::crawler::oracle::fixtures::{empty_page, entry, login_page, result_page};
    use crate::crawler::testing::ScriptedFetcher;
    use crate::scope::TimeWindow;
    use chrono::{NaiveDate, NaiveDateTime};
    use url::Url;

    const TABLE: &str = r#"
[[province]]
name = "北京"
code = 11
cities = [{ name = "东城区", code = 1 }, { name = "西城区", code = 2 }, { name = "朝阳区", code = 5 }]

[[province]]
name = "上海"
code = 31
cities = [{ name = "黄浦区", code = 1 }]

[[province]]
name = "香港"
code = 81
"#;

    fn table() -> Arc<RegionTable> {
        Arc::new(RegionTable::from_toml_str(TABLE).unwrap())
    }

    fn query() -> SearchQuery {
        SearchQuery::new(
            Url::parse("https://s.weibo.com").unwrap(),
            PostType::All,
            MediaFilter::None,
        )
    }

    fn planner() -> PartitionPlanner {
        let regions = table();
        let provinces = regions.provinces().iter().map(|p| p.code).collect();
        PartitionPlanner::new(46, provinces, regions, query())
    }

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 2, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn window(from: NaiveDateTime, to: NaiveDateTime) -> TimeWindow {
        TimeWindow::new(from, to).unwrap()
    }

    fn page_with_links(links: usize) -> String {
        result_page(&[entry("1", "x")], links, None)
    }

    #[tokio::test]
    async fn test_under_threshold_walks_without_recursion() {
        let fetcher = ScriptedFetcher::new(page_with_links(10));
        let scope = QueryScope::root("a", window(at(1, 0), at(3, 0)), None);

        let decision = planner().plan(&fetcher, &scope).await.unwrap();

        assert!(matches!(decision, Decision::WalkPages { lossy: false, .. }));
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_never_splits_under_threshold() {
        let scopes = [
            QueryScope::root("a", window(at(1, 0), at(5, 0)), None),
            QueryScope::root("a", window(at(1, 0), at(2, 0)), None),
            QueryScope::root("a", window(at(1, 3), at(1, 4)), None),
            QueryScope::root("a", window(at(1, 3), at(1, 4)), Some(11)),
            QueryScope::root("a", window(at(1, 3), at(1, 4)), Some(11)).with_sub_region(5),
        ];
        for links in [0, 1, 45] {
            let fetcher = ScriptedFetcher::new(page_with_links(links));
            for scope in &scopes {
                let decision = planner().plan(&fetcher, scope).await.unwrap();
                assert_eq!(decision.label(), "walk", "{} links, {}", links, scope);
            }
        }
    }

    #[tokio::test]
    async fn test_empty_result() {
        let fetcher = ScriptedFetcher::new(empty_page());
        let scope = QueryScope::root("a", window(at(1, 0), at(3, 0)), None);
        let decision = planner().plan(&fetcher, &scope).await.unwrap();
        assert_eq!(decision, Decision::Empty);
    }

    #[tokio::test]
    async fn test_multi_day_window_splits_into_days() {
        let fetcher = ScriptedFetcher::new(page_with_links(50));
        let scope = QueryScope::root("a", window(at(1, 0), at(3, 0)), None);

        let decision = planner().plan(&fetcher, &scope).await.unwrap();

        assert_eq!(
            decision,
            Decision::SplitByTime(vec![
                scope.with_window(window(at(1, 0), at(2, 0))),
                scope.with_window(window(at(2, 0), at(3, 0))),
            ])
        );
    }

    #[tokio::test]
    async fn test_day_window_splits_into_24_hours() {
        let fetcher = ScriptedFetcher::new(page_with_links(50));
        let scope = QueryScope::root("a", window(at(1, 0), at(2, 0)), None);

        let decision = planner().plan(&fetcher, &scope).await.unwrap();
        let Decision::SplitByTime(children) = decision else {
            panic!("expected a time split");
        };

        assert_eq!(children.len(), 24);
        for (h, child) in children.iter().enumerate() {
            let h = h as u32;
            let end = if h == 23 { at(2, 0) } else { at(1, h + 1) };
            assert_eq!(child.window(), &window(at(1, h), end));
            assert_eq!(child.region(), None);
        }
    }

    #[tokio::test]
    async fn test_hour_window_splits_by_every_province() {
        let fetcher = ScriptedFetcher::new(page_with_links(50));
        let scope = QueryScope::root("a", window(at(1, 7), at(1, 8)), None);

        let decision = planner().plan(&fetcher, &scope).await.unwrap();

        assert_eq!(
            decision,
            Decision::SplitByRegion(vec![
                scope.with_region(11),
                scope.with_region(31),
                scope.with_region(81),
            ])
        );
    }

    #[test]
    fn test_region_split_follows_selected_provinces() {
        let regions = Arc::new(RegionTable::builtin().unwrap());
        let all: Vec<u32> = regions.provinces().iter().map(|p| p.code).collect();
        let planner = PartitionPlanner::new(46, all.clone(), regions, query());
        let scope = QueryScope::root("a", window(at(1, 7), at(1, 8)), None);

        let Partition::Region(children) = planner.partition(&scope) else {
            panic!("expected a region split");
        };
        let codes: Vec<u32> = children.iter().filter_map(|c| c.region()).collect();
        assert_eq!(codes, all);
    }

    #[tokio::test]
    async fn test_province_hour_splits_by_city_then_walks_lossy() {
        let fetcher = ScriptedFetcher::new(page_with_links(50));
        let province = QueryScope::root("a", window(at(1, 7), at(1, 8)), None).with_region(11);

        let decision = planner().plan(&fetcher, &province).await.unwrap();
        assert_eq!(
            decision,
            Decision::SplitBySubRegion(vec![
                province.with_sub_region(1),
                province.with_sub_region(2),
                province.with_sub_region(5),
            ])
        );

        let city = &decision.children()[2];
        let decision = planner().plan(&fetcher, city).await.unwrap();
        assert!(matches!(decision, Decision::WalkPages { lossy: true, .. }));
    }

    #[test]
    fn test_province_without_cities_is_exhausted() {
        let scope = QueryScope::root("a", window(at(1, 7), at(1, 8)), Some(81));
        assert_eq!(planner().partition(&scope), Partition::Exhausted);

        let unknown = QueryScope::root("a", window(at(1, 7), at(1, 8)), Some(4242));
        assert_eq!(planner().partition(&unknown), Partition::Exhausted);
    }

    #[test]
    fn test_time_split_keeps_region_of_parent() {
        let scope = QueryScope::root("a", window(at(1, 0), at(3, 0)), Some(31));
        let Partition::Time(children) = planner().partition(&scope) else {
            panic!("expected a time split");
        };
        assert!(children.iter().all(|c| c.region() == Some(31)));
    }

    #[test]
    fn test_splits_cover_parent_exactly() {
        let scope = QueryScope::root("a", window(at(1, 0), at(4, 0)), None);
        let mut frontier = vec![scope.clone()];
        let mut hours = Vec::new();

        while let Some(next) = frontier.pop() {
            match planner().partition(&next) {
                Partition::Time(children) => frontier.extend(children),
                _ => hours.push(*next.window()),
            }
        }

        hours.sort();
        assert_eq!(hours.len(), 72);
        assert_eq!(hours.first().unwrap().start(), at(1, 0));
        assert_eq!(hours.last().unwrap().end(), at(4, 0));
        for pair in hours.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start());
        }
    }

    #[tokio::test]
    async fn test_session_failure_surfaces() {
        let fetcher = ScriptedFetcher::new(login_page());
        let scope = QueryScope::root("a", window(at(1, 0), at(2, 0)), None);
        let err = planner().plan(&fetcher, &scope).await.unwrap_err();
        assert!(err.is_session_failure());
    }

    #[tokio::test]
    async fn test_requests_first_page_of_scope() {
        let fetcher = ScriptedFetcher::new(page_with_links(1));
        let scope = QueryScope::root("春节", window(at(1, 7), at(1, 8)), Some(11));
        planner().plan(&fetcher, &scope).await.unwrap();

        let requested = &fetcher.requests()[0];
        let params: std::collections::HashMap<_, _> =
            requested.query_pairs().into_owned().collect();
        assert_eq!(params["q"], "春节");
        assert_eq!(params["timescope"], "custom:2025-02-01-7:2025-02-01-8");
        assert_eq!(params["region"], "custom:11:1000");
    }
}
