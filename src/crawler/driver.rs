//! Crawl driver - main crawl orchestration logic
//!
//! This module contains the crawl loop that ties the other crawler parts
//! together:
//! - Deriving the root scopes from configuration
//! - Checking the session once before crawling
//! - Planning scopes depth-first, in enumeration order
//! - Walking leaf scopes page by page and emitting their posts
//! - Marking the run completed or failed in storage

use crate::config::Config;
use crate::crawler::extractor::{parse_ip_location, RecordExtractor};
use crate::crawler::fetcher::{HttpFetcher, PageFetcher};
use crate::crawler::oracle::{parse_result_page, ResultPage};
use crate::crawler::planner::{Decision, PartitionPlanner};
use crate::post::site_now;
use crate::region::RegionTable;
use crate::scope::{QueryScope, SearchQuery, TimeWindow};
use crate::state::{CrawlCounters, CrawlProgress};
use crate::storage::{open_storage, EmitOutcome, PostSink, SqliteSink, Storage};
use crate::{ConfigError, Result, SieveError};
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Builds the root scope of every keyword
///
/// Without a region restriction each keyword gets one root covering the whole
/// date range. With configured regions it gets one root per province instead.
pub fn root_scopes(config: &Config, regions: &RegionTable) -> std::result::Result<Vec<QueryScope>, ConfigError> {
    let window = TimeWindow::from_dates(config.search.start_date, config.search.end_date);
    let provinces = if config.search.all_regions() {
        vec![None]
    } else {
        regions
            .select(&config.search.regions)?
            .into_iter()
            .map(Some)
            .collect()
    };

    Ok(config
        .search
        .keywords
        .iter()
        .flat_map(|keyword| {
            provinces
                .iter()
                .map(move |&province| QueryScope::root(keyword.as_str(), window, province))
        })
        .collect())
}

/// Main crawl driver
pub struct CrawlDriver<F, S> {
    planner: PartitionPlanner,
    extractor: RecordExtractor,
    fetcher: F,
    sink: S,
    roots: Vec<QueryScope>,
    ip_lookup: Option<Url>,
    counters: CrawlCounters,
    /// First page fetched by `preflight`, consumed when its scope is planned
    primed: Option<(QueryScope, ResultPage)>,
}

impl<F, S> CrawlDriver<F, S>
where
    F: PageFetcher,
    S: PostSink,
{
    /// Creates a driver
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawler configuration
    /// * `regions` - The province → city table
    /// * `fetcher` - Fetches result pages, one at a time
    /// * `sink` - Receives every extracted post
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlDriver)` - Ready to run
    /// * `Err(SieveError)` - A configured region or URL is invalid
    pub fn new(config: &Config, regions: Arc<RegionTable>, fetcher: F, sink: S) -> Result<Self> {
        let roots = root_scopes(config, &regions)?;
        let provinces = regions.select(&config.search.regions)?;
        let query = SearchQuery::from_config(config)?;
        let ip_lookup = if config.crawler.lookup_ip_location {
            Some(Url::parse(&config.crawler.ip_lookup_url)?)
        } else {
            None
        };

        Ok(Self {
            planner: PartitionPlanner::new(
                config.search.further_threshold,
                provinces,
                regions,
                query,
            ),
            extractor: RecordExtractor::new(config.extraction.clone()),
            fetcher,
            sink,
            roots,
            ip_lookup,
            counters: CrawlCounters::default(),
            primed: None,
        })
    }

    pub fn root_scopes(&self) -> &[QueryScope] {
        &self.roots
    }

    pub fn planner(&self) -> &PartitionPlanner {
        &self.planner
    }

    pub fn counters(&self) -> CrawlCounters {
        self.counters
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Checks that the session is accepted before any crawling
    ///
    /// Fetches the first page of the first root scope. A login redirect or a
    /// page without a result list fails with `SessionInvalid`. The page is
    /// kept and planned by `run` without being fetched again.
    pub async fn preflight(&mut self) -> Result<ResultPage> {
        let Some(scope) = self.roots.first().cloned() else {
            return Err(SieveError::Config(ConfigError::Validation(
                "no keywords to crawl".to_string(),
            )));
        };

        let page = fetch_first_page(&self.fetcher, self.planner.query(), &scope)
            .await
            .map_err(|e| scope_failed(&scope, e))?;
        self.primed = Some((scope, page.clone()));
        Ok(page)
    }

    /// Crawls every root scope
    ///
    /// Scopes are planned depth-first with an explicit stack, so children are
    /// finished in enumeration order before the next sibling of their parent.
    /// The first fatal error stops the crawl and names the scope it happened in.
    pub async fn run(&mut self) -> Result<CrawlCounters> {
        tracing::info!(roots = self.roots.len(), "Starting crawl");
        let start_time = std::time::Instant::now();

        for root in self.roots.clone() {
            tracing::info!(keyword = root.keyword(), window = %root.window(), "Crawling keyword");
            let mut stack = vec![root];

            while let Some(scope) = stack.pop() {
                let children = self
                    .process_scope(&scope)
                    .await
                    .map_err(|e| scope_failed(&scope, e))?;
                stack.extend(children.into_iter().rev());
            }
        }

        tracing::info!(
            posts = self.counters.posts_emitted,
            duplicates = self.counters.duplicates,
            leaves = self.counters.leaves,
            lossy_leaves = self.counters.lossy_leaves,
            "Crawl completed in {:?}",
            start_time.elapsed()
        );

        Ok(self.counters)
    }

    /// Plans one scope and either walks it or returns its children
    async fn process_scope(&mut self, scope: &QueryScope) -> Result<Vec<QueryScope>> {
        let decision = match self.primed.take() {
            Some((primed, page)) if primed == *scope => self.planner.decide(scope, page),
            _ => self.planner.plan(&self.fetcher, scope).await?,
        };
        self.counters.scopes_planned += 1;

        tracing::debug!(scope = %scope, decision = decision.label(), "Planned scope");

        match decision {
            Decision::Empty => {
                tracing::info!(scope = %scope, "No results for scope");
                self.counters.empty_scopes += 1;
                Ok(Vec::new())
            }
            Decision::WalkPages { first_page, lossy } => {
                self.walk_pages(scope, first_page, lossy).await?;
                Ok(Vec::new())
            }
            Decision::SplitByTime(children) => {
                self.counters.time_splits += 1;
                Ok(children)
            }
            Decision::SplitByRegion(children) => {
                self.counters.region_splits += 1;
                Ok(children)
            }
            Decision::SplitBySubRegion(children) => {
                self.counters.sub_region_splits += 1;
                Ok(children)
            }
        }
    }

    /// Walks a leaf scope from its first page until no next link remains
    async fn walk_pages(&mut self, scope: &QueryScope, first_page: ResultPage, lossy: bool) -> Result<()> {
        self.counters.leaves += 1;
        if lossy {
            self.counters.lossy_leaves += 1;
            tracing::warn!(
                scope = %scope,
                region = %self.describe_region(scope),
                pagination_links = first_page.pagination_link_count(),
                threshold = self.planner.threshold(),
                "Scope cannot be narrowed further; results beyond the last page are lost"
            );
        }

        let mut progress = CrawlProgress::starting_at(&first_page.url);
        self.counters.pages_walked += 1;
        self.emit_page(scope, &first_page).await?;
        let mut next = first_page.next_page_ref().cloned();

        loop {
            if !progress.advance_to(next.take()) {
                tracing::warn!(scope = %scope, "Next link points back to a visited page");
                break;
            }
            let Some(url) = progress.cursor().cloned() else {
                break;
            };

            tracing::debug!(scope = %scope, page = progress.pages_consumed() + 1, url = %url, "Fetching page");
            let fetched = self.fetcher.fetch(&url).await?;
            let page = parse_result_page(&fetched.body, &fetched.url)?;
            progress.consume();
            self.counters.pages_walked += 1;

            if page.is_empty() {
                break;
            }
            self.emit_page(scope, &page).await?;
            next = page.next_page_ref().cloned();
        }

        tracing::debug!(scope = %scope, pages = progress.pages_consumed(), "Finished scope");
        self.sink
            .record_leaf(scope, progress.pages_consumed(), lossy)?;
        Ok(())
    }

    /// Extracts and emits every post on a page, originals before reposts
    async fn emit_page(&mut self, scope: &QueryScope, page: &ResultPage) -> Result<()> {
        let now = site_now();
        for entry in page.entries() {
            let Some(mut extracted) = self.extractor.extract(entry, now) else {
                continue;
            };

            if self.ip_lookup.is_some() && !extracted.post.bid.is_empty() {
                extracted.post.ip_location = self.lookup_ip_location(&extracted.post.bid).await;
            }

            for record in extracted.into_records() {
                match self.sink.emit(&record, scope.keyword()) {
                    Ok(EmitOutcome::Inserted) => self.counters.posts_emitted += 1,
                    Ok(EmitOutcome::Duplicate) => self.counters.duplicates += 1,
                    Err(source) => {
                        tracing::error!(
                            post_id = %record.id,
                            keyword = scope.keyword(),
                            error = %source,
                            "Sink rejected post; replay it manually"
                        );
                        return Err(SieveError::SinkUnavailable {
                            post_id: record.id,
                            source,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Looks up where a post was published from; failures yield ""
    async fn lookup_ip_location(&self, bid: &str) -> String {
        let Some(base) = &self.ip_lookup else {
            return String::new();
        };
        let mut url = base.clone();
        url.query_pairs_mut()
            .append_pair("id", bid)
            .append_pair("locale", "zh-CN");

        match self.fetcher.fetch(&url).await {
            Ok(page) => parse_ip_location(&page.body),
            Err(e) => {
                tracing::debug!(bid = bid, error = %e, "IP location lookup failed");
                String::new()
            }
        }
    }

    fn describe_region(&self, scope: &QueryScope) -> String {
        match scope.region() {
            Some(province) => self.planner.regions().describe(province, scope.sub_region()),
            None => "all".to_string(),
        }
    }
}

async fn fetch_first_page<F>(
    fetcher: &F,
    query: &SearchQuery,
    scope: &QueryScope,
) -> Result<ResultPage>
where
    F: PageFetcher + ?Sized,
{
    let url = query.first_page_url(scope);
    let fetched = fetcher.fetch(&url).await?;
    let page = parse_result_page(&fetched.body, &fetched.url)?;

    tracing::info!(
        scope = %scope,
        pagination_links = page.pagination_link_count(),
        entries = page.entries().len(),
        "Session accepted"
    );
    Ok(page)
}

fn scope_failed(scope: &QueryScope, error: SieveError) -> SieveError {
    tracing::error!(scope = %scope, error = %error, "Crawl stopped");
    SieveError::ScopeFailed {
        scope: scope.to_string(),
        source: Box::new(error),
    }
}

/// Runs the main crawl operation
///
/// This function orchestrates the entire crawl process:
///
/// 1. Open storage and record a new run
/// 2. Build the HTTP fetcher from the session settings
/// 3. Check the session with one first-page request
/// 4. Plan and walk every keyword's scopes
/// 5. Mark the run completed, or failed with the diagnostic
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file, stored with the run
/// * `regions` - The province → city table
///
/// # Returns
///
/// * `Ok(CrawlCounters)` - Crawl completed successfully
/// * `Err(SieveError)` - Crawl failed with an error
///
/// # Example
///
/// ```no_run
/// use sumi_sieve::config::load_config_with_hash;
/// use sumi_sieve::crawler::run_crawl;
/// use sumi_sieve::RegionTable;
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let regions = Arc::new(RegionTable::for_config(&config.crawler)?);
/// let counters = run_crawl(&config, &hash, regions).await?;
/// println!("{}", counters);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: &Config,
    config_hash: &str,
    regions: Arc<RegionTable>,
) -> Result<CrawlCounters> {
    let fetcher = HttpFetcher::new(&config.session, &config.crawler)?;
    let mut storage = open_storage(Path::new(&config.output.database_path))?;
    let run_id = storage.create_run(config_hash)?;
    tracing::info!("Starting crawl run {}", run_id);

    let mut driver =
        match CrawlDriver::new(config, regions, fetcher, SqliteSink::new(storage, run_id)) {
            Ok(driver) => driver,
            Err(e) => {
                // The sink, and with it the storage, was dropped with the driver.
                let mut storage = open_storage(Path::new(&config.output.database_path))?;
                return finish_run(&mut storage, run_id, Err(e));
            }
        };

    let result = match driver.preflight().await {
        Ok(_) => driver.run().await,
        Err(e) => Err(e),
    };

    finish_run(driver.sink_mut().storage_mut(), run_id, result)
}

/// Records how a run ended and hands back its outcome
///
/// A failure to record a failed run is logged; the crawl error is what the
/// caller gets.
fn finish_run<T>(
    storage: &mut T,
    run_id: i64,
    result: Result<CrawlCounters>,
) -> Result<CrawlCounters>
where
    T: Storage + ?Sized,
{
    match result {
        Ok(counters) => {
            storage.complete_run(run_id)?;
            Ok(counters)
        }
        Err(e) => {
            if let Err(record_error) = storage.fail_run(run_id, &e.to_string()) {
                tracing::error!(
                    run_id = run_id,
                    error = %record_error,
                    "Could not mark run as failed"
                );
            }
            Err(e)
        }
    }
}

/// Runs only the session check, without touching storage
pub async fn check_session(config: &Config, regions: &RegionTable) -> Result<ResultPage> {
    let roots = root_scopes(config, regions)?;
    let Some(scope) = roots.first() else {
        return Err(SieveError::Config(ConfigError::Validation(
            "no keywords to crawl".to_string(),
        )));
    };
    let query = SearchQuery::from_config(config)?;
    let fetcher = HttpFetcher::new(&config.session, &config.crawler)?;
    fetch_first_page(&fetcher, &query, scope)
        .await
        .map_err(|e| scope_failed(scope, e))
}
