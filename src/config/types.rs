use chrono::NaiveDate;
use serde::Deserialize;

/// Main configuration structure for Sumi-Sieve
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub search: SearchConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    pub output: OutputConfig,
}

/// What to search for and over which dates
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Keywords to crawl; `#topic#` keywords search a hashtag
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Optional file with one keyword per line, merged into `keywords`
    #[serde(rename = "keywords-file", default)]
    pub keywords_file: Option<String>,

    /// Post type filter
    #[serde(rename = "post-type", default)]
    pub post_type: PostType,

    /// Media filter
    #[serde(rename = "media-filter", default)]
    pub media_filter: MediaFilter,

    /// Province display names, or "all"
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,

    /// First day of the crawl (inclusive)
    #[serde(rename = "start-date")]
    pub start_date: NaiveDate,

    /// Last day of the crawl (inclusive)
    #[serde(rename = "end-date")]
    pub end_date: NaiveDate,

    /// Pagination link count at which a scope is treated as truncated
    #[serde(rename = "further-threshold", default = "default_further_threshold")]
    pub further_threshold: u32,
}

impl SearchConfig {
    /// Returns true when no region restriction is configured
    pub fn all_regions(&self) -> bool {
        selects_all_regions(&self.regions)
    }
}

/// Returns true when a region list means "no restriction": it is empty or
/// names `all` / `全部` anywhere, ignoring surrounding whitespace
pub fn selects_all_regions(names: &[String]) -> bool {
    names.is_empty()
        || names.iter().map(|n| n.trim()).any(|n| {
            n.eq_ignore_ascii_case("all") || n == "全部"
        })
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Search host, e.g. `https://s.weibo.com`
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Mandatory pause between two requests (milliseconds)
    #[serde(rename = "request-delay", default = "default_request_delay")]
    pub request_delay: u64,

    /// Total attempts for a request failing with a transient error
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Resolve each post's IP location with one extra request
    #[serde(rename = "lookup-ip-location", default)]
    pub lookup_ip_location: bool,

    /// Endpoint used for the IP location lookup
    #[serde(rename = "ip-lookup-url", default = "default_ip_lookup_url")]
    pub ip_lookup_url: String,

    /// Region table replacing the built-in one
    #[serde(rename = "regions-path", default)]
    pub regions_path: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_delay: default_request_delay(),
            max_attempts: default_max_attempts(),
            lookup_ip_location: false,
            ip_lookup_url: default_ip_lookup_url(),
            regions_path: None,
        }
    }
}

/// Logged-in session headers sent with every request
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    #[serde(rename = "accept-language", default = "default_accept_language")]
    pub accept_language: String,

    /// Raw `Cookie` header of a logged-in browser session
    pub cookie: String,
}

/// Text trimming rules matched to the current page markup
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Characters dropped from the start of every post text
    #[serde(rename = "leading-marker-len", default = "default_leading_marker_len")]
    pub leading_marker_len: usize,

    /// Characters dropped from the end of a long-form post text
    #[serde(rename = "long-text-suffix-len", default = "default_long_text_suffix_len")]
    pub long_text_suffix_len: usize,

    /// Zero-width and icon-font characters removed from text
    #[serde(rename = "strip-chars", default = "default_strip_chars")]
    pub strip_chars: Vec<char>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            leading_marker_len: default_leading_marker_len(),
            long_text_suffix_len: default_long_text_suffix_len(),
            strip_chars: default_strip_chars(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory `--export-csv` writes per-keyword CSV files into
    #[serde(rename = "csv-dir", default = "default_csv_dir")]
    pub csv_dir: String,
}

/// Post type filter offered by the search page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostType {
    #[default]
    All,
    Original,
    Hot,
    Followed,
    Verified,
    Media,
    Viewpoint,
}

impl PostType {
    /// Query parameter selecting this post type
    pub fn query_param(&self) -> (&'static str, &'static str) {
        match self {
            Self::All => ("typeall", "1"),
            Self::Original => ("scope", "ori"),
            Self::Hot => ("xsort", "hot"),
            Self::Followed => ("atten", "1"),
            Self::Verified => ("vip", "1"),
            Self::Media => ("category", "4"),
            Self::Viewpoint => ("viewpoint", "1"),
        }
    }
}

/// Attachment filter offered by the search page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaFilter {
    #[default]
    None,
    Image,
    Video,
    Music,
    ShortLink,
}

impl MediaFilter {
    /// Query parameter selecting this media filter
    pub fn query_param(&self) -> (&'static str, &'static str) {
        match self {
            Self::None => ("suball", "1"),
            Self::Image => ("haspic", "1"),
            Self::Video => ("hasvideo", "1"),
            Self::Music => ("hasmusic", "1"),
            Self::ShortLink => ("haslink", "1"),
        }
    }
}

fn default_csv_dir() -> String {
    "./results".to_string()
}

fn default_regions() -> Vec<String> {
    vec!["all".to_string()]
}

fn default_further_threshold() -> u32 {
    46
}

fn default_base_url() -> String {
    "https://s.weibo.com".to_string()
}

fn default_request_delay() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_ip_lookup_url() -> String {
    "https://weibo.com/ajax/statuses/show".to_string()
}

fn default_accept_language() -> String {
    "zh-CN,zh;q=0.9,en;q=0.8,en-US;q=0.7".to_string()
}

fn default_leading_marker_len() -> usize {
    2
}

fn default_long_text_suffix_len() -> usize {
    4
}

fn default_strip_chars() -> Vec<char> {
    vec!['\u{200b}', '\u{e627}']
}
