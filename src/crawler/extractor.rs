//! Record extraction from post entries
//!
//! Maps one `card-wrap` entry to a [`PostRecord`], plus the embedded
//! original when the entry is a repost. Elements that are missing fall back
//! to defaults (`0` counts, empty strings) instead of failing the entry; only
//! a missing post id makes an entry unusable.

use crate::config::ExtractionConfig;
use crate::crawler::oracle::PostEntry;
use crate::post::{standardize_date, PostRecord, VerificationTier};
use chrono::NaiveDateTime;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

const SITE_ROOT: &str = "https://weibo.com/";
const ARTICLE_PREFIX: &str = "发布了头条文章";
const LOCATION_ICON: &str = "2";
const ARTICLE_ICON: &str = "O";

/// A post and, for reposts, the original it embeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPost {
    pub post: PostRecord,
    pub original: Option<PostRecord>,
}

impl ExtractedPost {
    /// Records in emission order: the embedded original before its wrapper
    pub fn into_records(self) -> Vec<PostRecord> {
        match self.original {
            Some(original) => vec![original, self.post],
            None => vec![self.post],
        }
    }
}

/// Text pulled from one `p.txt` block
#[derive(Debug, Default)]
struct TextFields {
    text: String,
    position: String,
    article_url: String,
    topics: Vec<String>,
    mentioned_users: Vec<String>,
}

/// Extracts post records from result page entries
#[derive(Debug, Clone, Default)]
pub struct RecordExtractor {
    rules: ExtractionConfig,
}

impl RecordExtractor {
    pub fn new(rules: ExtractionConfig) -> Self {
        Self { rules }
    }

    /// Extracts one entry
    ///
    /// Relative timestamps ("5分钟前") are resolved against `now`. Returns
    /// `None` when the entry has no post id.
    pub fn extract(&self, entry: &PostEntry, now: NaiveDateTime) -> Option<ExtractedPost> {
        let Some(id) = entry.mid.clone() else {
            tracing::warn!("Skipping result entry without a post id");
            return None;
        };

        let fragment = Html::parse_fragment(&entry.html);
        let root = fragment.root_element();
        let repost_card = select_first(root, "div.card-comment");

        let mut post = PostRecord {
            id,
            ..PostRecord::default()
        };

        if let Some(link) = outside_repost(root, "div.from > a").into_iter().next() {
            post.bid = last_path_segment(link.value().attr("href").unwrap_or_default());
            post.created_at = standardize_date(&text_of(link), now);
        }
        post.source_client = outside_repost(root, "div.from > a")
            .get(1)
            .map(|a| text_of(*a).trim().to_string())
            .unwrap_or_default();

        if let Some(author) = select_first(root, "div.info a[nick-name]") {
            post.author_id = last_path_segment(author.value().attr("href").unwrap_or_default());
            post.author_name = author.value().attr("nick-name").unwrap_or_default().to_string();
        }

        let full = outside_repost(root, "p[node-type=feed_list_content_full]")
            .into_iter()
            .next();
        let body = match full {
            Some(element) => Some((element, true)),
            None => outside_repost(root, "p.txt")
                .into_iter()
                .next()
                .map(|element| (element, false)),
        };
        if let Some((element, long)) = body {
            self.apply_text(&mut post, self.text_fields(element, long));
        }

        post.repost_count = outside_repost(root, "div.card-act a[action-type=feed_list_forward]")
            .first()
            .map_or(0, |a| parse_count(&text_of(*a)));
        post.comment_count = outside_repost(root, "div.card-act a[action-type=feed_list_comment]")
            .first()
            .map_or(0, |a| parse_count(&text_of(*a)));
        post.like_count = outside_repost(root, "div.card-act a[action-type=feed_list_like]")
            .first()
            .map_or(0, |a| parse_count(&text_of(*a)));

        post.author_verification_tier = select_first(root, "div.card-feed > div.avator svg[id]")
            .and_then(|svg| svg.value().attr("id"))
            .map(VerificationTier::from_badge_id)
            .unwrap_or_default();

        let image_urls = extract_images(root);
        let video_url = extract_video(root);

        let original = match repost_card {
            Some(card) => {
                let original = self.extract_original(card, now).map(|mut original| {
                    original.image_urls = image_urls;
                    original.video_url = video_url;
                    original
                });
                post.origin_post_id = original.as_ref().map(|o| o.id.clone());
                original
            }
            None => {
                post.image_urls = image_urls;
                post.video_url = video_url;
                None
            }
        };

        Some(ExtractedPost { post, original })
    }

    /// Extracts the original post embedded in a repost card
    fn extract_original(&self, card: ElementRef<'_>, now: NaiveDateTime) -> Option<PostRecord> {
        let author = select_first(card, "div[node-type=feed_list_forwardContent] > a")?;

        let id = select_first(card, "a[action-type=feed_list_like][action-data]")
            .and_then(|a| a.value().attr("action-data"))
            .and_then(|data| {
                data.split('&')
                    .find_map(|pair| pair.strip_prefix("mid="))
                    .map(str::to_string)
            })
            .filter(|id| !id.is_empty());
        let Some(id) = id else {
            tracing::warn!("Skipping embedded original without a post id");
            return None;
        };

        let mut original = PostRecord {
            id,
            author_id: last_path_segment(author.value().attr("href").unwrap_or_default()),
            author_name: author.value().attr("nick-name").unwrap_or_default().to_string(),
            ..PostRecord::default()
        };

        let from = select_all(card, "p.from > a");
        if let Some(link) = from.first() {
            original.bid = last_path_segment(link.value().attr("href").unwrap_or_default());
            original.created_at = standardize_date(&text_of(*link), now);
        }
        original.source_client = from
            .get(1)
            .map(|a| text_of(*a).trim().to_string())
            .unwrap_or_default();

        let body = match select_first(card, "p[node-type=feed_list_content_full]") {
            Some(element) => Some((element, true)),
            None => select_first(card, "p.txt").map(|element| (element, false)),
        };
        if let Some((element, long)) = body {
            self.apply_text(&mut original, self.text_fields(element, long));
        }

        let actions = select_all(card, "ul.act > li");
        let action_count = |i: usize| {
            actions
                .get(i)
                .map_or(0, |li| parse_count(&text_of(*li)))
        };
        original.repost_count = action_count(0);
        original.comment_count = action_count(1);
        original.like_count = match select_first(card, "span.woo-like-count") {
            Some(span) => parse_count(&text_of(span)),
            None => action_count(2),
        };

        Some(original)
    }

    fn apply_text(&self, post: &mut PostRecord, fields: TextFields) {
        post.text = fields.text;
        post.position = fields.position;
        post.article_url = fields.article_url;
        post.topics = fields.topics;
        post.mentioned_users = fields.mentioned_users;
    }

    fn text_fields(&self, element: ElementRef<'_>, long: bool) -> TextFields {
        let position = extract_position(element);
        TextFields {
            text: self.clean_text(element, &position, long),
            article_url: extract_article_url(element),
            topics: extract_topics(element),
            mentioned_users: extract_mentions(element),
            position,
        }
    }

    /// Applies the trimming rules to a text block
    ///
    /// Order matters: presentational characters go first, then the position
    /// tag, then the fixed leading marker, then spaces, and finally the
    /// "collapse" suffix of long-form posts.
    fn clean_text(&self, element: ElementRef<'_>, position: &str, long: bool) -> String {
        let raw: String = element
            .text()
            .collect::<String>()
            .chars()
            .filter(|c| !self.rules.strip_chars.contains(c))
            .collect();

        let raw = if position.is_empty() {
            raw
        } else {
            raw.replace(&format!("{}{}", LOCATION_ICON, position), "")
        };

        let mut text: String = raw
            .chars()
            .skip(self.rules.leading_marker_len)
            .filter(|c| *c != ' ')
            .collect();

        if long {
            let keep = text
                .chars()
                .count()
                .saturating_sub(self.rules.long_text_suffix_len);
            text = text.chars().take(keep).collect();
        }

        text.trim().to_string()
    }
}

fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => scope.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    scope.select(&selector).next()
}

/// Matches of `css` that do not sit inside the embedded repost card
fn outside_repost<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    select_all(scope, css)
        .into_iter()
        .filter(|element| !in_repost_card(element))
        .collect()
}

fn in_repost_card(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().classes().any(|c| c == "card-comment"))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// Resolves a possibly protocol-relative href from the page
fn site_url(href: &str) -> Option<Url> {
    Url::parse(SITE_ROOT).ok()?.join(href.trim()).ok()
}

/// `//weibo.com/123/AbC?refer=x` → `AbC`
fn last_path_segment(href: &str) -> String {
    let Some(url) = site_url(href) else {
        return String::new();
    };
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or_default()
        .to_string();
    segment
}

/// Text of the icon inside an anchor, if it has one
fn icon_of(anchor: ElementRef<'_>) -> Option<String> {
    select_first(anchor, "i.wbicon").map(|i| text_of(i).trim().to_string())
}

/// Place tag rendered as an anchor with the location icon
fn extract_position(element: ElementRef<'_>) -> String {
    select_all(element, "a")
        .into_iter()
        .find(|a| icon_of(*a).as_deref() == Some(LOCATION_ICON))
        .map(|a| text_of(a).trim().chars().skip(1).collect())
        .unwrap_or_default()
}

/// Short link of a headline article, only for "published an article" posts
fn extract_article_url(element: ElementRef<'_>) -> String {
    let compact: String = text_of(element)
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{200b}' && *c != '\u{e627}')
        .collect();
    if !compact.starts_with(ARTICLE_PREFIX) {
        return String::new();
    }

    select_all(element, "a")
        .into_iter()
        .filter(|a| icon_of(*a).as_deref() == Some(ARTICLE_ICON))
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.starts_with("http://t.cn") || href.starts_with("https://t.cn"))
        .map(str::to_string)
        .unwrap_or_default()
}

/// `#topic#` anchors, without the hashes, deduplicated in first-seen order
fn extract_topics(element: ElementRef<'_>) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();
    for anchor in select_all(element, "a") {
        let text = text_of(anchor);
        let text = text.trim();
        if text.chars().count() > 2 && text.starts_with('#') && text.ends_with('#') {
            let topic = text.trim_matches('#').to_string();
            if !topic.is_empty() && !topics.contains(&topic) {
                topics.push(topic);
            }
        }
    }
    topics
}

/// `@name` anchors whose link points at that user's profile
fn extract_mentions(element: ElementRef<'_>) -> Vec<String> {
    let mut users: Vec<String> = Vec::new();
    for anchor in select_all(element, "a[href]") {
        let text = text_of(anchor);
        let Some(name) = text.trim().strip_prefix('@').map(str::to_string) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let href = anchor.value().attr("href").unwrap_or_default();
        let decoded = urlencoding::decode(href)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| href.to_string());
        if decoded.ends_with(&format!("/n/{}", name)) && !users.contains(&name) {
            users.push(name);
        }
    }
    users
}

/// Picture URLs from the first picture list, rewritten to the large size
fn extract_images(root: ElementRef<'_>) -> Vec<String> {
    let Some(list) = select_first(root, "div.media.media-piclist ul") else {
        return Vec::new();
    };
    select_all(list, "li img[src]")
        .into_iter()
        .filter_map(|img| img.value().attr("src"))
        .filter_map(large_image_url)
        .collect()
}

/// `https://wx1.sinaimg.cn/orj360/abc.jpg` → `https://wx1.sinaimg.cn/large/abc.jpg`
///
/// The first path segment names the thumbnail size.
fn large_image_url(src: &str) -> Option<String> {
    let mut url = site_url(src)?;
    url.set_scheme("https").ok()?;

    let rest: Vec<String> = url
        .path_segments()?
        .skip(1)
        .map(str::to_string)
        .collect();
    if !rest.is_empty() {
        url.set_path(&format!("/large/{}", rest.join("/")));
    }
    Some(url.to_string())
}

fn video_source_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"src:'(.*?)'").expect("static video pattern"))
}

fn extract_video(root: ElementRef<'_>) -> String {
    let Some(player) = select_first(root, "div.thumbnail video-player") else {
        return String::new();
    };
    let markup = player.html();
    let Some(src) = video_source_pattern()
        .captures(&markup)
        .and_then(|caps| caps.get(1))
    else {
        return String::new();
    };

    let src = src.as_str().replace("&amp;", "&");
    if src.starts_with("//") {
        format!("http:{}", src)
    } else {
        src
    }
}

fn count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(万|亿)?").expect("static count pattern"))
}

/// Parses a counter label such as `转发 12`, `1.2万` or `赞`
///
/// Labels without a number mean zero.
pub fn parse_count(label: &str) -> u64 {
    let Some(caps) = count_pattern().captures(label) else {
        return 0;
    };
    let Some(value) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) else {
        return 0;
    };
    let multiplier = match caps.get(2).map(|m| m.as_str()) {
        Some("万") => 10_000.0,
        Some("亿") => 100_000_000.0,
        _ => 1.0,
    };
    (value * multiplier).round() as u64
}

/// Reads the IP location from the status lookup response
///
/// The endpoint answers `{"region_name": "发布于 北京", ...}`; only the last
/// word is kept. Anything unexpected yields an empty string.
pub fn parse_ip_location(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("region_name")?
                .as_str()?
                .split_whitespace()
                .last()
                .map(str::to_string)
        })
        .unwrap_or_default()
}
