//! Per-keyword CSV export
//!
//! Writes every stored post found under a keyword to
//! `<dir>/<keyword>/<keyword>.csv`, one row per post, with the column layout
//! downstream spreadsheet and import scripts expect.

use crate::post::{PostRecord, VerificationTier};
use crate::storage::Storage;
use crate::SieveError;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Byte order mark so spreadsheet programs detect UTF-8
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    bid: &'a str,
    user_id: &'a str,
    #[serde(rename = "用户昵称")]
    author_name: &'a str,
    #[serde(rename = "微博正文")]
    text: &'a str,
    #[serde(rename = "头条文章url")]
    article_url: &'a str,
    #[serde(rename = "发布位置")]
    position: &'a str,
    #[serde(rename = "艾特用户")]
    mentioned_users: String,
    #[serde(rename = "话题")]
    topics: String,
    #[serde(rename = "转发数")]
    repost_count: u64,
    #[serde(rename = "评论数")]
    comment_count: u64,
    #[serde(rename = "点赞数")]
    like_count: u64,
    #[serde(rename = "发布时间")]
    created_at: String,
    #[serde(rename = "发布工具")]
    source_client: &'a str,
    #[serde(rename = "微博图片url")]
    image_urls: String,
    #[serde(rename = "微博视频url")]
    video_url: &'a str,
    retweet_id: &'a str,
    ip: &'a str,
    user_authentication: &'static str,
}

impl<'a> From<&'a PostRecord> for CsvRow<'a> {
    fn from(post: &'a PostRecord) -> Self {
        Self {
            id: &post.id,
            bid: &post.bid,
            user_id: &post.author_id,
            author_name: &post.author_name,
            text: &post.text,
            article_url: &post.article_url,
            position: &post.position,
            mentioned_users: post.mentioned_users.join(","),
            topics: post.topics.join(","),
            repost_count: post.repost_count,
            comment_count: post.comment_count,
            like_count: post.like_count,
            created_at: post
                .created_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            source_client: &post.source_client,
            image_urls: post.image_urls.join(","),
            video_url: &post.video_url,
            retweet_id: post.origin_post_id.as_deref().unwrap_or_default(),
            ip: &post.ip_location,
            user_authentication: authentication_label(post.author_verification_tier),
        }
    }
}

fn authentication_label(tier: VerificationTier) -> &'static str {
    match tier {
        VerificationTier::Ordinary => "普通用户",
        VerificationTier::Blue => "蓝V",
        VerificationTier::Yellow => "黄V",
        VerificationTier::Orange => "红V",
        VerificationTier::Gold => "金V",
    }
}

/// Keywords become directory and file names; path separators are replaced
fn file_stem(keyword: &str) -> String {
    keyword
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

/// Writes one keyword's posts to a CSV file
///
/// # Arguments
///
/// * `posts` - The posts to write, in row order
/// * `output_path` - Path of the CSV file; an existing file is replaced
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the file
/// * `Err(SieveError)` - Failed to create or write the file
pub fn write_keyword_csv(posts: &[PostRecord], output_path: &Path) -> Result<(), SieveError> {
    let mut file = File::create(output_path)?;
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    for post in posts {
        writer.serialize(CsvRow::from(post))?;
    }
    writer.flush()?;

    Ok(())
}

/// Exports every keyword in storage to its own CSV file under `dir`
///
/// Returns the written paths in keyword order.
pub fn export_csv(storage: &dyn Storage, dir: &Path) -> Result<Vec<PathBuf>, SieveError> {
    let mut keywords: Vec<String> = storage
        .count_posts_by_keyword()?
        .into_iter()
        .map(|(keyword, _)| keyword)
        .collect();
    keywords.sort();

    let mut written = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        let stem = file_stem(&keyword);
        if stem.is_empty() {
            tracing::warn!(keyword = %keyword, "Skipping keyword with no usable file name");
            continue;
        }

        let posts = storage.get_posts_by_keyword(&keyword)?;
        let keyword_dir = dir.join(&stem);
        fs::create_dir_all(&keyword_dir)?;
        let path = keyword_dir.join(format!("{}.csv", stem));
        write_keyword_csv(&posts, &path)?;

        tracing::info!(keyword = %keyword, rows = posts.len(), path = %path.display(), "Exported CSV");
        written.push(path);
    }

    Ok(written)
}
