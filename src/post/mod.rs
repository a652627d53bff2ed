//! Post records extracted from result pages

mod dates;

pub use dates::{site_now, standardize_date};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Author verification badge shown next to the avatar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationTier {
    #[default]
    Ordinary,
    Blue,
    Yellow,
    Orange,
    Gold,
}

impl VerificationTier {
    /// Maps the badge's SVG id to a tier
    pub fn from_badge_id(id: &str) -> Self {
        match id {
            "woo_svg_vblue" => Self::Blue,
            "woo_svg_vyellow" => Self::Yellow,
            "woo_svg_vorange" => Self::Orange,
            "woo_svg_vgold" => Self::Gold,
            _ => Self::Ordinary,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::Blue => "blue",
            Self::Yellow => "yellow",
            Self::Orange => "orange",
            Self::Gold => "gold",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "ordinary" => Some(Self::Ordinary),
            "blue" => Some(Self::Blue),
            "yellow" => Some(Self::Yellow),
            "orange" => Some(Self::Orange),
            "gold" => Some(Self::Gold),
            _ => None,
        }
    }
}

/// One post as shown on a search result page
///
/// A record's identity is its `id`. When the post reposts another one,
/// `origin_post_id` names the embedded original, which is emitted as its own
/// record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: String,
    pub bid: String,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub article_url: String,
    pub topics: Vec<String>,
    pub mentioned_users: Vec<String>,
    pub repost_count: u64,
    pub comment_count: u64,
    pub like_count: u64,
    pub created_at: Option<NaiveDateTime>,
    pub source_client: String,
    pub image_urls: Vec<String>,
    pub video_url: String,
    pub origin_post_id: Option<String>,
    /// Place tag written inside the text, separated out during extraction
    pub position: String,
    pub ip_location: String,
    pub author_verification_tier: VerificationTier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_ids() {
        assert_eq!(
            VerificationTier::from_badge_id("woo_svg_vblue"),
            VerificationTier::Blue
        );
        assert_eq!(
            VerificationTier::from_badge_id("woo_svg_vgold"),
            VerificationTier::Gold
        );
        assert_eq!(
            VerificationTier::from_badge_id("something_else"),
            VerificationTier::Ordinary
        );
    }

    #[test]
    fn test_tier_db_strings() {
        for tier in [
            VerificationTier::Ordinary,
            VerificationTier::Blue,
            VerificationTier::Yellow,
            VerificationTier::Orange,
            VerificationTier::Gold,
        ] {
            assert_eq!(VerificationTier::from_db_string(tier.to_db_string()), Some(tier));
        }
        assert_eq!(VerificationTier::from_db_string("purple"), None);
    }
}
