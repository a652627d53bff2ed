use std::collections::HashSet;
use url::Url;

/// Page cursor for one leaf scope
///
/// Created when a scope starts walking pages and dropped when the scope is
/// exhausted. Pages already consumed are remembered so a `next` link that
/// points back into the walk ends it instead of looping.
#[derive(Debug, Clone)]
pub struct CrawlProgress {
    cursor: Option<Url>,
    pages_consumed: u32,
    visited: HashSet<Url>,
}

impl CrawlProgress {
    /// Starts a walk whose first page has already been fetched
    pub fn starting_at(first_page: &Url) -> Self {
        let mut visited = HashSet::new();
        visited.insert(first_page.clone());
        Self {
            cursor: None,
            pages_consumed: 1,
            visited,
        }
    }

    /// URL of the next page to fetch, if any
    pub fn cursor(&self) -> Option<&Url> {
        self.cursor.as_ref()
    }

    pub fn pages_consumed(&self) -> u32 {
        self.pages_consumed
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_none()
    }

    /// Points the cursor at the next page announced by the current one
    ///
    /// Returns false, leaving the walk exhausted, when the link leads back
    /// to a page this walk has already consumed.
    pub fn advance_to(&mut self, next: Option<Url>) -> bool {
        match next {
            Some(url) if self.visited.contains(&url) => {
                self.cursor = None;
                false
            }
            other => {
                self.cursor = other;
                true
            }
        }
    }

    /// Marks the page under the cursor as consumed
    pub fn consume(&mut self) {
        if let Some(url) = self.cursor.take() {
            self.visited.insert(url);
            self.pages_consumed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32) -> Url {
        Url::parse(&format!("https://s.weibo.com/weibo?q=a&page={}", n)).unwrap()
    }

    #[test]
    fn test_first_page_counts_as_consumed() {
        let progress = CrawlProgress::starting_at(&page(1));
        assert_eq!(progress.pages_consumed(), 1);
        assert!(progress.is_exhausted());
    }

    #[test]
    fn test_walks_forward() {
        let mut progress = CrawlProgress::starting_at(&page(1));
        assert!(progress.advance_to(Some(page(2))));
        assert_eq!(progress.cursor(), Some(&page(2)));

        progress.consume();
        assert_eq!(progress.pages_consumed(), 2);
        assert!(progress.advance_to(None));
        assert!(progress.is_exhausted());
    }

    #[test]
    fn test_refuses_to_revisit_a_page() {
        let mut progress = CrawlProgress::starting_at(&page(1));
        assert!(progress.advance_to(Some(page(2))));
        progress.consume();

        assert!(!progress.advance_to(Some(page(1))));
        assert!(progress.is_exhausted());
        assert_eq!(progress.pages_consumed(), 2);
    }
}
