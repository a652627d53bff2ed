use std::fmt;

/// Tallies collected over one crawl run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlCounters {
    /// Scopes whose first page was fetched
    pub scopes_planned: u64,
    pub empty_scopes: u64,
    pub time_splits: u64,
    pub region_splits: u64,
    pub sub_region_splits: u64,
    /// Scopes walked page by page
    pub leaves: u64,
    /// Leaves walked although still over the threshold
    pub lossy_leaves: u64,
    pub pages_walked: u64,
    /// Records newly stored by the sink
    pub posts_emitted: u64,
    /// Records the sink already had
    pub duplicates: u64,
}

impl CrawlCounters {
    /// Requests issued for result pages
    pub fn requests(&self) -> u64 {
        // The first page of a walked leaf is the one fetched while planning.
        self.scopes_planned + self.pages_walked - self.leaves.min(self.pages_walked)
    }
}

impl fmt::Display for CrawlCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scopes planned:     {}", self.scopes_planned)?;
        writeln!(f, "  Empty:            {}", self.empty_scopes)?;
        writeln!(f, "  Split by time:    {}", self.time_splits)?;
        writeln!(f, "  Split by region:  {}", self.region_splits)?;
        writeln!(f, "  Split by city:    {}", self.sub_region_splits)?;
        writeln!(f, "  Walked:           {}", self.leaves)?;
        writeln!(f, "  Walked (lossy):   {}", self.lossy_leaves)?;
        writeln!(f, "Pages walked:       {}", self.pages_walked)?;
        writeln!(f, "Result requests:    {}", self.requests())?;
        writeln!(f, "Posts stored:       {}", self.posts_emitted)?;
        write!(f, "Already stored:     {}", self.duplicates)
    }
}
