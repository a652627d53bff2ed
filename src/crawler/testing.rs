//! In-process fetcher and sink used by crawler tests

use crate::crawler::fetcher::{FetchError, FetchedPage, PageFetcher};
use crate::post::PostRecord;
use crate::scope::QueryScope;
use crate::storage::{EmitOutcome, PostSink, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use url::Url;

enum Reply {
    Body(String),
    Error(FetchError),
}

/// Answers requests by matching their query parameters against rules
///
/// Rules are tried in the order they were added; a request matching no rule
/// gets the default body.
pub struct ScriptedFetcher {
    rules: Vec<(Vec<(String, String)>, Reply)>,
    default_body: String,
    requests: Mutex<Vec<Url>>,
}

impl ScriptedFetcher {
    pub fn new(default_body: String) -> Self {
        Self {
            rules: Vec::new(),
            default_body,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Serves `body` to requests carrying all of `params`
    pub fn respond(mut self, params: &[(&str, &str)], body: String) -> Self {
        self.rules.push((owned(params), Reply::Body(body)));
        self
    }

    /// Fails requests carrying all of `params`
    pub fn fail(mut self, params: &[(&str, &str)], error: FetchError) -> Self {
        self.rules.push((owned(params), Reply::Error(error)));
        self
    }

    /// Every URL requested so far, in order
    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().unwrap().clone()
    }
}

fn owned(params: &[(&str, &str)]) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        self.requests.lock().unwrap().push(url.clone());
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

        let reply = self.rules.iter().find_map(|(params, reply)| {
            params
                .iter()
                .all(|(k, v)| query.get(k) == Some(v))
                .then_some(reply)
        });

        match reply {
            Some(Reply::Error(error)) => Err(error.clone()),
            Some(Reply::Body(body)) => Ok(page(url, body)),
            None => Ok(page(url, &self.default_body)),
        }
    }
}

fn page(url: &Url, body: &str) -> FetchedPage {
    FetchedPage {
        url: url.clone(),
        status_code: 200,
        body: body.to_string(),
    }
}

/// Sink keeping records in memory, keyed by id like the real one
#[derive(Default)]
pub struct MemorySink {
    pub records: Vec<(PostRecord, String)>,
    pub leaves: Vec<(QueryScope, u32, bool)>,
    seen: HashSet<String>,
    reject: Option<String>,
}

impl MemorySink {
    /// A sink that fails when asked to store the post `id`
    pub fn rejecting(id: &str) -> Self {
        Self {
            reject: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.iter().map(|(r, _)| r.id.clone()).collect()
    }
}

impl PostSink for MemorySink {
    fn emit(&mut self, record: &PostRecord, keyword: &str) -> StorageResult<EmitOutcome> {
        if self.reject.as_deref() == Some(record.id.as_str()) {
            return Err(StorageError::Database("disk full".to_string()));
        }
        if !self.seen.insert(record.id.clone()) {
            return Ok(EmitOutcome::Duplicate);
        }
        self.records.push((record.clone(), keyword.to_string()));
        Ok(EmitOutcome::Inserted)
    }

    fn record_leaf(&mut self, scope: &QueryScope, pages: u32, lossy: bool) -> StorageResult<()> {
        self.leaves.push((scope.clone(), pages, lossy));
        Ok(())
    }
}
