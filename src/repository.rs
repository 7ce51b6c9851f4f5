//! Persistence contract for wiki records and templates.

use crate::model::{Wiki, WikiId, WikiTemplate};
use anyhow::{Context, Result};
use regex::RegexBuilder;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Filter and page for record listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WikiQuery<'a> {
    /// Restrict to one template family; `None` lists every type.
    pub wiki_type: Option<&'a str>,
    /// Case-insensitive pattern matched against the code and every
    /// translation title.
    pub search: Option<&'a str>,
    pub page: i64,
    pub limit: i64,
}

impl WikiQuery<'_> {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Whole-record storage. Writes always replace the full record.
pub trait WikiRepository: Send + Sync + 'static {
    /// Insert or replace the template of `template.wiki_type`.
    fn save_template(&self, template: &WikiTemplate) -> impl Future<Output = Result<()>> + Send;

    fn template(&self, wiki_type: &str) -> impl Future<Output = Result<Option<WikiTemplate>>> + Send;

    /// Replace every record of `wiki_type` with `records`. Incoming ids are
    /// ignored and assigned by the store. Returns the number inserted.
    fn replace_all(
        &self,
        wiki_type: &str,
        records: Vec<Wiki>,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// One page of matching records ordered by code, plus the total match count.
    fn list(&self, query: WikiQuery<'_>) -> impl Future<Output = Result<(Vec<Wiki>, i64)>> + Send;

    fn get_by_id(&self, id: WikiId) -> impl Future<Output = Result<Option<Wiki>>> + Send;

    fn get_by_code(
        &self,
        wiki_type: &str,
        code: &str,
    ) -> impl Future<Output = Result<Option<Wiki>>> + Send;

    /// Replace the stored record with the same id. Returns false when no
    /// such record exists.
    fn update(&self, record: &Wiki) -> impl Future<Output = Result<bool>> + Send;
}

#[derive(Debug, Default)]
struct Store {
    next_id: WikiId,
    wikis: BTreeMap<WikiId, Wiki>,
    templates: HashMap<String, WikiTemplate>,
}

/// Process-local repository used by tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryWikiRepository {
    store: RwLock<Store>,
    reject_writes: AtomicBool,
}

impl InMemoryWikiRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, as an unavailable store would.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            anyhow::bail!("store is unavailable");
        }
        Ok(())
    }
}

fn matches_search(wiki: &Wiki, pattern: &regex::Regex) -> bool {
    pattern.is_match(&wiki.code)
        || wiki
            .translation
            .iter()
            .filter_map(|t| t.title.as_deref())
            .any(|title| pattern.is_match(title))
}

impl WikiRepository for InMemoryWikiRepository {
    async fn save_template(&self, template: &WikiTemplate) -> Result<()> {
        self.check_writable()?;
        let mut store = self.store.write().await;
        store
            .templates
            .insert(template.wiki_type.clone(), template.clone());
        Ok(())
    }

    async fn template(&self, wiki_type: &str) -> Result<Option<WikiTemplate>> {
        Ok(self.store.read().await.templates.get(wiki_type).cloned())
    }

    async fn replace_all(&self, wiki_type: &str, records: Vec<Wiki>) -> Result<u64> {
        self.check_writable()?;
        let mut store = self.store.write().await;
        store.wikis.retain(|_, w| w.wiki_type != wiki_type);

        let inserted = records.len() as u64;
        for mut record in records {
            store.next_id += 1;
            record.id = store.next_id;
            store.wikis.insert(record.id, record);
        }
        Ok(inserted)
    }

    async fn list(&self, query: WikiQuery<'_>) -> Result<(Vec<Wiki>, i64)> {
        let pattern = query
            .search
            .filter(|s| !s.is_empty())
            .map(|s| RegexBuilder::new(s).case_insensitive(true).build())
            .transpose()
            .context("Invalid search pattern")?;

        let store = self.store.read().await;
        let mut matching: Vec<&Wiki> = store
            .wikis
            .values()
            .filter(|w| query.wiki_type.map_or(true, |t| w.wiki_type == t))
            .filter(|w| pattern.as_ref().map_or(true, |p| matches_search(w, p)))
            .collect();
        matching.sort_by(|a, b| a.code.cmp(&b.code).then(a.id.cmp(&b.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset().max(0) as usize)
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn get_by_id(&self, id: WikiId) -> Result<Option<Wiki>> {
        Ok(self.store.read().await.wikis.get(&id).cloned())
    }

    async fn get_by_code(&self, wiki_type: &str, code: &str) -> Result<Option<Wiki>> {
        let store = self.store.read().await;
        Ok(store
            .wikis
            .values()
            .find(|w| w.wiki_type == wiki_type && w.code == code)
            .cloned())
    }

    async fn update(&self, record: &Wiki) -> Result<bool> {
        self.check_writable()?;
        let mut store = self.store.write().await;
        match store.wikis.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
