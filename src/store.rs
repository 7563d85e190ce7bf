//! Storage and fetch seams.
//!
//! The core never talks to a network or database directly; layouts,
//! templates, fonts and images arrive through these traits. Transport is a
//! collaborator concern.

use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::{
    error::{CartazError, CartazResult},
    format::OutputFormat,
    model::Layout,
};

/// Background image URL for one format of a template.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TemplateFormat {
    pub format_name: OutputFormat,
    pub image_url: String,
}

/// A stored template: one background image per supported format.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TemplateRecord {
    pub template_id: String,
    pub formats: Vec<TemplateFormat>,
}

impl TemplateRecord {
    pub fn image_url_for(&self, format: OutputFormat) -> Option<&str> {
        self.formats
            .iter()
            .find(|f| f.format_name == format)
            .map(|f| f.image_url.as_str())
    }
}

/// Layout/template persistence collaborator.
///
/// `save_layout` upserts keyed by `(template_id, format_name)`.
pub trait LayoutStore: Send + Sync {
    fn get_layout(&self, template_id: &str, format: OutputFormat)
    -> CartazResult<Option<Layout>>;
    fn save_layout(&self, layout: &Layout) -> CartazResult<()>;
    fn get_template(&self, template_id: &str) -> CartazResult<Option<TemplateRecord>>;
}

/// Byte-fetch collaborator for fonts and images.
///
/// Implementations must respect `timeout` as an upper bound; a slow source
/// degrades to a resource error rather than hanging a render.
pub trait ByteFetcher: Send + Sync {
    fn fetch(&self, url: &str, timeout: Duration) -> CartazResult<Vec<u8>>;
}

/// In-memory store used by tests and the CLI.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    layouts: HashMap<(String, OutputFormat), Layout>,
    templates: HashMap<String, TemplateRecord>,
    layout_fetches: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_template(&self, template: TemplateRecord) {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.templates.insert(template.template_id.clone(), template);
    }

    /// Number of layout reads that reached the store (cache misses included).
    pub fn layout_fetch_count(&self) -> u64 {
        self.inner.lock().expect("memory store poisoned").layout_fetches
    }
}

impl LayoutStore for MemoryStore {
    fn get_layout(
        &self,
        template_id: &str,
        format: OutputFormat,
    ) -> CartazResult<Option<Layout>> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.layout_fetches += 1;
        Ok(inner
            .layouts
            .get(&(template_id.to_string(), format))
            .cloned())
    }

    fn save_layout(&self, layout: &Layout) -> CartazResult<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.layouts.insert(
            (layout.template_id.clone(), layout.format_name),
            layout.clone(),
        );
        Ok(())
    }

    fn get_template(&self, template_id: &str) -> CartazResult<Option<TemplateRecord>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.templates.get(template_id).cloned())
    }
}

/// Filesystem-backed fetcher; URLs are paths relative to a root directory.
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Normalize a relative source path: `/` separators, no `.` segments,
    /// no absolute paths or parent traversals.
    pub fn normalize_source(source: &str) -> CartazResult<String> {
        let s = source.replace('\\', "/");
        if s.starts_with('/') {
            return Err(CartazError::validation("asset paths must be relative"));
        }
        if s.is_empty() {
            return Err(CartazError::validation("asset path must be non-empty"));
        }

        let mut out = Vec::<&str>::new();
        for part in s.split('/') {
            if part.is_empty() || part == "." {
                continue;
            }
            if part == ".." {
                return Err(CartazError::validation("asset paths must not contain '..'"));
            }
            out.push(part);
        }

        if out.is_empty() {
            return Err(CartazError::validation("asset path must contain a file name"));
        }

        Ok(out.join("/"))
    }
}

impl ByteFetcher for FsFetcher {
    fn fetch(&self, url: &str, _timeout: Duration) -> CartazResult<Vec<u8>> {
        let rel = Self::normalize_source(url)?;
        let path = self.root.join(rel);
        std::fs::read(&path)
            .map_err(|e| CartazError::resource(format!("read '{}': {e}", path.display())))
    }
}

/// Map-backed fetcher for tests and embedded assets.
#[derive(Default)]
pub struct MemoryFetcher {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.entries
            .lock()
            .expect("memory fetcher poisoned")
            .insert(url.into(), bytes);
    }
}

impl ByteFetcher for MemoryFetcher {
    fn fetch(&self, url: &str, _timeout: Duration) -> CartazResult<Vec<u8>> {
        self.entries
            .lock()
            .expect("memory fetcher poisoned")
            .get(url)
            .cloned()
            .ok_or_else(|| CartazError::resource(format!("no bytes for '{url}'")))
    }
}

const LAYOUT_CACHE_TTL: Duration = Duration::from_secs(600);
const LAYOUT_CACHE_CAPACITY: usize = 64;

struct CacheEntry {
    layout: Option<Layout>,
    stored_at: Instant,
}

/// Bounded, time-boxed cache of fetched layouts.
///
/// Keys are xxh3 of `(template_id, format)`. Entries expire after ten
/// minutes; past capacity the oldest entry is evicted.
struct LayoutCacheInner {
    entries: HashMap<u64, CacheEntry>,
    order: VecDeque<u64>,
    capacity: usize,
    ttl: Duration,
}

impl LayoutCacheInner {
    fn key(template_id: &str, format: OutputFormat) -> u64 {
        let mut buf = Vec::with_capacity(template_id.len() + 16);
        buf.extend_from_slice(template_id.as_bytes());
        buf.push(0);
        buf.extend_from_slice(format.wire_name().as_bytes());
        xxhash_rust::xxh3::xxh3_64(&buf)
    }

    fn get(&mut self, template_id: &str, format: OutputFormat) -> Option<Option<Layout>> {
        let key = Self::key(template_id, format);
        let entry = self.entries.get(&key)?;
        if entry.stored_at.elapsed() > self.ttl {
            self.entries.remove(&key);
            self.order.retain(|k| *k != key);
            return None;
        }
        Some(entry.layout.clone())
    }

    fn insert(&mut self, template_id: &str, format: OutputFormat, layout: Option<Layout>) {
        let key = Self::key(template_id, format);
        if self.entries.insert(
            key,
            CacheEntry {
                layout,
                stored_at: Instant::now(),
            },
        ).is_none()
        {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.entries.remove(&old);
            }
        }
    }

    fn invalidate(&mut self, template_id: &str, format: OutputFormat) {
        let key = Self::key(template_id, format);
        self.entries.remove(&key);
        self.order.retain(|k| *k != key);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Caching front for a [`LayoutStore`].
///
/// `get_layout` with `force_refresh` bypasses the cache entirely (and
/// refreshes it); `save_layout` invalidates the written key so the next
/// read observes the stored value.
pub struct CachedLayouts<S: LayoutStore> {
    store: S,
    cache: Mutex<LayoutCacheInner>,
}

impl<S: LayoutStore> CachedLayouts<S> {
    pub fn new(store: S) -> Self {
        Self::with_limits(store, LAYOUT_CACHE_CAPACITY, LAYOUT_CACHE_TTL)
    }

    pub fn with_limits(store: S, capacity: usize, ttl: Duration) -> Self {
        Self {
            store,
            cache: Mutex::new(LayoutCacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
                ttl,
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn get_layout(
        &self,
        template_id: &str,
        format: OutputFormat,
        force_refresh: bool,
    ) -> CartazResult<Option<Layout>> {
        if !force_refresh
            && let Some(cached) = self
                .cache
                .lock()
                .expect("layout cache poisoned")
                .get(template_id, format)
        {
            return Ok(cached);
        }

        let fresh = self.store.get_layout(template_id, format)?;
        self.cache
            .lock()
            .expect("layout cache poisoned")
            .insert(template_id, format, fresh.clone());
        Ok(fresh)
    }

    pub fn save_layout(&self, layout: &Layout) -> CartazResult<()> {
        self.store.save_layout(layout)?;
        self.cache
            .lock()
            .expect("layout cache poisoned")
            .invalidate(&layout.template_id, layout.format_name);
        Ok(())
    }

    pub fn get_template(&self, template_id: &str) -> CartazResult<Option<TemplateRecord>> {
        self.store.get_template(template_id)
    }

    pub fn clear_cache(&self) {
        self.cache.lock().expect("layout cache poisoned").clear();
    }
}
