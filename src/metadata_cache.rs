//! The [MetadataCache] holds titles, subtitles, and artwork for library items in three independent byte-budgeted LRU
//! mappings.
//!
//! Text entries are tiny and artwork entries are huge, so each mapping gets its own budget and its own recency order:
//! evicting, removing, or clearing in one mapping never touches the others.
//!
//! Entries are keyed by item identity (see [ItemRef]).  Every mapping sits behind its own mutex, so background jobs may
//! populate the cache concurrently.  Concurrent `cache_*` reads of the same field of the same item are serialized so
//! that `only_if_absent` reads the item at most once.
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::*;

pub const DEFAULT_TEXT_CAPACITY: u64 = 64 * 1024;
pub const DEFAULT_ARTWORK_CAPACITY: u64 = 16 * 1024 * 1024;

/// Which of the three mappings something refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    Title,
    Subtitle,
    Artwork,
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetadataKind::Title => "titles",
            MetadataKind::Subtitle => "subtitles",
            MetadataKind::Artwork => "artwork",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, derive_builder::Builder)]
pub struct MetadataCacheConfig {
    /// Maximum cost of the title mapping in bytes.
    #[builder(default = "DEFAULT_TEXT_CAPACITY")]
    pub title_capacity: u64,
    /// Maximum cost of the subtitle mapping in bytes.
    #[builder(default = "DEFAULT_TEXT_CAPACITY")]
    pub subtitle_capacity: u64,
    /// Maximum cost of the artwork mapping in bytes.
    #[builder(default = "DEFAULT_ARTWORK_CAPACITY")]
    pub artwork_capacity: u64,
}

impl Default for MetadataCacheConfig {
    fn default() -> MetadataCacheConfig {
        MetadataCacheConfig {
            title_capacity: DEFAULT_TEXT_CAPACITY,
            subtitle_capacity: DEFAULT_TEXT_CAPACITY,
            artwork_capacity: DEFAULT_ARTWORK_CAPACITY,
        }
    }
}

/// A snapshot of one mapping's bookkeeping.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    /// Bytes currently held.
    pub cost: u64,
    pub capacity: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// One of the three mappings.
struct Mapping<V> {
    kind: MetadataKind,
    lru: Mutex<CostBasedLru<ItemRef, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: EstimateCost> Mapping<V> {
    fn new(kind: MetadataKind, capacity: u64) -> Result<Mapping<V>, CacheError> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity { kind });
        }

        Ok(Mapping {
            kind,
            lru: Mutex::new(CostBasedLru::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    fn record_lookup(&self, found: bool) {
        let counter = if found { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self, key: &ItemRef) -> Option<Arc<V>> {
        let found = self.lru.lock().get(key);
        self.record_lookup(found.is_some());
        found
    }

    /// Look without counting a lookup or refreshing recency.
    fn peek(&self, key: &ItemRef) -> Option<Arc<V>> {
        self.lru.lock().peek(key)
    }

    /// Find the entry if `keep` accepts it.  A rejected entry is removed in the same critical section, so a newer entry
    /// written concurrently is never the one thrown away.
    fn find_or_discard(
        &self,
        key: &ItemRef,
        refresh: bool,
        keep: impl FnOnce(&V) -> bool,
    ) -> Option<Arc<V>> {
        let mut guard = self.lru.lock();
        let found = if refresh {
            guard.get(key)
        } else {
            guard.peek(key)
        };
        match found {
            Some(v) => {
                if keep(&*v) {
                    Some(v)
                } else {
                    guard.remove(key);
                    None
                }
            }
            None => None,
        }
    }

    fn get_or_discard(&self, key: &ItemRef, keep: impl FnOnce(&V) -> bool) -> Option<Arc<V>> {
        let found = self.find_or_discard(key, true, keep);
        self.record_lookup(found.is_some());
        found
    }

    fn peek_or_discard(&self, key: &ItemRef, keep: impl FnOnce(&V) -> bool) -> Option<Arc<V>> {
        self.find_or_discard(key, false, keep)
    }

    fn contains(&self, key: &ItemRef) -> bool {
        self.lru.lock().contains(key)
    }

    fn insert(&self, key: ItemRef, value: Arc<V>) {
        let cost = value.estimate_cost();
        let outcome = self.lru.lock().insert(key.clone(), value, cost);
        if outcome.evicted > 0 {
            self.evictions
                .fetch_add(outcome.evicted as u64, Ordering::Relaxed);
            debug!(
                kind = %self.kind,
                evicted = outcome.evicted,
                "evicted least recently used entries"
            );
        }
        if !outcome.retained {
            debug!(
                kind = %self.kind,
                item = ?key,
                cost,
                "entry is larger than the whole mapping; not cached"
            );
        }
    }

    fn remove(&self, key: &ItemRef) {
        self.lru.lock().remove(key);
    }

    fn clear(&self) {
        self.lru.lock().clear();
    }

    fn stats(&self) -> CacheStats {
        let guard = self.lru.lock();
        CacheStats {
            entries: guard.len(),
            cost: guard.current_cost(),
            capacity: guard.max_cost(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Cached artwork plus the size it was decoded for.
///
/// Items may hand back something smaller than asked for (the embedded picture is only so big).  Such a copy is still
/// the best the item can do at any size up to the request, so it counts as covering that.
struct ArtworkEntry {
    artwork: Arc<Artwork>,
    requested_width: u32,
    requested_height: u32,
}

impl ArtworkEntry {
    fn covers(&self, width: u32, height: u32) -> bool {
        self.artwork.covers(width, height)
            || (self.requested_width >= width && self.requested_height >= height)
    }
}

impl EstimateCost for ArtworkEntry {
    fn estimate_cost(&self) -> u64 {
        self.artwork.estimate_cost()
    }
}

type FetchGuards = HashMap<(MetadataKind, ItemRef), Arc<Mutex<()>>, ahash::RandomState>;

pub struct MetadataCache {
    titles: Mapping<String>,
    subtitles: Mapping<String>,
    artwork: Mapping<ArtworkEntry>,
    /// Mutexes that stop multiple threads reading the same field of the same item.
    fetch_guards: Mutex<FetchGuards>,
}

impl MetadataCache {
    pub fn new(config: MetadataCacheConfig) -> Result<MetadataCache, CacheError> {
        Ok(MetadataCache {
            titles: Mapping::new(MetadataKind::Title, config.title_capacity)?,
            subtitles: Mapping::new(MetadataKind::Subtitle, config.subtitle_capacity)?,
            artwork: Mapping::new(MetadataKind::Artwork, config.artwork_capacity)?,
            fetch_guards: Default::default(),
        })
    }

    /// Read one field from `item` into `mapping`, holding the per-field guard for the duration of the read.
    fn populate<V: EstimateCost>(
        &self,
        mapping: &Mapping<V>,
        item: &SharedItem,
        only_if_absent: bool,
        read: impl FnOnce(&dyn LibraryItem) -> Result<Option<Arc<V>>, ReadError>,
    ) {
        let key = ItemRef::new(item);
        if only_if_absent && mapping.contains(&key) {
            return;
        }

        let guard_key = (mapping.kind, key.clone());
        let guard = {
            let mut guards = self.fetch_guards.lock();
            guards
                .entry(guard_key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        {
            let _held = guard.lock();
            // Someone may have finished the read while we waited.
            if !(only_if_absent && mapping.contains(&key)) {
                match read(&**item) {
                    Ok(Some(value)) => mapping.insert(key, value),
                    Ok(None) => debug!(kind = %mapping.kind, item = ?key, "item has no value"),
                    Err(e) => {
                        warn!(kind = %mapping.kind, item = ?key, error = %e, "could not read item")
                    }
                }
            }
        }

        // Nobody can clone the guard without holding the map lock, so a count of one means nobody is waiting on it.
        let mut guards = self.fetch_guards.lock();
        drop(guard);
        if guards
            .get(&guard_key)
            .map_or(false, |g| Arc::strong_count(g) == 1)
        {
            guards.remove(&guard_key);
        }
    }

    /// Read the title from `item` and cache it.
    ///
    /// Failures and missing titles store nothing.  With `only_if_absent`, an item which already has a cached title
    /// isn't read at all.
    pub fn cache_title(&self, item: &SharedItem, only_if_absent: bool) {
        self.populate(&self.titles, item, only_if_absent, |i| {
            i.title().map(|t| t.map(Arc::new))
        });
    }

    /// Read the subtitle from `item` and cache it.  See [MetadataCache::cache_title].
    pub fn cache_subtitle(&self, item: &SharedItem, only_if_absent: bool) {
        self.populate(&self.subtitles, item, only_if_absent, |i| {
            i.subtitle().map(|t| t.map(Arc::new))
        });
    }

    /// Read artwork decoded at `preferred_width` x `preferred_height` from `item` and cache it.  See
    /// [MetadataCache::cache_title].
    pub fn cache_artwork(
        &self,
        item: &SharedItem,
        only_if_absent: bool,
        preferred_width: u32,
        preferred_height: u32,
    ) {
        self.populate(&self.artwork, item, only_if_absent, |i| {
            let read = i.artwork(preferred_width, preferred_height)?;
            Ok(read.map(|artwork| {
                Arc::new(ArtworkEntry {
                    artwork,
                    requested_width: preferred_width,
                    requested_height: preferred_height,
                })
            }))
        });
    }

    /// Store a title which was already read.
    pub fn insert_title(&self, item: &SharedItem, title: impl Into<Arc<String>>) {
        self.titles.insert(ItemRef::new(item), title.into());
    }

    pub fn insert_subtitle(&self, item: &SharedItem, subtitle: impl Into<Arc<String>>) {
        self.subtitles.insert(ItemRef::new(item), subtitle.into());
    }

    /// Store artwork which was already read, as if it had been requested at its own size.
    pub fn insert_artwork(&self, item: &SharedItem, artwork: Arc<Artwork>) {
        let (width, height) = (artwork.width(), artwork.height());
        self.insert_artwork_requested(item, artwork, width, height);
    }

    /// Store artwork which was read for a request of `width` x `height`.  Later requests up to that size are served
    /// from this copy even when the item returned something smaller.
    pub fn insert_artwork_requested(
        &self,
        item: &SharedItem,
        artwork: Arc<Artwork>,
        width: u32,
        height: u32,
    ) {
        let entry = ArtworkEntry {
            artwork,
            requested_width: width,
            requested_height: height,
        };
        self.artwork.insert(ItemRef::new(item), Arc::new(entry));
    }

    pub fn get_title(&self, item: &SharedItem) -> Option<Arc<String>> {
        self.titles.get(&ItemRef::new(item))
    }

    pub fn get_subtitle(&self, item: &SharedItem) -> Option<Arc<String>> {
        self.subtitles.get(&ItemRef::new(item))
    }

    pub fn get_artwork(&self, item: &SharedItem) -> Option<Arc<Artwork>> {
        self.artwork
            .get(&ItemRef::new(item))
            .map(|e| e.artwork.clone())
    }

    /// Like [MetadataCache::get_title], but neither refreshes recency nor counts towards the stats.  For rechecking
    /// after a lookup that was already counted.
    pub fn peek_title(&self, item: &SharedItem) -> Option<Arc<String>> {
        self.titles.peek(&ItemRef::new(item))
    }

    pub fn peek_subtitle(&self, item: &SharedItem) -> Option<Arc<String>> {
        self.subtitles.peek(&ItemRef::new(item))
    }

    /// Get cached artwork only if it is at least `width` x `height`, or was read for a request at least that large.
    ///
    /// A smaller cached copy would look blurry scaled up, so it is evicted and `None` is returned, leaving the caller
    /// to read the item again at the larger size.
    pub fn get_artwork_covering(
        &self,
        item: &SharedItem,
        width: u32,
        height: u32,
    ) -> Option<Arc<Artwork>> {
        let key = ItemRef::new(item);
        let found = self
            .artwork
            .get_or_discard(&key, |e| e.covers(width, height));
        if found.is_none() {
            debug!(item = ?key, width, height, "no cached artwork large enough");
        }
        found.map(|e| e.artwork.clone())
    }

    /// [MetadataCache::get_artwork_covering] without refreshing recency or counting towards the stats.  A copy that is
    /// too small is still evicted.
    pub fn peek_artwork_covering(
        &self,
        item: &SharedItem,
        width: u32,
        height: u32,
    ) -> Option<Arc<Artwork>> {
        self.artwork
            .peek_or_discard(&ItemRef::new(item), |e| e.covers(width, height))
            .map(|e| e.artwork.clone())
    }

    /// Doesn't count as a use for eviction purposes.
    pub fn contains_title(&self, item: &SharedItem) -> bool {
        self.titles.contains(&ItemRef::new(item))
    }

    pub fn contains_subtitle(&self, item: &SharedItem) -> bool {
        self.subtitles.contains(&ItemRef::new(item))
    }

    pub fn contains_artwork(&self, item: &SharedItem) -> bool {
        self.artwork.contains(&ItemRef::new(item))
    }

    pub fn remove_title(&self, item: &SharedItem) {
        self.titles.remove(&ItemRef::new(item));
    }

    pub fn remove_subtitle(&self, item: &SharedItem) {
        self.subtitles.remove(&ItemRef::new(item));
    }

    pub fn remove_artwork(&self, item: &SharedItem) {
        self.artwork.remove(&ItemRef::new(item));
    }

    pub fn clear_titles(&self) {
        self.titles.clear();
    }

    pub fn clear_subtitles(&self) {
        self.subtitles.clear();
    }

    pub fn clear_artwork(&self) {
        self.artwork.clear();
    }

    pub fn clear_all(&self) {
        self.clear_titles();
        self.clear_subtitles();
        self.clear_artwork();
    }

    pub fn stats(&self, kind: MetadataKind) -> CacheStats {
        match kind {
            MetadataKind::Title => self.titles.stats(),
            MetadataKind::Subtitle => self.subtitles.stats(),
            MetadataKind::Artwork => self.artwork.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{artwork, FakeItem};

    fn build_cache() -> MetadataCache {
        let cfg = MetadataCacheConfigBuilder::default()
            .title_capacity(20)
            .subtitle_capacity(20)
            .artwork_capacity(1000)
            .build()
            .expect("Should build");
        MetadataCache::new(cfg).expect("Capacities are valid")
    }

    #[test]
    fn test_builder_defaults() {
        let cfg = MetadataCacheConfigBuilder::default()
            .build()
            .expect("Should build");
        assert_eq!(cfg.title_capacity, DEFAULT_TEXT_CAPACITY);
        assert_eq!(cfg.subtitle_capacity, DEFAULT_TEXT_CAPACITY);
        assert_eq!(cfg.artwork_capacity, DEFAULT_ARTWORK_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let cfg = MetadataCacheConfig {
            subtitle_capacity: 0,
            ..Default::default()
        };
        match MetadataCache::new(cfg) {
            Err(CacheError::ZeroCapacity { kind }) => assert_eq!(kind, MetadataKind::Subtitle),
            Ok(_) => panic!("Zero capacity should be rejected"),
            Err(e) => panic!("Wrong error: {}", e),
        }
    }

    // Caching one field leaves the other mappings alone.
    #[test]
    fn test_fields_are_independent() {
        let cache = build_cache();
        let item = FakeItem::new("abc", "def").shared();

        cache.cache_title(&item, false);
        assert!(cache.contains_title(&item));
        assert_eq!(cache.get_title(&item).as_deref().map(|s| s.as_str()), Some("abc"));
        assert!(!cache.contains_subtitle(&item));
        assert!(!cache.contains_artwork(&item));

        cache.cache_subtitle(&item, false);
        cache.cache_artwork(&item, false, 4, 4);
        cache.clear_titles();
        assert!(!cache.contains_title(&item));
        assert_eq!(cache.get_subtitle(&item).as_deref().map(|s| s.as_str()), Some("def"));
        assert!(cache.get_artwork(&item).is_some());

        cache.remove_artwork(&item);
        assert!(!cache.contains_artwork(&item));
        assert!(cache.contains_subtitle(&item));
    }

    #[test]
    fn test_only_if_absent_reads_once() {
        let cache = build_cache();
        let item = FakeItem::new("abc", "def").arc();
        let shared: SharedItem = item.clone();

        cache.cache_title(&shared, true);
        cache.cache_title(&shared, true);
        assert_eq!(item.title_reads(), 1);

        // Without the flag we always go back to the item.
        cache.cache_title(&shared, false);
        assert_eq!(item.title_reads(), 2);
    }

    #[test]
    fn test_failures_store_nothing() {
        let cache = build_cache();
        let failing = FakeItem::failing().shared();
        let empty = FakeItem::empty().shared();

        for item in &[failing, empty] {
            cache.cache_title(item, false);
            cache.cache_subtitle(item, false);
            cache.cache_artwork(item, false, 4, 4);
            assert!(!cache.contains_title(item));
            assert!(!cache.contains_subtitle(item));
            assert!(!cache.contains_artwork(item));
        }
    }

    // Equal content is not equal identity.
    #[test]
    fn test_keys_by_identity() {
        let cache = build_cache();
        let a = FakeItem::new("same", "same").shared();
        let b = FakeItem::new("same", "same").shared();

        cache.cache_title(&a, false);
        assert!(cache.contains_title(&a));
        assert!(!cache.contains_title(&b));
    }

    #[test]
    fn test_lru_eviction() {
        let cache = build_cache();
        // Each title is 6 bytes against a budget of 20.
        let items = (0..4)
            .map(|i| FakeItem::new(&format!("title{}", i), "").shared())
            .collect::<Vec<_>>();

        cache.cache_title(&items[0], false);
        cache.cache_title(&items[1], false);
        cache.cache_title(&items[2], false);
        // Touch the oldest so the second one becomes least recently used.
        assert!(cache.get_title(&items[0]).is_some());
        cache.cache_title(&items[3], false);

        assert!(cache.contains_title(&items[0]));
        assert!(!cache.contains_title(&items[1]));
        assert!(cache.contains_title(&items[2]));
        assert!(cache.contains_title(&items[3]));

        let stats = cache.stats(MetadataKind::Title);
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.cost, 18);
        assert_eq!(stats.capacity, 20);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_artwork_covering() {
        let cache = build_cache();
        let item = FakeItem::new("", "").arc();
        let shared: SharedItem = item.clone();

        cache.cache_artwork(&shared, false, 20, 10);
        assert_eq!(item.artwork_reads(), 1);

        let smaller = cache
            .get_artwork_covering(&shared, 10, 10)
            .expect("Cached copy is large enough");
        assert_eq!((smaller.width(), smaller.height()), (20, 10));

        // Taller than what we have: the stale copy goes away.
        assert!(cache.get_artwork_covering(&shared, 20, 11).is_none());
        assert!(!cache.contains_artwork(&shared));
        assert_eq!(item.artwork_reads(), 1);
    }

    #[test]
    fn test_concurrent_population_reads_once() {
        let cache = Arc::new(build_cache());
        let item = FakeItem::new("abc", "def").slow().arc();
        let shared: SharedItem = item.clone();

        let threads = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let shared = shared.clone();
                std::thread::spawn(move || cache.cache_subtitle(&shared, true))
            })
            .collect::<Vec<_>>();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(item.subtitle_reads(), 1);
        assert!(cache.contains_subtitle(&shared));
        assert!(cache.fetch_guards.lock().is_empty());
    }

    #[test]
    fn test_peek_is_not_counted() {
        let cache = build_cache();
        let item = FakeItem::new("abc", "def").shared();

        assert!(cache.peek_title(&item).is_none());
        cache.insert_title(&item, "abc".to_string());
        assert_eq!(cache.peek_title(&item).as_deref().map(|s| s.as_str()), Some("abc"));
        assert!(cache.peek_subtitle(&item).is_none());

        let stats = cache.stats(MetadataKind::Title);
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    #[test]
    fn test_peek_does_not_refresh_recency() {
        let cache = build_cache();
        let items = (0..4)
            .map(|i| FakeItem::new(&format!("title{}", i), "").shared())
            .collect::<Vec<_>>();

        for item in &items[..3] {
            cache.cache_title(item, false);
        }
        assert!(cache.peek_title(&items[0]).is_some());
        cache.cache_title(&items[3], false);

        // Still the oldest, so it went first.
        assert!(!cache.contains_title(&items[0]));
        assert!(cache.contains_title(&items[1]));
    }

    #[test]
    fn test_peek_artwork_covering_discards_small_copies_uncounted() {
        let cache = build_cache();
        let item = FakeItem::new("", "").shared();

        cache.cache_artwork(&item, false, 20, 10);
        assert!(cache.peek_artwork_covering(&item, 10, 10).is_some());
        assert!(cache.peek_artwork_covering(&item, 20, 11).is_none());
        assert!(!cache.contains_artwork(&item));

        let stats = cache.stats(MetadataKind::Artwork);
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    // The item only has a 10x10 picture, so asking again at the same size mustn't decode it again.
    #[test]
    fn test_artwork_smaller_than_requested_still_covers_the_request() {
        let cache = build_cache();
        let item = FakeItem::new("", "").capped(10, 10).arc();
        let shared: SharedItem = item.clone();

        cache.cache_artwork(&shared, false, 20, 20);
        let cached = cache
            .get_artwork_covering(&shared, 20, 20)
            .expect("Best the item can do at this size");
        assert_eq!((cached.width(), cached.height()), (10, 10));
        assert_eq!(item.artwork_reads(), 1);

        // A bigger request may get something better, so the copy goes.
        assert!(cache.get_artwork_covering(&shared, 30, 20).is_none());
        assert!(!cache.contains_artwork(&shared));
    }

    #[test]
    fn test_insert_artwork_requested() {
        let cache = build_cache();
        let item = FakeItem::new("", "").shared();

        cache.insert_artwork_requested(&item, Arc::new(artwork(5, 5)), 16, 16);
        assert!(cache.get_artwork_covering(&item, 16, 16).is_some());
        cache.insert_artwork(&item, Arc::new(artwork(5, 5)));
        assert!(cache.get_artwork_covering(&item, 16, 16).is_none());
    }
}
