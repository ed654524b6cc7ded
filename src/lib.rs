//! Metadata caching and asynchronous binding for widgets which display media library items.
//!
//! Lists of songs scroll fast, and reading a title or decoding cover art from a tagged file is slow.  Reading the same
//! things over and over is wasteful, while a plain map of items to values just grows forever.  This crate provides the
//! two pieces that sit between a library and its widgets:
//!
//! [MetadataCache] holds titles, subtitles, and artwork in three independent LRU mappings, each with its own byte
//! budget, so that a handful of large images can't push out thousands of cheap strings.  It is built on
//! [CostBasedLru], a standard Lru cache which supports giving each item a cost, exposed because it's useful in other
//! contexts.
//!
//! The binders ([TitleBinder], [SubtitleBinder], [ArtworkBinder]) show an item's value on a target:
//!
//! - A bind first cancels whatever bind was in flight for the same target, then blanks the target, so stale data from
//!   a recycled row is never visible.
//! - If the cache has the value, it is shown immediately.
//! - Otherwise the item is read by a job on an [Executor], and the result is handed back to the thread which owns the
//!   targets through its [MainQueue].  Failures and missing values show the [DisplayableDefaults] instead.
//! - Values read from the item are written into the cache by a separate job afterwards.
//!
//! To use this crate, implement [LibraryItem] for your items and the target traits for your widgets, then build a
//! [BindContext] from a [MetadataCache], your defaults, an [Executor] such as [WorkerPool], and a [MainHandle].
mod artwork;
mod artwork_binder;
mod binder;
mod cost_based_lru;
mod defaults;
mod error;
mod estimate_cost;
mod executor;
mod item;
mod main_queue;
mod metadata_cache;
mod task;
mod text_binder;
mod traits;

#[cfg(test)]
mod test_support;

pub use artwork::*;
pub use artwork_binder::*;
pub use binder::BindContext;
pub use cost_based_lru::*;
pub use defaults::*;
pub use error::*;
pub use estimate_cost::*;
pub use executor::*;
pub use item::*;
pub use main_queue::*;
pub use metadata_cache::*;
pub use task::*;
pub use text_binder::*;
pub use traits::*;
