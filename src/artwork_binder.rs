//! The [ArtworkBinder].
//!
//! Artwork is the expensive field, so reuse is size-aware: a cached copy is shown only if it is at least as large as the
//! target wants.  Otherwise the stale copy is evicted and the item is decoded again at the new size.  Results that
//! arrive asynchronously can fade in.
use std::sync::Arc;
use std::time::Duration;

use crate::binder::{Fetched, TargetKey, TaskRegistry};
use crate::*;

pub const DEFAULT_ARTWORK_SIZE: u32 = 512;

#[derive(Debug, Clone, derive_builder::Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ArtworkBinderConfig {
    /// How long fetched artwork takes to fade in.  Zero shows it immediately.
    #[builder(default = "Duration::ZERO")]
    pub fade_in: Duration,
    /// Size to fetch at while the target doesn't know its own size yet.
    #[builder(default = "DEFAULT_ARTWORK_SIZE")]
    pub default_width: u32,
    #[builder(default = "DEFAULT_ARTWORK_SIZE")]
    pub default_height: u32,
}

impl Default for ArtworkBinderConfig {
    fn default() -> ArtworkBinderConfig {
        ArtworkBinderConfig {
            fade_in: Duration::ZERO,
            default_width: DEFAULT_ARTWORK_SIZE,
            default_height: DEFAULT_ARTWORK_SIZE,
        }
    }
}

impl ArtworkBinderConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.default_width == Some(0) || self.default_height == Some(0) {
            return Err("default_width and default_height must be non-zero".into());
        }
        Ok(())
    }
}

pub struct ArtworkBinder {
    ctx: BindContext,
    tasks: TaskRegistry,
    config: ArtworkBinderConfig,
}

impl ArtworkBinder {
    /// Fails if either default dimension is zero, which would make every cached copy look large enough.
    pub fn new(ctx: BindContext, config: ArtworkBinderConfig) -> Result<ArtworkBinder, CacheError> {
        if config.default_width == 0 || config.default_height == 0 {
            return Err(CacheError::ZeroDefaultSize {
                width: config.default_width,
                height: config.default_height,
            });
        }

        Ok(ArtworkBinder {
            ctx,
            tasks: Default::default(),
            config,
        })
    }

    pub fn config(&self) -> &ArtworkBinderConfig {
        &self.config
    }

    /// The size to fetch for `target`.
    fn fetch_size<T: ArtworkTarget>(&self, target: &T) -> (u32, u32) {
        match target.size() {
            (w, h) if w > 0 && h > 0 => (w, h),
            _ => (self.config.default_width, self.config.default_height),
        }
    }

    /// Show `item`'s artwork on `target`, or the default for `None`.  Must be called on the owning thread.
    pub fn bind<T: ArtworkTarget>(&self, target: &Arc<T>, item: Option<&SharedItem>) {
        let key = TargetKey::of(target);
        self.tasks.cancel(key);
        target.set_artwork(None);

        let item = match item {
            Some(i) => i.clone(),
            None => {
                target.set_artwork(self.ctx.defaults.artwork());
                return;
            }
        };

        let (width, height) = self.fetch_size(&**target);
        if let Some(cached) = self.ctx.cache.get_artwork_covering(&item, width, height) {
            target.set_artwork(Some(cached));
            return;
        }

        let fetch = {
            let cache = self.ctx.cache.clone();
            let item = item.clone();
            // The owner already counted the miss.
            move || match cache.peek_artwork_covering(&item, width, height) {
                Some(art) => Fetched::Cached(art),
                None => Fetched::from_read(
                    MetadataKind::Artwork,
                    &item,
                    item.artwork(width, height),
                ),
            }
        };

        let handle = TaskHandle::new();
        let task_id = handle.id();
        let apply = {
            let ctx = self.ctx.clone();
            let target = target.clone();
            let fade_in = self.config.fade_in;
            move |fetched: Fetched<Arc<Artwork>>| {
                match fetched {
                    Fetched::Cached(art) => show_fetched(&*target, art, fade_in),
                    Fetched::Read(art) => {
                        show_fetched(&*target, art.clone(), fade_in);
                        ctx.populate_later(move |cache| {
                            cache.insert_artwork_requested(&item, art, width, height)
                        });
                    }
                    Fetched::Missing => target.set_artwork(ctx.defaults.artwork()),
                }
            }
        };

        let tasks = self.tasks.clone();
        self.tasks.track(key, handle.clone());
        BindTask::with_handle(handle, fetch, apply)
            .on_finish(move || tasks.release(key, task_id))
            .spawn(&*self.ctx.executor, &self.ctx.main);
    }

    /// Cancel the in-flight bind for `target`, if any.  The target keeps whatever it currently shows.
    pub fn cancel<T: ArtworkTarget>(&self, target: &Arc<T>) {
        self.tasks.cancel(TargetKey::of(target));
    }

    pub fn cancel_all(&self) {
        self.tasks.cancel_all();
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}

fn show_fetched<T: ArtworkTarget>(target: &T, art: Arc<Artwork>, fade_in: Duration) {
    target.set_artwork(Some(art));
    if fade_in > Duration::ZERO {
        target.fade_in(fade_in);
    }
}
