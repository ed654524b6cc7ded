//! Binders for the text fields: [TitleBinder] and [SubtitleBinder].
use std::marker::PhantomData;
use std::sync::Arc;

use crate::binder::{Fetched, TargetKey, TaskRegistry};
use crate::*;

/// How a [TextBinder] reaches one text field in the cache, the item, and the defaults.
pub trait TextField: Send + Sync + 'static {
    const KIND: MetadataKind;

    fn cached(cache: &MetadataCache, item: &SharedItem) -> Option<Arc<String>>;

    /// Like `cached`, without counting as a lookup.
    fn peek(cache: &MetadataCache, item: &SharedItem) -> Option<Arc<String>>;

    fn read(item: &dyn LibraryItem) -> Result<Option<String>, ReadError>;

    fn store(cache: &MetadataCache, item: &SharedItem, value: Arc<String>);

    fn default_value(defaults: &dyn DisplayableDefaults) -> Option<String>;
}

pub struct Title;

pub struct Subtitle;

impl TextField for Title {
    const KIND: MetadataKind = MetadataKind::Title;

    fn cached(cache: &MetadataCache, item: &SharedItem) -> Option<Arc<String>> {
        cache.get_title(item)
    }

    fn peek(cache: &MetadataCache, item: &SharedItem) -> Option<Arc<String>> {
        cache.peek_title(item)
    }

    fn read(item: &dyn LibraryItem) -> Result<Option<String>, ReadError> {
        item.title()
    }

    fn store(cache: &MetadataCache, item: &SharedItem, value: Arc<String>) {
        cache.insert_title(item, value);
    }

    fn default_value(defaults: &dyn DisplayableDefaults) -> Option<String> {
        defaults.title()
    }
}

impl TextField for Subtitle {
    const KIND: MetadataKind = MetadataKind::Subtitle;

    fn cached(cache: &MetadataCache, item: &SharedItem) -> Option<Arc<String>> {
        cache.get_subtitle(item)
    }

    fn peek(cache: &MetadataCache, item: &SharedItem) -> Option<Arc<String>> {
        cache.peek_subtitle(item)
    }

    fn read(item: &dyn LibraryItem) -> Result<Option<String>, ReadError> {
        item.subtitle()
    }

    fn store(cache: &MetadataCache, item: &SharedItem, value: Arc<String>) {
        cache.insert_subtitle(item, value);
    }

    fn default_value(defaults: &dyn DisplayableDefaults) -> Option<String> {
        defaults.subtitle()
    }
}

/// Binds one text field of library items to [TextTarget]s.
///
/// A bind first blanks the target.  A cached value is then shown immediately; otherwise the item is read on the
/// executor and the result (or the default, if there is none) is shown once the owning thread runs its [MainQueue].
pub struct TextBinder<F> {
    ctx: BindContext,
    tasks: TaskRegistry,
    _field: PhantomData<fn() -> F>,
}

pub type TitleBinder = TextBinder<Title>;

pub type SubtitleBinder = TextBinder<Subtitle>;

fn show_default<F: TextField, T: TextTarget>(ctx: &BindContext, target: &T) {
    target.set_text(F::default_value(&*ctx.defaults).as_deref());
}

impl<F: TextField> TextBinder<F> {
    pub fn new(ctx: BindContext) -> TextBinder<F> {
        TextBinder {
            ctx,
            tasks: Default::default(),
            _field: PhantomData,
        }
    }

    /// Show `item`'s value on `target`, or the default for `None`.  Must be called on the owning thread.
    pub fn bind<T: TextTarget>(&self, target: &Arc<T>, item: Option<&SharedItem>) {
        let key = TargetKey::of(target);
        self.tasks.cancel(key);
        target.set_text(None);

        let item = match item {
            Some(i) => i.clone(),
            None => {
                show_default::<F, T>(&self.ctx, target);
                return;
            }
        };

        if let Some(cached) = F::cached(&self.ctx.cache, &item) {
            target.set_text(Some(cached.as_str()));
            return;
        }

        let fetch = {
            let cache = self.ctx.cache.clone();
            let item = item.clone();
            // The owner already counted the miss.
            move || match F::peek(&cache, &item) {
                Some(v) => Fetched::Cached(v),
                None => {
                    let read = F::read(&*item).map(|v| v.map(Arc::new));
                    Fetched::from_read(F::KIND, &item, read)
                }
            }
        };

        let handle = TaskHandle::new();
        let task_id = handle.id();
        let apply = {
            let ctx = self.ctx.clone();
            let target = target.clone();
            move |fetched: Fetched<Arc<String>>| {
                match fetched {
                    Fetched::Cached(v) => target.set_text(Some(v.as_str())),
                    Fetched::Read(v) => {
                        target.set_text(Some(v.as_str()));
                        ctx.populate_later(move |cache| F::store(cache, &item, v));
                    }
                    Fetched::Missing => show_default::<F, T>(&ctx, &*target),
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
    pub fn cancel<T: TextTarget>(&self, target: &Arc<T>) {
        self.tasks.cancel(TargetKey::of(target));
    }

    pub fn cancel_all(&self) {
        self.tasks.cancel_all();
    }

    /// How many binds are still waiting on their fetch.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}
