//! Fakes shared by the unit tests.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::*;

/// An item with fixed values which counts how often each field is read.
pub(crate) struct FakeItem {
    title: Option<String>,
    subtitle: Option<String>,
    has_artwork: bool,
    /// Largest artwork the item can produce, whatever is asked for.
    artwork_cap: Option<(u32, u32)>,
    failing: bool,
    delay: Option<Duration>,
    title_reads: AtomicUsize,
    subtitle_reads: AtomicUsize,
    artwork_reads: AtomicUsize,
}

impl FakeItem {
    pub(crate) fn new(title: &str, subtitle: &str) -> FakeItem {
        FakeItem {
            title: Some(title.to_string()),
            subtitle: Some(subtitle.to_string()),
            has_artwork: true,
            artwork_cap: None,
            failing: false,
            delay: None,
            title_reads: AtomicUsize::new(0),
            subtitle_reads: AtomicUsize::new(0),
            artwork_reads: AtomicUsize::new(0),
        }
    }

    /// Every read fails.
    pub(crate) fn failing() -> FakeItem {
        FakeItem {
            failing: true,
            ..FakeItem::new("", "")
        }
    }

    /// Every read succeeds with nothing.
    pub(crate) fn empty() -> FakeItem {
        FakeItem {
            title: None,
            subtitle: None,
            has_artwork: false,
            ..FakeItem::new("", "")
        }
    }

    /// Reads take a while, so concurrent callers overlap.
    pub(crate) fn slow(self) -> FakeItem {
        FakeItem {
            delay: Some(Duration::from_millis(50)),
            ..self
        }
    }

    /// Artwork never comes back larger than `width` x `height`.
    pub(crate) fn capped(self, width: u32, height: u32) -> FakeItem {
        FakeItem {
            artwork_cap: Some((width, height)),
            ..self
        }
    }

    pub(crate) fn arc(self) -> Arc<FakeItem> {
        Arc::new(self)
    }

    pub(crate) fn shared(self) -> SharedItem {
        Arc::new(self)
    }

    pub(crate) fn title_reads(&self) -> usize {
        self.title_reads.load(Ordering::SeqCst)
    }

    pub(crate) fn subtitle_reads(&self) -> usize {
        self.subtitle_reads.load(Ordering::SeqCst)
    }

    pub(crate) fn artwork_reads(&self) -> usize {
        self.artwork_reads.load(Ordering::SeqCst)
    }

    fn read<T>(&self, counter: &AtomicUsize, value: Option<T>) -> Result<Option<T>, ReadError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
        if self.failing {
            return Err(ReadError::Inaccessible);
        }
        Ok(value)
    }
}

impl LibraryItem for FakeItem {
    fn title(&self) -> Result<Option<String>, ReadError> {
        self.read(&self.title_reads, self.title.clone())
    }

    fn subtitle(&self) -> Result<Option<String>, ReadError> {
        self.read(&self.subtitle_reads, self.subtitle.clone())
    }

    /// Decodes at the requested size up to the cap, one byte per pixel.
    fn artwork(&self, width: u32, height: u32) -> Result<Option<Arc<Artwork>>, ReadError> {
        let (width, height) = match self.artwork_cap {
            Some((w, h)) => (width.min(w), height.min(h)),
            None => (width, height),
        };
        let art = if self.has_artwork {
            Some(Arc::new(artwork(width, height)))
        } else {
            None
        };
        self.read(&self.artwork_reads, art)
    }
}

pub(crate) fn artwork(width: u32, height: u32) -> Artwork {
    Artwork::new(width, height, vec![0; (width * height) as usize])
}

/// Queues jobs until the test runs them.
#[derive(Default)]
pub(crate) struct ManualExecutor {
    jobs: Mutex<VecDeque<Job>>,
}

impl ManualExecutor {
    pub(crate) fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Run queued jobs in order, including any they queue.  Returns how many ran.
    pub(crate) fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.jobs.lock().pop_front();
            match next {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Drop every queued job without running it, like a pool which has shut down.  Returns how many went.
    pub(crate) fn discard_all(&self) -> usize {
        let discarded = std::mem::take(&mut *self.jobs.lock());
        discarded.len()
    }

    /// Run only the newest queued job.
    pub(crate) fn run_last(&self) -> bool {
        let next = self.jobs.lock().pop_back();
        next.map(|job| job()).is_some()
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }
}

/// A text target remembering everything it was told to show.
#[derive(Default)]
pub(crate) struct RecordingText {
    history: Mutex<Vec<Option<String>>>,
}

impl RecordingText {
    pub(crate) fn shown(&self) -> Option<String> {
        self.history.lock().last().cloned().flatten()
    }

    pub(crate) fn history(&self) -> Vec<Option<String>> {
        self.history.lock().clone()
    }
}

impl TextTarget for RecordingText {
    fn set_text(&self, text: Option<&str>) {
        self.history.lock().push(text.map(str::to_string));
    }
}

/// An artwork target with a fixed size.
pub(crate) struct RecordingArtwork {
    size: (u32, u32),
    shown: Mutex<Option<Arc<Artwork>>>,
    sets: AtomicUsize,
    fades: Mutex<Vec<Duration>>,
}

impl RecordingArtwork {
    pub(crate) fn new(width: u32, height: u32) -> RecordingArtwork {
        RecordingArtwork {
            size: (width, height),
            shown: Mutex::new(None),
            sets: AtomicUsize::new(0),
            fades: Mutex::new(vec![]),
        }
    }

    pub(crate) fn shown(&self) -> Option<Arc<Artwork>> {
        self.shown.lock().clone()
    }

    pub(crate) fn shown_size(&self) -> Option<(u32, u32)> {
        self.shown().map(|a| (a.width(), a.height()))
    }

    pub(crate) fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub(crate) fn fades(&self) -> Vec<Duration> {
        self.fades.lock().clone()
    }
}

impl ArtworkTarget for RecordingArtwork {
    fn set_artwork(&self, artwork: Option<Arc<Artwork>>) {
        self.sets.fetch_add(1, Ordering::SeqCst);
        *self.shown.lock() = artwork;
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn fade_in(&self, duration: Duration) {
        self.fades.lock().push(duration);
    }
}

/// Everything needed to drive a binder by hand.
pub(crate) struct Harness {
    pub(crate) cache: Arc<MetadataCache>,
    pub(crate) executor: Arc<ManualExecutor>,
    pub(crate) queue: MainQueue,
    pub(crate) ctx: BindContext,
}

impl Harness {
    pub(crate) fn new(defaults: StaticDefaults) -> Harness {
        let cache = Arc::new(
            MetadataCache::new(Default::default()).expect("Default capacities are valid"),
        );
        let executor = Arc::new(ManualExecutor::default());
        let queue = MainQueue::new();
        let ctx = BindContext::new(
            cache.clone(),
            Arc::new(defaults),
            executor.clone(),
            queue.handle(),
        );
        Harness {
            cache,
            executor,
            queue,
            ctx,
        }
    }

    /// Run background jobs and owner-thread messages until both are idle.
    pub(crate) fn settle(&self) {
        while self.executor.run_all() + self.queue.run_pending() > 0 {}
    }
}
