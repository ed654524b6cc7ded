//! The capabilities the cache and binders consume and drive.
//!
//! A [LibraryItem] is where metadata comes from.  Reading it may be slow (tag parsing, decoding), so binders only ever
//! call it from an [Executor] job.  Targets are whatever displays a value; they are only touched from the thread which
//! owns the [crate::MainQueue].
use std::sync::Arc;
use std::time::Duration;

use crate::{Artwork, ReadError};

/// A source of metadata for one entry in a media library.
///
/// Items are compared by identity, not content: two items describing the same song are still two cache entries.
pub trait LibraryItem: Send + Sync + 'static {
    fn title(&self) -> Result<Option<String>, ReadError>;

    fn subtitle(&self) -> Result<Option<String>, ReadError>;

    /// Read artwork, preferably decoded at `width` x `height`.
    ///
    /// Implementations may return something larger or smaller than requested.  A smaller result is taken to be the
    /// best the item has, so the cache treats it as covering any request up to the size it was decoded for.
    fn artwork(&self, width: u32, height: u32) -> Result<Option<Arc<Artwork>>, ReadError>;
}

/// Values to display when an item is missing, fails to read, or has no value for a field.
pub trait DisplayableDefaults: Send + Sync + 'static {
    fn title(&self) -> Option<String>;

    fn subtitle(&self) -> Option<String>;

    fn artwork(&self) -> Option<Arc<Artwork>>;
}

/// Something which displays a line of text.
pub trait TextTarget: Send + Sync + 'static {
    /// Display `text`, or blank the target for `None`.
    fn set_text(&self, text: Option<&str>);
}

/// Something which displays artwork.
pub trait ArtworkTarget: Send + Sync + 'static {
    /// Display `artwork`, or blank the target for `None`.
    fn set_artwork(&self, artwork: Option<Arc<Artwork>>);

    /// Current rendering size as `(width, height)`.  Zero in either dimension means not yet known.
    fn size(&self) -> (u32, u32);

    /// Animate opacity from transparent to opaque over `duration`.
    fn fade_in(&self, duration: Duration);
}

/// A unit of background work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs off the calling thread.
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, job: Job);
}
