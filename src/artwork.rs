//! Decoded artwork as held by the cache and handed to targets.
use crate::EstimateCost;

/// A decoded bitmap.
///
/// The pixel layout is up to the item that produced it; the cache only cares about the dimensions (for size-aware
/// reuse) and the number of bytes held.
#[derive(Clone, PartialEq, Eq)]
pub struct Artwork {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Artwork {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Artwork {
        Artwork {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Whether this artwork is at least as large as `width` x `height` in both dimensions.
    pub fn covers(&self, width: u32, height: u32) -> bool {
        self.width >= width && self.height >= height
    }
}

impl std::fmt::Debug for Artwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artwork")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Artwork costs its decoded pixel bytes.
impl EstimateCost for Artwork {
    fn estimate_cost(&self) -> u64 {
        self.pixels.len() as u64
    }
}
