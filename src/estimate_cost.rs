///Estimate the cost of an item.  This is in bytes.
///
/// Each mapping of [crate::MetadataCache] caches up to a specified total cost, then begins evicting entries which are
/// least recently used.
pub trait EstimateCost {
    fn estimate_cost(&self) -> u64;
}

/// Text costs its UTF-8 length.
impl EstimateCost for str {
    fn estimate_cost(&self) -> u64 {
        self.len() as u64
    }
}

impl EstimateCost for String {
    fn estimate_cost(&self) -> u64 {
        self.as_str().estimate_cost()
    }
}
