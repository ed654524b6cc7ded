use std::sync::Arc;

use crate::*;

/// [DisplayableDefaults] backed by fixed values.
#[derive(Debug, Clone, Default)]
pub struct StaticDefaults {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub artwork: Option<Arc<Artwork>>,
}

impl DisplayableDefaults for StaticDefaults {
    fn title(&self) -> Option<String> {
        self.title.clone()
    }

    fn subtitle(&self) -> Option<String> {
        self.subtitle.clone()
    }

    fn artwork(&self) -> Option<Arc<Artwork>> {
        self.artwork.clone()
    }
}
