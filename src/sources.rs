//! Keeping the grid's picture pool in sync with a list of source URLs.

use crate::grid::Grid;
use crate::loader::{Fetch, ImageLoader};
use crate::surface::Surface;

use tracing::info;

/// The URLs added and removed by a source list update.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SourceDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SourceDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The source URLs currently applied to a grid.
#[derive(Debug, Default)]
pub struct SourcePool {
    current: Vec<String>,
}

impl SourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The applied source list, without duplicates.
    pub fn current(&self) -> &[String] {
        &self.current
    }

    /// Replace the applied list with `sources`, returning what changed.
    pub fn diff(&mut self, sources: &[String]) -> SourceDelta {
        let mut next: Vec<String> = Vec::with_capacity(sources.len());
        for source in sources {
            if !next.contains(source) {
                next.push(source.clone());
            }
        }

        let added = next
            .iter()
            .filter(|s| !self.current.contains(*s))
            .cloned()
            .collect();
        let removed = self
            .current
            .iter()
            .filter(|s| !next.contains(*s))
            .cloned()
            .collect();

        self.current = next;
        SourceDelta { added, removed }
    }

    /// Apply a new source list to `grid`: pictures for dropped URLs are removed, and new URLs are
    /// loaded through `loader` and added.  Calling this again with the same list does nothing.
    pub async fn update<F, S, P>(
        &mut self,
        grid: &mut Grid<S>,
        loader: &ImageLoader<F>,
        sources: &[String],
        on_progress: P,
    ) -> SourceDelta
    where
        F: Fetch,
        S: Surface,
        P: FnMut(f64),
    {
        let delta = self.diff(sources);
        if delta.is_empty() {
            return delta;
        }

        info!(added = delta.added.len(), removed = delta.removed.len(), "updating sources");

        for url in &delta.removed {
            grid.remove_source_image(url);
        }

        for raster in loader.load_all(&delta.added, on_progress).await {
            grid.add_source_image(raster);
        }

        delta
    }
}
