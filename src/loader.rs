//! Asynchronous image loading with shared progress tracking.

use crate::picture::Raster;

use futures::stream::{FuturesUnordered, StreamExt};

use image::DynamicImage;

use thiserror::Error;

use tracing::{debug, warn};

use std::cell::Cell;
use std::error::Error;
use std::rc::Rc;

/// The reason a fetch failed.
pub type FetchError = Box<dyn Error + Send + Sync>;

/// A service that turns URLs into decoded images.
#[allow(async_fn_in_trait)]
pub trait Fetch {
    /// Fetch and decode the image at `url`.  `cross_origin` is passed through from the caller for
    /// fetchers that care about it.
    async fn fetch(&self, url: &str, cross_origin: Option<&str>) -> Result<DynamicImage, FetchError>;
}

/// A [Fetch] implementation that decodes local files.
#[derive(Debug, Default)]
pub struct FileFetcher;

impl Fetch for FileFetcher {
    async fn fetch(&self, url: &str, _cross_origin: Option<&str>) -> Result<DynamicImage, FetchError> {
        Ok(image::open(url)?)
    }
}

/// An image that failed to load.
#[derive(Debug, Error)]
#[error("failed to load image {url}: {reason}")]
pub struct LoadError {
    pub url: String,
    #[source]
    pub reason: FetchError,
}

/// Loads images through a [Fetch]er, counting requests to report progress.
///
/// The counters are shared by every load, so progress covers all batches in flight at once.  Once
/// every issued request has settled, the counters reset and progress is back to 1.
#[derive(Debug)]
pub struct ImageLoader<F> {
    fetcher: F,
    cross_origin: Option<String>,
    issued: Cell<usize>,
    completed: Cell<usize>,
}

impl<F: Fetch> ImageLoader<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            cross_origin: None,
            issued: Cell::new(0),
            completed: Cell::new(0),
        }
    }

    /// Set the cross-origin mode passed to the fetcher.
    pub fn with_cross_origin(mut self, cross_origin: Option<String>) -> Self {
        self.cross_origin = cross_origin;
        self
    }

    /// The fraction of issued requests that have settled, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        let issued = self.issued.get();
        if issued < 1 {
            1.0
        } else {
            self.completed.get() as f64 / issued as f64
        }
    }

    /// Load a single image.
    pub async fn load(&self, url: &str) -> Result<Rc<Raster>, LoadError> {
        let mut issued = self.issue(1);
        let result = self.decode(url).await;
        issued.settle();
        result
    }

    /// Load a batch of images concurrently, calling `on_progress` as each one settles.
    ///
    /// Images that fail to load are left out of the result, which is in settle order rather than
    /// the order of `urls`.
    pub async fn load_all<P>(&self, urls: &[String], mut on_progress: P) -> Vec<Rc<Raster>>
    where
        P: FnMut(f64),
    {
        let mut issued = self.issue(urls.len());

        let mut pending: FuturesUnordered<_> = urls.iter().map(|url| self.decode(url)).collect();

        let mut rasters = Vec::with_capacity(urls.len());
        while let Some(result) = pending.next().await {
            issued.settle();
            on_progress(self.progress());

            match result {
                Ok(raster) => rasters.push(raster),
                Err(err) => warn!("{}", err),
            }
        }

        rasters
    }

    async fn decode(&self, url: &str) -> Result<Rc<Raster>, LoadError> {
        let cross_origin = self.cross_origin.as_deref();

        match self.fetcher.fetch(url, cross_origin).await {
            Ok(image) => {
                debug!(url, width = image.width(), height = image.height(), "decoded image");
                Ok(Rc::new(Raster::from_dynamic(url, image)))
            }
            Err(reason) => Err(LoadError {
                url: url.to_owned(),
                reason,
            }),
        }
    }
}

impl<F> ImageLoader<F> {
    fn issue(&self, count: usize) -> Issued<'_, F> {
        self.issued.set(self.issued.get() + count);
        Issued {
            loader: self,
            outstanding: count,
        }
    }

    fn settle(&self) {
        let completed = self.completed.get() + 1;
        if completed >= self.issued.get() {
            self.issued.set(0);
            self.completed.set(0);
        } else {
            self.completed.set(completed);
        }
    }
}

/// Requests counted by a loader that have not settled yet.  Any still outstanding when this is
/// dropped, such as when a load is cancelled, are settled then.
struct Issued<'a, F> {
    loader: &'a ImageLoader<F>,
    outstanding: usize,
}

impl<F> Issued<'_, F> {
    fn settle(&mut self) {
        if self.outstanding > 0 {
            self.outstanding -= 1;
            self.loader.settle();
        }
    }
}

impl<F> Drop for Issued<'_, F> {
    fn drop(&mut self) {
        while self.outstanding > 0 {
            self.settle();
        }
    }
}
