//! Building the target picture a mosaic is drawn from.

use crate::loader::{Fetch, ImageLoader, LoadError};
use crate::picture::{Picture, Raster};

use thiserror::Error;

use std::rc::Rc;

/// The image a mosaic should reproduce.
#[derive(Clone, Debug)]
pub enum Target {
    /// An image still to be loaded.
    Url(String),
    /// An image that is already decoded.
    Raster(Rc<Raster>),
}

impl From<&str> for Target {
    fn from(url: &str) -> Self {
        Self::Url(url.to_owned())
    }
}

impl From<String> for Target {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<Rc<Raster>> for Target {
    fn from(raster: Rc<Raster>) -> Self {
        Self::Raster(raster)
    }
}

/// A target that could not be turned into a picture.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("could not create target image: {0}")]
    InvalidTarget(&'static str),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// The shape of one grid cell, as its width divided by its height.
pub fn pixel_aspect_ratio(width: u32, height: u32, columns: u32, rows: u32) -> f64 {
    (width as f64 / columns as f64) / (height as f64 / rows as f64)
}

/// Resolve `target` to a `columns × rows` picture, one pixel per grid cell.
pub async fn create_target_picture<F: Fetch>(
    target: &Target,
    loader: &ImageLoader<F>,
    columns: u32,
    rows: u32,
    aspect_ratio: f64,
) -> Result<Picture, TargetError> {
    let raster = match target {
        Target::Url(url) if url.trim().is_empty() => {
            return Err(TargetError::InvalidTarget("empty url"));
        }
        Target::Url(url) => loader.load(url).await?,
        Target::Raster(raster) if raster.src().is_empty() => {
            return Err(TargetError::InvalidTarget("image has no source"));
        }
        Target::Raster(raster) => raster.clone(),
    };

    Ok(Picture::new(Some(raster), columns, rows, aspect_ratio))
}
