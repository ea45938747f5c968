//! A mosaic: a grid kept in sync with its size, blending, sources and target.
//!
//! [Mosaic] is the piece a front end owns.  It serializes every change to the grid through
//! `&mut self`, redraws when a change affects the picture, and drops targets that finish loading
//! after a newer target was requested.

use crate::color::Color;
use crate::grid::{DrawError, Grid};
use crate::loader::{Fetch, ImageLoader};
use crate::picture::{Picture, Raster};
use crate::sources::{SourceDelta, SourcePool};
use crate::surface::Surface;
use crate::target::{create_target_picture, pixel_aspect_ratio, Target, TargetError};

use image::RgbaImage;

use thiserror::Error;

use tracing::info;

use std::rc::Rc;

/// An error updating a mosaic.
#[derive(Debug, Error)]
pub enum MosaicError {
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Draw(#[from] DrawError),
}

/// What happened to the surface after a change.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Applied {
    /// The mosaic was redrawn.
    Drawn,
    /// Nothing was drawn, because there is no target or no sources yet.
    Waiting,
    /// Nothing changed, so nothing was drawn.
    Unchanged,
    /// The change was dropped because a newer target was requested.
    Superseded,
}

/// What was under the pointer when the mosaic was clicked.
#[derive(Clone, Debug)]
pub struct ClickInfo {
    pub column: u32,
    pub row: u32,
    /// The target color of the clicked cell.
    pub color: Color,
    /// The source image drawn in the cell.
    pub image: Rc<Raster>,
}

/// A target waiting to be loaded.
#[derive(Debug)]
pub struct TargetRequest<F> {
    generation: u64,
    target: Target,
    loader: Rc<ImageLoader<F>>,
    columns: u32,
    rows: u32,
    aspect_ratio: f64,
}

impl<F: Fetch> TargetRequest<F> {
    /// Load the target and build its picture.
    pub async fn resolve(self) -> Result<ResolvedTarget, TargetError> {
        let picture = create_target_picture(
            &self.target,
            &self.loader,
            self.columns,
            self.rows,
            self.aspect_ratio,
        )
        .await?;

        Ok(ResolvedTarget {
            generation: self.generation,
            picture,
        })
    }
}

/// A loaded target, ready to be applied to the [Mosaic] that requested it.
#[derive(Debug)]
pub struct ResolvedTarget {
    generation: u64,
    picture: Picture,
}

/// A photo mosaic.
#[derive(Debug)]
pub struct Mosaic<F, S = RgbaImage> {
    loader: Rc<ImageLoader<F>>,
    grid: Grid<S>,
    sources: SourcePool,
    target: Option<Picture>,
    generation: u64,
}

impl<F: Fetch, S: Surface> Mosaic<F, S> {
    pub fn new(loader: Rc<ImageLoader<F>>) -> Self {
        Self {
            loader,
            grid: Grid::new(),
            sources: SourcePool::new(),
            target: None,
            generation: 0,
        }
    }

    pub fn grid(&self) -> &Grid<S> {
        &self.grid
    }

    pub fn loader(&self) -> &Rc<ImageLoader<F>> {
        &self.loader
    }

    pub fn is_ready(&self) -> bool {
        self.grid.is_ready()
    }

    /// The finished mosaic, if the last draw succeeded.
    pub fn surface(&self) -> Option<&S> {
        if self.grid.is_ready() {
            self.grid.surface()
        } else {
            None
        }
    }

    /// The shape of one cell.
    pub fn aspect_ratio(&self) -> f64 {
        let grid = &self.grid;
        pixel_aspect_ratio(grid.width(), grid.height(), grid.columns(), grid.rows())
    }

    /// Resize the mosaic.  Zero values keep the current setting.
    pub fn set_size(
        &mut self,
        width: u32,
        height: u32,
        columns: u32,
        rows: u32,
    ) -> Result<Applied, DrawError> {
        let keep = |value: u32, current: u32| if value > 0 { value } else { current };

        let width = keep(width, self.grid.width());
        let height = keep(height, self.grid.height());
        let columns = keep(columns, self.grid.columns());
        let rows = keep(rows, self.grid.rows());

        self.grid.set_size(width, height, columns, rows);

        let aspect_ratio = self.aspect_ratio();
        if let Some(target) = &mut self.target {
            target.set_size(columns, rows, aspect_ratio);
        }

        self.redraw()
    }

    /// Change how much flat color is blended over the tiles.
    pub fn set_blending(&mut self, blending: f64) -> Result<Applied, DrawError> {
        self.grid.set_blending(blending);
        self.redraw()
    }

    /// Replace the source list, loading any new sources, and redraw.
    ///
    /// The sources are applied even if the redraw fails, so the delta is returned either way.
    pub async fn update_sources<P>(
        &mut self,
        sources: &[String],
        on_progress: P,
    ) -> (SourceDelta, Result<Applied, DrawError>)
    where
        P: FnMut(f64),
    {
        let delta = self
            .sources
            .update(&mut self.grid, &self.loader, sources, on_progress)
            .await;

        let drawn = if delta.is_empty() {
            Ok(Applied::Unchanged)
        } else {
            self.redraw()
        };

        (delta, drawn)
    }

    /// Start replacing the target.  Any request made before this one is superseded.
    pub fn request_target(&mut self, target: impl Into<Target>) -> TargetRequest<F> {
        self.generation += 1;

        TargetRequest {
            generation: self.generation,
            target: target.into(),
            loader: self.loader.clone(),
            columns: self.grid.columns(),
            rows: self.grid.rows(),
            aspect_ratio: self.aspect_ratio(),
        }
    }

    /// Install a loaded target and redraw, unless a newer target has been requested.
    pub fn apply_target(&mut self, resolved: ResolvedTarget) -> Result<Applied, DrawError> {
        if resolved.generation != self.generation {
            info!(
                generation = resolved.generation,
                current = self.generation,
                "dropping superseded target"
            );
            return Ok(Applied::Superseded);
        }

        let mut picture = resolved.picture;
        let (columns, rows) = (self.grid.columns(), self.grid.rows());
        if (picture.width(), picture.height()) != (columns, rows) {
            picture.set_size(columns, rows, self.aspect_ratio());
        }
        self.target = Some(picture);

        self.redraw()
    }

    /// Load a new target and redraw with it.
    pub async fn set_target(&mut self, target: impl Into<Target>) -> Result<Applied, MosaicError> {
        let resolved = self.request_target(target).resolve().await?;
        Ok(self.apply_target(resolved)?)
    }

    /// Draw the current target with the current sources, if there are both.
    pub fn redraw(&mut self) -> Result<Applied, DrawError> {
        let target = match &self.target {
            Some(target) => target,
            None => return Ok(Applied::Waiting),
        };

        if self.grid.pool_size() == 0 {
            return Ok(Applied::Waiting);
        }

        self.grid.draw(target)?;
        Ok(Applied::Drawn)
    }

    /// Find what was drawn at a point on the mosaic, in surface pixels.
    pub fn click(&self, offset_x: f64, offset_y: f64) -> Option<ClickInfo> {
        let grid = &self.grid;
        if !grid.is_ready() || offset_x < 0.0 || offset_y < 0.0 {
            return None;
        }

        let column = (offset_x / grid.width() as f64 * grid.columns() as f64).floor() as u32;
        let row = (offset_y / grid.height() as f64 * grid.rows() as f64).floor() as u32;

        let color = grid.grid_square(column, row)?;
        let image = grid.picture_by_color(color)?.raster()?.clone();

        Some(ClickInfo {
            column,
            row,
            color,
            image,
        })
    }
}
