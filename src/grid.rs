//! The mosaic grid: a pool of pictures indexed by color, and the compositing loop that paints a
//! target onto a surface with them.

use crate::color::{self, Color};
use crate::picture::{Picture, Raster};
use crate::surface::{Rect, Surface};

use image::{Rgb, RgbaImage};

use thiserror::Error;

use tracing::{debug, warn};

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// One reason a grid could not be drawn.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DrawIssue {
    /// The target picture has no pixels.
    NoTargetData,
    /// The grid has no surface to draw on.
    NoContext,
    /// There are no pictures to draw with.
    EmptyPool,
    /// The target does not have exactly one pixel per cell.
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

impl fmt::Display for DrawIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTargetData => write!(f, "target has no image data"),
            Self::NoContext => write!(f, "grid surface is not set"),
            Self::EmptyPool => write!(f, "sources are not loaded"),
            Self::SizeMismatch { expected, actual } => write!(
                f,
                "target is {}x{} pixels, grid is {}x{} cells",
                actual.0, actual.1, expected.0, expected.1,
            ),
        }
    }
}

/// A failed draw, with every reason it failed.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct DrawError {
    issues: Vec<DrawIssue>,
}

impl DrawError {
    pub fn issues(&self) -> &[DrawIssue] {
        &self.issues
    }

    pub fn has(&self, issue: DrawIssue) -> bool {
        self.issues.contains(&issue)
    }
}

impl From<DrawIssue> for DrawError {
    fn from(issue: DrawIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }
}

impl fmt::Display for DrawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", issue)?;
        }
        Ok(())
    }
}

/// A grid of `columns × rows` cells painted onto a `width × height` surface.
#[derive(Debug)]
pub struct Grid<S = RgbaImage> {
    width: u32,
    height: u32,
    columns: u32,
    rows: u32,
    blending: f64,
    /// Every picture in the pool, in insertion order.
    pictures: Vec<Picture>,
    /// The picture drawn for each distinct average color.
    index: HashMap<Color, usize>,
    /// The keys of `index`, in the order they first appeared.
    colors: Vec<Color>,
    /// The target color of each cell from the last successful draw.
    cells: Vec<Option<Color>>,
    surface: Option<S>,
    ready: bool,
}

impl<S: Surface> Grid<S> {
    /// Create an empty grid with no size.
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            columns: 0,
            rows: 0,
            blending: 0.2,
            pictures: Vec::new(),
            index: HashMap::new(),
            colors: Vec::new(),
            cells: Vec::new(),
            surface: None,
            ready: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// The number of cells.
    pub fn size(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// The number of distinct colors available to draw with.
    pub fn pool_size(&self) -> usize {
        self.colors.len()
    }

    /// The number of pictures in the pool, including ones whose color is shadowed by a later
    /// picture.
    pub fn picture_count(&self) -> usize {
        self.pictures.len()
    }

    /// The average colors of the pool, in insertion order.
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn blending(&self) -> f64 {
        self.blending
    }

    /// Set how much of the flat target color is mixed over each tile, from 0 to 1.
    pub fn set_blending(&mut self, blending: f64) {
        self.blending = blending.clamp(0.0, 1.0);
    }

    /// Whether the surface holds a complete mosaic.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    /// The size pooled pictures are drawn at.
    pub fn tile_size(&self) -> (u32, u32) {
        if self.columns == 0 || self.rows == 0 {
            (0, 0)
        } else {
            (self.width / self.columns, self.height / self.rows)
        }
    }

    /// Resize the grid and every picture in the pool.
    ///
    /// Resizing changes the pictures' average colors, so the color index is rebuilt afterwards.
    /// Pictures that end up with the same color are all kept, and the last one in insertion order
    /// is drawn for that color.
    pub fn set_size(&mut self, width: u32, height: u32, columns: u32, rows: u32) {
        self.width = width;
        self.height = height;
        self.columns = columns;
        self.rows = rows;

        self.surface = if width > 0 && height > 0 {
            Some(S::blank(width, height))
        } else {
            None
        };
        self.reset_grid_squares();
        self.ready = false;

        let (tile_width, tile_height) = self.tile_size();
        for picture in &mut self.pictures {
            picture.set_size(tile_width, tile_height, 1.0);
        }
        self.reindex();
    }

    /// Add a raster to the pool, returning its average color.
    ///
    /// A picture with the same average color as an existing one replaces it.
    pub fn add_source_image(&mut self, raster: Rc<Raster>) -> Color {
        let (tile_width, tile_height) = self.tile_size();
        let picture = Picture::new(Some(raster), tile_width, tile_height, 1.0);
        let color = picture.average_color();

        debug!(src = picture.src(), %color, "adding source");
        match self.index.get(&color) {
            Some(&i) => self.pictures[i] = picture,
            None => {
                self.index.insert(color, self.pictures.len());
                self.colors.push(color);
                self.pictures.push(picture);
            }
        }
        color
    }

    /// Remove every picture loaded from `src`, returning how many were removed.
    pub fn remove_source_image(&mut self, src: &str) -> usize {
        let before = self.pictures.len();
        self.pictures.retain(|picture| picture.src() != Some(src));
        let removed = before - self.pictures.len();

        if removed > 0 {
            self.reindex();
        }

        debug!(src, removed, "removed source");
        removed
    }

    /// Find the pool color closest to `color`, or `None` if the pool is empty.
    pub fn closest_color(&self, color: Color) -> Option<Color> {
        color::closest(&self.colors, color)
    }

    /// The picture whose average color is closest to `color`.
    pub fn picture_by_color(&self, color: Color) -> Option<&Picture> {
        self.closest_color(color)
            .and_then(|closest| self.index.get(&closest))
            .map(|&i| &self.pictures[i])
    }

    /// Forget the colors of the last draw.
    pub fn reset_grid_squares(&mut self) {
        self.cells.clear();
        self.cells.resize(self.size(), None);
    }

    /// Record the target color of a cell.  Does nothing outside the grid.
    pub fn set_grid_square(&mut self, column: u32, row: u32, color: Color) {
        if let Some(i) = self.cell_index(column, row) {
            self.cells[i] = Some(color);
        }
    }

    /// The target color recorded for a cell by the last draw.
    pub fn grid_square(&self, column: u32, row: u32) -> Option<Color> {
        self.cell_index(column, row).and_then(|i| self.cells[i])
    }

    fn cell_index(&self, column: u32, row: u32) -> Option<usize> {
        if column < self.columns && row < self.rows {
            let i = column as usize + row as usize * self.columns as usize;
            (i < self.cells.len()).then_some(i)
        } else {
            None
        }
    }

    /// Rebuild the color index from the pool.
    fn reindex(&mut self) {
        self.index.clear();
        self.colors.clear();

        for (i, picture) in self.pictures.iter().enumerate() {
            let color = picture.average_color();
            if self.index.insert(color, i).is_none() {
                self.colors.push(color);
            }
        }
    }

    /// Paint `target` onto the surface as a mosaic.
    ///
    /// The target must have one pixel per cell.  Each cell gets the pool picture closest to its
    /// pixel's color, with the flat pixel color laid over it at the current blending opacity.
    pub fn draw(&mut self, target: &Picture) -> Result<(), DrawError> {
        let pixels = match self.check(target) {
            Ok(pixels) => pixels,
            Err(err) => {
                self.ready = false;
                warn!("cannot draw grid: {}", err);
                return Err(err);
            }
        };

        self.reset_grid_squares();

        let columns = self.columns as usize;
        let cell_width = self.width as f64 / self.columns as f64;
        let cell_height = self.height as f64 / self.rows as f64;
        let blending = self.blending;

        let Some(surface) = self.surface.as_mut() else {
            self.ready = false;
            return Err(DrawIssue::NoContext.into());
        };
        let (pictures, index, colors) = (&self.pictures, &self.index, &self.colors);
        let cells = &mut self.cells;

        for (i, pixel) in pixels.chunks_exact(4).enumerate() {
            let rgb = Rgb([pixel[0], pixel[1], pixel[2]]);
            let color = Color::from(rgb);

            let column = (i % columns) as u32;
            let row = (i / columns) as u32;
            cells[i] = Some(color);

            let rect = Rect::cell(column, row, cell_width, cell_height);

            if blending < 1.0 {
                let tile = color::closest(colors, color)
                    .and_then(|c| index.get(&c))
                    .map(|&p| &pictures[p]);
                if let Some(tile) = tile {
                    surface.draw_picture(tile.surface(), rect);
                }
            }

            if blending > 0.0 {
                surface.fill_rect(rgb, blending, rect);
            }
        }

        self.ready = true;
        Ok(())
    }

    /// Check that `target` can be drawn, returning its pixels.
    fn check<'a>(&self, target: &'a Picture) -> Result<&'a [u8], DrawError> {
        let mut issues = Vec::new();

        let pixels = target.image_data();
        if pixels.is_none() {
            issues.push(DrawIssue::NoTargetData);
        } else if (target.width(), target.height()) != (self.columns, self.rows) {
            issues.push(DrawIssue::SizeMismatch {
                expected: (self.columns, self.rows),
                actual: (target.width(), target.height()),
            });
        }

        if self.surface.is_none() {
            issues.push(DrawIssue::NoContext);
        }

        if self.pictures.is_empty() {
            issues.push(DrawIssue::EmptyPool);
        }

        match pixels {
            Some(pixels) if issues.is_empty() => Ok(pixels),
            _ => Err(DrawError { issues }),
        }
    }
}

impl<S: Surface> Default for Grid<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::loader::tests::solid;

    use image::Rgba;

    use rand::prelude::*;
    use rand_pcg::Pcg64;

    const RED: Color = Color::new(255, 0, 0);
    const GREEN: Color = Color::new(0, 255, 0);
    const BLUE: Color = Color::new(0, 0, 255);
    const WHITE: Color = Color::new(255, 255, 255);

    /// A [Surface] that records what was drawn on it.
    #[derive(Debug, Default)]
    struct Recording {
        pictures: Vec<Rect>,
        fills: Vec<(Rect, f64)>,
    }

    impl Surface for Recording {
        fn blank(_width: u32, _height: u32) -> Self {
            Self::default()
        }

        fn draw_picture(&mut self, _tile: &RgbaImage, rect: Rect) {
            self.pictures.push(rect);
        }

        fn fill_rect(&mut self, _color: Rgb<u8>, alpha: f64, rect: Rect) {
            self.fills.push((rect, alpha));
        }
    }

    /// A `columns × rows` target whose pixels are `colors` in row-major order.
    fn target(columns: u32, rows: u32, colors: &[Color]) -> Picture {
        let mut image = RgbaImage::new(columns, rows);
        for (pixel, color) in image.pixels_mut().zip(colors) {
            let [r, g, b] = color.rgb().0;
            *pixel = Rgba([r, g, b, 255]);
        }
        let raster = Rc::new(Raster::new("target", image));
        Picture::new(Some(raster), columns, rows, 1.0)
    }

    fn four_color_grid<S: Surface>(blending: f64) -> Grid<S> {
        let mut grid = Grid::new();
        grid.set_size(20, 20, 2, 2);
        grid.set_blending(blending);
        for (name, color) in [("red", RED), ("green", GREEN), ("blue", BLUE), ("white", WHITE)] {
            grid.add_source_image(solid(name, color, 8, 8));
        }
        grid
    }

    #[test]
    fn test_end_to_end() {
        let mut grid: Grid = four_color_grid(0.0);
        grid.draw(&target(2, 2, &[RED, GREEN, BLUE, WHITE])).unwrap();

        assert!(grid.is_ready());
        assert_eq!(grid.grid_square(0, 0), Some(RED));
        assert_eq!(grid.grid_square(1, 0), Some(GREEN));
        assert_eq!(grid.grid_square(0, 1), Some(BLUE));
        assert_eq!(grid.grid_square(1, 1), Some(WHITE));

        let picture = grid.picture_by_color(RED).unwrap();
        assert_eq!(picture.src(), Some("red"));
        assert_eq!(picture.average_color(), RED);

        let surface = grid.surface().unwrap();
        assert_eq!(*surface.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*surface.get_pixel(15, 5), Rgba([0, 255, 0, 255]));
        assert_eq!(*surface.get_pixel(5, 15), Rgba([0, 0, 255, 255]));
        assert_eq!(*surface.get_pixel(19, 19), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_flat_blending() {
        let mut grid: Grid = four_color_grid(1.0);
        let gray = Color::new(10, 20, 30);
        grid.draw(&target(2, 2, &[gray, gray, gray, gray])).unwrap();

        let surface = grid.surface().unwrap();
        assert_eq!(*surface.get_pixel(3, 17), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_blending_boundaries() {
        let pixels = [RED, GREEN, BLUE, WHITE];

        let mut grid: Grid<Recording> = four_color_grid(0.0);
        grid.draw(&target(2, 2, &pixels)).unwrap();
        let surface = grid.surface().unwrap();
        assert_eq!(surface.pictures.len(), 4);
        assert!(surface.fills.is_empty());

        let mut grid: Grid<Recording> = four_color_grid(1.0);
        grid.draw(&target(2, 2, &pixels)).unwrap();
        let surface = grid.surface().unwrap();
        assert!(surface.pictures.is_empty());
        assert_eq!(surface.fills.len(), 4);

        let mut grid: Grid<Recording> = four_color_grid(0.25);
        grid.draw(&target(2, 2, &pixels)).unwrap();
        let surface = grid.surface().unwrap();
        assert_eq!(surface.pictures.len(), 4);
        assert_eq!(surface.fills.len(), 4);
        assert!(surface.fills.iter().all(|&(_, alpha)| alpha == 0.25));
    }

    #[test]
    fn test_cell_rects() {
        let mut grid: Grid<Recording> = Grid::new();
        grid.set_size(10, 6, 3, 2);
        grid.set_blending(0.0);
        grid.add_source_image(solid("red", RED, 2, 2));
        grid.draw(&target(3, 2, &[RED; 6])).unwrap();

        let rects = &grid.surface().unwrap().pictures;
        assert_eq!(rects[0], Rect { x: 0, y: 0, width: 3, height: 3 });
        assert_eq!(rects[1], Rect { x: 3, y: 0, width: 3, height: 3 });
        assert_eq!(rects[2], Rect { x: 6, y: 0, width: 4, height: 3 });
        assert_eq!(rects[5], Rect { x: 6, y: 3, width: 4, height: 3 });
    }

    #[test]
    fn test_grid_addressing() {
        let mut grid: Grid = Grid::new();
        grid.set_size(100, 100, 5, 3);

        for row in 0..3 {
            for column in 0..5 {
                grid.set_grid_square(column, row, Color::from_packed(column * 10 + row));
            }
        }
        for row in 0..3 {
            for column in 0..5 {
                assert_eq!(grid.grid_square(column, row), Some(Color::from_packed(column * 10 + row)));
            }
        }

        assert_eq!(grid.grid_square(5, 0), None);
        assert_eq!(grid.grid_square(0, 3), None);
    }

    #[test]
    fn test_draw_preconditions() {
        let mut grid: Grid = Grid::new();
        let empty = Picture::new(None, 0, 0, 1.0);

        let err = grid.draw(&empty).unwrap_err();
        assert_eq!(
            err.issues(),
            &[DrawIssue::NoTargetData, DrawIssue::NoContext, DrawIssue::EmptyPool]
        );
        assert_eq!(
            err.to_string(),
            "target has no image data, grid surface is not set, sources are not loaded"
        );
        assert!(!grid.is_ready());

        grid.set_size(20, 20, 2, 2);
        let err = grid.draw(&target(2, 2, &[RED; 4])).unwrap_err();
        assert_eq!(err.issues(), &[DrawIssue::EmptyPool]);
    }

    #[test]
    fn test_failure_keeps_cells() {
        let mut grid: Grid = four_color_grid(0.0);
        grid.draw(&target(2, 2, &[RED, GREEN, BLUE, WHITE])).unwrap();

        let err = grid.draw(&target(3, 2, &[WHITE; 6])).unwrap_err();
        assert!(err.has(DrawIssue::SizeMismatch {
            expected: (2, 2),
            actual: (3, 2),
        }));
        assert!(!grid.is_ready());
        assert_eq!(grid.grid_square(0, 0), Some(RED));

        grid.draw(&target(2, 2, &[WHITE; 4])).unwrap();
        assert!(grid.is_ready());
        assert_eq!(grid.grid_square(0, 0), Some(WHITE));
    }

    #[test]
    fn test_same_color_replaces() {
        let mut grid: Grid = Grid::new();
        grid.set_size(10, 10, 2, 2);

        grid.add_source_image(solid("first", RED, 4, 4));
        grid.add_source_image(solid("second", RED, 6, 6));

        assert_eq!(grid.pool_size(), 1);
        assert_eq!(grid.colors(), &[RED]);
        assert_eq!(grid.picture_by_color(RED).and_then(Picture::src), Some("second"));

        // The replaced picture is no longer in the pool
        assert_eq!(grid.remove_source_image("first"), 0);
        assert_eq!(grid.pool_size(), 1);
    }

    #[test]
    fn test_remove() {
        let mut grid: Grid = four_color_grid(0.0);

        assert_eq!(grid.remove_source_image("missing"), 0);
        assert_eq!(grid.remove_source_image("green"), 1);
        assert_eq!(grid.colors(), &[RED, BLUE, WHITE]);
        assert_eq!(grid.closest_color(GREEN), Some(RED));

        for name in ["red", "blue", "white"] {
            grid.remove_source_image(name);
        }
        assert_eq!(grid.pool_size(), 0);
        assert_eq!(grid.closest_color(GREEN), None);
        assert!(grid.picture_by_color(GREEN).is_none());
    }

    #[test]
    fn test_resize_reindexes() {
        let mut image = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([200, 200, 200, 255]));
        let raster = Rc::new(Raster::new("pair", image));

        let mut grid: Grid = Grid::new();
        grid.set_size(4, 2, 2, 2);
        let before = grid.add_source_image(raster);
        assert_eq!(before, Color::new(100, 100, 100));

        // Square tiles crop to the right half of the pair
        grid.set_size(2, 2, 2, 2);
        assert_eq!(grid.tile_size(), (1, 1));
        let after = grid.colors()[0];
        assert_ne!(after, before);
        assert_eq!(grid.picture_by_color(after).map(Picture::average_color), Some(after));
    }

    /// A 3x1 raster whose middle pixel is `middle` and whose ends are `ends`.
    fn striped(src: &str, ends: [u8; 3], middle: [u8; 3]) -> Rc<Raster> {
        let [r, g, b] = ends;
        let mut image = RgbaImage::from_pixel(3, 1, Rgba([r, g, b, 255]));
        let [r, g, b] = middle;
        image.put_pixel(1, 0, Rgba([r, g, b, 255]));
        Rc::new(Raster::new(src, image))
    }

    #[test]
    fn test_resize_keeps_colliding_pictures() {
        let mut grid: Grid = Grid::new();
        grid.set_size(6, 2, 2, 2);
        let dark = grid.add_source_image(striped("dark", [20, 20, 20], [50, 50, 50]));
        let light = grid.add_source_image(striped("light", [200, 200, 200], [50, 50, 50]));
        assert_eq!(dark, Color::new(30, 30, 30));
        assert_eq!(light, Color::new(150, 150, 150));
        assert_eq!(grid.pool_size(), 2);

        // Square 1x1 tiles keep only the shared middle pixel
        grid.set_size(2, 2, 2, 2);
        assert_eq!(grid.colors(), &[Color::new(50, 50, 50)]);
        assert_eq!(grid.picture_count(), 2);
        let shown = grid.picture_by_color(Color::new(50, 50, 50)).and_then(Picture::src);
        assert_eq!(shown, Some("light"));

        grid.set_size(6, 2, 2, 2);
        assert_eq!(grid.pool_size(), 2);
        assert_eq!(grid.colors(), &[dark, light]);
        assert_eq!(grid.picture_by_color(dark).and_then(Picture::src), Some("dark"));

        grid.set_size(2, 2, 2, 2);
        assert_eq!(grid.remove_source_image("light"), 1);
        let shown = grid.picture_by_color(Color::new(50, 50, 50)).and_then(Picture::src);
        assert_eq!(shown, Some("dark"));
    }

    #[test]
    fn test_closest_random() {
        let mut rng = Pcg64::seed_from_u64(0);

        let mut grid: Grid = Grid::new();
        grid.set_size(64, 64, 8, 8);
        for i in 0..64 {
            let color = Color::new(rng.gen(), rng.gen(), rng.gen());
            grid.add_source_image(solid(&i.to_string(), color, 2, 2));
        }

        let distance = |a: Color, b: Color| {
            let d = |x: u8, y: u8| (x as i32 - y as i32).pow(2);
            d(a.red(), b.red()) + d(a.green(), b.green()) + d(a.blue(), b.blue())
        };

        for _ in 0..256 {
            let query = Color::new(rng.gen(), rng.gen(), rng.gen());
            let found = grid.closest_color(query).unwrap();
            let best = grid.colors().iter().map(|&c| distance(c, query)).min().unwrap();
            assert_eq!(distance(found, query), best);
        }

        for &color in grid.colors() {
            assert_eq!(grid.closest_color(color), Some(color));
        }
    }
}
