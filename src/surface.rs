//! Drawing surfaces that mosaics are painted on.

use crate::color::Rgb8;

use image::imageops::{self, FilterType};
use image::{Pixel, Rgba, RgbaImage};

/// A rectangle of pixels on a [Surface].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// The pixels covered by cell `(column, row)` of a grid with fractional cell size
    /// `cell_width × cell_height`.  Adjacent cells share edges, so a grid of cells covers its
    /// surface without gaps or overlap.
    pub fn cell(column: u32, row: u32, cell_width: f64, cell_height: f64) -> Self {
        let x0 = (column as f64 * cell_width).floor() as u32;
        let x1 = ((column + 1) as f64 * cell_width).floor() as u32;
        let y0 = (row as f64 * cell_height).floor() as u32;
        let y1 = ((row + 1) as f64 * cell_height).floor() as u32;

        Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Something a grid can paint cells onto.
pub trait Surface {
    /// Create a blank surface of the given size.
    fn blank(width: u32, height: u32) -> Self
    where
        Self: Sized;

    /// Draw `tile`, scaled to fill `rect`, over whatever is there already.
    fn draw_picture(&mut self, tile: &RgbaImage, rect: Rect);

    /// Fill `rect` with a flat color at the given opacity.
    fn fill_rect(&mut self, color: Rgb8, alpha: f64, rect: Rect);
}

impl Surface for RgbaImage {
    fn blank(width: u32, height: u32) -> Self {
        RgbaImage::new(width, height)
    }

    fn draw_picture(&mut self, tile: &RgbaImage, rect: Rect) {
        if rect.is_empty() || tile.width() == 0 || tile.height() == 0 {
            return;
        }

        let scaled;
        let tile = if tile.dimensions() == (rect.width, rect.height) {
            tile
        } else {
            scaled = imageops::resize(tile, rect.width, rect.height, FilterType::Triangle);
            &scaled
        };

        imageops::overlay(self, tile, rect.x as i64, rect.y as i64);
    }

    fn fill_rect(&mut self, color: Rgb8, alpha: f64, rect: Rect) {
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha == 0.0 {
            return;
        }

        let x1 = rect.x.saturating_add(rect.width).min(self.width());
        let y1 = rect.y.saturating_add(rect.height).min(self.height());
        let paint = color.to_rgba();

        for y in rect.y..y1 {
            for x in rect.x..x1 {
                let pixel = self.get_pixel_mut(x, y);
                *pixel = source_over(*pixel, paint, alpha);
            }
        }
    }
}

/// Composite `src` at opacity `alpha` over `dst`.
fn source_over(dst: Rgba<u8>, src: Rgba<u8>, alpha: f64) -> Rgba<u8> {
    let dst_alpha = dst[3] as f64 / 255.0;
    let out_alpha = alpha + dst_alpha * (1.0 - alpha);
    if out_alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0; 4];
    for i in 0..3 {
        let value = (src[i] as f64 * alpha + dst[i] as f64 * dst_alpha * (1.0 - alpha)) / out_alpha;
        out[i] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_alpha * 255.0).round() as u8;

    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    use image::Rgb;

    #[test]
    fn test_cells_tile_without_gaps() {
        let (columns, width) = (3, 10);
        let cell_width = width as f64 / columns as f64;

        let mut next = 0;
        for column in 0..columns {
            let rect = Rect::cell(column, 0, cell_width, 1.0);
            assert_eq!(rect.x, next);
            next = rect.x + rect.width;
        }
        assert_eq!(next, width);
    }

    #[test]
    fn test_fill_opaque() {
        let mut surface = RgbaImage::blank(4, 4);
        let rect = Rect { x: 1, y: 1, width: 2, height: 2 };
        surface.fill_rect(Rgb([10, 20, 30]), 1.0, rect);

        assert_eq!(*surface.get_pixel(1, 1), Rgba([10, 20, 30, 255]));
        assert_eq!(*surface.get_pixel(2, 2), Rgba([10, 20, 30, 255]));
        assert_eq!(*surface.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(*surface.get_pixel(3, 3), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_fill_blends_over_opaque() {
        let mut surface = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 200, 255]));
        surface.fill_rect(Rgb([200, 0, 0]), 0.5, Rect { x: 0, y: 0, width: 1, height: 1 });
        assert_eq!(*surface.get_pixel(0, 0), Rgba([100, 0, 100, 255]));
    }

    #[test]
    fn test_draw_scales_tile() {
        let tile = RgbaImage::from_pixel(2, 2, Rgba([40, 50, 60, 255]));
        let mut surface = RgbaImage::blank(8, 8);
        surface.draw_picture(&tile, Rect { x: 4, y: 0, width: 4, height: 4 });

        assert_eq!(*surface.get_pixel(4, 0), Rgba([40, 50, 60, 255]));
        assert_eq!(*surface.get_pixel(7, 3), Rgba([40, 50, 60, 255]));
        assert_eq!(*surface.get_pixel(3, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(*surface.get_pixel(4, 4), Rgba([0, 0, 0, 0]));
    }
}
