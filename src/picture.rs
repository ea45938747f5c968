//! Pictures: decoded images cropped and resized for tiling.

use crate::color::Color;

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

use std::rc::Rc;

/// A decoded source image, identified by the URL it was loaded from.
#[derive(Debug)]
pub struct Raster {
    src: String,
    image: RgbaImage,
}

impl Raster {
    pub fn new(src: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            src: src.into(),
            image,
        }
    }

    /// Wrap a decoded image of any pixel format.
    pub fn from_dynamic(src: impl Into<String>, image: DynamicImage) -> Self {
        Self::new(src, image.into_rgba8())
    }

    /// The URL this raster was loaded from.
    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn natural_width(&self) -> u32 {
        self.image.width()
    }

    pub fn natural_height(&self) -> u32 {
        self.image.height()
    }
}

/// Source and destination rectangles for drawing a raster onto a picture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub sx: f64,
    pub sy: f64,
    pub sw: f64,
    pub sh: f64,
    pub dw: u32,
    pub dh: u32,
}

impl Bounds {
    /// Center-crop a `width × height` source so that it fills a `dw × dh` destination without
    /// distortion, once destination pixels are stretched by `aspect_ratio`.
    pub fn fit(width: u32, height: u32, dw: u32, dh: u32, aspect_ratio: f64) -> Self {
        let (width, height) = (width as f64, height as f64);

        let source_ratio = width / height;
        let dest_ratio = (dw as f64 * aspect_ratio) / dh as f64;

        let (mut sx, mut sy, mut sw, mut sh) = (0.0, 0.0, width, height);
        if source_ratio > dest_ratio {
            // Relatively wider, crop the sides
            sw = height * dest_ratio;
            sx = width * 0.5 - sw * 0.5;
        } else {
            // Relatively taller, crop the top and bottom
            sh = width / dest_ratio;
            sy = height * 0.5 - sh * 0.5;
        }

        Self {
            sx,
            sy,
            sw,
            sh,
            dw,
            dh,
        }
    }

    /// The source rectangle snapped to whole pixels inside a `width × height` image.
    fn source_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let x = (self.sx.round().max(0.0) as u32).min(width - 1);
        let y = (self.sy.round().max(0.0) as u32).min(height - 1);
        let w = (self.sw.round().max(1.0) as u32).min(width - x);
        let h = (self.sh.round().max(1.0) as u32).min(height - y);
        (x, y, w, h)
    }
}

/// A raster drawn onto a surface of a given size, along with its average color.
#[derive(Debug)]
pub struct Picture {
    raster: Option<Rc<Raster>>,
    width: u32,
    height: u32,
    aspect_ratio: f64,
    average_color: Color,
    surface: RgbaImage,
}

impl Picture {
    /// Create a `width × height` picture, drawing `raster` onto it if given.
    pub fn new(raster: Option<Rc<Raster>>, width: u32, height: u32, aspect_ratio: f64) -> Self {
        let mut picture = Self {
            raster: None,
            width: 0,
            height: 0,
            aspect_ratio: 1.0,
            average_color: Color::BLACK,
            surface: RgbaImage::new(0, 0),
        };

        picture.set_size(width, height, aspect_ratio);
        if let Some(raster) = raster {
            picture.set_image(raster);
        }

        picture
    }

    /// Resize the picture and redraw it.
    pub fn set_size(&mut self, width: u32, height: u32, aspect_ratio: f64) {
        self.width = width;
        self.height = height;
        self.aspect_ratio = aspect_ratio;
        self.surface = RgbaImage::new(width, height);
        self.draw();
    }

    /// Replace the raster and redraw.
    pub fn set_image(&mut self, raster: Rc<Raster>) {
        self.raster = Some(raster);
        self.draw();
    }

    /// The RGBA bytes of the drawn picture, or `None` if it has no pixels.
    pub fn image_data(&self) -> Option<&[u8]> {
        if self.width == 0 || self.height == 0 {
            None
        } else {
            Some(self.surface.as_raw())
        }
    }

    /// The average color of the drawn picture, black until a raster has been drawn.
    pub fn average_color(&self) -> Color {
        self.average_color
    }

    pub fn raster(&self) -> Option<&Rc<Raster>> {
        self.raster.as_ref()
    }

    /// The URL of the raster, if any.
    pub fn src(&self) -> Option<&str> {
        self.raster.as_deref().map(Raster::src)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    fn draw(&mut self) {
        let raster = match &self.raster {
            Some(raster) => raster,
            None => return,
        };

        let (width, height) = (raster.natural_width(), raster.natural_height());
        if self.width == 0 || self.height == 0 || width == 0 || height == 0 {
            return;
        }

        let bounds = Bounds::fit(width, height, self.width, self.height, self.aspect_ratio);
        let (x, y, w, h) = bounds.source_pixels(width, height);

        let cropped = imageops::crop_imm(raster.image(), x, y, w, h).to_image();
        self.surface = if (w, h) == (self.width, self.height) {
            cropped
        } else {
            imageops::resize(&cropped, self.width, self.height, FilterType::Triangle)
        };

        self.average_color = average_color(&self.surface);
    }
}

/// Average each channel over every pixel, truncating to whole values.
fn average_color(image: &RgbaImage) -> Color {
    let len = image.width() as f64 * image.height() as f64;
    if len == 0.0 {
        return Color::BLACK;
    }

    let mut sum = [0.0; 3];
    for pixel in image.pixels() {
        for i in 0..3 {
            sum[i] += pixel[i] as f64;
        }
    }

    Color::new(
        (sum[0] / len) as u8,
        (sum[1] / len) as u8,
        (sum[2] / len) as u8,
    )
}
