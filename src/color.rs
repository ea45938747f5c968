//! Packed colors and the RGB distance used to match them.

use acap::coords::Coordinates;
use acap::distance::{Distance, Metric, Proximity};
use acap::euclid::{euclidean_distance, EuclideanDistance};

use image::Rgb;

use std::fmt;
use std::ops::Index;

/// An 8-bit RGB color.
pub type Rgb8 = Rgb<u8>;

/// A 24-bit RGB color packed as `0xRRGGBB`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Color(u32);

impl Color {
    /// Black, which is also the average color of a picture with nothing drawn.
    pub const BLACK: Self = Self(0);

    /// Pack separate channels into a color.
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self((red as u32) << 16 | (green as u32) << 8 | blue as u32)
    }

    /// Wrap an already packed value, ignoring anything above the low 24 bits.
    pub const fn from_packed(value: u32) -> Self {
        Self(value & 0xFF_FF_FF)
    }

    /// The packed `0xRRGGBB` value.
    pub const fn packed(self) -> u32 {
        self.0
    }

    pub const fn red(self) -> u8 {
        (self.0 >> 16 & 0xFF) as u8
    }

    pub const fn green(self) -> u8 {
        (self.0 >> 8 & 0xFF) as u8
    }

    pub const fn blue(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Unpack into an [Rgb8].
    pub fn rgb(self) -> Rgb8 {
        Rgb([self.red(), self.green(), self.blue()])
    }
}

impl From<Rgb8> for Color {
    fn from(rgb8: Rgb8) -> Self {
        Self::new(rgb8[0], rgb8[1], rgb8[2])
    }
}

impl From<Color> for Rgb8 {
    fn from(color: Color) -> Self {
        color.rgb()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

/// Colors as points in RGB space, one unit per channel step.
#[derive(Clone, Copy, Debug)]
pub struct RgbSpace([f64; 3]);

impl Index<usize> for RgbSpace {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.0[i]
    }
}

impl From<Color> for RgbSpace {
    fn from(color: Color) -> Self {
        Self([
            color.red() as f64,
            color.green() as f64,
            color.blue() as f64,
        ])
    }
}

impl Coordinates for RgbSpace {
    type Value = f64;

    fn dims(&self) -> usize {
        self.0.dims()
    }

    fn coord(&self, i: usize) -> f64 {
        self.0.coord(i)
    }
}

impl Proximity for RgbSpace {
    type Distance = EuclideanDistance<f64>;

    fn distance(&self, other: &Self) -> Self::Distance {
        euclidean_distance(&self.0, &other.0)
    }
}

impl Metric for RgbSpace {}

/// Find the color in `colors` closest to `target`.
///
/// The scan stops at the first exact match.  Among equally distant candidates the one that appears
/// first wins, so the result only depends on the order of `colors`.  Returns `None` if `colors` is
/// empty.
pub fn closest(colors: &[Color], target: Color) -> Option<Color> {
    let point = RgbSpace::from(target);

    let mut best: Option<(Color, EuclideanDistance<f64>)> = None;
    for &color in colors {
        let distance = point.distance(&RgbSpace::from(color));

        if distance.value() == 0.0 {
            return Some(color);
        }

        match best {
            Some((_, current)) if current <= distance => {}
            _ => best = Some((color, distance)),
        }
    }

    best.map(|(color, _)| color)
}
