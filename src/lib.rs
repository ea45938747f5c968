//! Photo mosaics: a target image rebuilt as a grid of source images, each cell showing the source
//! whose average color best matches the target underneath it.
//!
//! The pieces, leaf first:
//!
//! * [picture]: decoded images center-cropped onto a surface, with their average color
//! * [loader]: asynchronous image loading with batch progress
//! * [grid]: the picture pool indexed by color, and the compositing loop
//! * [sources]: keeping the pool in sync with a list of URLs
//! * [target]: building the one-pixel-per-cell target picture
//! * [mosaic]: all of the above behind one owner

pub mod color;
pub mod grid;
pub mod loader;
pub mod mosaic;
pub mod picture;
pub mod sources;
pub mod surface;
pub mod target;
