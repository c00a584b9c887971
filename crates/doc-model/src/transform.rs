//! Conversions between the coordinate spaces the editor juggles.
//!
//! - screen space: zoomed on-screen pixels relative to the page origin
//! - doc space: resolution-independent units stored in annotations, y down
//! - buffer space: screen space times the device pixel ratio
//! - output space: PDF user space of the unrotated page, y up
//!
//! The output mapping takes the *displayed* page size, i.e. the media box
//! with width and height swapped on 90/270 degree pages, which is the layout
//! the preview rasterizer produces.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid page rotation {0}, expected 0, 90, 180 or 270")]
pub struct InvalidRotation(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] =
        [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270];

    pub fn degrees(self) -> i64 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

impl TryFrom<i64> for Rotation {
    type Error = InvalidRotation;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(InvalidRotation(other)),
        }
    }
}

impl From<Rotation> for i64 {
    fn from(value: Rotation) -> Self {
        value.degrees()
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

pub fn to_doc_space(px: f32, zoom: f32) -> f32 {
    px / zoom
}

pub fn to_screen_space(units: f32, zoom: f32) -> f32 {
    units * zoom
}

pub fn to_buffer_space(units: f32, zoom: f32, device_pixel_ratio: f32) -> f32 {
    units * zoom * device_pixel_ratio
}

pub fn from_buffer_space(px: f32, zoom: f32, device_pixel_ratio: f32) -> f32 {
    px / (zoom * device_pixel_ratio)
}

pub fn point_to_doc_space(x: f32, y: f32, zoom: f32) -> (f32, f32) {
    (to_doc_space(x, zoom), to_doc_space(y, zoom))
}

/// Maps a doc-space point onto the output page.
pub fn to_output_space(
    x: f32,
    y: f32,
    page_width: f32,
    page_height: f32,
    rotation: Rotation,
) -> (f32, f32) {
    match rotation {
        Rotation::Deg0 => (x, page_height - y),
        Rotation::Deg90 => (y, x),
        Rotation::Deg180 => (page_width - x, y),
        Rotation::Deg270 => (page_height - y, page_width - x),
    }
}

/// Raw-degree variant of [`to_output_space`] for values read straight from a document.
pub fn to_output_space_degrees(
    x: f32,
    y: f32,
    page_width: f32,
    page_height: f32,
    rotation: i64,
) -> Result<(f32, f32), InvalidRotation> {
    let rotation = Rotation::try_from(rotation)?;
    Ok(to_output_space(x, y, page_width, page_height, rotation))
}

/// Inverse of [`to_output_space`].
pub fn from_output_space(
    ox: f32,
    oy: f32,
    page_width: f32,
    page_height: f32,
    rotation: Rotation,
) -> (f32, f32) {
    match rotation {
        Rotation::Deg0 => (ox, page_height - oy),
        Rotation::Deg90 => (oy, ox),
        Rotation::Deg180 => (page_width - ox, oy),
        Rotation::Deg270 => (page_width - oy, page_height - ox),
    }
}

/// Text matrix `[a b c d]` for a glyph run that reads upright once the
/// viewer applies `rotation`: the images of doc-space "right" and "up".
pub fn text_matrix(rotation: Rotation) -> [f32; 4] {
    match rotation {
        Rotation::Deg0 => [1.0, 0.0, 0.0, 1.0],
        Rotation::Deg90 => [0.0, 1.0, -1.0, 0.0],
        Rotation::Deg180 => [-1.0, 0.0, 0.0, -1.0],
        Rotation::Deg270 => [0.0, -1.0, 1.0, 0.0],
    }
}

/// Displayed page size for a media box of `width` x `height`.
pub fn displayed_size(width: f32, height: f32, rotation: Rotation) -> (f32, f32) {
    if rotation.swaps_axes() {
        (height, width)
    } else {
        (width, height)
    }
}
