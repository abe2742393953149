// THEORY:
// The `HeatAccumulator` turns the stream of person positions into a spatial density map:
// every frame, each detected person adds heat to the grid cell they stand in. Over minutes
// the grid shows where people walk and where they gather.
//
// Key architectural principles:
// 1.  **Chunked Grid**: The frame is divided into cells of `cell_width x cell_height` pixels,
//     the same slicing the grid manager applies to frames. A cell size of 1x1 gives a grid
//     with exactly the frame's resolution.
// 2.  **Nearest Cell**: A point adds its whole weight to the one cell that covers it; there
//     is no bilinear split. Points outside the frame (bounding-box math can push a center a
//     few pixels past the edge) are clamped onto the border cells rather than dropped.
// 3.  **Monotonic Between Resets**: Non-positive and non-finite weights are ignored, so cell
//     values can only grow until `reset` zeroes the whole grid. Atomicity of reset with
//     respect to readers is provided by the owner's lock, not by this struct.
// 4.  **Rendering on Copies**: `snapshot` hands out an owned copy. Normalisation and colour
//     mapping happen on that copy, outside any critical section.

use crate::error::{Result, ValidationError};
use image::{ImageEncoder, Rgb, RgbImage};
use serde::Serialize;
use std::path::Path;

/// Accumulates per-cell weight over a frame-sized grid.
#[derive(Debug, Clone)]
pub struct HeatAccumulator {
    /// Width of the source frame in pixels.
    frame_width: u32,
    /// Height of the source frame in pixels.
    frame_height: u32,
    cell_width: u32,
    cell_height: u32,
    /// Number of cell columns (frame_width / cell_width, rounded up).
    grid_width: u32,
    /// Number of cell rows (frame_height / cell_height, rounded up).
    grid_height: u32,
    /// Row-major cell values.
    cells: Vec<f32>,
}

impl HeatAccumulator {
    pub fn new(
        frame_width: u32,
        frame_height: u32,
        cell_width: u32,
        cell_height: u32,
    ) -> std::result::Result<Self, ValidationError> {
        if frame_width == 0 || frame_height == 0 {
            return Err(ValidationError::InvalidDimensions {
                width: frame_width,
                height: frame_height,
            });
        }
        if cell_width == 0 || cell_height == 0 {
            return Err(ValidationError::InvalidDimensions {
                width: cell_width,
                height: cell_height,
            });
        }

        let grid_width = frame_width.div_ceil(cell_width);
        let grid_height = frame_height.div_ceil(cell_height);
        Ok(Self {
            frame_width,
            frame_height,
            cell_width,
            cell_height,
            grid_width,
            grid_height,
            cells: vec![0.0; (grid_width as usize) * (grid_height as usize)],
        })
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }

    pub fn grid_size(&self) -> (u32, u32) {
        (self.grid_width, self.grid_height)
    }

    /// Adds `weight` to the cell covering pixel `(x, y)`, clamping to the frame edge.
    pub fn add(&mut self, x: f64, y: f64, weight: f32) {
        if !weight.is_finite() || weight <= 0.0 || !x.is_finite() || !y.is_finite() {
            return;
        }
        let index = self.cell_index(x, y);
        self.cells[index] += weight;
    }

    fn cell_index(&self, x: f64, y: f64) -> usize {
        let px = x.clamp(0.0, f64::from(self.frame_width - 1));
        let py = y.clamp(0.0, f64::from(self.frame_height - 1));
        let col = ((px / f64::from(self.cell_width)) as u32).min(self.grid_width - 1);
        let row = ((py / f64::from(self.cell_height)) as u32).min(self.grid_height - 1);
        (row * self.grid_width + col) as usize
    }

    /// Value of the cell covering pixel `(x, y)`.
    pub fn value_at(&self, x: f64, y: f64) -> f32 {
        if !x.is_finite() || !y.is_finite() {
            return 0.0;
        }
        self.cells[self.cell_index(x, y)]
    }

    pub fn snapshot(&self) -> HeatmapSnapshot {
        HeatmapSnapshot {
            width: self.grid_width,
            height: self.grid_height,
            cell_width: self.cell_width,
            cell_height: self.cell_height,
            cells: self.cells.clone(),
        }
    }

    pub fn reset(&mut self) {
        self.cells.fill(0.0);
    }

    /// Rebuilds an empty grid for a new frame resolution, keeping the cell size.
    pub fn resize(
        &mut self,
        frame_width: u32,
        frame_height: u32,
    ) -> std::result::Result<(), ValidationError> {
        *self = Self::new(frame_width, frame_height, self.cell_width, self.cell_height)?;
        Ok(())
    }
}

/// An owned copy of the heat grid, row-major.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapSnapshot {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub cells: Vec<f32>,
}

impl HeatmapSnapshot {
    /// Value at grid column `col`, row `row`.
    pub fn get(&self, col: u32, row: u32) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.cells.get((row * self.width + col) as usize).copied()
    }

    pub fn max(&self) -> f32 {
        self.cells.iter().copied().fold(0.0, f32::max)
    }

    pub fn total(&self) -> f64 {
        self.cells.iter().map(|&v| f64::from(v)).sum()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.cells.chunks(self.width.max(1) as usize)
    }

    /// Renders the grid as a colour image, one pixel per cell.
    /// Cold cells are black; heat ramps from blue through yellow to red at the grid maximum.
    pub fn to_rgb_image(&self) -> RgbImage {
        let peak = self.max();
        RgbImage::from_fn(self.width, self.height, |col, row| {
            let value = self.get(col, row).unwrap_or(0.0);
            if peak <= 0.0 || value <= 0.0 {
                return Rgb([0, 0, 0]);
            }
            heat_color(value / peak)
        })
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let image = self.to_rgb_image();
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(std::io::BufWriter::new(output));
        encoder.write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(())
    }
}

/// Maps a normalised intensity in (0, 1] onto a blue -> yellow -> red ramp.
fn heat_color(intensity: f32) -> Rgb<u8> {
    let score = intensity.clamp(0.0, 1.0);
    let (r, g, b) = if score <= 0.5 {
        let ratio = score / 0.5;
        (0.0, 255.0 * ratio, 255.0 * (1.0 - ratio))
    } else {
        let ratio = (score - 0.5) / 0.5;
        (255.0 * ratio, 255.0 * (1.0 - ratio), 0.0)
    };
    Rgb([r as u8, g as u8, b as u8])
}
