//! Recorded sheet activity and heat-map export.
//!
//! A forward pass run with `return_activations` yields an [`ActivationTrace`]: the
//! embedded input followed by the state after every step, copied to the host.
//! [`render_gif`] animates one batch element of a trace as a heat map over the
//! sheet, and [`render_png`] writes a single frame.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{Delay, Frame, Rgba, RgbaImage};
use ndarray::{Array2, ArrayView1};

use crate::data::float_vec;
use crate::error::{Result, TopographyError};
use crate::sheet::SheetSize;

/// Host copies of the sheet state, one `[batch, N]` frame per step.
#[derive(Clone, Debug, Default)]
pub struct ActivationTrace {
    frames: Vec<Array2<f32>>,
}

impl ActivationTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detach a neuron-major `[N, batch]` state and store it as `[batch, N]`.
    pub fn record<B: Backend>(&mut self, state: Tensor<B, 2>) -> Result<()> {
        let [n, batch] = state.dims();
        let values = float_vec(state.detach().transpose())?;
        self.frames.push(Array2::from_shape_vec((batch, n), values)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Array2<f32>] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Array2<f32>> {
        self.frames
    }

    /// Reshape every frame of one batch element onto the sheet grid.
    pub fn sheet_frames(&self, sheet: SheetSize, batch_index: usize) -> Result<Vec<Array2<f32>>> {
        self.frames
            .iter()
            .map(|frame| {
                let [batch, n] = [frame.nrows(), frame.ncols()];
                if n != sheet.num_neurons() {
                    return Err(TopographyError::SheetMismatch {
                        rows: sheet.rows,
                        cols: sheet.cols,
                        num_neurons: n,
                    });
                }
                if batch_index >= batch {
                    return Err(TopographyError::ShapeMismatch {
                        expected: batch_index + 1,
                        actual: batch,
                    });
                }
                let row: ArrayView1<f32> = frame.row(batch_index);
                Ok(row.to_owned().into_shape_with_order((sheet.rows, sheet.cols))?)
            })
            .collect()
    }
}

/// Options for [`render_gif`].
#[derive(Clone, Debug)]
pub struct GifOptions {
    /// Playback speed
    pub fps: u32,
    /// Half-open range of frames to keep; all frames when `None`
    pub frames: Option<(usize, usize)>,
    /// Pixels per neuron along each axis
    pub scale: u32,
    pub batch_index: usize,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            fps: 4,
            frames: None,
            scale: 1,
            batch_index: 0,
        }
    }
}

impl GifOptions {
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_frames(mut self, start: usize, end: usize) -> Self {
        self.frames = Some((start, end));
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_batch_index(mut self, batch_index: usize) -> Self {
        self.batch_index = batch_index;
        self
    }
}

/// Write an animated heat map of a trace. Activity is clamped to `[0, 1]`.
///
/// Returns the number of frames written.
pub fn render_gif(
    trace: &ActivationTrace,
    sheet: SheetSize,
    path: impl AsRef<Path>,
    options: &GifOptions,
) -> Result<usize> {
    let frames = trace.sheet_frames(sheet, options.batch_index)?;
    let frames = match options.frames {
        Some((start, end)) => {
            let end = end.min(frames.len());
            frames[start.min(end)..end].to_vec()
        }
        None => frames,
    };

    let delay = Delay::from_numer_denom_ms(1000, options.fps.max(1));
    let mut encoder = GifEncoder::new(BufWriter::new(File::create(path)?));
    encoder.set_repeat(Repeat::Infinite)?;
    for grid in &frames {
        let image = heat_map(grid, options.scale);
        encoder.encode_frame(Frame::from_parts(image, 0, 0, delay))?;
    }
    Ok(frames.len())
}

/// Write one frame of a trace as a PNG heat map.
pub fn render_png(
    trace: &ActivationTrace,
    sheet: SheetSize,
    step: usize,
    path: impl AsRef<Path>,
    options: &GifOptions,
) -> Result<()> {
    let frames = trace.sheet_frames(sheet, options.batch_index)?;
    let grid = frames.get(step).ok_or(TopographyError::ShapeMismatch {
        expected: step + 1,
        actual: frames.len(),
    })?;
    heat_map(grid, options.scale).save(path)?;
    Ok(())
}

fn heat_map(grid: &Array2<f32>, scale: u32) -> RgbaImage {
    let (rows, cols) = grid.dim();
    let image = RgbaImage::from_fn(cols as u32, rows as u32, |x, y| {
        colormap(grid[[y as usize, x as usize]])
    });
    if scale <= 1 {
        return image;
    }
    imageops::resize(
        &image,
        cols as u32 * scale,
        rows as u32 * scale,
        FilterType::Nearest,
    )
}

/// Viridis anchors at 0, 0.25, 0.5, 0.75 and 1.
const VIRIDIS: [[f32; 3]; 5] = [
    [68.0, 1.0, 84.0],
    [59.0, 82.0, 139.0],
    [33.0, 145.0, 140.0],
    [94.0, 201.0, 98.0],
    [253.0, 231.0, 37.0],
];

fn colormap(value: f32) -> Rgba<u8> {
    let v = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    let pos = v * (VIRIDIS.len() - 1) as f32;
    let lo = (pos.floor() as usize).min(VIRIDIS.len() - 2);
    let t = pos - lo as f32;
    let mix = |i: usize| (VIRIDIS[lo][i] + (VIRIDIS[lo + 1][i] - VIRIDIS[lo][i]) * t).round() as u8;
    Rgba([mix(0), mix(1), mix(2), 255])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_colormap_endpoints() {
        assert_eq!(colormap(-1.0), Rgba([68, 1, 84, 255]));
        assert_eq!(colormap(0.0), Rgba([68, 1, 84, 255]));
        assert_eq!(colormap(1.0), Rgba([253, 231, 37, 255]));
        assert_eq!(colormap(7.0), colormap(1.0));
    }

    #[test]
    fn test_record_transposes_to_batch_major() {
        let device = Default::default();
        let mut trace = ActivationTrace::new();
        // neuron-major [N=3, batch=2]
        let state = Tensor::<TestBackend, 2>::from_floats([[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]], &device);
        trace.record(state).unwrap();

        assert_eq!(trace.len(), 1);
        let frame = &trace.frames()[0];
        assert_eq!(frame.dim(), (2, 3));
        assert_eq!(frame.row(1).to_vec(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_sheet_frames_checks_sheet() {
        let device = Default::default();
        let mut trace = ActivationTrace::new();
        trace
            .record(Tensor::<TestBackend, 2>::zeros([6, 1], &device))
            .unwrap();

        let grids = trace.sheet_frames(SheetSize::new(2, 3), 0).unwrap();
        assert_eq!(grids[0].dim(), (2, 3));
        assert!(matches!(
            trace.sheet_frames(SheetSize::new(2, 2), 0),
            Err(TopographyError::SheetMismatch { .. })
        ));
        assert!(trace.sheet_frames(SheetSize::new(2, 3), 1).is_err());
    }
}
