use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ndarray::{s, Array3};

use crate::renderer::{render_rgb, render_window_level};
use crate::sample::{BufferLedger, SampleBuffer, RGBA_STRIDE};
use crate::scale::SeriesExtents;
use crate::window::{default_window, Extrema, Window, WindowStats};

const ORIENTATION_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    Axial,
    Sagittal,
    Coronal,
}

impl Plane {
    pub const ALL: [Self; 3] = [Self::Axial, Self::Sagittal, Self::Coronal];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Axial => "Axial",
            Self::Sagittal => "Sagittal",
            Self::Coronal => "Coronal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    pub modality: Option<String>,
    pub photometric: String,
    pub transfer_syntax_uid: String,
}

impl DatasetInfo {
    pub fn is_grayscale(&self) -> bool {
        matches!(
            self.photometric.trim().to_ascii_uppercase().as_str(),
            "MONOCHROME1" | "MONOCHROME2"
        )
    }

    pub fn is_inverted(&self) -> bool {
        self.photometric.trim().eq_ignore_ascii_case("MONOCHROME1")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FramePixels {
    Mono(Vec<i32>),
    Color {
        samples: Vec<u8>,
        samples_per_pixel: u16,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceGeometry {
    // Row spacing, column spacing (mm).
    pub pixel_spacing: Option<[f32; 2]>,
    pub slice_thickness: Option<f32>,
    pub spacing_between_slices: Option<f32>,
    pub position: Option<[f32; 3]>,
    pub orientation: Option<[f32; 6]>,
}

#[derive(Debug, Clone)]
pub struct DecodedSlice {
    pub info: DatasetInfo,
    pub width: usize,
    pub height: usize,
    pub frames: Vec<FramePixels>,
    pub window_center: Option<f32>,
    pub window_width: Option<f32>,
    pub geometry: SliceGeometry,
}

#[derive(Debug)]
pub struct AcquiredPlane {
    pub buffer: SampleBuffer,
    pub width: usize,
    pub height: usize,
    pub aspect: f32,
}

#[derive(Debug)]
pub enum Session {
    Single(SingleImage),
    Series(SeriesVolume),
}

impl Session {
    pub fn info(&self) -> &DatasetInfo {
        match self {
            Session::Single(image) => &image.info,
            Session::Series(volume) => &volume.info,
        }
    }

    pub fn is_grayscale(&self) -> bool {
        self.info().is_grayscale()
    }

    pub fn window_stats(&self, frame: usize) -> WindowStats {
        match self {
            Session::Single(image) => WindowStats {
                default_window: image.default_window,
                frame_extrema: image.frame_extrema(frame),
                series_extrema: image.series_extrema,
            },
            Session::Series(volume) => WindowStats {
                default_window: volume.default_window,
                frame_extrema: None,
                series_extrema: volume.series_extrema,
            },
        }
    }

    pub fn visible_planes(&self) -> &'static [Plane] {
        match self {
            Session::Single(_) => &[Plane::Axial],
            Session::Series(_) => &Plane::ALL,
        }
    }

    pub fn ledger(&self) -> &Arc<BufferLedger> {
        match self {
            Session::Single(image) => &image.ledger,
            Session::Series(volume) => &volume.ledger,
        }
    }
}

#[derive(Debug)]
pub struct SingleImage {
    pub info: DatasetInfo,
    pub width: usize,
    pub height: usize,
    frames: Vec<FramePixels>,
    frame_extrema: Vec<Option<Extrema>>,
    series_extrema: Extrema,
    default_window: Window,
    ledger: Arc<BufferLedger>,
}

impl SingleImage {
    pub fn new(slice: DecodedSlice) -> Result<Self> {
        let DecodedSlice {
            info,
            width,
            height,
            frames,
            window_center,
            window_width,
            ..
        } = slice;
        if frames.is_empty() {
            bail!("Image has no frames");
        }

        let pixel_count = width
            .checked_mul(height)
            .context("Overflow while calculating frame size")?;
        let mut frame_extrema = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            match frame {
                FramePixels::Mono(pixels) => {
                    if pixels.len() != pixel_count {
                        bail!(
                            "Decoded pixel count mismatch in frame {}: got {}, expected {}",
                            index + 1,
                            pixels.len(),
                            pixel_count
                        );
                    }
                    frame_extrema.push(Extrema::of(pixels));
                }
                FramePixels::Color { .. } => frame_extrema.push(None),
            }
        }

        let (series_extrema, default_window) =
            match frame_extrema.iter().flatten().copied().reduce(Extrema::merge) {
                Some(extrema) => (
                    extrema,
                    default_window(window_center, window_width, extrema),
                ),
                None => {
                    let extrema = Extrema { min: 0, max: 255 };
                    (extrema, Window::from_extrema(extrema))
                }
            };

        Ok(Self {
            info,
            width,
            height,
            frames,
            frame_extrema,
            series_extrema,
            default_window,
            ledger: BufferLedger::new(),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame_extrema(&self, frame: usize) -> Option<Extrema> {
        frame
            .checked_sub(1)
            .and_then(|index| self.frame_extrema.get(index).copied().flatten())
    }

    pub fn acquire_frame(&self, frame: usize, window: Window) -> Result<AcquiredPlane> {
        let pixels = frame
            .checked_sub(1)
            .and_then(|index| self.frames.get(index))
            .with_context(|| format!("Frame {} out of range 1..={}", frame, self.frames.len()))?;
        let pixel_count = self.width * self.height;

        let rgba = match pixels {
            FramePixels::Mono(samples) => render_window_level(
                samples.iter().copied(),
                pixel_count,
                self.info.is_inverted(),
                window,
            ),
            FramePixels::Color {
                samples,
                samples_per_pixel,
            } => render_rgb(samples, pixel_count, *samples_per_pixel),
        };

        Ok(AcquiredPlane {
            buffer: SampleBuffer::acquire(rgba, RGBA_STRIDE, &self.ledger),
            width: self.width,
            height: self.height,
            aspect: 1.0,
        })
    }
}

#[derive(Debug)]
pub struct SeriesVolume {
    pub info: DatasetInfo,
    voxels: Array3<i32>,
    series_extrema: Extrema,
    default_window: Window,
    pub sagittal_aspect: f32,
    pub coronal_aspect: f32,
    pub common_orientation: bool,
    source_order: Vec<usize>,
    ledger: Arc<BufferLedger>,
}

impl SeriesVolume {
    pub fn from_slices(slices: Vec<DecodedSlice>) -> Result<Self> {
        let Some(first) = slices.first() else {
            bail!("Series contains no images");
        };
        let (width, height) = (first.width, first.height);
        if let Some(index) = slices
            .iter()
            .position(|slice| slice.width != width || slice.height != height)
        {
            bail!(
                "Inconsistent slice dimensions: slice {} is {}x{}, expected {}x{}",
                index + 1,
                slices[index].width,
                slices[index].height,
                width,
                height
            );
        }

        let common_orientation = shares_orientation(&slices);
        let sorted = if common_orientation {
            position_order(&slices)
        } else {
            log::warn!("Series slices do not share one orientation; keeping file order");
            None
        };
        let (source_order, positions) = match sorted {
            Some((order, positions)) => (order, Some(positions)),
            None => ((0..slices.len()).collect(), None),
        };
        let mut slots: Vec<_> = slices.into_iter().map(Some).collect();
        let slices: Vec<DecodedSlice> = source_order
            .iter()
            .filter_map(|&index| slots[index].take())
            .collect();

        let first = &slices[0];
        let info = first.info.clone();
        let (window_center, window_width) = (first.window_center, first.window_width);
        let geometry = first.geometry.clone();

        let depth = slices.len();
        let mut data = Vec::with_capacity(depth * width * height);
        for (index, slice) in slices.into_iter().enumerate() {
            match slice.frames.into_iter().next() {
                Some(FramePixels::Mono(pixels)) if pixels.len() == width * height => {
                    data.extend(pixels)
                }
                Some(FramePixels::Mono(pixels)) => bail!(
                    "Decoded pixel count mismatch in slice {}: got {}, expected {}",
                    index + 1,
                    pixels.len(),
                    width * height
                ),
                Some(FramePixels::Color { .. }) => {
                    bail!("Series mode supports monochrome images only (slice {})", index + 1)
                }
                None => bail!("Slice {} has no frames", index + 1),
            }
        }

        let series_extrema = Extrema::of(&data).context("No pixels available for rendering")?;
        let voxels = Array3::from_shape_vec((depth, height, width), data)
            .context("Could not assemble series volume")?;

        let slice_spacing = slice_spacing(&geometry, positions.as_deref());
        let [row_spacing, column_spacing] = geometry.pixel_spacing.unwrap_or([1.0, 1.0]);

        Ok(Self {
            info,
            voxels,
            series_extrema,
            default_window: default_window(window_center, window_width, series_extrema),
            sagittal_aspect: aspect(slice_spacing, row_spacing),
            coronal_aspect: aspect(slice_spacing, column_spacing),
            common_orientation,
            source_order,
            ledger: BufferLedger::new(),
        })
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        let (z, y, x) = self.voxels.dim();
        (x, y, z)
    }

    pub fn extents(&self) -> SeriesExtents {
        let (x, y, z) = self.dims();
        SeriesExtents {
            x,
            y,
            z,
            sagittal_aspect: self.sagittal_aspect,
            coronal_aspect: self.coronal_aspect,
        }
    }

    pub fn source_index(&self, index: usize) -> Option<usize> {
        let slot = index.checked_sub(1)?;
        self.source_order.get(slot).map(|source| source + 1)
    }

    pub fn plane_count(&self, plane: Plane) -> usize {
        let (x, y, z) = self.dims();
        match plane {
            Plane::Axial => z,
            Plane::Sagittal => x,
            Plane::Coronal => y,
        }
    }

    pub fn acquire_plane(&self, plane: Plane, index: usize, window: Window) -> Result<AcquiredPlane> {
        let count = self.plane_count(plane);
        if index == 0 || index > count {
            bail!("{} index {} out of range 1..={}", plane.label(), index, count);
        }
        let i = index - 1;
        let (view, aspect) = match plane {
            Plane::Axial => (self.voxels.slice(s![i, .., ..]), 1.0),
            Plane::Sagittal => (self.voxels.slice(s![.., .., i]), self.sagittal_aspect),
            Plane::Coronal => (self.voxels.slice(s![.., i, ..]), self.coronal_aspect),
        };
        let (height, width) = view.dim();
        let rgba = render_window_level(
            view.iter().copied(),
            width * height,
            self.info.is_inverted(),
            window,
        );

        Ok(AcquiredPlane {
            buffer: SampleBuffer::acquire(rgba, RGBA_STRIDE, &self.ledger),
            width,
            height,
            aspect,
        })
    }
}

fn shares_orientation(slices: &[DecodedSlice]) -> bool {
    let mut orientations = slices.iter().map(|slice| slice.geometry.orientation);
    let Some(Some(reference)) = orientations.next() else {
        return false;
    };
    orientations.all(|orientation| {
        orientation.is_some_and(|o| {
            o.iter()
                .zip(reference.iter())
                .all(|(a, b)| (a - b).abs() <= ORIENTATION_TOLERANCE)
        })
    })
}

/// Input indices ordered along the shared normal, highest position first,
/// with their projected positions. `None` when any slice lacks a position.
fn position_order(slices: &[DecodedSlice]) -> Option<(Vec<usize>, Vec<f32>)> {
    let orientation = slices.first()?.geometry.orientation?;
    let normal = slice_normal(orientation);
    let projected = slices
        .iter()
        .map(|slice| {
            slice
                .geometry
                .position
                .map(|p| p[0] * normal[0] + p[1] * normal[1] + p[2] * normal[2])
        })
        .collect::<Option<Vec<f32>>>()?;

    let mut order: Vec<usize> = (0..slices.len()).collect();
    order.sort_by(|&a, &b| {
        projected[b]
            .partial_cmp(&projected[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let positions = order.iter().map(|&index| projected[index]).collect();
    Some((order, positions))
}

fn slice_normal(o: [f32; 6]) -> [f32; 3] {
    [
        o[1] * o[5] - o[2] * o[4],
        o[2] * o[3] - o[0] * o[5],
        o[0] * o[4] - o[1] * o[3],
    ]
}

fn slice_spacing(geometry: &SliceGeometry, positions: Option<&[f32]>) -> f32 {
    geometry
        .spacing_between_slices
        .filter(|value| *value > 0.0)
        .or_else(|| {
            positions
                .filter(|p| p.len() >= 2)
                .map(|p| (p[0] - p[1]).abs())
                .filter(|value| *value > 0.0)
        })
        .or(geometry.slice_thickness.filter(|value| *value > 0.0))
        .unwrap_or(1.0)
}

fn aspect(slice_spacing: f32, pixel_spacing: f32) -> f32 {
    if pixel_spacing > 0.0 {
        slice_spacing / pixel_spacing
    } else {
        1.0
    }
}
