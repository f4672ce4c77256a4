use anyhow::{bail, Context, Result};

use crate::navigation::ViewParameters;
use crate::scale::{compute_scale, series_scale, SERIES_VIEWPORT, SINGLE_VIEWPORT};
use crate::session::{AcquiredPlane, Plane, Session};

#[derive(Debug, Clone, Copy)]
pub struct PlaneFrame<'a> {
    pub rgba: &'a [u8],
    pub width: usize,
    pub height: usize,
    pub aspect: f32,
    pub scale: f32,
}

pub trait RasterSink {
    fn render_uncompressed_data(&mut self, plane: Plane, frame: &PlaneFrame<'_>) -> Result<()>;

    fn reset_canvas(&mut self, plane: Plane);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneRequest {
    pub axial: bool,
    pub sagittal: bool,
    pub coronal: bool,
}

impl PlaneRequest {
    pub const ALL: Self = Self {
        axial: true,
        sagittal: true,
        coronal: true,
    };

    pub fn only(plane: Plane) -> Self {
        let mut request = Self::default();
        request.insert(plane);
        request
    }

    pub fn visible(session: &Session) -> Self {
        match session {
            Session::Single(_) => Self::only(Plane::Axial),
            Session::Series(_) => Self::ALL,
        }
    }

    pub fn insert(&mut self, plane: Plane) {
        match plane {
            Plane::Axial => self.axial = true,
            Plane::Sagittal => self.sagittal = true,
            Plane::Coronal => self.coronal = true,
        }
    }

    pub fn contains(&self, plane: Plane) -> bool {
        match plane {
            Plane::Axial => self.axial,
            Plane::Sagittal => self.sagittal,
            Plane::Coronal => self.coronal,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.axial || self.sagittal || self.coronal)
    }

    pub fn planes(self) -> impl Iterator<Item = Plane> {
        Plane::ALL.into_iter().filter(move |plane| self.contains(*plane))
    }
}

/// Paints every plane in `request` with the view's current window and
/// indices. Each decoder buffer is released before the next plane is
/// acquired, including when the sink fails.
pub fn render_planes(
    session: &Session,
    view: &ViewParameters,
    request: PlaneRequest,
    sink: &mut dyn RasterSink,
) -> Result<()> {
    if request.is_empty() {
        log::debug!("Empty plane request");
        return Ok(());
    }
    let window = view
        .window
        .context("No window selected for the loaded image")?;
    let scale = match session {
        Session::Single(image) => {
            compute_scale(image.width as f32, image.height as f32, SINGLE_VIEWPORT)
        }
        Session::Series(volume) => series_scale(volume.extents(), SERIES_VIEWPORT),
    };

    for plane in request.planes() {
        let acquired = match session {
            Session::Single(image) => {
                if plane != Plane::Axial {
                    log::debug!("Ignoring {} request for a single image", plane.label());
                    continue;
                }
                image.acquire_frame(view.frame, window)?
            }
            Session::Series(volume) => volume.acquire_plane(plane, view.index(plane), window)?,
        };

        let AcquiredPlane {
            buffer,
            width,
            height,
            aspect,
        } = acquired;
        if buffer.element_count() != width * height {
            bail!(
                "{} buffer holds {} samples, expected {}x{}",
                plane.label(),
                buffer.element_count(),
                width,
                height
            );
        }
        let frame = PlaneFrame {
            rgba: buffer.bytes(),
            width,
            height,
            aspect,
            scale,
        };
        sink.render_uncompressed_data(plane, &frame)
            .with_context(|| format!("Could not paint the {} plane", plane.label()))?;
        buffer.release();
    }

    Ok(())
}
