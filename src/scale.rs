#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub max_width: f32,
    pub max_height: f32,
}

pub const SERIES_VIEWPORT: Viewport = Viewport {
    max_width: 400.0,
    max_height: 400.0,
};

pub const SINGLE_VIEWPORT: Viewport = Viewport {
    max_width: 1024.0,
    max_height: 1024.0,
};

/// Isotropic scale that fits a `native_width` x `native_height` plane into
/// `viewport`. Never upscales.
pub fn compute_scale(native_width: f32, native_height: f32, viewport: Viewport) -> f32 {
    if native_width <= viewport.max_width && native_height <= viewport.max_height {
        return 1.0;
    }
    let scale_w = native_width / viewport.max_width;
    let scale_h = native_height / viewport.max_height;
    1.0 / scale_w.max(scale_h)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesExtents {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub sagittal_aspect: f32,
    pub coronal_aspect: f32,
}

pub fn series_scale(extents: SeriesExtents, viewport: Viewport) -> f32 {
    let axial = compute_scale(extents.x as f32, extents.y as f32, viewport);
    let sagittal = compute_scale(
        extents.y as f32,
        extents.z as f32 * extents.sagittal_aspect,
        viewport,
    );
    let coronal = compute_scale(
        extents.x as f32,
        extents.z as f32 * extents.coronal_aspect,
        viewport,
    );
    axial.min(sagittal).min(coronal)
}
