use crate::sample::RGBA_STRIDE;
use crate::window::Window;

pub fn render_window_level<I>(samples: I, pixel_count: usize, invert: bool, window: Window) -> Vec<u8>
where
    I: IntoIterator<Item = i32>,
{
    let low = window.low();
    let range = (window.high() - low).max(1e-6);

    let mut rgba = Vec::with_capacity(pixel_count * RGBA_STRIDE);
    for sample in samples.into_iter().take(pixel_count) {
        let normalized = ((sample as f32 - low) / range).clamp(0.0, 1.0);
        let mut gray = (normalized * 255.0).round() as u8;
        if invert {
            gray = 255 - gray;
        }
        rgba.extend_from_slice(&[gray, gray, gray, 255]);
    }
    rgba.resize(pixel_count * RGBA_STRIDE, 0);
    rgba
}

pub fn render_rgb(frame_pixels: &[u8], pixel_count: usize, samples_per_pixel: u16) -> Vec<u8> {
    let spp = samples_per_pixel.max(1) as usize;
    let mut rgba = Vec::with_capacity(pixel_count * RGBA_STRIDE);

    for chunk in frame_pixels.chunks_exact(spp).take(pixel_count) {
        let r = chunk[0];
        let g = if spp > 1 { chunk[1] } else { r };
        let b = if spp > 2 { chunk[2] } else { r };
        rgba.extend_from_slice(&[r, g, b, 255]);
    }

    if rgba.len() < pixel_count * RGBA_STRIDE {
        rgba.resize(pixel_count * RGBA_STRIDE, 0);
    }
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_clamps_outside_window() {
        let window = Window::new(40.0, 400.0);
        let rgba = render_window_level([-1000, -160, 40, 240, 5000], 5, false, window);
        let grays: Vec<u8> = rgba.chunks_exact(4).map(|px| px[0]).collect();
        assert_eq!(grays, vec![0, 0, 128, 255, 255]);
        assert!(rgba.chunks_exact(4).all(|px| px[3] == 255 && px[0] == px[2]));
    }

    #[test]
    fn monochrome1_inverts() {
        let window = Window::new(127.5, 255.0);
        let rgba = render_window_level([0, 255], 2, true, window);
        assert_eq!(&rgba[..4], &[255, 255, 255, 255]);
        assert_eq!(&rgba[4..], &[0, 0, 0, 255]);
    }

    #[test]
    fn short_input_is_padded() {
        let rgba = render_window_level([10], 3, false, Window::new(0.0, 2.0));
        assert_eq!(rgba.len(), 12);
    }

    #[test]
    fn rgb_passthrough_adds_alpha() {
        let rgba = render_rgb(&[1, 2, 3, 4, 5, 6], 2, 3);
        assert_eq!(rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }
}
