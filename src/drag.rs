use crate::window::{Window, MIN_WINDOW_WIDTH};

#[derive(Debug, Default, Clone)]
pub struct DragController {
    last: Option<(f32, f32)>,
}

impl DragController {
    pub fn start(&mut self, x: f32, y: f32) {
        self.last = Some((x, y));
    }

    pub fn is_armed(&self) -> bool {
        self.last.is_some()
    }

    /// Applies the motion since the previous position to `previous`.
    /// Returns `None` when unarmed or when the cursor did not move.
    pub fn update(&mut self, x: f32, y: f32, previous: Window) -> Option<Window> {
        let (prev_x, prev_y) = self.last?;
        self.last = Some((x, y));

        let mut delta_x = x - prev_x;
        let delta_y = prev_y - y;
        if delta_x == 0.0 && delta_y == 0.0 {
            return None;
        }

        let mut width = previous.width + delta_x;
        if width < MIN_WINDOW_WIDTH {
            width = MIN_WINDOW_WIDTH;
            delta_x = 0.0;
        }
        log::trace!("window drag dx={delta_x} dy={delta_y}");

        Some(Window::new(previous.center + delta_y, width))
    }

    pub fn end(&mut self) {
        self.last = None;
    }
}
