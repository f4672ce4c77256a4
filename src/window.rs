pub const MIN_WINDOW_WIDTH: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub center: f32,
    pub width: f32,
}

impl Window {
    pub fn new(center: f32, width: f32) -> Self {
        Self {
            center,
            width: clamp_width(width),
        }
    }

    pub fn from_extrema(extrema: Extrema) -> Self {
        let min = f64::from(extrema.min);
        let max = f64::from(extrema.max);
        let center = ((max + min) / 2.0).floor();
        let width = (max - min).floor();
        Self::new(center as f32, width as f32)
    }

    pub fn low(&self) -> f32 {
        self.center - self.width / 2.0
    }

    pub fn high(&self) -> f32 {
        self.center + self.width / 2.0
    }
}

pub fn clamp_width(width: f32) -> f32 {
    if width.is_nan() {
        MIN_WINDOW_WIDTH
    } else {
        width.max(MIN_WINDOW_WIDTH)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extrema {
    pub min: i32,
    pub max: i32,
}

impl Extrema {
    pub fn of(values: &[i32]) -> Option<Self> {
        let mut iter = values.iter().copied();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        Some(Self { min, max })
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizationMode {
    PixelOrHuMaxMin,
    #[default]
    WindowCenterWidth,
    AbdomenSoftTissues,
    SpineSoftTissues,
    SpineBone,
    Brain,
    Lungs,
}

impl NormalizationMode {
    pub const ALL: [Self; 7] = [
        Self::PixelOrHuMaxMin,
        Self::WindowCenterWidth,
        Self::AbdomenSoftTissues,
        Self::SpineSoftTissues,
        Self::SpineBone,
        Self::Brain,
        Self::Lungs,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::PixelOrHuMaxMin => "Pixel/HU max-min",
            Self::WindowCenterWidth => "Window center/width",
            Self::AbdomenSoftTissues => "Abdomen soft tissues W400 L50",
            Self::SpineSoftTissues => "Spine soft tissues W250 L50",
            Self::SpineBone => "Spine bone W1800 L400",
            Self::Brain => "Brain W80 L40",
            Self::Lungs => "Lungs W1500 L-600",
        }
    }

    pub const fn preset(self) -> Option<Window> {
        let (center, width) = match self {
            Self::PixelOrHuMaxMin | Self::WindowCenterWidth => return None,
            Self::AbdomenSoftTissues => (50.0, 400.0),
            Self::SpineSoftTissues => (50.0, 250.0),
            Self::SpineBone => (400.0, 1800.0),
            Self::Brain => (40.0, 80.0),
            Self::Lungs => (-600.0, 1500.0),
        };
        Some(Window { center, width })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub default_window: Window,
    pub frame_extrema: Option<Extrema>,
    pub series_extrema: Extrema,
}

/// Picks the window for `mode`. `adjusted` is the live override left by a
/// mouse drag or inherited from the previous file.
pub fn compute_display_window(
    mode: NormalizationMode,
    stats: &WindowStats,
    adjusted: Option<Window>,
) -> Window {
    let window = match mode {
        NormalizationMode::WindowCenterWidth => adjusted.unwrap_or(stats.default_window),
        NormalizationMode::PixelOrHuMaxMin => {
            Window::from_extrema(stats.frame_extrema.unwrap_or(stats.series_extrema))
        }
        preset => preset.preset().unwrap_or(stats.default_window),
    };
    Window::new(window.center, window.width)
}

pub fn default_window(
    dataset_center: Option<f32>,
    dataset_width: Option<f32>,
    extrema: Extrema,
) -> Window {
    match (dataset_center, dataset_width) {
        (Some(center), Some(width)) => Window::new(center, width),
        _ => Window::from_extrema(extrema),
    }
}
