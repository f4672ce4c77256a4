use anyhow::Result;

use crate::dispatch::PlaneRequest;
use crate::drag::DragController;
use crate::launch::{accept_sources, FileSource};
use crate::session::{Plane, Session};
use crate::window::{compute_display_window, NormalizationMode, Window};

/// What the next render uses. Indices are 1-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParameters {
    pub mode: NormalizationMode,
    // Effective window for the next render. `None` until an image is
    // installed.
    pub window: Option<Window>,
    // Live override from dragging, carried into the next single file.
    pub adjusted: Option<Window>,
    pub frame: usize,
    pub file: usize,
    pub sagittal: usize,
    pub coronal: usize,
}

impl Default for ViewParameters {
    fn default() -> Self {
        Self {
            mode: NormalizationMode::default(),
            window: None,
            adjusted: None,
            frame: 1,
            file: 1,
            sagittal: 1,
            coronal: 1,
        }
    }
}

impl ViewParameters {
    pub fn index(&self, plane: Plane) -> usize {
        match plane {
            Plane::Axial => self.file,
            Plane::Sagittal => self.sagittal,
            Plane::Coronal => self.coronal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Previous,
    Next,
}

#[derive(Debug)]
pub enum Event {
    Load(Vec<FileSource>),
    Decoded {
        generation: u64,
        result: Result<Session>,
    },
    ToggleSeriesMode,
    SwitchFile(usize),
    StepFile(Step),
    SwitchSagittal(usize),
    SwitchCoronal(usize),
    SwitchFrame(usize),
    SetNormalization(NormalizationMode),
    DragStart { x: f32, y: f32 },
    DragMove { x: f32, y: f32 },
    DragEnd,
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeJob {
    Single(FileSource),
    Series(Vec<FileSource>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodeRequest {
    pub generation: u64,
    pub job: DecodeJob,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Decode(DecodeRequest),
    Render(PlaneRequest),
    ResetCanvas,
    Alert(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Inherited {
    mode: NormalizationMode,
    adjusted: Option<Window>,
}

#[derive(Debug)]
struct PendingLoad {
    generation: u64,
    files: Vec<FileSource>,
    series_mode: bool,
    file_index: usize,
    inherit: Option<Inherited>,
}

#[derive(Debug, Default)]
pub struct Viewer {
    generation: u64,
    files: Vec<FileSource>,
    series_mode: bool,
    session: Option<Session>,
    view: ViewParameters,
    drag: DragController,
    pending: Option<PendingLoad>,
}

impl Viewer {
    pub fn new(series_mode: bool) -> Self {
        Self {
            series_mode,
            ..Self::default()
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn view(&self) -> &ViewParameters {
        &self.view
    }

    pub fn series_mode(&self) -> bool {
        self.series_mode
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_armed()
    }

    pub fn files(&self) -> &[FileSource] {
        &self.files
    }

    pub fn total_files(&self) -> usize {
        match &self.session {
            Some(Session::Series(volume)) => volume.plane_count(Plane::Axial),
            Some(Session::Single(_)) => self.files.len(),
            None => 0,
        }
    }

    pub fn total_frames(&self) -> usize {
        match &self.session {
            Some(Session::Single(image)) => image.frame_count(),
            _ => 0,
        }
    }

    pub fn total_sagittal(&self) -> usize {
        self.series_count(Plane::Sagittal)
    }

    pub fn total_coronal(&self) -> usize {
        self.series_count(Plane::Coronal)
    }

    fn series_count(&self, plane: Plane) -> usize {
        match &self.session {
            Some(Session::Series(volume)) => volume.plane_count(plane),
            _ => 0,
        }
    }

    pub fn dispatch(&mut self, event: Event) -> Vec<Command> {
        match event {
            Event::Load(sources) => self.load(sources),
            Event::Decoded { generation, result } => self.decoded(generation, result),
            Event::ToggleSeriesMode => self.toggle_series_mode(),
            Event::SwitchFile(index) => self.switch_file(index),
            Event::StepFile(step) => self.step_file(step),
            Event::SwitchSagittal(index) => self.switch_slice(Plane::Sagittal, index),
            Event::SwitchCoronal(index) => self.switch_slice(Plane::Coronal, index),
            Event::SwitchFrame(frame) => self.switch_frame(frame),
            Event::SetNormalization(mode) => self.set_normalization(mode),
            Event::DragStart { x, y } => self.drag_start(x, y),
            Event::DragMove { x, y } => self.drag_move(x, y),
            Event::DragEnd => {
                self.drag.end();
                Vec::new()
            }
            Event::Reset => self.reset(),
        }
    }

    fn load(&mut self, sources: Vec<FileSource>) -> Vec<Command> {
        let files = accept_sources(sources);
        if files.is_empty() {
            log::debug!("Load ignored: no DICOM files");
            return Vec::new();
        }
        log::info!(
            "Loading {} file(s) as {}",
            files.len(),
            if self.series_mode { "a series" } else { "single images" }
        );
        vec![self.request_decode(files, self.series_mode, 1, None)]
    }

    fn request_decode(
        &mut self,
        files: Vec<FileSource>,
        series_mode: bool,
        file_index: usize,
        inherit: Option<Inherited>,
    ) -> Command {
        self.generation += 1;
        let job = if series_mode {
            DecodeJob::Series(files.clone())
        } else {
            DecodeJob::Single(files[file_index - 1].clone())
        };
        self.pending = Some(PendingLoad {
            generation: self.generation,
            files,
            series_mode,
            file_index,
            inherit,
        });
        Command::Decode(DecodeRequest {
            generation: self.generation,
            job,
        })
    }

    fn decoded(&mut self, generation: u64, result: Result<Session>) -> Vec<Command> {
        let pending = match self.pending.take() {
            Some(pending) if pending.generation == generation => pending,
            other => {
                log::debug!("Discarding stale decode result (generation {generation})");
                self.pending = other;
                return Vec::new();
            }
        };

        match result {
            Ok(session) => self.install(pending, session),
            Err(err) => {
                log::error!("Decode failed: {err:#}");
                self.series_mode = match &self.session {
                    Some(session) => matches!(session, Session::Series(_)),
                    None => self.series_mode,
                };
                vec![Command::Alert(format!("{err:#}"))]
            }
        }
    }

    fn install(&mut self, pending: PendingLoad, session: Session) -> Vec<Command> {
        let PendingLoad {
            files,
            series_mode,
            file_index,
            inherit,
            ..
        } = pending;

        let mut view = ViewParameters::default();
        if let Some(inherit) = inherit {
            view.mode = inherit.mode;
            view.adjusted = inherit.adjusted;
        }
        match &session {
            Session::Single(_) => view.file = file_index,
            Session::Series(volume) => {
                view.sagittal = centre(volume.plane_count(Plane::Sagittal));
                view.coronal = centre(volume.plane_count(Plane::Coronal));
            }
        }
        view.window = Some(compute_display_window(
            view.mode,
            &session.window_stats(view.frame),
            view.adjusted,
        ));

        self.drag.end();
        self.files = files;
        self.series_mode = series_mode;
        self.view = view;
        let request = PlaneRequest::visible(&session);
        self.session = Some(session);

        vec![Command::ResetCanvas, Command::Render(request)]
    }

    fn toggle_series_mode(&mut self) -> Vec<Command> {
        let series_mode = !self.series_mode;
        if self.files.is_empty() {
            self.series_mode = series_mode;
            return Vec::new();
        }
        log::info!(
            "Reloading {} file(s) in {} mode",
            self.files.len(),
            if series_mode { "series" } else { "single" }
        );
        let file_index = match &self.session {
            Some(Session::Series(volume)) => volume.source_index(self.view.file).unwrap_or(1),
            _ => self.view.file,
        }
        .clamp(1, self.files.len());
        self.series_mode = series_mode;
        vec![self.request_decode(self.files.clone(), series_mode, file_index, None)]
    }

    fn target_file(&self) -> usize {
        self.pending
            .as_ref()
            .filter(|pending| pending.inherit.is_some())
            .map_or(self.view.file, |pending| pending.file_index)
    }

    fn switch_file(&mut self, index: usize) -> Vec<Command> {
        let total = self.total_files();
        let current = match &self.session {
            Some(Session::Single(_)) => self.target_file(),
            _ => self.view.file,
        };
        if index == 0 || index > total || index == current {
            log::debug!("File switch to {index} ignored (total {total})");
            return Vec::new();
        }

        match &self.session {
            Some(Session::Series(_)) => {
                self.view.file = index;
                vec![Command::Render(PlaneRequest::only(Plane::Axial))]
            }
            Some(Session::Single(_)) => {
                let inherit = Inherited {
                    mode: self.view.mode,
                    adjusted: self.view.adjusted,
                };
                vec![self.request_decode(self.files.clone(), false, index, Some(inherit))]
            }
            None => Vec::new(),
        }
    }

    fn step_file(&mut self, step: Step) -> Vec<Command> {
        let current = match &self.session {
            Some(Session::Single(_)) => self.target_file(),
            _ => self.view.file,
        };
        let target = match step {
            Step::Previous => current.checked_sub(1),
            Step::Next => Some(current + 1),
        };
        match target {
            Some(index) => self.switch_file(index),
            None => Vec::new(),
        }
    }

    fn switch_slice(&mut self, plane: Plane, index: usize) -> Vec<Command> {
        let total = self.series_count(plane);
        if index == 0 || index > total {
            log::debug!("{} switch to {index} ignored (total {total})", plane.label());
            return Vec::new();
        }
        match plane {
            Plane::Sagittal => self.view.sagittal = index,
            Plane::Coronal => self.view.coronal = index,
            Plane::Axial => self.view.file = index,
        }
        vec![Command::Render(PlaneRequest::only(plane))]
    }

    fn switch_frame(&mut self, frame: usize) -> Vec<Command> {
        let Some(session @ Session::Single(image)) = &self.session else {
            log::debug!("Frame switch ignored outside single mode");
            return Vec::new();
        };
        if frame == 0 || frame > image.frame_count() {
            log::debug!("Frame switch to {frame} ignored (total {})", image.frame_count());
            return Vec::new();
        }

        self.view.frame = frame;
        if self.view.mode == NormalizationMode::PixelOrHuMaxMin {
            self.view.window = Some(compute_display_window(
                self.view.mode,
                &session.window_stats(frame),
                self.view.adjusted,
            ));
        }
        vec![Command::Render(PlaneRequest::only(Plane::Axial))]
    }

    fn set_normalization(&mut self, mode: NormalizationMode) -> Vec<Command> {
        let Some(session) = &self.session else {
            log::debug!("Normalization change ignored: nothing loaded");
            return Vec::new();
        };
        self.view.mode = mode;
        self.view.window = Some(compute_display_window(
            mode,
            &session.window_stats(self.view.frame),
            self.view.adjusted,
        ));
        vec![Command::Render(PlaneRequest::visible(session))]
    }

    fn drag_start(&mut self, x: f32, y: f32) -> Vec<Command> {
        match &self.session {
            Some(session) if session.is_grayscale() => self.drag.start(x, y),
            _ => log::debug!("Drag ignored: no grayscale image"),
        }
        Vec::new()
    }

    fn drag_move(&mut self, x: f32, y: f32) -> Vec<Command> {
        let (Some(session), Some(previous)) = (&self.session, self.view.window) else {
            return Vec::new();
        };
        let Some(window) = self.drag.update(x, y, previous) else {
            return Vec::new();
        };

        self.view.window = Some(window);
        self.view.adjusted = Some(window);
        self.view.mode = NormalizationMode::WindowCenterWidth;
        vec![Command::Render(PlaneRequest::visible(session))]
    }

    fn reset(&mut self) -> Vec<Command> {
        self.generation += 1;
        self.pending = None;
        self.session = None;
        self.files.clear();
        self.view = ViewParameters::default();
        self.drag.end();
        log::info!("Viewer reset");
        vec![Command::ResetCanvas]
    }
}

fn centre(count: usize) -> usize {
    ((count + 1) / 2).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{mono_slice, positioned};
    use crate::session::{FramePixels, SeriesVolume, SingleImage};
    use std::path::PathBuf;

    fn local(name: &str) -> FileSource {
        FileSource::Local(PathBuf::from(name))
    }

    fn single_session(window: Option<(f32, f32)>) -> Session {
        Session::Single(
            SingleImage::new(mono_slice(512, 512, |i| (i % 1000) as i32 - 500, window))
                .expect("image"),
        )
    }

    fn series_session(files: usize) -> Session {
        let slices = (0..files)
            .map(|_| mono_slice(256, 256, |i| (i % 300) as i32, Some((40.0, 400.0))))
            .collect();
        Session::Series(SeriesVolume::from_slices(slices).expect("volume"))
    }

    fn decode_generation(commands: &[Command]) -> u64 {
        match commands {
            [Command::Decode(request)] => request.generation,
            other => panic!("expected a single decode, got {other:?}"),
        }
    }

    // Loads `names` and installs `session` for the resulting request.
    fn loaded(viewer: &mut Viewer, names: &[&str], session: Session) -> Vec<Command> {
        let commands = viewer.dispatch(Event::Load(names.iter().map(|n| local(n)).collect()));
        let generation = decode_generation(&commands);
        viewer.dispatch(Event::Decoded {
            generation,
            result: Ok(session),
        })
    }

    #[test]
    fn load_filters_sorts_and_decodes_first_file() {
        let mut viewer = Viewer::new(false);
        let commands = viewer.dispatch(Event::Load(vec![
            local("b.dcm"),
            local("notes.txt"),
            local("a.DICOM"),
        ]));
        assert_eq!(
            commands,
            vec![Command::Decode(DecodeRequest {
                generation: 1,
                job: DecodeJob::Single(local("a.DICOM")),
            })]
        );
        assert!(viewer.is_loading());
        assert!(viewer.session().is_none());
    }

    #[test]
    fn load_without_dicom_files_is_noop() {
        let mut viewer = Viewer::new(true);
        assert!(viewer.dispatch(Event::Load(vec![local("x.png")])).is_empty());
        assert!(viewer.dispatch(Event::Load(Vec::new())).is_empty());
        assert!(!viewer.is_loading());
    }

    #[test]
    fn install_single_uses_dataset_window() {
        let mut viewer = Viewer::new(false);
        let commands = loaded(&mut viewer, &["a.dcm"], single_session(Some((40.0, 400.0))));
        assert_eq!(
            commands,
            vec![
                Command::ResetCanvas,
                Command::Render(PlaneRequest::only(Plane::Axial))
            ]
        );
        assert_eq!(viewer.view().window, Some(Window::new(40.0, 400.0)));
        assert_eq!(viewer.view().mode, NormalizationMode::WindowCenterWidth);
        assert_eq!((viewer.total_files(), viewer.total_frames()), (1, 1));
    }

    #[test]
    fn install_series_reports_totals_and_centres_slices() {
        let mut viewer = Viewer::new(true);
        let names = ["1.dcm", "2.dcm", "3.dcm"];
        let commands = viewer.dispatch(Event::Load(names.iter().map(|n| local(n)).collect()));
        assert!(matches!(
            &commands[..],
            [Command::Decode(DecodeRequest { job: DecodeJob::Series(files), .. })] if files.len() == 3
        ));
        let generation = decode_generation(&commands);

        let commands = viewer.dispatch(Event::Decoded {
            generation,
            result: Ok(series_session(3)),
        });
        assert_eq!(commands[1], Command::Render(PlaneRequest::ALL));
        assert_eq!(
            (viewer.total_files(), viewer.total_sagittal(), viewer.total_coronal()),
            (3, 256, 256)
        );
        assert_eq!((viewer.view().sagittal, viewer.view().coronal), (128, 128));
        assert_eq!(viewer.view().file, 1);
    }

    #[test]
    fn stale_generation_is_discarded() {
        let mut viewer = Viewer::new(false);
        let first = decode_generation(&viewer.dispatch(Event::Load(vec![local("a.dcm")])));
        let second = decode_generation(&viewer.dispatch(Event::Load(vec![local("b.dcm")])));
        assert_ne!(first, second);

        let stale = viewer.dispatch(Event::Decoded {
            generation: first,
            result: Ok(single_session(None)),
        });
        assert!(stale.is_empty());
        assert!(viewer.session().is_none());
        assert!(viewer.is_loading());

        viewer.dispatch(Event::Decoded {
            generation: second,
            result: Ok(single_session(None)),
        });
        assert!(viewer.session().is_some());
        assert_eq!(viewer.files(), &[local("b.dcm")]);
    }

    #[test]
    fn result_after_reset_is_discarded() {
        let mut viewer = Viewer::new(false);
        let generation = decode_generation(&viewer.dispatch(Event::Load(vec![local("a.dcm")])));
        assert_eq!(viewer.dispatch(Event::Reset), vec![Command::ResetCanvas]);
        assert!(viewer
            .dispatch(Event::Decoded {
                generation,
                result: Ok(single_session(None)),
            })
            .is_empty());
        assert!(viewer.session().is_none());
    }

    #[test]
    fn decode_failure_alerts_and_keeps_previous_session() {
        let mut viewer = Viewer::new(false);
        loaded(&mut viewer, &["a.dcm"], single_session(Some((40.0, 400.0))));

        let generation = decode_generation(&viewer.dispatch(Event::Load(vec![local("bad.dcm")])));
        let commands = viewer.dispatch(Event::Decoded {
            generation,
            result: Err(anyhow::anyhow!("Missing Rows tag")),
        });
        assert_eq!(commands, vec![Command::Alert("Missing Rows tag".to_string())]);
        assert!(viewer.session().is_some());
        assert_eq!(viewer.files(), &[local("a.dcm")]);
        assert_eq!(viewer.view().window, Some(Window::new(40.0, 400.0)));
    }

    #[test]
    fn single_file_switch_inherits_window() {
        let mut viewer = Viewer::new(false);
        loaded(
            &mut viewer,
            &["a.dcm", "b.dcm"],
            single_session(Some((40.0, 400.0))),
        );
        viewer.dispatch(Event::DragStart { x: 0.0, y: 0.0 });
        viewer.dispatch(Event::DragMove { x: 10.0, y: -5.0 });
        viewer.dispatch(Event::DragEnd);
        let dragged = Window::new(45.0, 410.0);
        assert_eq!(viewer.view().window, Some(dragged));

        let commands = viewer.dispatch(Event::StepFile(Step::Next));
        assert_eq!(
            commands,
            vec![Command::Decode(DecodeRequest {
                generation: 2,
                job: DecodeJob::Single(local("b.dcm")),
            })]
        );
        viewer.dispatch(Event::Decoded {
            generation: 2,
            result: Ok(single_session(Some((300.0, 1000.0)))),
        });
        assert_eq!(viewer.view().file, 2);
        assert_eq!(viewer.view().window, Some(dragged));
        assert_eq!(viewer.view().adjusted, Some(dragged));
    }

    #[test]
    fn single_file_switch_without_drag_uses_new_file_window() {
        let mut viewer = Viewer::new(false);
        loaded(
            &mut viewer,
            &["a.dcm", "b.dcm"],
            single_session(Some((40.0, 400.0))),
        );
        let generation = decode_generation(&viewer.dispatch(Event::StepFile(Step::Next)));
        viewer.dispatch(Event::Decoded {
            generation,
            result: Ok(single_session(Some((300.0, 1000.0)))),
        });
        assert_eq!(viewer.view().file, 2);
        assert_eq!(viewer.view().window, Some(Window::new(300.0, 1000.0)));
        assert_eq!(viewer.view().adjusted, None);
    }

    #[test]
    fn repeated_steps_advance_past_pending_file() {
        let mut viewer = Viewer::new(false);
        loaded(&mut viewer, &["a.dcm", "b.dcm", "c.dcm"], single_session(None));

        let first = viewer.dispatch(Event::StepFile(Step::Next));
        let second = viewer.dispatch(Event::StepFile(Step::Next));
        assert_eq!(
            first,
            vec![Command::Decode(DecodeRequest {
                generation: 2,
                job: DecodeJob::Single(local("b.dcm")),
            })]
        );
        assert_eq!(
            second,
            vec![Command::Decode(DecodeRequest {
                generation: 3,
                job: DecodeJob::Single(local("c.dcm")),
            })]
        );
        assert!(viewer.dispatch(Event::StepFile(Step::Next)).is_empty());

        let back = viewer.dispatch(Event::StepFile(Step::Previous));
        assert_eq!(
            back,
            vec![Command::Decode(DecodeRequest {
                generation: 4,
                job: DecodeJob::Single(local("b.dcm")),
            })]
        );
        viewer.dispatch(Event::Decoded {
            generation: 4,
            result: Ok(single_session(None)),
        });
        assert_eq!(viewer.view().file, 2);
    }

    #[test]
    fn single_file_switch_keeps_preset_mode() {
        let mut viewer = Viewer::new(false);
        loaded(&mut viewer, &["a.dcm", "b.dcm"], single_session(None));
        viewer.dispatch(Event::SetNormalization(NormalizationMode::Brain));
        let generation = decode_generation(&viewer.dispatch(Event::SwitchFile(2)));
        viewer.dispatch(Event::Decoded {
            generation,
            result: Ok(single_session(Some((1.0, 2.0)))),
        });
        assert_eq!(viewer.view().mode, NormalizationMode::Brain);
        assert_eq!(viewer.view().window, Some(Window::new(40.0, 80.0)));
    }

    #[test]
    fn series_file_switch_renders_axial_only() {
        let mut viewer = Viewer::new(true);
        loaded(&mut viewer, &["1.dcm", "2.dcm", "3.dcm"], series_session(3));
        assert_eq!(
            viewer.dispatch(Event::SwitchFile(3)),
            vec![Command::Render(PlaneRequest::only(Plane::Axial))]
        );
        assert_eq!(viewer.view().file, 3);
    }

    #[test]
    fn step_past_either_end_is_noop() {
        let mut viewer = Viewer::new(true);
        loaded(&mut viewer, &["1.dcm", "2.dcm", "3.dcm"], series_session(3));
        assert!(viewer.dispatch(Event::StepFile(Step::Previous)).is_empty());
        viewer.dispatch(Event::SwitchFile(3));
        let before = *viewer.view();
        assert!(viewer.dispatch(Event::StepFile(Step::Next)).is_empty());
        assert_eq!(*viewer.view(), before);
        assert!(viewer.dispatch(Event::SwitchFile(0)).is_empty());
    }

    #[test]
    fn sagittal_and_coronal_bounds() {
        let mut viewer = Viewer::new(true);
        loaded(&mut viewer, &["1.dcm", "2.dcm"], series_session(2));
        assert_eq!(
            viewer.dispatch(Event::SwitchSagittal(256)),
            vec![Command::Render(PlaneRequest::only(Plane::Sagittal))]
        );
        assert_eq!(
            viewer.dispatch(Event::SwitchCoronal(1)),
            vec![Command::Render(PlaneRequest::only(Plane::Coronal))]
        );
        assert!(viewer.dispatch(Event::SwitchSagittal(257)).is_empty());
        assert!(viewer.dispatch(Event::SwitchCoronal(0)).is_empty());
        assert_eq!((viewer.view().sagittal, viewer.view().coronal), (256, 1));
    }

    #[test]
    fn slice_switches_need_a_series() {
        let mut viewer = Viewer::new(false);
        loaded(&mut viewer, &["a.dcm"], single_session(None));
        assert!(viewer.dispatch(Event::SwitchSagittal(1)).is_empty());
    }

    #[test]
    fn toggle_series_round_trip_restores_window() {
        let mut viewer = Viewer::new(false);
        loaded(
            &mut viewer,
            &["1.dcm", "2.dcm", "3.dcm"],
            single_session(Some((40.0, 400.0))),
        );
        let initial = viewer.view().window;

        let commands = viewer.dispatch(Event::ToggleSeriesMode);
        assert!(matches!(
            &commands[..],
            [Command::Decode(DecodeRequest { job: DecodeJob::Series(_), .. })]
        ));
        viewer.dispatch(Event::Decoded {
            generation: decode_generation(&commands),
            result: Ok(series_session(3)),
        });
        assert!(viewer.series_mode());
        assert_eq!(viewer.view().window, initial);

        let commands = viewer.dispatch(Event::ToggleSeriesMode);
        assert!(matches!(
            &commands[..],
            [Command::Decode(DecodeRequest { job: DecodeJob::Single(_), .. })]
        ));
        viewer.dispatch(Event::Decoded {
            generation: decode_generation(&commands),
            result: Ok(single_session(Some((40.0, 400.0)))),
        });
        assert!(!viewer.series_mode());
        assert_eq!(viewer.view().window, initial);
        assert_eq!(viewer.view().adjusted, None);
    }

    #[test]
    fn series_toggle_round_trip_restores_window() {
        let mut viewer = Viewer::new(true);
        loaded(&mut viewer, &["1.dcm", "2.dcm", "3.dcm"], series_session(3));
        let initial = viewer.view().window;

        let generation = decode_generation(&viewer.dispatch(Event::ToggleSeriesMode));
        viewer.dispatch(Event::Decoded {
            generation,
            result: Ok(single_session(Some((40.0, 400.0)))),
        });
        assert!(!viewer.series_mode());
        viewer.dispatch(Event::DragStart { x: 0.0, y: 0.0 });
        viewer.dispatch(Event::DragMove { x: 20.0, y: 20.0 });
        viewer.dispatch(Event::DragEnd);
        assert_ne!(viewer.view().window, initial);

        let commands = viewer.dispatch(Event::ToggleSeriesMode);
        assert!(matches!(
            &commands[..],
            [Command::Decode(DecodeRequest { job: DecodeJob::Series(_), .. })]
        ));
        viewer.dispatch(Event::Decoded {
            generation: decode_generation(&commands),
            result: Ok(series_session(3)),
        });
        assert!(viewer.series_mode());
        assert_eq!(viewer.view().window, initial);
        assert_eq!(viewer.view().mode, NormalizationMode::default());
    }

    #[test]
    fn series_to_single_reopens_file_of_axial_slice() {
        let slices = vec![
            positioned(mono_slice(4, 4, |_| 0, None), 0.0),
            positioned(mono_slice(4, 4, |_| 0, None), 10.0),
            positioned(mono_slice(4, 4, |_| 0, None), 5.0),
        ];
        let session = Session::Series(SeriesVolume::from_slices(slices).expect("volume"));
        let mut viewer = Viewer::new(true);
        loaded(&mut viewer, &["1.dcm", "2.dcm", "3.dcm"], session);

        // Axial slice 1 is the highest position, decoded from 2.dcm.
        assert_eq!(viewer.view().file, 1);
        assert_eq!(
            viewer.dispatch(Event::ToggleSeriesMode),
            vec![Command::Decode(DecodeRequest {
                generation: 2,
                job: DecodeJob::Single(local("2.dcm")),
            })]
        );
    }

    #[test]
    fn failed_toggle_reverts_mode() {
        let mut viewer = Viewer::new(false);
        loaded(&mut viewer, &["1.dcm"], single_session(None));
        let generation = decode_generation(&viewer.dispatch(Event::ToggleSeriesMode));
        assert!(viewer.series_mode());
        viewer.dispatch(Event::Decoded {
            generation,
            result: Err(anyhow::anyhow!("Inconsistent slice dimensions")),
        });
        assert!(!viewer.series_mode());
    }

    #[test]
    fn toggle_without_files_only_flips_mode() {
        let mut viewer = Viewer::new(false);
        assert!(viewer.dispatch(Event::ToggleSeriesMode).is_empty());
        assert!(viewer.series_mode());
    }

    #[test]
    fn normalization_before_load_is_noop() {
        let mut viewer = Viewer::new(false);
        assert!(viewer
            .dispatch(Event::SetNormalization(NormalizationMode::Lungs))
            .is_empty());
        assert_eq!(viewer.view().window, None);
    }

    #[test]
    fn lungs_preset_ignores_extrema() {
        let mut viewer = Viewer::new(true);
        loaded(&mut viewer, &["1.dcm", "2.dcm", "3.dcm"], series_session(3));
        let commands = viewer.dispatch(Event::SetNormalization(NormalizationMode::Lungs));
        assert_eq!(commands, vec![Command::Render(PlaneRequest::ALL)]);
        assert_eq!(viewer.view().window, Some(Window::new(-600.0, 1500.0)));
    }

    #[test]
    fn max_min_mode_tracks_frame_extrema() {
        let mut slice = mono_slice(2, 2, |_| 0, Some((40.0, 400.0)));
        slice.frames = vec![
            FramePixels::Mono(vec![0, 10, 20, 30]),
            FramePixels::Mono(vec![-100, 0, 50, 100]),
        ];
        let session = Session::Single(SingleImage::new(slice).expect("image"));
        let mut viewer = Viewer::new(false);
        loaded(&mut viewer, &["multi.dcm"], session);
        assert_eq!(viewer.total_frames(), 2);

        viewer.dispatch(Event::SetNormalization(NormalizationMode::PixelOrHuMaxMin));
        assert_eq!(viewer.view().window, Some(Window::new(15.0, 30.0)));

        let commands = viewer.dispatch(Event::SwitchFrame(2));
        assert_eq!(commands, vec![Command::Render(PlaneRequest::only(Plane::Axial))]);
        assert_eq!(viewer.view().frame, 2);
        assert_eq!(viewer.view().window, Some(Window::new(0.0, 200.0)));
        assert!(viewer.dispatch(Event::SwitchFrame(3)).is_empty());
    }

    #[test]
    fn zero_delta_drag_renders_nothing() {
        let mut viewer = Viewer::new(false);
        loaded(&mut viewer, &["a.dcm"], single_session(Some((40.0, 400.0))));
        viewer.dispatch(Event::DragStart { x: 5.0, y: 5.0 });
        assert!(viewer.is_dragging());
        assert!(viewer.dispatch(Event::DragMove { x: 5.0, y: 5.0 }).is_empty());
    }

    #[test]
    fn drag_clamps_width_and_switches_mode() {
        let mut viewer = Viewer::new(true);
        loaded(&mut viewer, &["1.dcm", "2.dcm"], series_session(2));
        viewer.dispatch(Event::SetNormalization(NormalizationMode::Brain));
        viewer.dispatch(Event::DragStart { x: 100.0, y: 100.0 });
        let commands = viewer.dispatch(Event::DragMove { x: 0.0, y: 90.0 });
        assert_eq!(commands, vec![Command::Render(PlaneRequest::ALL)]);
        assert_eq!(viewer.view().window, Some(Window::new(50.0, 2.0)));
        assert_eq!(viewer.view().mode, NormalizationMode::WindowCenterWidth);

        viewer.dispatch(Event::DragEnd);
        assert!(viewer.dispatch(Event::DragMove { x: 50.0, y: 0.0 }).is_empty());
    }

    #[test]
    fn drag_is_ignored_for_color_images() {
        let mut slice = mono_slice(2, 2, |_| 0, None);
        slice.info.photometric = "RGB".to_string();
        slice.frames = vec![FramePixels::Color {
            samples: vec![0; 12],
            samples_per_pixel: 3,
        }];
        let mut viewer = Viewer::new(false);
        loaded(
            &mut viewer,
            &["color.dcm"],
            Session::Single(SingleImage::new(slice).expect("image")),
        );
        viewer.dispatch(Event::DragStart { x: 0.0, y: 0.0 });
        assert!(!viewer.is_dragging());
        assert!(viewer.dispatch(Event::DragMove { x: 30.0, y: 30.0 }).is_empty());
    }

    #[test]
    fn reset_drops_session() {
        let mut viewer = Viewer::new(false);
        loaded(&mut viewer, &["a.dcm"], single_session(None));
        assert_eq!(viewer.dispatch(Event::Reset), vec![Command::ResetCanvas]);
        assert!(viewer.session().is_none());
        assert_eq!(*viewer.view(), ViewParameters::default());
        assert_eq!(viewer.total_files(), 0);
    }
}
