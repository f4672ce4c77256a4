use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use eframe::egui::{self, ColorImage, Sense, TextureHandle, TextureOptions};

use crate::dicom::DicomDecoder;
use crate::dispatch::{render_planes, PlaneFrame, RasterSink};
use crate::launch::{FileSource, LaunchRequest};
use crate::loader::BackgroundLoader;
use crate::navigation::{Command, Event, Step, Viewer};
use crate::sample::RGBA_STRIDE;
use crate::session::{Plane, Session};
use crate::window::NormalizationMode;

const APP_TITLE: &str = "Orthoview";
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

struct PlaneTexture {
    texture: TextureHandle,
    display_size: egui::Vec2,
}

struct TextureSink<'a> {
    ctx: &'a egui::Context,
    textures: &'a mut HashMap<Plane, PlaneTexture>,
}

impl RasterSink for TextureSink<'_> {
    fn render_uncompressed_data(&mut self, plane: Plane, frame: &PlaneFrame<'_>) -> Result<()> {
        let expected = frame.width * frame.height * RGBA_STRIDE;
        if frame.rgba.len() < expected {
            bail!(
                "{} buffer too short: got {} bytes, expected {}",
                plane.label(),
                frame.rgba.len(),
                expected
            );
        }
        let image =
            ColorImage::from_rgba_unmultiplied([frame.width, frame.height], &frame.rgba[..expected]);
        let display_size = egui::vec2(
            frame.width as f32 * frame.scale,
            frame.height as f32 * frame.aspect * frame.scale,
        );

        match self.textures.get_mut(&plane) {
            Some(existing) => {
                existing.texture.set(image, TextureOptions::LINEAR);
                existing.display_size = display_size;
            }
            None => {
                let name = format!("plane-{}", plane.label().to_ascii_lowercase());
                let texture = self.ctx.load_texture(name, image, TextureOptions::LINEAR);
                self.textures.insert(
                    plane,
                    PlaneTexture {
                        texture,
                        display_size,
                    },
                );
            }
        }
        Ok(())
    }

    fn reset_canvas(&mut self, plane: Plane) {
        self.textures.remove(&plane);
    }
}

pub struct OrthoviewApp {
    viewer: Viewer,
    loader: BackgroundLoader,
    textures: HashMap<Plane, PlaneTexture>,
    pending_launch: Option<Vec<FileSource>>,
    alert: Option<String>,
    status_line: String,
}

impl OrthoviewApp {
    pub fn new(initial_request: Option<LaunchRequest>, initial_status: Option<String>) -> Self {
        let series_mode = initial_request
            .as_ref()
            .is_some_and(|request| request.series_mode);
        let pending_launch = initial_request
            .map(|request| request.sources)
            .filter(|sources| !sources.is_empty());

        Self {
            viewer: Viewer::new(series_mode),
            loader: BackgroundLoader::new(Arc::new(DicomDecoder)),
            textures: HashMap::new(),
            pending_launch,
            alert: None,
            status_line: initial_status.unwrap_or_default(),
        }
    }

    fn apply(&mut self, event: Event, ctx: &egui::Context) {
        let commands = self.viewer.dispatch(event);
        for command in commands {
            self.execute(command, ctx);
        }
    }

    fn execute(&mut self, command: Command, ctx: &egui::Context) {
        match command {
            Command::Decode(request) => {
                self.status_line = "Loading DICOM(s)...".to_string();
                self.loader.spawn(request);
            }
            Command::Render(request) => {
                let Some(session) = self.viewer.session() else {
                    return;
                };
                let mut sink = TextureSink {
                    ctx,
                    textures: &mut self.textures,
                };
                match render_planes(session, self.viewer.view(), request, &mut sink) {
                    Ok(()) => self.status_line = session_summary(session),
                    Err(err) => {
                        log::error!("Render failed: {err:#}");
                        self.status_line = format!("{err:#}");
                    }
                }
                let ledger = session.ledger();
                if ledger.outstanding() > 0 {
                    log::warn!(
                        "{} of {} plane buffers still checked out",
                        ledger.outstanding(),
                        ledger.acquired()
                    );
                }
            }
            Command::ResetCanvas => {
                let mut sink = TextureSink {
                    ctx,
                    textures: &mut self.textures,
                };
                for plane in Plane::ALL {
                    sink.reset_canvas(plane);
                }
                self.status_line.clear();
            }
            Command::Alert(message) => {
                self.status_line = message.clone();
                self.alert = Some(message);
            }
        }
    }

    fn open_dicoms(&mut self, ctx: &egui::Context) {
        let picked = rfd::FileDialog::new()
            .add_filter("DICOM", &["dcm", "dicom"])
            .pick_files();

        if let Some(paths) = picked {
            let sources = paths.into_iter().map(FileSource::Local).collect();
            self.apply(Event::Load(sources), ctx);
        }
    }

    fn show_top_bar(&mut self, ctx: &egui::Context, events: &mut Vec<Event>) {
        let mut open_clicked = false;
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(format!("{APP_TITLE} v{APP_VERSION}"));
                ui.separator();
                if ui.button("Open DICOM(s)").clicked() {
                    open_clicked = true;
                }

                let mut series_mode = self.viewer.series_mode();
                if ui.checkbox(&mut series_mode, "Series mode").changed() {
                    events.push(Event::ToggleSeriesMode);
                }

                let current = self.viewer.view().mode;
                let mut selected = current;
                ui.add_enabled_ui(self.viewer.session().is_some(), |ui| {
                    egui::ComboBox::from_id_salt("normalization")
                        .selected_text(selected.label())
                        .width(240.0)
                        .show_ui(ui, |ui| {
                            for mode in NormalizationMode::ALL {
                                ui.selectable_value(&mut selected, mode, mode.label());
                            }
                        });
                });
                if selected != current {
                    events.push(Event::SetNormalization(selected));
                }

                if ui.button("Reset").clicked() {
                    events.push(Event::Reset);
                }
            });
        });
        if open_clicked {
            self.open_dicoms(ctx);
        }
    }

    fn show_controls(&mut self, ctx: &egui::Context, events: &mut Vec<Event>) {
        let view = *self.viewer.view();
        let sliders: [(usize, usize, &str, fn(usize) -> Event); 4] = [
            (self.viewer.total_files(), view.file, "File", Event::SwitchFile),
            (self.viewer.total_frames(), view.frame, "Frame", Event::SwitchFrame),
            (self.viewer.total_sagittal(), view.sagittal, "Sagittal", Event::SwitchSagittal),
            (self.viewer.total_coronal(), view.coronal, "Coronal", Event::SwitchCoronal),
        ];

        egui::TopBottomPanel::bottom("controls").show(ctx, |ui| {
            for (total, current, label, event) in sliders {
                if total <= 1 {
                    continue;
                }
                let mut value = current.clamp(1, total);
                if ui
                    .add(egui::Slider::new(&mut value, 1..=total).text(label))
                    .changed()
                {
                    events.push(event(value));
                }
            }
            if let Some(Session::Single(_)) = self.viewer.session() {
                if let Some(source) = self.viewer.files().get(view.file.saturating_sub(1)) {
                    ui.label(source.describe());
                }
            }
            if let Some(window) = view.window {
                ui.label(format!("C {:.0} / W {:.0}", window.center, window.width));
            }
            ui.label(&self.status_line);
        });
    }

    fn show_planes(&self, ctx: &egui::Context, events: &mut Vec<Event>) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(session) = self.viewer.session() else {
                ui.centered_and_justified(|ui| {
                    if self.viewer.is_loading() {
                        ui.label("Loading DICOM(s)...");
                    } else {
                        ui.label("Open or drop DICOM file(s) to start.");
                    }
                });
                return;
            };

            ui.horizontal_top(|ui| {
                for plane in session.visible_planes() {
                    let Some(entry) = self.textures.get(plane) else {
                        continue;
                    };
                    ui.vertical(|ui| {
                        ui.label(format!("{} {}", plane.label(), self.viewer.view().index(*plane)));
                        let response = ui.add(
                            egui::Image::new((entry.texture.id(), entry.display_size))
                                .sense(Sense::click_and_drag()),
                        );
                        if let Some(pos) = response.interact_pointer_pos() {
                            if response.drag_started() {
                                events.push(Event::DragStart { x: pos.x, y: pos.y });
                            } else if response.dragged() {
                                events.push(Event::DragMove { x: pos.x, y: pos.y });
                            }
                        }
                    });
                }
            });
        });
    }

    fn show_alert(&mut self, ctx: &egui::Context) {
        let Some(message) = self.alert.as_deref() else {
            return;
        };
        let mut dismissed = false;
        egui::Window::new("Could not open DICOM")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(message);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if dismissed {
            self.alert = None;
        }
    }
}

impl eframe::App for OrthoviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(sources) = self.pending_launch.take() {
            self.apply(Event::Load(sources), ctx);
        }

        for event in self.loader.poll() {
            self.apply(event, ctx);
        }

        let mut events = Vec::new();
        let (dropped, step, released) = ctx.input_mut(|input| {
            let step = if input.consume_key(egui::Modifiers::NONE, egui::Key::ArrowLeft) {
                Some(Step::Previous)
            } else if input.consume_key(egui::Modifiers::NONE, egui::Key::ArrowRight) {
                Some(Step::Next)
            } else {
                None
            };
            (
                input.raw.dropped_files.clone(),
                step,
                input.pointer.any_released(),
            )
        });
        if !dropped.is_empty() {
            events.push(Event::Load(dropped_sources(dropped)));
        }
        if let Some(step) = step {
            events.push(Event::StepFile(step));
        }

        self.show_top_bar(ctx, &mut events);
        self.show_controls(ctx, &mut events);
        self.show_planes(ctx, &mut events);
        self.show_alert(ctx);

        if released && self.viewer.is_dragging() {
            events.push(Event::DragEnd);
        }
        for event in events {
            self.apply(event, ctx);
        }

        if self.viewer.is_loading() || self.loader.in_flight() > 0 {
            ctx.set_cursor_icon(egui::CursorIcon::Progress);
            ctx.request_repaint_after(Duration::from_millis(16));
        }
    }
}

fn dropped_sources(files: Vec<egui::DroppedFile>) -> Vec<FileSource> {
    files
        .into_iter()
        .filter_map(|file| match (file.path, file.bytes) {
            (Some(path), _) => Some(FileSource::Local(path)),
            (None, Some(bytes)) => Some(FileSource::Memory {
                name: file.name,
                bytes,
            }),
            (None, None) => {
                log::info!("Dropped item {} has no path or contents", file.name);
                None
            }
        })
        .collect()
}

fn session_summary(session: &Session) -> String {
    let info = session.info();
    let modality = info.modality.as_deref().unwrap_or("??");
    let shape = match session {
        Session::Single(image) => format!(
            "{}x{}, {} frame(s)",
            image.width,
            image.height,
            image.frame_count()
        ),
        Session::Series(volume) => {
            let (x, y, z) = volume.dims();
            let ordering = if volume.common_orientation {
                "position order"
            } else {
                "file order"
            };
            format!("{x}x{y}x{z}, {ordering}")
        }
    };
    format!(
        "{modality} {} | {shape} | {}",
        info.photometric, info.transfer_syntax_uid
    )
}
