mod app;
mod dicom;
mod dispatch;
mod drag;
mod fetch;
mod launch;
mod loader;
mod navigation;
mod renderer;
mod sample;
mod scale;
mod session;
mod window;

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    let (initial_request, initial_status) = match launch::parse_launch_request_from_args(&cli_args)
    {
        Ok(request) => (request, None),
        Err(err) => {
            log::warn!("Ignoring launch arguments: {err}");
            (None, Some(format!("Launch args error: {err}")))
        }
    };

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([1320.0, 860.0])
            .with_resizable(true),
        ..Default::default()
    };

    eframe::run_native(
        "Orthoview",
        native_options,
        Box::new(move |_cc| {
            Ok(Box::new(app::OrthoviewApp::new(
                initial_request.clone(),
                initial_status.clone(),
            )))
        }),
    )
}
