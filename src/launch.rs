use std::path::PathBuf;
use std::sync::Arc;

const DICOM_EXTENSIONS: [&str; 2] = [".dcm", ".dicom"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Local(PathBuf),
    Remote(String),
    Memory { name: String, bytes: Arc<[u8]> },
}

impl FileSource {
    pub fn name(&self) -> String {
        match self {
            FileSource::Local(path) => path
                .file_name()
                .and_then(|value| value.to_str())
                .unwrap_or_default()
                .to_string(),
            FileSource::Remote(url) => {
                let without_query = url.split(['?', '#']).next().unwrap_or_default();
                without_query
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            }
            FileSource::Memory { name, .. } => name.clone(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FileSource::Local(path) => path.display().to_string(),
            FileSource::Remote(url) => url.clone(),
            FileSource::Memory { name, .. } => name.clone(),
        }
    }
}

pub fn is_dicom_file_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    DICOM_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

pub fn accept_sources(sources: Vec<FileSource>) -> Vec<FileSource> {
    let mut accepted: Vec<_> = sources
        .into_iter()
        .filter(|source| {
            let valid = is_dicom_file_name(&source.name());
            if !valid {
                log::info!("Not a DICOM file name, skipping: {}", source.describe());
            }
            valid
        })
        .collect();
    accepted.sort_by_key(FileSource::name);
    accepted
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub sources: Vec<FileSource>,
    pub series_mode: bool,
}

pub fn parse_launch_request_from_args(args: &[String]) -> Result<Option<LaunchRequest>, String> {
    if args.is_empty() {
        return Ok(None);
    }

    let mut series_mode = false;
    let mut sources = Vec::new();
    let mut saw_open = false;
    for arg in args {
        match arg.as_str() {
            "--series" => series_mode = true,
            "--open" => saw_open = true,
            flag if flag.starts_with("--") => {
                return Err(format!("Unknown option {flag}."));
            }
            value => sources.push(parse_source(value)),
        }
    }

    if sources.is_empty() && saw_open {
        return Err("Missing file path(s) after --open.".to_string());
    }

    Ok(Some(LaunchRequest {
        sources,
        series_mode,
    }))
}

fn parse_source(value: &str) -> FileSource {
    let lower = value.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        FileSource::Remote(value.to_string())
    } else {
        FileSource::Local(PathBuf::from(value))
    }
}
