use std::fs;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;

use crate::launch::FileSource;

const DICOM_ACCEPT: &str = "application/dicom, application/octet-stream;q=0.9, */*;q=0.1";

pub struct Fetcher {
    client: Option<Client>,
}

impl Fetcher {
    pub fn for_sources(sources: &[FileSource]) -> Result<Self> {
        let needs_http = sources
            .iter()
            .any(|source| matches!(source, FileSource::Remote(_)));
        let client = if needs_http {
            Some(build_http_client()?)
        } else {
            None
        };
        Ok(Self { client })
    }

    pub fn fetch(&self, source: &FileSource) -> Result<Vec<u8>> {
        match source {
            FileSource::Local(path) => {
                fs::read(path).with_context(|| format!("Could not read {}", path.display()))
            }
            FileSource::Memory { bytes, .. } => Ok(bytes.to_vec()),
            FileSource::Remote(url) => {
                let client = self
                    .client
                    .as_ref()
                    .context("HTTP client was not initialized for a remote source")?;
                http_get_bytes(client, url)
            }
        }
    }

    /// Fetches every source concurrently and keeps the input order. Fails
    /// as a whole if any single fetch fails.
    pub fn fetch_all(&self, sources: &[FileSource]) -> Result<Vec<Vec<u8>>> {
        if sources.len() <= 1 {
            return sources.iter().map(|source| self.fetch(source)).collect();
        }

        std::thread::scope(|scope| {
            let jobs = sources
                .iter()
                .map(|source| (source, scope.spawn(move || self.fetch(source))))
                .collect::<Vec<_>>();

            jobs.into_iter()
                .map(|(source, job)| match job.join() {
                    Ok(result) => result,
                    Err(_) => bail!("Fetch worker panicked for {}", source.describe()),
                })
                .collect()
        })
    }
}

fn build_http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()
        .context("Could not initialize HTTP client")
}

fn http_get_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .header(ACCEPT, DICOM_ACCEPT)
        .send()
        .with_context(|| format!("HTTP request failed for {url}"))?;
    let status = response.status();
    if !status.is_success() {
        let detail = response
            .text()
            .unwrap_or_else(|_| String::from("unable to read error body"));
        bail!("HTTP {status} for {url}: {detail}");
    }

    response
        .bytes()
        .map(|body| body.to_vec())
        .with_context(|| format!("Could not read response body from {url}"))
}
