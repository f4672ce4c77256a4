use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};

use crate::dicom::Decoder;
use crate::fetch::Fetcher;
use crate::navigation::{DecodeJob, DecodeRequest, Event};
use crate::session::Session;

type Outcome = (u64, Result<Session>);

pub struct BackgroundLoader {
    decoder: Arc<dyn Decoder>,
    sender: Sender<Outcome>,
    receiver: Receiver<Outcome>,
    in_flight: usize,
}

impl BackgroundLoader {
    pub fn new(decoder: Arc<dyn Decoder>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            decoder,
            sender,
            receiver,
            in_flight: 0,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn spawn(&mut self, request: DecodeRequest) {
        let DecodeRequest { generation, job } = request;
        let decoder = Arc::clone(&self.decoder);
        let tx = self.sender.clone();
        self.in_flight += 1;
        log::debug!("Starting decode for generation {generation}");
        thread::spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| run_job(decoder.as_ref(), &job)))
                .unwrap_or_else(|payload| {
                    Err(anyhow!("Decode worker panicked: {}", panic_message(payload.as_ref())))
                });
            let _ = tx.send((generation, result));
        });
    }

    pub fn poll(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok((generation, result)) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    events.push(Event::Decoded { generation, result });
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }
}

fn run_job(decoder: &dyn Decoder, job: &DecodeJob) -> Result<Session> {
    match job {
        DecodeJob::Single(source) => {
            let fetcher = Fetcher::for_sources(std::slice::from_ref(source))?;
            let bytes = fetcher.fetch(source)?;
            decoder
                .create_single(&bytes)
                .with_context(|| format!("Error opening {}", source.describe()))
        }
        DecodeJob::Series(sources) => {
            let fetcher = Fetcher::for_sources(sources)?;
            let files = fetcher.fetch_all(sources)?;
            decoder
                .create_series(&files)
                .with_context(|| format!("Error opening series of {} file(s)", sources.len()))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
