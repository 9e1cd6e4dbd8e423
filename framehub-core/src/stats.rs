//! Per-sender delivery statistics.
//!
//! The engine keeps one record per sender id, created the first time that
//! id is seen and never removed during a run. Every processed envelope
//! updates exactly one record. Latency is a signed duration: producer and
//! consumer clocks are independent and a negative value is reported as-is.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;

use crate::envelope::Envelope;

/// Observation returned by [`StatsEngine::record_arrival`].
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Consumer clock at arrival.
    pub received_at: NaiveDateTime,
    /// `received_at - sent_at`. Negative under clock skew.
    pub latency: TimeDelta,
    /// Time since this sender's first arrival.
    pub elapsed: TimeDelta,
    /// `frames / elapsed`; `None` while `elapsed <= 0`.
    pub running_fps: Option<f64>,
    /// 1 / gap to this sender's previous arrival.
    pub instant_fps: Option<f64>,
    /// 1-based count of frames from this sender.
    pub frame_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No frame recorded yet.
    Idle,
    /// At least one frame recorded. Never returns to `Idle`.
    Active,
}

struct SenderRecord {
    sender_id: String,
    frames_received: u64,
    first_frame_at: NaiveDateTime,
    last_arrival_at: NaiveDateTime,
    last_payload_size: usize,
    total_bytes: u64,
    latency_sum: TimeDelta,
    latency_min: TimeDelta,
    latency_max: TimeDelta,
}

/// Elapsed time and rate of the most recent observation.
struct LastUpdate {
    record: usize,
    elapsed: TimeDelta,
    running_fps: Option<f64>,
    payload_size: usize,
}

#[derive(Default)]
pub struct StatsEngine {
    records: Vec<SenderRecord>,
    index: HashMap<String, usize>,
    total_frames: u64,
    last: Option<LastUpdate>,
}

impl StatsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EngineState {
        if self.last.is_some() {
            EngineState::Active
        } else {
            EngineState::Idle
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn sender_count(&self) -> usize {
        self.records.len()
    }

    /// Frames recorded for `sender_id`, zero if never seen.
    pub fn frames_from(&self, sender_id: &str) -> u64 {
        self.index
            .get(sender_id)
            .map(|&i| self.records[i].frames_received)
            .unwrap_or(0)
    }

    /// Record one arrival and return the updated view of its sender.
    pub fn record_arrival(
        &mut self,
        sender_id: &str,
        sent_at: NaiveDateTime,
        received_at: NaiveDateTime,
        payload_size: usize,
    ) -> Snapshot {
        let latency = received_at - sent_at;
        let slot = match self.index.get(sender_id) {
            Some(&i) => i,
            None => {
                self.records.push(SenderRecord {
                    sender_id: sender_id.to_string(),
                    frames_received: 0,
                    first_frame_at: received_at,
                    last_arrival_at: received_at,
                    last_payload_size: 0,
                    total_bytes: 0,
                    latency_sum: TimeDelta::zero(),
                    latency_min: latency,
                    latency_max: latency,
                });
                let i = self.records.len() - 1;
                self.index.insert(sender_id.to_string(), i);
                i
            }
        };

        let record = &mut self.records[slot];
        let gap = received_at - record.last_arrival_at;
        let instant_fps = (record.frames_received > 0)
            .then(|| rate(1, gap))
            .flatten();

        record.frames_received += 1;
        record.last_arrival_at = received_at;
        record.last_payload_size = payload_size;
        record.total_bytes += payload_size as u64;
        record.latency_sum = record
            .latency_sum
            .checked_add(&latency)
            .unwrap_or(if latency < TimeDelta::zero() {
                TimeDelta::MIN
            } else {
                TimeDelta::MAX
            });
        record.latency_min = record.latency_min.min(latency);
        record.latency_max = record.latency_max.max(latency);

        let elapsed = received_at - record.first_frame_at;
        let running_fps = rate(record.frames_received, elapsed);
        let frame_index = record.frames_received;

        self.total_frames += 1;
        self.last = Some(LastUpdate {
            record: slot,
            elapsed,
            running_fps,
            payload_size,
        });

        Snapshot {
            received_at,
            latency,
            elapsed,
            running_fps,
            instant_fps,
            frame_index,
        }
    }

    /// Convenience over [`record_arrival`](Self::record_arrival).
    pub fn record(&mut self, envelope: &Envelope, received_at: NaiveDateTime) -> Snapshot {
        self.record_arrival(
            envelope.sender_id(),
            envelope.sent_at(),
            received_at,
            envelope.payload_len(),
        )
    }

    /// Summarise the run so far. Does not mutate; calling it twice with no
    /// arrival in between yields equal reports.
    pub fn finalize(&self) -> Report {
        let Some(last) = &self.last else {
            return Report::NoData;
        };

        let per_sender = self
            .records
            .iter()
            .map(|r| SenderSummary {
                sender_id: r.sender_id.clone(),
                frames: r.frames_received,
                bytes: r.total_bytes,
                last_payload_size: r.last_payload_size,
                mean_latency_secs: seconds(r.latency_sum) / r.frames_received as f64,
                min_latency_secs: seconds(r.latency_min),
                max_latency_secs: seconds(r.latency_max),
            })
            .collect();

        Report::Summary(Summary {
            total_frames: self.total_frames,
            per_sender,
            last_payload_size: last.payload_size,
            elapsed_secs: seconds(last.elapsed),
            final_fps: last.running_fps,
            last_sender: self.records[last.record].sender_id.clone(),
        })
    }
}

/// `count / span` in Hz, undefined for a non-positive span.
fn rate(count: u64, span: TimeDelta) -> Option<f64> {
    let secs = seconds(span);
    (secs > 0.0).then(|| count as f64 / secs)
}

fn seconds(delta: TimeDelta) -> f64 {
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

// ── Report ───────────────────────────────────────────────────────

/// Final statistics of a consumer run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Report {
    /// Nothing was received; no sizes or rates exist.
    NoData,
    Summary(Summary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_frames: u64,
    /// In first-seen order.
    pub per_sender: Vec<SenderSummary>,
    pub last_payload_size: usize,
    /// Elapsed time of the last-updated sender.
    pub elapsed_secs: f64,
    /// Running FPS of the last-updated sender, `None` if its elapsed time
    /// was still zero.
    pub final_fps: Option<f64>,
    pub last_sender: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SenderSummary {
    pub sender_id: String,
    pub frames: u64,
    pub bytes: u64,
    pub last_payload_size: usize,
    pub mean_latency_secs: f64,
    pub min_latency_secs: f64,
    pub max_latency_secs: f64,
}

impl Report {
    pub fn has_data(&self) -> bool {
        matches!(self, Report::Summary(_))
    }

    pub fn total_frames(&self) -> u64 {
        match self {
            Report::NoData => 0,
            Report::Summary(s) => s.total_frames,
        }
    }

    /// Frames from one sender, zero when absent.
    pub fn frames_from(&self, sender_id: &str) -> u64 {
        match self {
            Report::NoData => 0,
            Report::Summary(s) => s
                .per_sender
                .iter()
                .find(|p| p.sender_id == sender_id)
                .map(|p| p.frames)
                .unwrap_or(0),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Total number of images received: {}",
            group_digits(self.total_frames())
        )?;
        let Report::Summary(s) = self else {
            return writeln!(f, "No frames received.");
        };

        writeln!(f, "Number of images received from each sender:")?;
        for p in &s.per_sender {
            writeln!(
                f,
                "    {} : {}  (latency mean {:.6}s, min {:.6}s, max {:.6}s)",
                p.sender_id,
                group_digits(p.frames),
                p.mean_latency_secs,
                p.min_latency_secs,
                p.max_latency_secs
            )?;
        }
        writeln!(
            f,
            "Size of last image received: {} bytes",
            group_digits(s.last_payload_size as u64)
        )?;
        writeln!(f, "Elapsed time: {:.2} seconds", s.elapsed_secs)?;
        match s.final_fps {
            Some(fps) => writeln!(f, "Approximate FPS: {fps:.2}"),
            None => writeln!(f, "Approximate FPS: n/a"),
        }
    }
}

fn group_digits(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

// ── SharedStats ──────────────────────────────────────────────────

/// A [`StatsEngine`] behind a mutex, for callers that handle envelopes on
/// several tasks. Each call is one critical section.
#[derive(Clone, Default)]
pub struct SharedStats {
    inner: Arc<Mutex<StatsEngine>>,
}

impl SharedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_arrival(
        &self,
        sender_id: &str,
        sent_at: NaiveDateTime,
        received_at: NaiveDateTime,
        payload_size: usize,
    ) -> Snapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_arrival(sender_id, sent_at, received_at, payload_size)
    }

    pub fn finalize(&self) -> Report {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finalize()
    }
}
