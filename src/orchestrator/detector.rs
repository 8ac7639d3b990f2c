//! Polling keyword detector
//!
//! Reads a bounded snapshot of the watched stream on each tick and decides
//! whether the awaited keyword genuinely occurred again. Two independent
//! guards suppress re-detections of old output: the last-occurrence position
//! must strictly advance, and the whole-buffer fingerprint must differ from
//! the buffer that triggered the previous detection of the same keyword.
//! The guards tolerate legitimately repeated identical output windows
//! differently, so neither replaces the other.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::stream::{ReadError, SnapshotStream};

/// Line prefixes treated as commentary rather than agent output.
const COMMENT_PREFIXES: [&str; 4] = ["//", "#", "--", ">"];

/// A confirmed new occurrence of the awaited keyword.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub keyword: String,
    /// Byte offset of the occurrence within the bounded tail buffer.
    pub position: usize,
    pub fingerprint: String,
}

/// Outcome of one poll tick. `None` from `poll` means a quiet tick.
#[derive(Debug)]
pub enum PollSignal {
    Detection(DetectionEvent),
    /// Wall-clock deadline since monitor start exceeded. Terminal.
    Timeout,
    /// The stream read failed. Terminal for this monitor; the detector
    /// never retries a read itself.
    StreamFailed(ReadError),
}

pub struct PollingKeywordDetector<S> {
    stream: S,
    tail_lines: usize,
    deadline: Duration,
    started_at: Instant,
    positions: HashMap<String, usize>,
    fingerprints: HashMap<String, String>,
    patterns: HashMap<String, Regex>,
    prev_buffer: String,
    poll_count: u64,
}

impl<S: SnapshotStream> PollingKeywordDetector<S> {
    pub fn new(stream: S, tail_lines: usize, deadline: Duration) -> Self {
        Self {
            stream,
            tail_lines,
            deadline,
            started_at: Instant::now(),
            positions: HashMap::new(),
            fingerprints: HashMap::new(),
            patterns: HashMap::new(),
            prev_buffer: String::new(),
            poll_count: 0,
        }
    }

    /// One bounded tick: a single stream read and a single scan.
    pub fn poll(&mut self, keyword: &str) -> Option<PollSignal> {
        if self.started_at.elapsed() >= self.deadline {
            return Some(PollSignal::Timeout);
        }
        self.poll_count += 1;

        let raw = match self.stream.read_snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => return Some(PollSignal::StreamFailed(err)),
        };
        let buffer = bounded_tail(&raw, self.tail_lines);
        self.note_rotation(&buffer);

        let detection = self.detect(&buffer, keyword);
        self.prev_buffer = buffer;
        detection.map(PollSignal::Detection)
    }

    /// Recorded last-detection position for a keyword, if any.
    pub fn position(&self, keyword: &str) -> Option<usize> {
        self.positions.get(keyword).copied()
    }

    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Compare against the previous snapshot. A buffer that shrank, or that
    /// shares less than half of the previous content as a prefix, means the
    /// visible window rotated past old content and absolute positions are
    /// stale. Detection fingerprints are kept so an unchanged window that
    /// scrolls back into view never re-fires.
    fn note_rotation(&mut self, buffer: &str) {
        if self.prev_buffer.is_empty() || self.positions.is_empty() {
            return;
        }
        let shared = common_prefix_len(&self.prev_buffer, buffer);
        if buffer.len() < self.prev_buffer.len() || shared * 2 < self.prev_buffer.len() {
            debug!(
                prev_len = self.prev_buffer.len(),
                new_len = buffer.len(),
                shared,
                "window rotated, discarding stale positions"
            );
            self.positions.clear();
        }
    }

    fn detect(&mut self, buffer: &str, keyword: &str) -> Option<DetectionEvent> {
        let position = self.last_meaningful_occurrence(buffer, keyword)?;

        if let Some(prev) = self.positions.get(keyword) {
            if position <= *prev {
                trace!(%keyword, position, prev, "occurrence not beyond recorded position");
                return None;
            }
        }

        let fingerprint = fingerprint(buffer);
        if self.fingerprints.get(keyword) == Some(&fingerprint) {
            trace!(%keyword, "buffer identical to prior detection, suppressed");
            return None;
        }

        self.positions.insert(keyword.to_string(), position);
        self.fingerprints
            .insert(keyword.to_string(), fingerprint.clone());

        Some(DetectionEvent {
            keyword: keyword.to_string(),
            position,
            fingerprint,
        })
    }

    /// Byte offset of the last occurrence that is neither on a comment-like
    /// line nor inside a double-quoted span.
    fn last_meaningful_occurrence(&mut self, buffer: &str, keyword: &str) -> Option<usize> {
        let pattern = match self.patterns.get(keyword) {
            Some(pattern) => pattern.clone(),
            None => {
                // An escaped literal always compiles; a failure here means
                // the keyword is unusable, so it simply never matches.
                let compiled = Regex::new(&regex::escape(keyword)).ok()?;
                self.patterns.insert(keyword.to_string(), compiled.clone());
                compiled
            }
        };

        let mut last = None;
        let mut offset = 0usize;
        for line in buffer.split_inclusive('\n') {
            let content = line.strip_suffix('\n').unwrap_or(line);
            if !is_comment_line(content) {
                for hit in pattern.find_iter(content) {
                    if !inside_quotes(content, hit.start()) {
                        last = Some(offset + hit.start());
                    }
                }
            }
            offset += line.len();
        }
        last
    }
}

fn is_comment_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    COMMENT_PREFIXES
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
}

/// An occurrence preceded by an odd number of double quotes on its line sits
/// inside a quoted string.
fn inside_quotes(line: &str, at: usize) -> bool {
    line[..at].matches('"').count() % 2 == 1
}

/// Keep the last `max_lines` lines of a snapshot.
fn bounded_tail(snapshot: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = snapshot.lines().collect();
    if lines.len() <= max_lines {
        return snapshot.to_string();
    }
    lines[lines.len() - max_lines..].join("\n")
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

fn fingerprint(buffer: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(buffer.as_bytes());
    hex::encode(hasher.finalize())
}
