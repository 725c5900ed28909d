use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::attempt::AssessmentTarget;
use crate::recorder::backend::CaptureProfile;

/// One drained, immutable unit of screen video, ready for upload.
#[derive(Debug)]
pub struct Segment {
    pub index: u64,
    pub duration_seconds: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RecorderStatus {
    Idle,
    Recording,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderSnapshot {
    pub status: RecorderStatus,
    pub elapsed_secs: u64,
    pub segments_flushed: u64,
    pub mime_type: Option<String>,
}

impl RecorderSnapshot {
    pub fn idle() -> Self {
        Self {
            status: RecorderStatus::Idle,
            elapsed_secs: 0,
            segments_flushed: 0,
            mime_type: None,
        }
    }
}

/// State of one active recording attempt.
///
/// Appends come from the fragment pump, drains from the flush routine and the
/// final flush in `stop()`; both mutations happen under the controller's lock
/// with no suspension point inside, so fragments are never lost to an
/// in-flight upload.
pub struct CaptureSession {
    /// Single-assignment token; spawned loops check it before touching state.
    pub attempt: Uuid,
    pub target: AssessmentTarget,
    pub profile: CaptureProfile,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: u64,
    buffer: Vec<Vec<u8>>,
    buffered_bytes: usize,
    next_index: u64,
    last_drain: Instant,
}

impl CaptureSession {
    pub fn new(target: AssessmentTarget, profile: CaptureProfile, now: Instant) -> Self {
        Self {
            attempt: Uuid::new_v4(),
            target,
            profile,
            started_at: Utc::now(),
            elapsed_secs: 0,
            buffer: Vec::new(),
            buffered_bytes: 0,
            next_index: 0,
            last_drain: now,
        }
    }

    pub fn append_fragment(&mut self, fragment: Vec<u8>) {
        if fragment.is_empty() {
            return;
        }
        self.buffered_bytes += fragment.len();
        self.buffer.push(fragment);
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Detaches everything buffered as the next numbered segment.
    ///
    /// An empty buffer consumes no index (the flush tick simply passes), but
    /// still moves the duration anchor: a segment's duration covers only the
    /// span in which its data could have accumulated.
    pub fn drain(&mut self, now: Instant) -> Option<Segment> {
        let elapsed = now.duration_since(self.last_drain);
        self.last_drain = now;

        if self.buffer.is_empty() {
            return None;
        }

        let mut data = Vec::with_capacity(self.buffered_bytes);
        for fragment in self.buffer.drain(..) {
            data.extend_from_slice(&fragment);
        }
        self.buffered_bytes = 0;

        let duration_seconds = (elapsed.as_millis() as u64 + 500) / 1000;
        let segment = Segment {
            index: self.next_index,
            duration_seconds,
            data,
        };
        self.next_index += 1;

        Some(segment)
    }

    /// Indices handed out so far; the next segment gets exactly this value.
    pub fn segments_flushed(&self) -> u64 {
        self.next_index
    }

    pub fn tick_second(&mut self) -> u64 {
        self.elapsed_secs += 1;
        self.elapsed_secs
    }

    pub fn snapshot(&self) -> RecorderSnapshot {
        RecorderSnapshot {
            status: RecorderStatus::Recording,
            elapsed_secs: self.elapsed_secs,
            segments_flushed: self.next_index,
            mime_type: Some(self.profile.mime_type.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::backend::PROFILE_PREFERENCES;
    use tokio::time::Duration;

    fn session(now: Instant) -> CaptureSession {
        CaptureSession::new(
            AssessmentTarget::Exam("e1".into()),
            PROFILE_PREFERENCES[0],
            now,
        )
    }

    #[test]
    fn indices_are_gapless_and_start_at_zero() {
        let t0 = Instant::now();
        let mut session = session(t0);

        for step in 1..=3u64 {
            session.append_fragment(vec![1, 2, 3]);
            let segment = session
                .drain(t0 + Duration::from_secs(step))
                .expect("segment");
            assert_eq!(segment.index, step - 1);
        }
        assert_eq!(session.segments_flushed(), 3);
    }

    #[test]
    fn empty_drain_consumes_no_index() {
        let t0 = Instant::now();
        let mut session = session(t0);

        assert!(session.drain(t0 + Duration::from_secs(1)).is_none());
        assert_eq!(session.segments_flushed(), 0);

        session.append_fragment(vec![9]);
        let segment = session.drain(t0 + Duration::from_secs(2)).expect("segment");
        assert_eq!(segment.index, 0);
    }

    #[test]
    fn drain_concatenates_fragments_in_arrival_order() {
        let t0 = Instant::now();
        let mut session = session(t0);

        session.append_fragment(vec![1, 2]);
        session.append_fragment(Vec::new());
        session.append_fragment(vec![3]);
        assert_eq!(session.buffered_bytes(), 3);

        let segment = session.drain(t0 + Duration::from_secs(1)).expect("segment");
        assert_eq!(segment.data, vec![1, 2, 3]);
        assert_eq!(session.buffered_bytes(), 0);
    }

    #[test]
    fn duration_is_measured_from_previous_drain() {
        let t0 = Instant::now();
        let mut session = session(t0);

        session.append_fragment(vec![0]);
        let full = session.drain(t0 + Duration::from_secs(60)).expect("segment");
        assert_eq!(full.duration_seconds, 60);

        session.append_fragment(vec![0]);
        let partial = session
            .drain(t0 + Duration::from_millis(60_500))
            .expect("segment");
        assert_eq!(partial.duration_seconds, 1);
    }
}
