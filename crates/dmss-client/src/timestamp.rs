//! Presentation-time reconstruction.
//!
//! The device stamps every DHAV packet with a 16-bit seconds counter
//! ("epoch", wraps every ~18 hours) and a 16-bit millisecond counter
//! (wraps every ~65 seconds). Both jitter and occasionally reset.
//! Decoders need a monotonically non-decreasing PTS anchored to the
//! pipeline clock, so this module folds the wrapping counters into one.
//!
//! The algorithm keeps two anchors captured at the first frame: the
//! pipeline clock reading and a synthetic device time
//! (`epoch·10⁹ + (ts mod 1000)·10⁶` ns). Millisecond steps within a
//! ±1000 ms window advance the synthetic time exactly; anything larger
//! is a device clock jump, which re-captures both anchors so the emitted
//! PTS stays continuous with pipeline-clock elapsed time.
//!
//! Like the other state machines in this workspace, the tracker is pure
//! and generic over the instant type; the driver passes the current
//! pipeline time into every call.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

/// Largest forward or backward millisecond step treated as jitter rather
/// than a device clock jump.
const RING_TOLERANCE_MS: u16 = 1000;

/// Result of feeding one frame's timing into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtsUpdate {
    /// Presentation timestamp for the frame, relative to the session
    /// start. Non-decreasing except across a resync.
    pub pts: Duration,
    /// True on the very first frame of the session.
    pub first: bool,
    /// True when this frame declared a device clock jump.
    pub resync: bool,
}

#[derive(Debug, Clone, Copy)]
struct Anchor<I> {
    /// Pipeline clock reading at the current anchor point.
    pipeline_anchor: I,
    /// PTS emitted at the current anchor point.
    base_pts: Duration,
    /// Synthetic device time the PTS is measured against (ns).
    stream_anchor: i64,
    /// Absolute synthetic device time of the last frame (ns).
    last_timestamp: i64,
    /// Device millisecond counter of the last frame.
    last_ts16: u16,
    /// Last emitted PTS, for the non-decreasing clamp.
    last_pts: Duration,
}

/// Maps `(epoch, ts16)` pairs onto a monotone presentation clock.
///
/// One per session. Generic over `Instant` to support virtual time in
/// tests.
#[derive(Debug, Clone)]
pub struct PtsTracker<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    anchor: Option<Anchor<I>>,
}

impl<I> PtsTracker<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a tracker with no frames seen yet.
    #[must_use]
    pub fn new() -> Self {
        Self { anchor: None }
    }

    /// Fold one frame's `(epoch, ts)` into the presentation clock.
    ///
    /// `now` is the pipeline clock, read by the driver at the moment the
    /// frame was parsed.
    pub fn timestamp(&mut self, epoch: u16, ts: u16, now: I) -> PtsUpdate {
        let Some(anchor) = self.anchor.as_mut() else {
            let synthetic = synthesize(epoch, ts);
            self.anchor = Some(Anchor {
                pipeline_anchor: now,
                base_pts: Duration::ZERO,
                stream_anchor: synthetic,
                last_timestamp: synthetic,
                last_ts16: ts,
                last_pts: Duration::ZERO,
            });
            return PtsUpdate { pts: Duration::ZERO, first: true, resync: false };
        };

        // Cheap firmwares zero the timing fields on some frames; carry
        // the previous counter so the frame lands next to its neighbor.
        let ts = if epoch == 0 && ts == 0 { anchor.last_ts16 } else { ts };

        let forward = ts.wrapping_sub(anchor.last_ts16);
        let backward = anchor.last_ts16.wrapping_sub(ts);

        let resync = if forward <= RING_TOLERANCE_MS {
            anchor.last_timestamp += i64::from(forward) * 1_000_000;
            false
        } else if backward <= RING_TOLERANCE_MS {
            anchor.last_timestamp -= i64::from(backward) * 1_000_000;
            false
        } else {
            // Device clock jumped. Re-anchor so the emitted PTS continues
            // from the previous anchor plus pipeline-clock elapsed time.
            let elapsed = now - anchor.pipeline_anchor;
            anchor.base_pts += elapsed;
            anchor.pipeline_anchor = now;

            let synthetic = synthesize(epoch, ts);
            anchor.stream_anchor = synthetic - duration_to_ns(anchor.base_pts);
            anchor.last_timestamp = synthetic;
            true
        };

        anchor.last_ts16 = ts;

        let raw = anchor.last_timestamp - anchor.stream_anchor;
        let pts = ns_to_duration(raw.max(0)).max(anchor.last_pts);
        anchor.last_pts = pts;

        PtsUpdate { pts, first: false, resync }
    }
}

impl<I> Default for PtsTracker<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Synthetic absolute device time in nanoseconds.
fn synthesize(epoch: u16, ts: u16) -> i64 {
    i64::from(epoch) * 1_000_000_000 + i64::from(ts % 1000) * 1_000_000
}

fn duration_to_ns(duration: Duration) -> i64 {
    duration.as_nanos() as i64
}

fn ns_to_duration(ns: i64) -> Duration {
    Duration::from_nanos(ns as u64)
}
