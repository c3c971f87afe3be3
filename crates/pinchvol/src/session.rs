//! Per-frame loop: capture → detect → map → set volume → draw → display.

use crate::display::Display;
use crate::overlay;
use pinchvol_core::{GestureMapper, HandDetector};
use pinchvol_hw::{FrameSource, VolumeSink};

/// The volume sink plus its one-way "usable" latch.
///
/// Enabled iff a sink was opened at startup. The first failed set call
/// disables it for the rest of the run; it never re-enables.
pub struct SinkState {
    sink: Option<Box<dyn VolumeSink>>,
    enabled: bool,
}

impl SinkState {
    pub fn new(sink: Option<Box<dyn VolumeSink>>) -> Self {
        let enabled = sink.is_some();
        Self { sink, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Forward `scalar` to the sink if still enabled. Returns true if the
    /// volume was set. Errors are logged and latch the sink off.
    pub fn apply(&mut self, scalar: f64) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(sink) = self.sink.as_mut() else {
            self.enabled = false;
            return false;
        };

        match sink.set_volume(scalar) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    sink = sink.name(),
                    error = %e,
                    "volume set failed; audio control disabled for this run"
                );
                self.enabled = false;
                false
            }
        }
    }
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub hands: u64,
    pub volume_sets: u64,
}

/// Loop controller. Owns the only state carried between frames.
pub struct Session {
    mapper: GestureMapper,
    sink: SinkState,
    mirror: bool,
}

impl Session {
    pub fn new(mapper: GestureMapper, sink: SinkState, mirror: bool) -> Self {
        Self {
            mapper,
            sink,
            mirror,
        }
    }

    pub fn sink(&self) -> &SinkState {
        &self.sink
    }

    /// Run until the display asks to quit or the source stops producing frames.
    pub fn run<S, D, V>(&mut self, source: &mut S, detector: &mut D, display: &mut V) -> RunSummary
    where
        S: FrameSource + ?Sized,
        D: HandDetector + ?Sized,
        V: Display + ?Sized,
    {
        let mut summary = RunSummary::default();

        loop {
            let mut frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::info!(error = %e, "frame acquisition failed; stopping");
                    break;
                }
            };
            summary.frames += 1;

            if self.mirror {
                frame.mirror();
            }

            let hand = detector.detect(&frame.image).unwrap_or_else(|e| {
                tracing::warn!(seq = frame.sequence, error = %e, "hand detection failed");
                None
            });

            if let Some(hand) = hand {
                summary.hands += 1;
                let reading = self.mapper.read(&hand, frame.width(), frame.height());
                tracing::trace!(
                    distance = reading.distance,
                    percent = reading.percent,
                    handedness = %hand.handedness,
                    "gesture"
                );

                if self.sink.apply(reading.scalar) {
                    summary.volume_sets += 1;
                }
                overlay::draw_hand(&mut frame.image, &hand, &reading);
            }

            overlay::draw_status(&mut frame.image, self.sink.is_enabled());

            if !display.show(&frame.image) {
                tracing::info!("quit requested");
                break;
            }
        }

        summary
    }
}
