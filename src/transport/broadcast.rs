use crate::foundation::error::{HeadcastError, HeadcastResult, ObserverError};
use crate::model::frame::Frame;
use crate::stream::dispatch::FrameObserver;
use crate::stream::state::{STATUS_NODDING, content_status};
use base64::Engine;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Message type tag carried by every envelope.
pub const FRAME_UPDATE: &str = "frame_update";

/// One frame as sent to presentation clients.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameEnvelope {
    /// Always [`FRAME_UPDATE`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Base64-encoded JPEG.
    pub frame: String,
    /// Content index, `-1` for filler frames.
    pub frame_idx: i64,
    /// Progress in `[0, 1]`.
    pub progress: f32,
    /// Total content frames, `null` for filler frames.
    pub total_frames: Option<u64>,
    /// Status line at send time.
    pub status: String,
    /// Whether this is an idle filler frame.
    pub is_nodding: bool,
    /// Whether this frame came from the preview path.
    pub is_preview: bool,
    /// Longest image side in pixels.
    pub resolution: u32,
}

/// Encoding and fan-out options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BroadcastOpts {
    /// JPEG quality, 1..=100.
    pub jpeg_quality: u8,
    /// Messages buffered per subscriber before new ones are dropped.
    pub outbox_capacity: usize,
}

impl Default for BroadcastOpts {
    fn default() -> Self {
        Self {
            jpeg_quality: 95,
            outbox_capacity: 16,
        }
    }
}

/// Encode `frame` as a JPEG, base64 it and wrap it in an envelope.
pub fn encode_envelope(
    frame: &Frame,
    status: impl Into<String>,
    jpeg_quality: u8,
) -> HeadcastResult<FrameEnvelope> {
    let image = frame.image();
    let rgb = image.to_rgb8();
    let mut jpeg = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, jpeg_quality.clamp(1, 100))
        .encode(&rgb, image.width(), image.height(), image::ExtendedColorType::Rgb8)
        .map_err(|e| HeadcastError::Other(anyhow::anyhow!("encode frame as JPEG: {e}")))?;

    Ok(FrameEnvelope {
        kind: FRAME_UPDATE.to_owned(),
        frame: base64::engine::general_purpose::STANDARD.encode(&jpeg),
        frame_idx: frame.frame_index(),
        progress: frame.progress(),
        total_frames: frame.total_frames(),
        status: status.into(),
        is_nodding: frame.is_filler(),
        is_preview: frame.is_preview(),
        resolution: frame.resolution(),
    })
}

/// Status line the progress record showed when `frame` was accepted.
///
/// Derived from the frame itself so a frame delivered late never carries a newer job status.
pub fn frame_status(frame: &Frame) -> String {
    if frame.is_filler() {
        STATUS_NODDING.to_owned()
    } else {
        content_status(frame)
    }
}

struct Hub {
    subscribers: Mutex<Vec<Sender<String>>>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

/// Observer that serializes frames to JSON envelopes and pushes them to subscriber outboxes.
///
/// Clones share the subscriber list, so a clone can be registered on a dispatcher while the
/// original keeps accepting subscriptions. A full outbox drops the message for that subscriber;
/// a dropped receiver unsubscribes it.
#[derive(Clone)]
pub struct BroadcastObserver {
    hub: Arc<Hub>,
    opts: BroadcastOpts,
}

impl BroadcastObserver {
    /// Create a broadcaster with no subscribers.
    pub fn new(opts: BroadcastOpts) -> Self {
        Self {
            hub: Arc::new(Hub {
                subscribers: Mutex::new(Vec::new()),
                sent: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
            opts,
        }
    }

    /// Add a subscriber and return its outbox.
    pub fn subscribe(&self) -> Receiver<String> {
        let (tx, rx) = bounded(self.opts.outbox_capacity.max(1));
        self.hub.subscribers.lock().push(tx);
        rx
    }

    /// Live subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscribers.lock().len()
    }

    /// Messages queued to subscribers so far.
    pub fn sent(&self) -> u64 {
        self.hub.sent.load(Ordering::Relaxed)
    }

    /// Messages dropped on full outboxes so far.
    pub fn dropped(&self) -> u64 {
        self.hub.dropped.load(Ordering::Relaxed)
    }
}

impl FrameObserver for BroadcastObserver {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn on_frame(&mut self, frame: &Frame) -> Result<(), ObserverError> {
        if self.hub.subscribers.lock().is_empty() {
            return Ok(());
        }
        let envelope = encode_envelope(frame, frame_status(frame), self.opts.jpeg_quality)
            .map_err(|e| ObserverError::delivery(e.to_string()))?;
        let message =
            serde_json::to_string(&envelope).map_err(|e| ObserverError::delivery(e.to_string()))?;

        let mut subscribers = self.hub.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(message.clone()) {
            Ok(()) => {
                self.hub.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.hub.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("broadcast subscriber disconnected");
                false
            }
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transport/broadcast.rs"]
mod tests;
