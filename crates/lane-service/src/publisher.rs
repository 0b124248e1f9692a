//! Latest-frame slots for the active window and the MJPEG streams that read
//! them.

use bytes::{BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics::LANE_STREAM_CLIENTS;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Number of concurrently processed cameras, and of stream endpoints
pub const WINDOW_SLOTS: usize = 3;

pub const MJPEG_BOUNDARY: &str = "frame";

/// One position in the active window. Written only by the processing loop,
/// read by any number of stream consumers.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: RwLock<Option<Bytes>>,
}

impl FrameSlot {
    pub async fn publish(&self, jpeg: Bytes) {
        *self.latest.write().await = Some(jpeg);
    }

    pub async fn latest(&self) -> Option<Bytes> {
        self.latest.read().await.clone()
    }

    async fn take(&self) -> Option<Bytes> {
        self.latest.write().await.take()
    }

    async fn replace(&self, jpeg: Option<Bytes>) {
        *self.latest.write().await = jpeg;
    }
}

#[derive(Debug, Default)]
pub struct FramePublisher {
    slots: [FrameSlot; WINDOW_SLOTS],
}

impl FramePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, position: usize) -> Option<&FrameSlot> {
        self.slots.get(position)
    }

    pub async fn publish(&self, position: usize, jpeg: Bytes) {
        if let Some(slot) = self.slots.get(position) {
            slot.publish(jpeg).await;
        }
    }

    pub async fn latest(&self, position: usize) -> Option<Bytes> {
        match self.slots.get(position) {
            Some(slot) => slot.latest().await,
            None => None,
        }
    }

    /// Follow a window rotation: every frame moves one position towards the
    /// head and the tail slot empties until its new camera publishes.
    pub async fn shift_left(&self) {
        for position in 0..WINDOW_SLOTS {
            let next = match self.slots.get(position + 1) {
                Some(slot) => slot.take().await,
                None => None,
            };
            self.slots[position].replace(next).await;
        }
    }

    /// Empty every slot at or beyond `len`
    pub async fn truncate(&self, len: usize) {
        for slot in self.slots.iter().skip(len) {
            slot.take().await;
        }
    }
}

/// One multipart body part carrying a JPEG image
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(jpeg.len() + 64);
    part.put_slice(b"--");
    part.put_slice(MJPEG_BOUNDARY.as_bytes());
    part.put_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

pub fn mjpeg_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", MJPEG_BOUNDARY)
}

struct ClientGuard {
    position: usize,
}

impl ClientGuard {
    fn new(position: usize) -> Self {
        LANE_STREAM_CLIENTS.inc();
        tracing::debug!(slot = position, "stream client connected");
        Self { position }
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        LANE_STREAM_CLIENTS.dec();
        tracing::debug!(slot = self.position, "stream client disconnected");
    }
}

/// Paced stream of the latest frame in `position`.
///
/// Each tick re-sends whatever is currently published, repeating frames when
/// production is slower than `interval`. Nothing is sent while the slot is
/// empty. The stream ends when the consumer drops it or `closed` is cancelled.
pub fn mjpeg_stream(
    publisher: Arc<FramePublisher>,
    position: usize,
    interval: Duration,
    closed: CancellationToken,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let guard = ClientGuard::new(position);

    futures::stream::unfold(
        (publisher, ticker, guard),
        |(publisher, mut ticker, guard)| async move {
            loop {
                ticker.tick().await;
                if let Some(jpeg) = publisher.latest(guard.position).await {
                    let part = mjpeg_part(&jpeg);
                    return Some((Ok(part), (publisher, ticker, guard)));
                }
            }
        },
    )
    .take_until(closed.cancelled_owned())
}
