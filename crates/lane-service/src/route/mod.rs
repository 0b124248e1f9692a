//! Route-driven camera selection.
//!
//! A [`RouteSession`] turns the operator's planned route into a queue of
//! cameras and keeps up to [`MAX_ACTIVE`] of them in the active window,
//! rotating the head out as the operator drives past it.
//!
//! Lock order: the `RouteSession` mutex is always taken before any frame
//! slot lock. Publishing a frame and rotating the window both happen under
//! the route lock, so a frame can never land in a slot that a rotation has
//! just reassigned.

pub mod matcher;
pub mod window;

pub use window::{ActiveWindow, CameraSession, SessionTracker, MAX_ACTIVE};

use crate::error::LaneFault;
use crate::publisher::FramePublisher;
use crate::source::FrameSourceFactory;
use anyhow::{Context, Result};
use bytes::Bytes;
use common::catalog::CameraCatalog;
use common::geo::GeoPoint;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use telemetry::metrics::{LANE_ACTIVE_CAMERAS, LANE_ROUTE_QUEUE_DEPTH};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted { matched: usize, activated: usize },
    /// A route was already submitted; nothing changed
    AlreadySubmitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionOutcome {
    NoActiveWindow,
    NotAtHead,
    Rotated {
        released: String,
        activated: Option<String>,
    },
}

pub struct RouteSession {
    catalog: Arc<CameraCatalog>,
    sources: Arc<dyn FrameSourceFactory>,
    publisher: Arc<FramePublisher>,
    tolerance: f64,
    track_distance_threshold: f64,
    submitted: bool,
    queue: VecDeque<String>,
    used: HashSet<String>,
    window: ActiveWindow,
}

impl RouteSession {
    pub fn new(
        catalog: Arc<CameraCatalog>,
        sources: Arc<dyn FrameSourceFactory>,
        publisher: Arc<FramePublisher>,
        tolerance: f64,
        track_distance_threshold: f64,
    ) -> Self {
        Self {
            catalog,
            sources,
            publisher,
            tolerance,
            track_distance_threshold,
            submitted: false,
            queue: VecDeque::new(),
            used: HashSet::new(),
            window: ActiveWindow::new(),
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn window(&self) -> &ActiveWindow {
        &self.window
    }

    pub fn head(&self) -> Option<Arc<CameraSession>> {
        self.window.head().cloned()
    }

    /// Sessions to process this tick, in window order
    pub fn snapshot(&self) -> Vec<Arc<CameraSession>> {
        self.window.sessions().to_vec()
    }

    pub fn queued(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(String::as_str)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Match the route and fill the window. Only the first call has any
    /// effect.
    pub fn submit_route(&mut self, points: &[GeoPoint]) -> SubmitOutcome {
        if self.submitted {
            debug!("route already submitted, ignoring");
            return SubmitOutcome::AlreadySubmitted;
        }
        self.submitted = true;

        let matched =
            matcher::match_route(&self.catalog, points, self.tolerance, &mut self.used);
        info!(
            points = points.len(),
            matched = matched.len(),
            cameras = ?matched,
            "route matched"
        );
        let matched_count = matched.len();
        self.queue.extend(matched);

        let activated = self.fill_window();
        self.update_gauges();
        SubmitOutcome::Accepted {
            matched: matched_count,
            activated: activated.len(),
        }
    }

    /// Rotate the window when `point` reaches the head camera
    pub async fn update_position(&mut self, point: &GeoPoint) -> PositionOutcome {
        let Some(head) = self.window.head() else {
            return PositionOutcome::NoActiveWindow;
        };
        if !matcher::is_at(head.camera(), point, self.tolerance) {
            return PositionOutcome::NotAtHead;
        }

        let Some(released) = self.window.pop_head() else {
            return PositionOutcome::NoActiveWindow;
        };
        let released = released.camera_id().to_string();
        self.publisher.shift_left().await;

        let activated = self.fill_window().into_iter().next();
        if activated.is_none() {
            LaneFault::QueueExhausted {
                released: released.clone(),
            }
            .record();
        }
        self.publisher.truncate(self.window.len()).await;
        self.update_gauges();

        info!(
            released = %released,
            activated = ?activated,
            window = self.window.len(),
            "active window rotated"
        );
        PositionOutcome::Rotated {
            released,
            activated,
        }
    }

    /// Publish a frame into the slot `session` currently occupies. Returns
    /// false if the session has left the window.
    pub async fn publish(&self, session: &CameraSession, jpeg: Bytes) -> bool {
        match self.window.position_of(session) {
            Some(position) => {
                self.publisher.publish(position, jpeg).await;
                true
            }
            None => false,
        }
    }

    /// Pop queued cameras into the window until it is full. Cameras whose
    /// source cannot be opened are skipped.
    fn fill_window(&mut self) -> Vec<String> {
        let mut activated = Vec::new();
        while !self.window.is_full() {
            let Some(camera_id) = self.queue.pop_front() else {
                break;
            };
            match self.activate(&camera_id) {
                Ok(session) => {
                    if self.window.push(session).is_err() {
                        self.queue.push_front(camera_id);
                        break;
                    }
                    activated.push(camera_id);
                }
                Err(e) => LaneFault::frame_source(&camera_id, format!("{:#}", e)).record(),
            }
        }
        activated
    }

    fn activate(&self, camera_id: &str) -> Result<Arc<CameraSession>> {
        let camera = self
            .catalog
            .get(camera_id)
            .with_context(|| format!("camera '{}' is not in the catalog", camera_id))?;
        let source = self
            .sources
            .open(camera_id)
            .with_context(|| format!("failed to open frame source for '{}'", camera_id))?;
        info!(camera_id = %camera_id, lanes = camera.lane_count(), "camera session started");
        Ok(Arc::new(CameraSession::new(
            camera,
            source,
            self.track_distance_threshold,
        )))
    }

    fn update_gauges(&self) {
        LANE_ACTIVE_CAMERAS.set(self.window.len() as i64);
        LANE_ROUTE_QUEUE_DEPTH.set(self.queue.len() as i64);
    }
}
