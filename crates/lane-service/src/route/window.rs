use crate::source::FrameSource;
use crate::tracking::{CrossingAccumulator, IdentityTracker, LaneStats};
use common::catalog::CameraStaticInfo;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Upper bound on concurrently processed cameras
pub const MAX_ACTIVE: usize = crate::publisher::WINDOW_SLOTS;

/// Mutable per-frame state, touched only by the processing loop
pub struct SessionTracker {
    pub source: Box<dyn FrameSource>,
    pub identity: IdentityTracker,
    pub crossings: CrossingAccumulator,
    /// Set once the source reports end of stream
    pub exhausted: bool,
}

/// One camera while it is part of the active window.
///
/// Dropping the last reference releases the frame source.
pub struct CameraSession {
    camera: Arc<CameraStaticInfo>,
    tracker: Mutex<SessionTracker>,
    stats: LaneStats,
    frame_index: AtomicU64,
    retired: CancellationToken,
}

impl CameraSession {
    pub fn new(
        camera: Arc<CameraStaticInfo>,
        source: Box<dyn FrameSource>,
        track_distance_threshold: f64,
    ) -> Self {
        let stats = LaneStats::new(camera.lane_count());
        Self {
            camera,
            tracker: Mutex::new(SessionTracker {
                source,
                identity: IdentityTracker::new(track_distance_threshold),
                crossings: CrossingAccumulator::new(),
                exhausted: false,
            }),
            stats,
            frame_index: AtomicU64::new(0),
            retired: CancellationToken::new(),
        }
    }

    pub fn camera(&self) -> &Arc<CameraStaticInfo> {
        &self.camera
    }

    pub fn camera_id(&self) -> &str {
        &self.camera.id
    }

    pub fn tracker(&self) -> &Mutex<SessionTracker> {
        &self.tracker
    }

    pub fn stats(&self) -> &LaneStats {
        &self.stats
    }

    /// Index of the frame about to be processed
    pub fn frame_index(&self) -> u64 {
        self.frame_index.load(Ordering::Relaxed)
    }

    pub fn advance_frame(&self) -> u64 {
        self.frame_index.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Mark the session as rotated out; an in-flight tick finishes but no
    /// further frames are processed.
    pub fn retire(&self) {
        self.retired.cancel();
    }

    pub fn is_retired(&self) -> bool {
        self.retired.is_cancelled()
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("camera_id", &self.camera.id)
            .field("frame_index", &self.frame_index())
            .field("retired", &self.is_retired())
            .finish()
    }
}

/// Ordered sessions, head first, never more than [`MAX_ACTIVE`]
#[derive(Debug, Default)]
pub struct ActiveWindow {
    sessions: Vec<Arc<CameraSession>>,
}

impl ActiveWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= MAX_ACTIVE
    }

    pub fn head(&self) -> Option<&Arc<CameraSession>> {
        self.sessions.first()
    }

    pub fn sessions(&self) -> &[Arc<CameraSession>] {
        &self.sessions
    }

    pub fn position_of(&self, session: &CameraSession) -> Option<usize> {
        self.sessions
            .iter()
            .position(|s| std::ptr::eq(Arc::as_ptr(s), session))
    }

    /// Append at the tail; hands the session back if the window is full
    pub fn push(&mut self, session: Arc<CameraSession>) -> Result<(), Arc<CameraSession>> {
        if self.is_full() {
            return Err(session);
        }
        self.sessions.push(session);
        Ok(())
    }

    /// Remove the head session, retiring it
    pub fn pop_head(&mut self) -> Option<Arc<CameraSession>> {
        if self.sessions.is_empty() {
            return None;
        }
        let head = self.sessions.remove(0);
        head.retire();
        Some(head)
    }
}
