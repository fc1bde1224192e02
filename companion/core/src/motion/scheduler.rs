//! Motion Scheduler
//!
//! Issues motions onto lanes and turns the runtime's poll-only completion
//! flags into awaitable [`MotionCompletion`] futures.
//!
//! # Frame Driving
//!
//! Nothing resolves on its own. The host calls [`MotionScheduler::tick`]
//! once per rendering frame; each tick lets the runtime advance and then
//! polls every lane that still has a waiter.
//!
//! ```text
//! frame ─► runtime.on_frame() ─► LaneTable::poll() ─► oneshot::send(outcome)
//!                                                            │
//!                              MotionCompletion.await ◄──────┘
//! ```
//!
//! The scheduler is a cheap, cloneable handle. Its lock is only taken for
//! the synchronous part of each call, never across an `.await`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{join, join_all, Join, JoinAll};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::lane::{AnimationRuntime, LaneTable, MotionOutcome, MotionRequest};
use super::library::{MotionLibrary, MotionPair, BODY_LANE, FACE_LANE};

// ============================================================================
// Completion Future
// ============================================================================

/// Resolves once the motion is no longer playing
///
/// Dropping the scheduler (or losing the lane's sender in any other way)
/// resolves the future as [`MotionOutcome::Destroyed`].
#[derive(Debug)]
pub struct MotionCompletion {
    inner: CompletionInner,
}

#[derive(Debug)]
enum CompletionInner {
    Ready(Option<MotionOutcome>),
    Waiting(oneshot::Receiver<MotionOutcome>),
}

impl MotionCompletion {
    /// A completion that is already resolved
    #[must_use]
    pub fn resolved(outcome: MotionOutcome) -> Self {
        Self {
            inner: CompletionInner::Ready(Some(outcome)),
        }
    }

    fn waiting(rx: oneshot::Receiver<MotionOutcome>) -> Self {
        Self {
            inner: CompletionInner::Waiting(rx),
        }
    }
}

impl Future for MotionCompletion {
    type Output = MotionOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            CompletionInner::Ready(outcome) => {
                Poll::Ready(outcome.take().unwrap_or(MotionOutcome::Skipped))
            }
            CompletionInner::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|result| result.unwrap_or(MotionOutcome::Destroyed)),
        }
    }
}

/// Completion of a body/face pair: `(body, face)`
pub type PairCompletion = Join<MotionCompletion, MotionCompletion>;

// ============================================================================
// Scheduler
// ============================================================================

struct SchedulerInner {
    runtime: Option<Box<dyn AnimationRuntime>>,
    lanes: LaneTable,
    frames: u64,
}

/// Multi-lane motion scheduler
#[derive(Clone)]
pub struct MotionScheduler {
    inner: Arc<Mutex<SchedulerInner>>,
}

impl Default for MotionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MotionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MotionScheduler")
            .field("has_host", &inner.runtime.is_some())
            .field("lanes", &inner.lanes.len())
            .field("frames", &inner.frames)
            .finish()
    }
}

impl MotionScheduler {
    /// Create a scheduler with no avatar loaded
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SchedulerInner {
                runtime: None,
                lanes: LaneTable::new(),
                frames: 0,
            })),
        }
    }

    /// Create a scheduler with an avatar already loaded
    #[must_use]
    pub fn with_runtime(runtime: impl AnimationRuntime + 'static) -> Self {
        let scheduler = Self::new();
        scheduler.attach(runtime);
        scheduler
    }

    /// The avatar finished loading
    pub fn attach(&self, runtime: impl AnimationRuntime + 'static) {
        let mut inner = self.inner.lock();
        let mut runtime: Box<dyn AnimationRuntime> = Box::new(runtime);
        runtime.ensure_lanes(inner.lanes.len());
        inner.runtime = Some(runtime);
        tracing::info!(lanes = inner.lanes.len(), "Animation runtime attached");
    }

    /// The avatar was unloaded
    ///
    /// Every pending completion resolves as [`MotionOutcome::Destroyed`].
    pub fn detach(&self) {
        let mut inner = self.inner.lock();
        inner.runtime = None;
        let released = inner.lanes.destroy_all();
        tracing::info!(released, "Animation runtime detached");
    }

    /// Whether an avatar is loaded
    #[must_use]
    pub fn has_host(&self) -> bool {
        self.inner.lock().runtime.is_some()
    }

    /// Play a motion with [`MotionPriority::Force`](super::MotionPriority::Force)
    pub fn do_motion(&self, group: &str, variant_index: usize, lane: usize) -> MotionCompletion {
        self.play(
            MotionRequest::new(group)
                .with_variant(variant_index)
                .on_lane(lane),
        )
    }

    /// Play an arbitrary request
    pub fn play(&self, request: MotionRequest) -> MotionCompletion {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let Some(runtime) = inner.runtime.as_deref_mut() else {
            tracing::debug!(group = %request.group, "No avatar loaded, motion skipped");
            return MotionCompletion::resolved(MotionOutcome::Skipped);
        };

        tracing::debug!(
            lane = request.lane,
            group = %request.group,
            variant = request.variant_index,
            priority = ?request.priority,
            "Playing motion"
        );

        MotionCompletion::waiting(inner.lanes.play(runtime, &request))
    }

    /// Play a body/face pair and wait for both lanes
    pub fn do_motion_pair(&self, pair: &MotionPair) -> PairCompletion {
        join(
            self.do_motion(&pair.body, 0, BODY_LANE),
            self.do_motion(&pair.face, 0, FACE_LANE),
        )
    }

    /// Play several requests and wait for all of them
    pub fn join_all<I>(&self, requests: I) -> JoinAll<MotionCompletion>
    where
        I: IntoIterator<Item = MotionRequest>,
    {
        join_all(requests.into_iter().map(|request| self.play(request)))
    }

    /// Greeting motion for a freshly loaded avatar
    pub fn play_initial(&self, library: &MotionLibrary) -> MotionCompletion {
        self.do_motion(&library.initial, 0, BODY_LANE)
    }

    /// Random idle reaction. Resolves immediately with two `Skipped`
    /// outcomes when the library has no idle pairs.
    pub fn play_random_pair(&self, library: &MotionLibrary) -> PairCompletion {
        let pair = library.random_idle(&mut rand::thread_rng()).cloned();
        match pair {
            Some(pair) => self.do_motion_pair(&pair),
            None => join(
                MotionCompletion::resolved(MotionOutcome::Skipped),
                MotionCompletion::resolved(MotionOutcome::Skipped),
            ),
        }
    }

    /// Advance one rendering frame
    ///
    /// Returns the number of completions resolved during this frame.
    pub fn tick(&self) -> usize {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.frames += 1;

        if let Some(runtime) = inner.runtime.as_deref_mut() {
            runtime.on_frame();
        }

        inner.lanes.poll()
    }

    /// Whether a lane has nothing left to play
    #[must_use]
    pub fn is_finished(&self, lane: usize) -> bool {
        self.inner.lock().lanes.is_finished(lane)
    }

    /// Number of lanes allocated
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.inner.lock().lanes.len()
    }

    /// Number of motions ever started on a lane
    #[must_use]
    pub fn lane_generation(&self, lane: usize) -> Option<u64> {
        self.inner.lock().lanes.lane(lane).map(super::Lane::generation)
    }

    /// Number of completions still waiting to resolve
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().lanes.pending_count()
    }

    /// Frames ticked so far
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.inner.lock().frames
    }
}
