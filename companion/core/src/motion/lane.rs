//! Lane Manager
//!
//! Owns the play/finish state of every animation lane. A lane is one
//! independent animation track on the avatar (body, face, ...). Each lane
//! holds at most one active [`MotionHandle`] and at most one pending
//! completion sender.
//!
//! The animation runtime never tells us when a motion ends, so completion
//! is observed by polling the handle's flags from [`LaneTable::poll`], once
//! per rendering frame. Pre-emption resolves the outstanding waiter
//! immediately, so a caller awaiting the old motion never hangs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Priority of a motion request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionPriority {
    /// Only plays when the lane is idle
    #[default]
    Normal,
    /// Always plays, discarding whatever the lane was doing
    Force,
}

/// A request to play one motion on one lane
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MotionRequest {
    /// Motion group name (as known to the animation runtime)
    pub group: String,
    /// Index of the variant inside the group
    pub variant_index: usize,
    /// Lane to play on
    pub lane: usize,
    /// Pre-emption policy
    pub priority: MotionPriority,
}

impl MotionRequest {
    /// Create a forced request for variant 0 on lane 0
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            variant_index: 0,
            lane: 0,
            priority: MotionPriority::Force,
        }
    }

    /// Set the variant index
    #[must_use]
    pub fn with_variant(mut self, variant_index: usize) -> Self {
        self.variant_index = variant_index;
        self
    }

    /// Set the lane
    #[must_use]
    pub fn on_lane(mut self, lane: usize) -> Self {
        self.lane = lane;
        self
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: MotionPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// How a completion signal resolved
///
/// Every outcome means the motion is no longer pending. Only
/// [`MotionOutcome::Finished`] means it actually played to the end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionOutcome {
    /// The motion played to completion
    Finished,
    /// Another motion was forced onto the same lane
    Superseded,
    /// The lane or the whole avatar was destroyed
    Destroyed,
    /// Nothing was played (no avatar loaded, unknown group, or lane busy)
    Skipped,
}

impl MotionOutcome {
    /// Whether the motion played all the way through
    #[must_use]
    pub fn completed_naturally(self) -> bool {
        matches!(self, Self::Finished)
    }
}

#[derive(Debug, Default)]
struct MotionStatus {
    finished: AtomicBool,
    destroyed: AtomicBool,
}

/// Shared reference to a motion currently playing on a lane
///
/// The animation runtime owns the flags and flips them; the scheduler only
/// reads them.
#[derive(Clone, Debug, Default)]
pub struct MotionHandle(Arc<MotionStatus>);

impl MotionHandle {
    /// Create a fresh, still-playing handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the motion reached its end
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.0.finished.load(Ordering::Acquire)
    }

    /// Whether the motion was torn down by the runtime
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.load(Ordering::Acquire)
    }

    /// Mark the motion as finished (runtime side)
    pub fn mark_finished(&self) {
        self.0.finished.store(true, Ordering::Release);
    }

    /// Mark the motion as destroyed (runtime side)
    pub fn mark_destroyed(&self) {
        self.0.destroyed.store(true, Ordering::Release);
    }
}

/// Capability provided by the avatar's animation runtime
///
/// There is no completion callback: completion is only
/// visible through the returned [`MotionHandle`].
pub trait AnimationRuntime: Send {
    /// Make sure the runtime has at least `count` parallel lanes
    fn ensure_lanes(&mut self, count: usize);

    /// Start a motion. Returns `None` if the runtime refused it (unknown
    /// group, lane busy under [`MotionPriority::Normal`], ...).
    fn start_motion(&mut self, request: &MotionRequest) -> Option<MotionHandle>;

    /// Called once per rendering frame, before lanes are polled
    fn on_frame(&mut self) {}
}

/// One animation track
#[derive(Debug, Default)]
pub struct Lane {
    handle: Option<MotionHandle>,
    generation: u64,
    destroyed: bool,
    pending: Option<oneshot::Sender<MotionOutcome>>,
}

impl Lane {
    /// Number of motions ever started on this lane
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the lane was destroyed (avatar unloaded)
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Whether someone is still waiting on this lane
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the lane has nothing left to play
    ///
    /// An empty lane counts as finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.destroyed
            || self
                .handle
                .as_ref()
                .map_or(true, |h| h.is_finished() || h.is_destroyed())
    }

    fn outcome(&self) -> MotionOutcome {
        let handle_destroyed = self.handle.as_ref().is_some_and(MotionHandle::is_destroyed);
        if self.destroyed || handle_destroyed {
            MotionOutcome::Destroyed
        } else {
            MotionOutcome::Finished
        }
    }

    fn resolve(&mut self, outcome: MotionOutcome) -> bool {
        match self.pending.take() {
            // The waiter may have given up; that is fine.
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

/// Growable table of lanes, indexed from 0
#[derive(Debug, Default)]
pub struct LaneTable {
    lanes: Vec<Lane>,
}

impl LaneTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lanes allocated so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    /// Whether no lane was ever allocated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Grow the table so `index` is valid. Never shrinks.
    pub fn ensure_lane(&mut self, index: usize) {
        if index >= self.lanes.len() {
            self.lanes.resize_with(index + 1, Lane::default);
        }
    }

    /// Look up a lane
    #[must_use]
    pub fn lane(&self, index: usize) -> Option<&Lane> {
        self.lanes.get(index)
    }

    /// Whether a lane is finished. Unknown lanes are finished.
    #[must_use]
    pub fn is_finished(&self, index: usize) -> bool {
        self.lanes.get(index).map_or(true, Lane::is_finished)
    }

    /// Number of lanes with a waiter attached
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lanes.iter().filter(|l| l.has_pending()).count()
    }

    /// Play a motion on its lane and return the receiving end of its
    /// completion signal
    pub fn play(
        &mut self,
        runtime: &mut dyn AnimationRuntime,
        request: &MotionRequest,
    ) -> oneshot::Receiver<MotionOutcome> {
        self.ensure_lane(request.lane);
        runtime.ensure_lanes(self.lanes.len());

        let (tx, rx) = oneshot::channel();
        let lane = &mut self.lanes[request.lane];

        if request.priority == MotionPriority::Normal && !lane.is_finished() {
            tracing::debug!(
                lane = request.lane,
                group = %request.group,
                "Lane busy, normal-priority motion skipped"
            );
            let _ = tx.send(MotionOutcome::Skipped);
            return rx;
        }

        if lane.resolve(MotionOutcome::Superseded) {
            tracing::debug!(lane = request.lane, "Pre-empted pending motion");
        }

        lane.generation += 1;
        lane.destroyed = false;

        match runtime.start_motion(request) {
            Some(handle) => {
                lane.handle = Some(handle);
                lane.pending = Some(tx);
            }
            None => {
                tracing::debug!(
                    lane = request.lane,
                    group = %request.group,
                    "Runtime refused motion"
                );
                lane.handle = None;
                let _ = tx.send(MotionOutcome::Skipped);
            }
        }

        rx
    }

    /// Resolve every pending lane whose motion is over
    ///
    /// Lanes whose waiter went away stop being observed. Returns the number
    /// of signals resolved.
    pub fn poll(&mut self) -> usize {
        let mut resolved = 0;

        for (index, lane) in self.lanes.iter_mut().enumerate() {
            if lane.pending.as_ref().is_some_and(oneshot::Sender::is_closed) {
                lane.pending = None;
                continue;
            }

            if lane.has_pending() && lane.is_finished() {
                let outcome = lane.outcome();
                lane.resolve(outcome);
                resolved += 1;
                tracing::trace!(lane = index, ?outcome, "Lane resolved");
            }
        }

        resolved
    }

    /// Mark every lane destroyed and release all waiters
    pub fn destroy_all(&mut self) -> usize {
        let mut resolved = 0;
        for lane in &mut self.lanes {
            lane.destroyed = true;
            if lane.resolve(MotionOutcome::Destroyed) {
                resolved += 1;
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runtime that hands out handles and keeps them for inspection
    #[derive(Default)]
    struct RecordingRuntime {
        lanes: usize,
        handles: Vec<MotionHandle>,
        refuse: bool,
    }

    impl AnimationRuntime for RecordingRuntime {
        fn ensure_lanes(&mut self, count: usize) {
            self.lanes = self.lanes.max(count);
        }

        fn start_motion(&mut self, _request: &MotionRequest) -> Option<MotionHandle> {
            if self.refuse {
                return None;
            }
            let handle = MotionHandle::new();
            self.handles.push(handle.clone());
            Some(handle)
        }
    }

    #[test]
    fn test_ensure_lane_grows_and_never_shrinks() {
        let mut table = LaneTable::new();
        assert!(table.is_empty());

        table.ensure_lane(3);
        assert_eq!(table.len(), 4);

        table.ensure_lane(1);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_play_grows_runtime_lanes() {
        let mut runtime = RecordingRuntime::default();
        let mut table = LaneTable::new();

        let _rx = table.play(&mut runtime, &MotionRequest::new("wave").on_lane(2));
        assert_eq!(table.len(), 3);
        assert_eq!(runtime.lanes, 3);
    }

    #[test]
    fn test_force_resolves_previous_waiter_immediately() {
        let mut runtime = RecordingRuntime::default();
        let mut table = LaneTable::new();

        let mut first = table.play(&mut runtime, &MotionRequest::new("a"));
        assert!(first.try_recv().is_err());

        let _second = table.play(&mut runtime, &MotionRequest::new("b"));
        assert_eq!(first.try_recv(), Ok(MotionOutcome::Superseded));
        assert_eq!(table.lane(0).map(Lane::generation), Some(2));
    }

    #[test]
    fn test_normal_priority_skipped_while_busy() {
        let mut runtime = RecordingRuntime::default();
        let mut table = LaneTable::new();

        let mut first = table.play(&mut runtime, &MotionRequest::new("a"));
        let mut second = table.play(
            &mut runtime,
            &MotionRequest::new("b").with_priority(MotionPriority::Normal),
        );

        assert_eq!(second.try_recv(), Ok(MotionOutcome::Skipped));
        assert!(first.try_recv().is_err(), "first motion keeps playing");
        assert_eq!(runtime.handles.len(), 1);
    }

    #[test]
    fn test_poll_resolves_finished_and_destroyed() {
        let mut runtime = RecordingRuntime::default();
        let mut table = LaneTable::new();

        let mut body = table.play(&mut runtime, &MotionRequest::new("a").on_lane(0));
        let mut face = table.play(&mut runtime, &MotionRequest::new("b").on_lane(1));

        assert_eq!(table.poll(), 0);

        runtime.handles[0].mark_finished();
        runtime.handles[1].mark_destroyed();
        assert_eq!(table.poll(), 2);

        assert_eq!(body.try_recv(), Ok(MotionOutcome::Finished));
        assert_eq!(face.try_recv(), Ok(MotionOutcome::Destroyed));
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn test_refused_motion_resolves_skipped() {
        let mut runtime = RecordingRuntime {
            refuse: true,
            ..Default::default()
        };
        let mut table = LaneTable::new();

        let mut rx = table.play(&mut runtime, &MotionRequest::new("missing"));
        assert_eq!(rx.try_recv(), Ok(MotionOutcome::Skipped));
        assert!(table.is_finished(0));
    }

    #[test]
    fn test_dropped_waiter_stops_being_polled() {
        let mut runtime = RecordingRuntime::default();
        let mut table = LaneTable::new();

        drop(table.play(&mut runtime, &MotionRequest::new("a")));
        assert_eq!(table.pending_count(), 1);

        assert_eq!(table.poll(), 0);
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn test_destroy_all() {
        let mut runtime = RecordingRuntime::default();
        let mut table = LaneTable::new();

        let mut rx = table.play(&mut runtime, &MotionRequest::new("a"));
        assert_eq!(table.destroy_all(), 1);
        assert_eq!(rx.try_recv(), Ok(MotionOutcome::Destroyed));
        assert!(table.lane(0).is_some_and(Lane::is_destroyed));
        assert!(table.is_finished(0));
    }

    #[test]
    fn test_unknown_lane_is_finished() {
        let table = LaneTable::new();
        assert!(table.is_finished(7));
    }
}
