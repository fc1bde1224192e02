//! Simulated animation runtime
//!
//! A headless stand-in for the avatar's animation runtime. Every motion
//! lasts a fixed number of frames (configurable per group) and is marked
//! finished by [`AnimationRuntime::on_frame`] once its frames ran out.
//!
//! Clones share state, so a host can keep a clone to inspect what is
//! playing after handing one to the scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::lane::{AnimationRuntime, MotionHandle, MotionPriority, MotionRequest};

#[derive(Debug)]
struct PlayingMotion {
    group: String,
    remaining: u32,
    handle: MotionHandle,
}

#[derive(Debug, Default)]
struct SimulatedState {
    default_duration: u32,
    durations: HashMap<String, u32>,
    unknown_groups_refused: bool,
    lanes: Vec<Option<PlayingMotion>>,
    history: Vec<MotionRequest>,
}

/// Tick-driven animation runtime
#[derive(Clone, Debug)]
pub struct SimulatedRuntime {
    state: Arc<Mutex<SimulatedState>>,
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new(30)
    }
}

impl SimulatedRuntime {
    /// Create a runtime where every motion lasts `default_duration` frames
    #[must_use]
    pub fn new(default_duration: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulatedState {
                default_duration,
                ..Default::default()
            })),
        }
    }

    /// Override the duration of one motion group
    #[must_use]
    pub fn with_duration(self, group: impl Into<String>, frames: u32) -> Self {
        self.state.lock().durations.insert(group.into(), frames);
        self
    }

    /// Refuse groups that have no explicit duration
    #[must_use]
    pub fn refusing_unknown_groups(self) -> Self {
        self.state.lock().unknown_groups_refused = true;
        self
    }

    /// Number of lanes the runtime was asked to provide
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.state.lock().lanes.len()
    }

    /// Group currently playing on a lane
    #[must_use]
    pub fn playing(&self, lane: usize) -> Option<String> {
        self.state
            .lock()
            .lanes
            .get(lane)
            .and_then(Option::as_ref)
            .map(|m| m.group.clone())
    }

    /// Every motion ever started, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<MotionRequest> {
        self.state.lock().history.clone()
    }

    /// Tear down the motion on a lane, as a runtime would when the
    /// underlying model goes away mid-motion
    pub fn destroy_lane(&self, lane: usize) {
        let mut state = self.state.lock();
        if let Some(motion) = state.lanes.get_mut(lane).and_then(Option::take) {
            motion.handle.mark_destroyed();
        }
    }
}

impl AnimationRuntime for SimulatedRuntime {
    fn ensure_lanes(&mut self, count: usize) {
        let mut state = self.state.lock();
        if state.lanes.len() < count {
            state.lanes.resize_with(count, || None);
        }
    }

    fn start_motion(&mut self, request: &MotionRequest) -> Option<MotionHandle> {
        let mut state = self.state.lock();

        let duration = match state.durations.get(&request.group) {
            Some(frames) => *frames,
            None if state.unknown_groups_refused => return None,
            None => state.default_duration,
        };

        if request.lane >= state.lanes.len() {
            return None;
        }

        let busy = state.lanes[request.lane].is_some();
        if busy && request.priority == MotionPriority::Normal {
            return None;
        }

        let handle = MotionHandle::new();
        if duration == 0 {
            handle.mark_finished();
        }

        tracing::info!(lane = request.lane, group = %request.group, frames = duration, "Motion started");

        state.lanes[request.lane] = Some(PlayingMotion {
            group: request.group.clone(),
            remaining: duration,
            handle: handle.clone(),
        });
        state.history.push(request.clone());

        Some(handle)
    }

    fn on_frame(&mut self) {
        let mut state = self.state.lock();
        for slot in &mut state.lanes {
            let done = match slot {
                Some(motion) => {
                    motion.remaining = motion.remaining.saturating_sub(1);
                    motion.remaining == 0
                }
                None => false,
            };

            if done {
                if let Some(motion) = slot.take() {
                    motion.handle.mark_finished();
                }
            }
        }
    }
}
