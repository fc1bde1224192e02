//! Motion System
//!
//! Plays avatar motions on independent lanes and exposes their completion
//! as futures.
//!
//! # Architecture
//!
//! - [`lane`]: per-lane play/finish state and the runtime capability trait
//! - [`scheduler`]: the frame-driven scheduler and completion futures
//! - [`library`]: named body/face pairs the companion reacts with
//! - [`simulated`]: a headless runtime for the daemon and tests

pub mod lane;
pub mod library;
pub mod scheduler;
pub mod simulated;

pub use lane::{
    AnimationRuntime, Lane, LaneTable, MotionHandle, MotionOutcome, MotionPriority, MotionRequest,
};
pub use library::{MotionLibrary, MotionPair, BODY_LANE, FACE_LANE};
pub use scheduler::{MotionCompletion, MotionScheduler, PairCompletion};
pub use simulated::SimulatedRuntime;
