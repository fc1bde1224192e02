//! Named motions used by the companion
//!
//! Reactions are expressed as body/face pairs that play together on the
//! body lane and the face lane.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Lane used for whole-body motions
pub const BODY_LANE: usize = 0;

/// Lane used for facial expressions
pub const FACE_LANE: usize = 1;

/// A body motion and a facial expression played together
///
/// Serialized as a two-element array: `["w-cool-glad01", "face_smile_04"]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct MotionPair {
    /// Group played on [`BODY_LANE`]
    pub body: String,
    /// Group played on [`FACE_LANE`]
    pub face: String,
}

impl MotionPair {
    /// Create a pair
    pub fn new(body: impl Into<String>, face: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            face: face.into(),
        }
    }
}

impl From<(String, String)> for MotionPair {
    fn from((body, face): (String, String)) -> Self {
        Self { body, face }
    }
}

impl From<MotionPair> for (String, String) {
    fn from(pair: MotionPair) -> Self {
        (pair.body, pair.face)
    }
}

/// Every motion the companion knows how to react with
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionLibrary {
    /// Played once on the body lane when the avatar becomes ready
    pub initial: String,
    /// Played when a prompt is submitted
    pub thinking: MotionPair,
    /// Played when the backend starts streaming
    pub acknowledged: MotionPair,
    /// Played after a reply finished
    pub satisfied: MotionPair,
    /// Played after a failed exchange
    pub failed: MotionPair,
    /// Random reactions to pointer clicks
    pub idle: Vec<MotionPair>,
}

impl Default for MotionLibrary {
    fn default() -> Self {
        Self {
            initial: "w-cool-posenod01".to_string(),
            thinking: MotionPair::new("w-adult-think02", "face_surprise_03"),
            acknowledged: MotionPair::new("w-cool-glad01", "face_smile_04"),
            satisfied: MotionPair::new("w-animal-nod01", "face_smile_09"),
            failed: MotionPair::new("w-cool-sad01", "face_baffling_01"),
            idle: vec![
                MotionPair::new("w-adult-blushed04", "face_smile_09"),
                MotionPair::new("w-adult-think02", "face_surprise_03"),
                MotionPair::new("w-adult-delicious03", "face_smile_01"),
            ],
        }
    }
}

impl MotionLibrary {
    /// Pick one idle pair uniformly at random
    pub fn random_idle<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&MotionPair> {
        self.idle.choose(rng)
    }
}
