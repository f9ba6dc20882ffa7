//! Skeletal hand model shared by tracking input, the frame codec and pose reconstruction.

use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Distance between thumb tip and index tip that counts as a pinch
pub const DEFAULT_PINCH_DISTANCE: f32 = 0.03;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Chirality {
    Left,
    Right,
}

impl Chirality {
    pub const ALL: [Chirality; 2] = [Chirality::Left, Chirality::Right];

    pub fn mirror(self) -> Self {
        match self {
            Chirality::Left => Chirality::Right,
            Chirality::Right => Chirality::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Chirality::Left => "left",
            Chirality::Right => "right",
        }
    }
}

impl fmt::Display for Chirality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FingerType {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl FingerType {
    pub const ALL: [FingerType; 5] = [
        FingerType::Thumb,
        FingerType::Index,
        FingerType::Middle,
        FingerType::Ring,
        FingerType::Pinky,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JointType {
    Metacarpal,
    Proximal,
    Intermediate,
    Distal,
    Tip,
}

impl JointType {
    pub const ALL: [JointType; 5] = [
        JointType::Metacarpal,
        JointType::Proximal,
        JointType::Intermediate,
        JointType::Distal,
        JointType::Tip,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// The thumb skeleton has no intermediate phalanx
pub fn joint_exists(finger: FingerType, joint: JointType) -> bool {
    !(finger == FingerType::Thumb && joint == JointType::Intermediate)
}

/// All joints that exist on a hand, in canonical finger-then-joint order.
///
/// This is the order joints travel in on the wire, 24 entries in total.
pub fn wire_joints() -> impl Iterator<Item = (FingerType, JointType)> {
    FingerType::ALL.iter().flat_map(|&finger| {
        JointType::ALL
            .iter()
            .filter(move |&&joint| joint_exists(finger, joint))
            .map(move |&joint| (finger, joint))
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: na::Vector3<f32>,
    pub rotation: na::UnitQuaternion<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(position: na::Vector3<f32>, rotation: na::UnitQuaternion<f32>) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: na::Vector3::zeros(),
            rotation: na::UnitQuaternion::identity(),
        }
    }

    /// Where hidden hands are parked, well below any floor
    pub fn off_stage() -> Self {
        Self {
            position: na::Vector3::new(0.0, -100.0, 0.0),
            rotation: na::UnitQuaternion::identity(),
        }
    }

    pub fn at(position: na::Vector3<f32>) -> Self {
        Self {
            position,
            rotation: na::UnitQuaternion::identity(),
        }
    }

    pub fn up(&self) -> na::Vector3<f32> {
        self.rotation * na::Vector3::y()
    }

    pub fn right(&self) -> na::Vector3<f32> {
        self.rotation * na::Vector3::x()
    }

    pub fn forward(&self) -> na::Vector3<f32> {
        self.rotation * na::Vector3::z()
    }
}

/// Capability surface every hand source exposes.
///
/// The frame codec and pose reconstruction only ever read hands through this trait,
/// so tracked, controller-driven and network-decoded hands are interchangeable.
pub trait HandData {
    fn chirality(&self) -> Chirality;
    fn is_valid(&self) -> bool;
    fn is_pinching(&self) -> bool;
    fn wrist(&self) -> Pose;
    fn palm(&self) -> Pose;
    /// `None` when the joint does not exist or carries no data
    fn joint(&self, finger: FingerType, joint: JointType) -> Option<Pose>;
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Finger {
    joints: [Option<Pose>; 5],
}

impl Finger {
    pub fn joint(&self, joint: JointType) -> Option<Pose> {
        self.joints[joint.index()]
    }

    fn set(&mut self, joint: JointType, pose: Option<Pose>) {
        self.joints[joint.index()] = pose;
    }
}

/// Skeletal hand storage.
///
/// Used for optically tracked hands, for frames decoded off the network
/// and as the avatar skeleton driven by reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    chirality: Chirality,
    valid: bool,
    wrist: Pose,
    palm: Pose,
    fingers: [Finger; 5],
    pinch_distance: f32,
}

impl Hand {
    /// Creates an empty, invalid hand
    pub fn new(chirality: Chirality) -> Self {
        Self {
            chirality,
            valid: false,
            wrist: Pose::identity(),
            palm: Pose::identity(),
            fingers: [Finger::default(); 5],
            pinch_distance: DEFAULT_PINCH_DISTANCE,
        }
    }

    pub fn with_pinch_distance(mut self, pinch_distance: f32) -> Self {
        self.pinch_distance = pinch_distance;
        self
    }

    pub fn pinch_distance(&self) -> f32 {
        self.pinch_distance
    }

    pub fn set_pinch_distance(&mut self, pinch_distance: f32) {
        self.pinch_distance = pinch_distance;
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    pub fn set_wrist(&mut self, wrist: Pose) {
        self.wrist = wrist;
    }

    pub fn set_palm(&mut self, palm: Pose) {
        self.palm = palm;
    }

    /// Stores a joint pose. Returns false for joints the skeleton doesn't have.
    pub fn set_joint(&mut self, finger: FingerType, joint: JointType, pose: Pose) -> bool {
        if !joint_exists(finger, joint) {
            return false;
        }
        self.fingers[finger.index()].set(joint, Some(pose));
        true
    }

    pub fn clear_joint(&mut self, finger: FingerType, joint: JointType) {
        self.fingers[finger.index()].set(joint, None);
    }

    pub fn finger(&self, finger: FingerType) -> &Finger {
        &self.fingers[finger.index()]
    }

    /// Moves the hand off stage and marks it invalid
    pub fn hide(&mut self) {
        self.wrist = Pose::off_stage();
        self.valid = false;
    }
}

impl HandData for Hand {
    fn chirality(&self) -> Chirality {
        self.chirality
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn is_pinching(&self) -> bool {
        if !self.valid {
            return false;
        }
        match (
            self.joint(FingerType::Thumb, JointType::Tip),
            self.joint(FingerType::Index, JointType::Tip),
        ) {
            (Some(thumb), Some(index)) => {
                (thumb.position - index.position).norm() <= self.pinch_distance
            }
            _ => false,
        }
    }

    fn wrist(&self) -> Pose {
        self.wrist
    }

    fn palm(&self) -> Pose {
        self.palm
    }

    fn joint(&self, finger: FingerType, joint: JointType) -> Option<Pose> {
        self.fingers[finger.index()].joint(joint)
    }
}
