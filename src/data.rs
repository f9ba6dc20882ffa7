//! JSON messages published by local tracking sources

use crate::error::TrackingError;
use crate::hand::{wire_joints, Chirality, FingerType, Hand, HandData, JointType, Pose};
use nalgebra as na;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Vector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PoseMessage {
    pub position: Vector,
    pub rotation: Quaternion,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JointMessage {
    pub finger: FingerType,
    pub joint: JointType,
    pub pose: PoseMessage,
}

/// Snapshot of one tracked hand
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HandMessage {
    pub chirality: Chirality,
    pub tracked: bool,
    pub wrist: PoseMessage,
    #[serde(default)]
    pub palm: Option<PoseMessage>,
    #[serde(default)]
    pub joints: Vec<JointMessage>,
}

impl From<&Pose> for PoseMessage {
    fn from(pose: &Pose) -> Self {
        let q = pose.rotation.quaternion();
        Self {
            position: Vector {
                x: pose.position.x,
                y: pose.position.y,
                z: pose.position.z,
            },
            rotation: Quaternion {
                x: q.i,
                y: q.j,
                z: q.k,
                w: q.w,
            },
        }
    }
}

impl PoseMessage {
    /// Converts to a pose, normalizing the rotation
    pub fn to_pose(&self) -> Option<Pose> {
        let Quaternion { x, y, z, w } = self.rotation;
        let rotation = na::Quaternion::new(w, x, y, z);
        if !(rotation.norm() > f32::EPSILON) {
            return None;
        }
        Some(Pose::new(
            na::Vector3::new(self.position.x, self.position.y, self.position.z),
            na::UnitQuaternion::new_normalize(rotation),
        ))
    }
}

impl HandMessage {
    pub fn deserialize(data: &[u8]) -> Result<HandMessage, TrackingError> {
        Ok(serde_json::from_slice::<HandMessage>(data)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, TrackingError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_hand(hand: &dyn HandData) -> Self {
        let joints = wire_joints()
            .filter_map(|(finger, joint)| {
                hand.joint(finger, joint).map(|pose| JointMessage {
                    finger,
                    joint,
                    pose: PoseMessage::from(&pose),
                })
            })
            .collect();
        Self {
            chirality: hand.chirality(),
            tracked: hand.is_valid(),
            wrist: PoseMessage::from(&hand.wrist()),
            palm: Some(PoseMessage::from(&hand.palm())),
            joints,
        }
    }

    /// Builds a skeletal hand. Untracked messages produce an invalid hand.
    pub fn into_hand(self, pinch_distance: f32) -> Result<Hand, TrackingError> {
        let mut hand = Hand::new(self.chirality).with_pinch_distance(pinch_distance);
        if !self.tracked {
            return Ok(hand);
        }

        let wrist = self
            .wrist
            .to_pose()
            .ok_or_else(|| TrackingError::DegenerateRotation("wrist".to_owned()))?;
        hand.set_wrist(wrist);
        let palm = match self.palm {
            Some(palm) => palm
                .to_pose()
                .ok_or_else(|| TrackingError::DegenerateRotation("palm".to_owned()))?,
            None => wrist,
        };
        hand.set_palm(palm);

        for joint in &self.joints {
            let pose = joint.pose.to_pose().ok_or_else(|| {
                TrackingError::DegenerateRotation(format!("{:?} {:?}", joint.finger, joint.joint))
            })?;
            // sources that report a thumb intermediate joint get it dropped here
            hand.set_joint(joint.finger, joint.joint, pose);
        }
        hand.set_valid(true);
        Ok(hand)
    }
}

/// Latest state of one tracked controller
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ControllerMessage {
    pub chirality: Chirality,
    pub tracked: bool,
    pub pose: PoseMessage,
    /// Grip or trigger value, 0 open to 1 closed
    #[serde(default)]
    pub grab: f32,
}

impl ControllerMessage {
    pub fn deserialize(data: &[u8]) -> Result<ControllerMessage, TrackingError> {
        Ok(serde_json::from_slice::<ControllerMessage>(data)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, TrackingError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Controller pose, `None` while untracked
    pub fn wrist(&self) -> Result<Option<Pose>, TrackingError> {
        if !self.tracked {
            return Ok(None);
        }
        self.pose
            .to_pose()
            .map(Some)
            .ok_or_else(|| TrackingError::DegenerateRotation("controller".to_owned()))
    }
}
