//! Rebuilds finger bone orientations from joint positions alone.
//!
//! Frames only carry joint positions, and tracking sources don't agree on joint
//! rotations, so every avatar hand derives its bone rotations here. Local and remote
//! hands go through the same code.
//!
//! Each finger is walked from the base towards the tip while carrying a reference
//! "upward" direction. For every bone the forward axis points at the next available
//! joint and the upward axis is re-orthogonalized against it. The resulting frame is
//! turned into a rotation and composed with the model's forward offset.

use crate::hand::{Chirality, FingerType, Hand, HandData, JointType, Pose};
use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Keeps overstretched fingers from flipping: the next reference direction is
/// taken from a point pushed slightly below the current joint.
pub const DEFAULT_SAFETY_OFFSET: f32 = 0.01;

const MIN_NORM: f32 = 1e-6;

/// Unity style euler angles in degrees, applied Z then X then Y
pub fn euler_degrees(angles: &na::Vector3<f32>) -> na::UnitQuaternion<f32> {
    let radians = angles.map(f32::to_radians);
    na::UnitQuaternion::from_axis_angle(&na::Vector3::y_axis(), radians.y)
        * na::UnitQuaternion::from_axis_angle(&na::Vector3::x_axis(), radians.x)
        * na::UnitQuaternion::from_axis_angle(&na::Vector3::z_axis(), radians.z)
}

/// Per-model offsets between tracking data and the rendered hand model.
///
/// Values are authored for the left hand, right hands mirror them.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct Calibration {
    /// Wrist position offset, in the wrist frame
    pub position: [f32; 3],
    /// Wrist rotation offset, euler degrees
    pub rotation_degrees: [f32; 3],
    /// Rotation from the bone frame (z forward, y up) to the model's bone axes, euler degrees
    pub forward_degrees: [f32; 3],
}

impl Calibration {
    pub fn for_chirality(&self, chirality: Chirality) -> Self {
        match chirality {
            Chirality::Left => *self,
            Chirality::Right => {
                let negate = |v: [f32; 3]| [-v[0], -v[1], -v[2]];
                let mut mirrored = Self {
                    position: negate(self.position),
                    rotation_degrees: negate(self.rotation_degrees),
                    forward_degrees: negate(self.forward_degrees),
                };
                mirrored.rotation_degrees[0] += 180.0;
                mirrored.forward_degrees[0] += 180.0;
                mirrored
            }
        }
    }

    pub fn position_offset(&self) -> na::Vector3<f32> {
        na::Vector3::from(self.position)
    }

    pub fn rotation_offset(&self) -> na::UnitQuaternion<f32> {
        euler_degrees(&na::Vector3::from(self.rotation_degrees))
    }

    pub fn forward_offset(&self) -> na::UnitQuaternion<f32> {
        euler_degrees(&na::Vector3::from(self.forward_degrees))
    }

    /// Applies the wrist offsets to a tracked wrist pose
    pub fn apply_to_wrist(&self, wrist: &Pose) -> Pose {
        let rotation = wrist.rotation * self.rotation_offset();
        let position = wrist.position + rotation * self.position_offset();
        Pose::new(position, rotation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconstructionSettings {
    pub forward_offset: na::UnitQuaternion<f32>,
    pub safety_offset: f32,
}

impl Default for ReconstructionSettings {
    fn default() -> Self {
        Self {
            forward_offset: na::UnitQuaternion::identity(),
            safety_offset: DEFAULT_SAFETY_OFFSET,
        }
    }
}

/// Rotation whose local z axis is `forward` and whose y axis leans towards `upward`
fn look_rotation(
    forward: &na::Vector3<f32>,
    upward: &na::Vector3<f32>,
) -> na::UnitQuaternion<f32> {
    na::UnitQuaternion::face_towards(forward, upward)
}

/// First reference direction of a finger, rooted at its first tracked joint
fn seed_upward(
    wrist: &Pose,
    chirality: Chirality,
    finger: FingerType,
    root: &na::Vector3<f32>,
    s: f32,
) -> na::Vector3<f32> {
    let up = wrist.up();
    let right = wrist.right();
    let tip = if finger == FingerType::Thumb {
        // slightly raised wrist
        let up = match chirality {
            Chirality::Left => up,
            Chirality::Right => -up,
        };
        wrist.position - up * 2.0 * s
    } else {
        // slightly raised virtual metacarpal
        match chirality {
            Chirality::Left => root - up * 2.0 * s + right * 5.0 * s,
            Chirality::Right => root + up * 2.0 * s - right * 5.0 * s,
        }
    };
    tip - root
}

/// Writes positions and synthesized bone rotations for every finger of `target`.
///
/// `target` supplies the wrist and chirality used for seeding, `source` the joint
/// positions. Joints missing from `source` are skipped and the bone before them is
/// stretched to the next joint that has data, which is how the thumb's proximal bone
/// reaches its distal joint. Joints missing from `source` are cleared on `target`.
/// Tips get the identity rotation, and a joint sitting on top of the next one keeps
/// the rotation of the bone before it.
pub fn reconstruct_fingers(
    target: &mut Hand,
    source: &dyn HandData,
    settings: &ReconstructionSettings,
) {
    let wrist = target.wrist();
    let chirality = target.chirality();
    let s = settings.safety_offset;

    for &finger in FingerType::ALL.iter() {
        let mut this_joint: Option<(JointType, Pose)> = None;
        let mut upward: Option<na::Vector3<f32>> = None;
        let mut last_rotation = wrist.rotation * settings.forward_offset;

        for (j, &joint) in JointType::ALL.iter().enumerate() {
            let (slot, this) = match this_joint {
                Some(current) => current,
                None => match source.joint(finger, joint) {
                    Some(pose) => {
                        this_joint = Some((joint, pose));
                        (joint, pose)
                    }
                    None => {
                        target.clear_joint(finger, joint);
                        continue;
                    }
                },
            };
            let up_ref = *upward.get_or_insert_with(|| {
                seed_upward(&wrist, chirality, finger, &this.position, s)
            });

            let rotation = if j + 1 == JointType::ALL.len() {
                na::UnitQuaternion::identity()
            } else {
                let next = match source.joint(finger, JointType::ALL[j + 1]) {
                    Some(next) => next,
                    None => {
                        target.clear_joint(finger, JointType::ALL[j + 1]);
                        continue;
                    }
                };

                match (next.position - this.position).try_normalize(MIN_NORM) {
                    Some(forward) => {
                        let right = forward
                            .cross(&up_ref)
                            .try_normalize(MIN_NORM)
                            .or_else(|| forward.cross(&wrist.up()).try_normalize(MIN_NORM))
                            .unwrap_or_else(|| wrist.right());
                        let up = forward.cross(&right);

                        upward = Some(
                            (this.position - up.normalize() * 2.0 * s - next.position)
                                .try_normalize(MIN_NORM)
                                .unwrap_or(up),
                        );
                        last_rotation = look_rotation(&forward, &up) * settings.forward_offset;
                        last_rotation
                    }
                    // coincident joints, nothing to orient by
                    None => last_rotation,
                }
            };

            this_joint = None;
            target.set_joint(finger, slot, Pose::new(this.position, rotation));
        }
    }
}
