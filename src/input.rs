//! Local hand sources: optically tracked skeletons and controller-driven hands.

use crate::data::{ControllerMessage, HandMessage};
use crate::error::TrackingError;
use crate::hand::{wire_joints, Chirality, FingerType, Hand, HandData, JointType, Pose};
use log::*;
use nalgebra as na;

/// Controller trigger value above which a controller hand pinches
pub const DEFAULT_CONTROLLER_PINCH_THRESHOLD: f32 = 0.95;

/// Provides the current local hand for each side.
///
/// Returns `None` while a side has no tracking data, so an untracked hand is never
/// mistaken for a valid one.
pub trait InputData {
    fn hand(&self, chirality: Chirality) -> Option<&dyn HandData>;

    fn hand_count(&self) -> usize {
        Chirality::ALL
            .iter()
            .filter(|&&chirality| self.hand(chirality).is_some())
            .count()
    }
}

/// Open hand rest pose of the right hand, joint offsets from the wrist in the wrist frame.
/// x points to the thumb side, y out of the back of the hand and z along the fingers.
const RIGHT_REST: [[[f32; 3]; 5]; 5] = [
    // thumb, intermediate slot unused
    [
        [0.015, -0.007, 0.022],
        [0.030, -0.009, 0.038],
        [0.0, 0.0, 0.0],
        [0.041, -0.009, 0.060],
        [0.049, -0.007, 0.079],
    ],
    [
        [0.007, 0.0, 0.022],
        [0.015, 0.0, 0.068],
        [0.017, 0.0, 0.098],
        [0.017, 0.0, 0.116],
        [0.018, 0.0, 0.131],
    ],
    [
        [0.0, 0.0, 0.022],
        [0.0, 0.0, 0.069],
        [0.0, 0.0, 0.103],
        [0.0, 0.0, 0.124],
        [0.0, 0.0, 0.141],
    ],
    [
        [-0.007, 0.0, 0.021],
        [-0.013, 0.0, 0.064],
        [-0.015, 0.0, 0.095],
        [-0.016, 0.0, 0.114],
        [-0.017, 0.0, 0.130],
    ],
    [
        [-0.013, -0.002, 0.019],
        [-0.026, -0.003, 0.057],
        [-0.030, -0.003, 0.079],
        [-0.032, -0.003, 0.092],
        [-0.033, -0.003, 0.106],
    ],
];

/// Rest pose offset of a joint relative to the wrist, in the wrist frame.
///
/// The left hand mirrors the right across the wrist's x axis.
pub fn rest_offset(
    chirality: Chirality,
    finger: FingerType,
    joint: JointType,
) -> na::Vector3<f32> {
    let [x, y, z] = RIGHT_REST[finger.index()][joint.index()];
    match chirality {
        Chirality::Right => na::Vector3::new(x, y, z),
        Chirality::Left => na::Vector3::new(-x, y, z),
    }
}

/// Skeletal hands fed from tracking messages
#[derive(Debug, Clone)]
pub struct TrackingInput {
    left: Hand,
    right: Hand,
    pinch_distance: f32,
}

impl TrackingInput {
    pub fn new(pinch_distance: f32) -> Self {
        Self {
            left: Hand::new(Chirality::Left).with_pinch_distance(pinch_distance),
            right: Hand::new(Chirality::Right).with_pinch_distance(pinch_distance),
            pinch_distance,
        }
    }

    /// Replaces the hand on the message's side
    pub fn update(&mut self, message: HandMessage) -> Result<Chirality, TrackingError> {
        let hand = message.into_hand(self.pinch_distance)?;
        let chirality = hand.chirality();
        trace!("tracking update for {} hand, valid {}", chirality, hand.is_valid());
        match chirality {
            Chirality::Left => self.left = hand,
            Chirality::Right => self.right = hand,
        }
        Ok(chirality)
    }

    pub fn apply_message(&mut self, payload: &[u8]) -> Result<Chirality, TrackingError> {
        self.update(HandMessage::deserialize(payload)?)
    }

    /// Drops tracking on one side, for example when the source went quiet
    pub fn invalidate(&mut self, chirality: Chirality) {
        match chirality {
            Chirality::Left => self.left.set_valid(false),
            Chirality::Right => self.right.set_valid(false),
        }
    }
}

impl InputData for TrackingInput {
    fn hand(&self, chirality: Chirality) -> Option<&dyn HandData> {
        let hand = match chirality {
            Chirality::Left => &self.left,
            Chirality::Right => &self.right,
        };
        if hand.is_valid() {
            Some(hand)
        } else {
            None
        }
    }
}

/// Hand simulated from a tracked controller.
///
/// The fingers follow the rest pose and curl towards the palm with the grab value.
#[derive(Debug, Clone)]
pub struct ControllerHand {
    chirality: Chirality,
    tracked: bool,
    wrist: Pose,
    grab: f32,
    pinch_threshold: f32,
}

impl ControllerHand {
    pub fn new(chirality: Chirality) -> Self {
        Self {
            chirality,
            tracked: false,
            wrist: Pose::identity(),
            grab: 0.0,
            pinch_threshold: DEFAULT_CONTROLLER_PINCH_THRESHOLD,
        }
    }

    pub fn with_pinch_threshold(mut self, pinch_threshold: f32) -> Self {
        self.pinch_threshold = pinch_threshold;
        self
    }

    /// Feeds the latest controller state. `None` means the controller lost tracking.
    pub fn update(&mut self, wrist: Option<Pose>, grab: f32) {
        match wrist {
            Some(wrist) => {
                self.tracked = true;
                self.wrist = wrist;
            }
            None => self.tracked = false,
        }
        self.grab = grab.max(0.0).min(1.0);
    }

    pub fn grab(&self) -> f32 {
        self.grab
    }

    /// Snapshot as a skeletal hand, for sources that need owned joint data
    pub fn to_hand(&self) -> Hand {
        let mut hand = Hand::new(self.chirality);
        hand.set_valid(self.tracked);
        hand.set_wrist(self.wrist);
        hand.set_palm(self.palm());
        for (finger, joint) in wire_joints() {
            if let Some(pose) = self.joint(finger, joint) {
                hand.set_joint(finger, joint, pose);
            }
        }
        hand
    }

    fn curl(&self, finger: FingerType) -> na::UnitQuaternion<f32> {
        // the thumb folds across the palm less than the other fingers
        let max_angle = match finger {
            FingerType::Thumb => 45.0_f32,
            _ => 100.0_f32,
        };
        na::UnitQuaternion::from_axis_angle(
            &na::Vector3::x_axis(),
            max_angle.to_radians() * self.grab,
        )
    }
}

impl HandData for ControllerHand {
    fn chirality(&self) -> Chirality {
        self.chirality
    }

    fn is_valid(&self) -> bool {
        self.tracked
    }

    fn is_pinching(&self) -> bool {
        self.tracked && self.grab > self.pinch_threshold
    }

    fn wrist(&self) -> Pose {
        self.wrist
    }

    fn palm(&self) -> Pose {
        let middle = rest_offset(self.chirality, FingerType::Middle, JointType::Metacarpal);
        Pose::new(self.wrist.position + self.wrist.rotation * middle, self.wrist.rotation)
    }

    fn joint(&self, finger: FingerType, joint: JointType) -> Option<Pose> {
        if !crate::hand::joint_exists(finger, joint) {
            return None;
        }
        let base = rest_offset(self.chirality, finger, JointType::Metacarpal);
        let local = if joint == JointType::Metacarpal {
            base
        } else {
            base + self.curl(finger) * (rest_offset(self.chirality, finger, joint) - base)
        };
        Some(Pose::at(self.wrist.position + self.wrist.rotation * local))
    }
}

/// Two controller hands
#[derive(Debug, Clone)]
pub struct ControllerInput {
    pub left: ControllerHand,
    pub right: ControllerHand,
}

impl ControllerInput {
    pub fn new(pinch_threshold: f32) -> Self {
        Self {
            left: ControllerHand::new(Chirality::Left).with_pinch_threshold(pinch_threshold),
            right: ControllerHand::new(Chirality::Right).with_pinch_threshold(pinch_threshold),
        }
    }
}

impl ControllerInput {
    pub fn update(&mut self, message: &ControllerMessage) -> Result<Chirality, TrackingError> {
        let wrist = message.wrist()?;
        let hand = match message.chirality {
            Chirality::Left => &mut self.left,
            Chirality::Right => &mut self.right,
        };
        hand.update(wrist, message.grab);
        Ok(message.chirality)
    }

    pub fn apply_message(&mut self, payload: &[u8]) -> Result<Chirality, TrackingError> {
        self.update(&ControllerMessage::deserialize(payload)?)
    }
}

impl InputData for ControllerInput {
    fn hand(&self, chirality: Chirality) -> Option<&dyn HandData> {
        let hand = match chirality {
            Chirality::Left => &self.left,
            Chirality::Right => &self.right,
        };
        if hand.is_valid() {
            Some(hand)
        } else {
            None
        }
    }
}

/// Kind of source currently driving the local hands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    /// Optically tracked skeletons
    Tracking,
    /// Hands simulated from controllers
    Controllers,
}

/// Switches between hand sources, tracked hands first and controllers as fallback.
///
/// The choice is made per call from which source has any hand at all, so putting a
/// controller down and raising a tracked hand switches over on the next tick.
#[derive(Debug, Clone)]
pub struct InputSelector {
    pub tracking: TrackingInput,
    pub controllers: ControllerInput,
}

impl InputSelector {
    pub fn new(tracking: TrackingInput, controllers: ControllerInput) -> Self {
        Self {
            tracking,
            controllers,
        }
    }

    pub fn input_type(&self) -> Option<InputType> {
        if self.tracking.hand_count() > 0 {
            Some(InputType::Tracking)
        } else if self.controllers.hand_count() > 0 {
            Some(InputType::Controllers)
        } else {
            None
        }
    }
}

impl InputData for InputSelector {
    fn hand(&self, chirality: Chirality) -> Option<&dyn HandData> {
        match self.input_type()? {
            InputType::Tracking => self.tracking.hand(chirality),
            InputType::Controllers => self.controllers.hand(chirality),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PoseMessage, Quaternion, Vector};

    fn message(chirality: Chirality, tracked: bool) -> HandMessage {
        HandMessage {
            chirality,
            tracked,
            wrist: PoseMessage {
                position: Vector { x: 0.0, y: 1.2, z: 0.0 },
                rotation: Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 },
            },
            palm: None,
            joints: vec![],
        }
    }

    #[test]
    fn tracking_input_reports_valid_hands_only() {
        let mut input = TrackingInput::new(0.03);
        assert_eq!(input.hand_count(), 0);

        input.update(message(Chirality::Right, true)).unwrap();
        assert!(input.hand(Chirality::Right).is_some());
        assert!(input.hand(Chirality::Left).is_none());
        assert_eq!(input.hand_count(), 1);

        input.update(message(Chirality::Right, false)).unwrap();
        assert!(input.hand(Chirality::Right).is_none());

        input.update(message(Chirality::Left, true)).unwrap();
        input.invalidate(Chirality::Left);
        assert_eq!(input.hand_count(), 0);
    }

    #[test]
    fn malformed_payload_keeps_previous_state() {
        let mut input = TrackingInput::new(0.03);
        input.update(message(Chirality::Left, true)).unwrap();
        assert!(input.apply_message(b"not json").is_err());
        assert!(input.hand(Chirality::Left).is_some());
    }

    #[test]
    fn rest_pose_mirrors() {
        let right = rest_offset(Chirality::Right, FingerType::Index, JointType::Tip);
        let left = rest_offset(Chirality::Left, FingerType::Index, JointType::Tip);
        assert_eq!(left, na::Vector3::new(-right.x, right.y, right.z));
        // every offset fits the compressed frame range
        for &chirality in Chirality::ALL.iter() {
            for (finger, joint) in wire_joints() {
                assert!(rest_offset(chirality, finger, joint).amax() < 0.15);
            }
        }
    }

    #[test]
    fn controller_hand_follows_wrist() {
        let mut hand = ControllerHand::new(Chirality::Right);
        assert!(!hand.is_valid());
        assert!(hand.to_hand().wrist() == Pose::identity());

        let wrist = Pose::at(na::Vector3::new(1.0, 1.0, 1.0));
        hand.update(Some(wrist), 0.0);
        assert!(hand.is_valid());
        let tip = hand.joint(FingerType::Middle, JointType::Tip).unwrap();
        let expected =
            wrist.position + rest_offset(Chirality::Right, FingerType::Middle, JointType::Tip);
        assert!((tip.position - expected).norm() < 1e-6);
        assert!(hand.joint(FingerType::Thumb, JointType::Intermediate).is_none());

        hand.update(None, 0.0);
        assert!(!hand.is_valid());
        assert!(!hand.to_hand().is_valid());
    }

    #[test]
    fn grabbing_curls_and_pinches() {
        let mut hand = ControllerHand::new(Chirality::Left);
        hand.update(Some(Pose::identity()), 0.0);
        let open = hand.joint(FingerType::Index, JointType::Tip).unwrap().position;
        assert!(!hand.is_pinching());

        hand.update(Some(Pose::identity()), 1.0);
        let closed = hand.joint(FingerType::Index, JointType::Tip).unwrap().position;
        assert!(closed.z < open.z);
        assert!(hand.is_pinching());

        // metacarpals don't move
        let meta = hand.joint(FingerType::Index, JointType::Metacarpal).unwrap().position;
        assert_eq!(meta, rest_offset(Chirality::Left, FingerType::Index, JointType::Metacarpal));

        hand.update(Some(Pose::identity()), 7.0);
        assert_eq!(hand.grab(), 1.0);
    }

    #[test]
    fn controller_input_hides_untracked() {
        let mut input = ControllerInput::new(0.95);
        input.left.update(Some(Pose::identity()), 0.5);
        assert!(input.hand(Chirality::Left).is_some());
        assert!(input.hand(Chirality::Right).is_none());
    }

    #[test]
    fn controller_messages_drive_controller_hands() {
        let mut input = ControllerInput::new(0.95);
        let message = ControllerMessage {
            chirality: Chirality::Right,
            tracked: true,
            pose: PoseMessage::from(&Pose::at(na::Vector3::new(0.1, 1.0, 0.2))),
            grab: 1.0,
        };
        let payload = message.to_json().unwrap();
        assert_eq!(input.apply_message(&payload).unwrap(), Chirality::Right);
        assert!(input.hand(Chirality::Right).unwrap().is_pinching());
        assert!(input.hand(Chirality::Left).is_none());
    }

    #[test]
    fn selector_prefers_tracked_hands() {
        let mut selector = InputSelector::new(TrackingInput::new(0.03), ControllerInput::new(0.95));
        assert_eq!(selector.input_type(), None);
        assert_eq!(selector.hand_count(), 0);

        selector.controllers.left.update(Some(Pose::identity()), 0.0);
        selector.controllers.right.update(Some(Pose::identity()), 0.0);
        assert_eq!(selector.input_type(), Some(InputType::Controllers));
        assert_eq!(selector.hand_count(), 2);

        // one tracked hand takes over both sides
        selector.tracking.update(message(Chirality::Right, true)).unwrap();
        assert_eq!(selector.input_type(), Some(InputType::Tracking));
        assert_eq!(selector.hand_count(), 1);
        assert_eq!(
            selector.hand(Chirality::Right).unwrap().wrist().position,
            na::Vector3::new(0.0, 1.2, 0.0)
        );
        assert!(selector.hand(Chirality::Left).is_none());

        selector.tracking.invalidate(Chirality::Right);
        assert_eq!(selector.input_type(), Some(InputType::Controllers));
    }
}
