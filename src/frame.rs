//! Wire format for one hand's pose in one network tick.
//!
//! An empty frame means the hand is not visible. A full frame is exactly
//! [`FRAME_LEN`] bytes:
//!
//! | offset | size | field                                           |
//! |--------|------|-------------------------------------------------|
//! | 0      | 12   | wrist position, 3 × f32 LE                      |
//! | 12     | 4    | wrist rotation, smallest-three packed           |
//! | 16     | 72   | 24 compressed joint offsets relative to wrist   |
//!
//! Joints follow [`wire_joints`] order. The thumb has no intermediate joint, so
//! thumb offsets are (metacarpal, proximal, distal, tip) and every other finger
//! sends all five.
//!
//! Joint rotations are not sent. Receivers rebuild them from positions, see
//! [`crate::reconstruction`].

use crate::codec::{quaternion, vector};
use crate::error::FrameError;
use crate::hand::{wire_joints, Chirality, Hand, HandData, Pose};
use log::trace;
use nalgebra as na;

pub const WIRE_JOINT_COUNT: usize = 24;
pub const FRAME_LEN: usize =
    vector::EXACT_LEN + quaternion::ENCODED_LEN + WIRE_JOINT_COUNT * vector::COMPRESSED_LEN;

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// The sender's hand is untracked
    Hidden,
    /// Absolute joint positions with identity placeholder rotations
    Pose(Hand),
}

/// Writes a frame for the given hand. Invalid hands produce the empty sentinel frame.
pub fn serialize(hand: &dyn HandData) -> Vec<u8> {
    if !hand.is_valid() {
        return Vec::new();
    }

    let wrist = hand.wrist();
    let mut bytes = Vec::with_capacity(FRAME_LEN);
    bytes.extend_from_slice(&vector::encode_exact(&wrist.position));
    bytes.extend_from_slice(&quaternion::encode(&wrist.rotation));

    for (finger, joint) in wire_joints() {
        // a joint the source lost this tick collapses onto the wrist
        let offset = hand
            .joint(finger, joint)
            .map(|pose| pose.position - wrist.position)
            .unwrap_or_else(na::Vector3::zeros);
        bytes.extend_from_slice(&vector::encode_compressed(&offset));
    }

    debug_assert_eq!(bytes.len(), FRAME_LEN);
    bytes
}

/// Consumes a frame front to back
struct FrameReader<'a> {
    bytes: &'a [u8],
}

impl<'a> FrameReader<'a> {
    fn segment(&mut self, len: usize) -> &'a [u8] {
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        head
    }
}

pub fn deserialize(bytes: &[u8], chirality: Chirality) -> Result<Frame, FrameError> {
    if bytes.is_empty() {
        return Ok(Frame::Hidden);
    }
    if bytes.len() != FRAME_LEN {
        return Err(FrameError::InvalidLength {
            len: bytes.len(),
            expected: FRAME_LEN,
        });
    }

    let mut reader = FrameReader { bytes };
    let wrist_position = vector::decode(reader.segment(vector::EXACT_LEN))?;
    let mut rotation = [0; quaternion::ENCODED_LEN];
    rotation.copy_from_slice(reader.segment(quaternion::ENCODED_LEN));
    let wrist_rotation = quaternion::decode(rotation);

    let mut hand = Hand::new(chirality);
    hand.set_wrist(Pose::new(wrist_position, wrist_rotation));

    let mut consumed = 0;
    for (finger, joint) in wire_joints() {
        let offset = vector::decode(reader.segment(vector::COMPRESSED_LEN))?;
        hand.set_joint(finger, joint, Pose::at(wrist_position + offset));
        consumed += 1;
    }
    trace!("decoded {} hand frame with {} joints", chirality, consumed);

    hand.set_valid(true);
    Ok(Frame::Pose(hand))
}

/// Decodes straight into an existing hand, hiding it on the empty sentinel frame.
///
/// On error the target is left untouched.
pub fn decode_into(bytes: &[u8], target: &mut Hand) -> Result<(), FrameError> {
    match deserialize(bytes, target.chirality())? {
        Frame::Hidden => target.hide(),
        Frame::Pose(hand) => *target = hand.with_pinch_distance(target.pinch_distance()),
    }
    Ok(())
}
