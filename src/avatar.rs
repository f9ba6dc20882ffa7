//! Network-synced hand model.
//!
//! The owning peer drives an avatar hand from local input and serializes it every
//! tick. Every other peer drives its copy from received frames. Both paths end in
//! the same finger reconstruction.

use crate::error::FrameError;
use crate::frame::{self, Frame};
use crate::hand::{Chirality, Hand, HandData};
use crate::reconstruction::{reconstruct_fingers, Calibration, ReconstructionSettings};

/// What a received frame did to the avatar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Shown,
    Hidden,
}

#[derive(Debug, Clone)]
pub struct AvatarHand {
    hand: Hand,
    calibration: Calibration,
    settings: ReconstructionSettings,
}

impl AvatarHand {
    /// `calibration` is authored for the left hand and mirrored for right avatars
    pub fn new(chirality: Chirality, calibration: &Calibration, safety_offset: f32) -> Self {
        let calibration = calibration.for_chirality(chirality);
        let mut hand = Hand::new(chirality);
        hand.hide();
        Self {
            hand,
            settings: ReconstructionSettings {
                forward_offset: calibration.forward_offset(),
                safety_offset,
            },
            calibration,
        }
    }

    pub fn hand(&self) -> &Hand {
        &self.hand
    }

    pub fn chirality(&self) -> Chirality {
        self.hand.chirality()
    }

    pub fn is_valid(&self) -> bool {
        self.hand.is_valid()
    }

    pub fn hide(&mut self) {
        self.hand.hide();
    }

    pub fn set_pinch_distance(&mut self, pinch_distance: f32) {
        self.hand.set_pinch_distance(pinch_distance);
    }

    /// Owner path: follow the local hand source
    pub fn sync_from(&mut self, data: &dyn HandData) {
        if !data.is_valid() {
            self.hide();
            return;
        }

        self.hand.set_wrist(self.calibration.apply_to_wrist(&data.wrist()));
        self.hand.set_palm(data.palm());
        reconstruct_fingers(&mut self.hand, data, &self.settings);
        self.hand.set_valid(true);
    }

    /// Frame for this tick, empty while hidden
    pub fn encode(&self) -> Vec<u8> {
        frame::serialize(&self.hand)
    }

    /// Remote path: follow a received frame.
    ///
    /// A frame that fails to decode leaves the avatar as it was.
    pub fn apply_frame(&mut self, bytes: &[u8]) -> Result<FrameOutcome, FrameError> {
        match frame::deserialize(bytes, self.chirality())? {
            Frame::Hidden => {
                self.hide();
                Ok(FrameOutcome::Hidden)
            }
            Frame::Pose(data) => {
                // the sender already applied its calibration to the wrist
                self.hand.set_wrist(data.wrist());
                reconstruct_fingers(&mut self.hand, &data, &self.settings);
                self.hand.set_valid(true);
                Ok(FrameOutcome::Shown)
            }
        }
    }
}
