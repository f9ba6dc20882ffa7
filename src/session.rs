//! Per tick driver tying input, avatars and the frame channel together.

use crate::avatar::AvatarHand;
use crate::config::HandSyncConfig;
use crate::hand::{Chirality, DEFAULT_PINCH_DISTANCE};
use crate::input::InputData;
use crate::reconstruction::Calibration;
use crate::transport::{
    receive_frame, send_frame, FrameChannel, HandKey, PeerId, ReceiveOutcome, RetryPolicy,
};
use log::*;
use std::collections::{BTreeMap, VecDeque};

/// Ticks without any frame before a remote hand is dropped
pub const DEFAULT_REMOTE_TIMEOUT_TICKS: u32 = 100;

/// State changes collected during a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandEvent {
    /// First frame seen from this hand
    Joined(HandKey),
    Shown(HandKey),
    Hidden(HandKey),
    Dropped { key: HandKey, attempts: usize },
    /// The hand went quiet and was removed
    Left(HandKey),
    /// A local hand started pinching
    Pinched(Chirality),
}

struct RemoteHand {
    avatar: AvatarHand,
    idle_ticks: u32,
}

/// One peer's view of the shared hands.
///
/// Owns the frame channel. Local hands are published every tick, every remote hand
/// that has sent anything gets exactly one receive per tick.
pub struct HandSync<C: FrameChannel> {
    channel: C,
    local: PeerId,
    local_hands: [AvatarHand; 2],
    remote_hands: BTreeMap<HandKey, RemoteHand>,
    calibration: Calibration,
    safety_offset: f32,
    pinch_distance: f32,
    retry: RetryPolicy,
    remote_timeout: u32,
    pinching: [bool; 2],
    events: VecDeque<HandEvent>,
}

impl<C: FrameChannel> HandSync<C> {
    pub fn new(
        channel: C,
        local: PeerId,
        calibration: Calibration,
        safety_offset: f32,
        retry: RetryPolicy,
    ) -> Self {
        let local_hands = [
            AvatarHand::new(Chirality::Left, &calibration, safety_offset),
            AvatarHand::new(Chirality::Right, &calibration, safety_offset),
        ];
        Self {
            channel,
            local,
            local_hands,
            remote_hands: BTreeMap::new(),
            calibration,
            safety_offset,
            pinch_distance: DEFAULT_PINCH_DISTANCE,
            retry,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT_TICKS,
            pinching: [false; 2],
            events: VecDeque::new(),
        }
    }

    pub fn from_config(channel: C, config: &HandSyncConfig) -> Self {
        Self::new(
            channel,
            config.peer_id.clone(),
            config.calibration,
            config.safety_offset,
            config.retry.policy(),
        )
        .with_pinch_distance(config.pinch_distance)
        .with_remote_timeout(config.remote_timeout_ticks)
    }

    /// Pinch distance of every avatar hand, local and remote
    pub fn with_pinch_distance(mut self, pinch_distance: f32) -> Self {
        self.pinch_distance = pinch_distance;
        for avatar in self.local_hands.iter_mut() {
            avatar.set_pinch_distance(pinch_distance);
        }
        for remote in self.remote_hands.values_mut() {
            remote.avatar.set_pinch_distance(pinch_distance);
        }
        self
    }

    /// Remote hands are removed after this many ticks without a frame
    pub fn with_remote_timeout(mut self, ticks: u32) -> Self {
        self.remote_timeout = ticks.max(1);
        self
    }

    pub fn tick(&mut self, input: &dyn InputData) {
        self.channel.poll();

        for (index, &chirality) in Chirality::ALL.iter().enumerate() {
            let source = input.hand(chirality);

            let pinching = source.map(|hand| hand.is_pinching()).unwrap_or(false);
            if pinching && !self.pinching[index] {
                self.events.push_back(HandEvent::Pinched(chirality));
            }
            self.pinching[index] = pinching;

            let avatar = &mut self.local_hands[index];
            match source {
                Some(source) => avatar.sync_from(source),
                None => avatar.hide(),
            }
            let key = HandKey::new(self.local.clone(), chirality);
            if let Err(e) = send_frame(&mut self.channel, &key, avatar) {
                warn!("failed to publish {}: {}", key, e);
            }
        }

        for key in self.channel.remote_keys() {
            if key.peer == self.local {
                continue;
            }
            self.receive_remote(key);
        }
    }

    fn receive_remote(&mut self, key: HandKey) {
        let calibration = &self.calibration;
        let safety_offset = self.safety_offset;
        let pinch_distance = self.pinch_distance;
        let events = &mut self.events;
        let remote = self.remote_hands.entry(key.clone()).or_insert_with(|| {
            debug!("new remote hand {}", key);
            events.push_back(HandEvent::Joined(key.clone()));
            let mut avatar = AvatarHand::new(key.chirality, calibration, safety_offset);
            avatar.set_pinch_distance(pinch_distance);
            RemoteHand {
                avatar,
                idle_ticks: 0,
            }
        });

        let was_valid = remote.avatar.is_valid();
        let outcome = receive_frame(&mut self.channel, &key, &mut remote.avatar, &self.retry);
        if outcome == ReceiveOutcome::Idle {
            remote.idle_ticks += 1;
        } else {
            remote.idle_ticks = 0;
        }

        if remote.idle_ticks >= self.remote_timeout {
            info!("{} timed out", key);
            self.remote_hands.remove(&key);
            self.channel.forget(&key);
            self.events.push_back(HandEvent::Left(key));
            return;
        }

        match outcome {
            ReceiveOutcome::Applied if !was_valid => {
                self.events.push_back(HandEvent::Shown(key));
            }
            ReceiveOutcome::Hidden if was_valid => {
                self.events.push_back(HandEvent::Hidden(key));
            }
            ReceiveOutcome::Dropped { attempts } => {
                self.events.push_back(HandEvent::Dropped { key, attempts });
            }
            _ => {}
        }
    }

    /// Events queued since the last call, oldest first
    pub fn drain_events(&mut self) -> Vec<HandEvent> {
        self.events.drain(..).collect()
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    pub fn local_hand(&self, chirality: Chirality) -> &AvatarHand {
        match chirality {
            Chirality::Left => &self.local_hands[0],
            Chirality::Right => &self.local_hands[1],
        }
    }

    pub fn remote_hand(&self, key: &HandKey) -> Option<&AvatarHand> {
        self.remote_hands.get(key).map(|remote| &remote.avatar)
    }

    pub fn remote_hands(&self) -> impl Iterator<Item = (&HandKey, &AvatarHand)> {
        self.remote_hands
            .iter()
            .map(|(key, remote)| (key, &remote.avatar))
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }
}
