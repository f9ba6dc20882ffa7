//! Moving hand frames between peers.
//!
//! Frames are fire-and-forget: nothing is acknowledged or resent, a lost frame is
//! simply superseded by the next tick's. Receiving tolerates corrupt frames by
//! retrying with the next buffered one a bounded number of times, and gives up for
//! the tick otherwise. Neither direction blocks.

use crate::avatar::{AvatarHand, FrameOutcome};
use crate::error::TransportError;
use crate::hand::Chirality;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one hand of one peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandKey {
    pub peer: PeerId,
    pub chirality: Chirality,
}

impl HandKey {
    pub fn new(peer: PeerId, chirality: Chirality) -> Self {
        Self { peer, chirality }
    }

    pub fn topic(&self, prefix: &str) -> String {
        format!("{}/{}/{}", prefix, self.peer, self.chirality)
    }

    /// Parses `{prefix}/{peer}/{left|right}`
    pub fn from_topic(prefix: &str, topic: &str) -> Option<Self> {
        let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
        let mut parts = rest.split('/');
        let peer = parts.next().filter(|peer| !peer.is_empty())?;
        let chirality = match parts.next()? {
            "left" => Chirality::Left,
            "right" => Chirality::Right,
            _ => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(PeerId(peer.to_owned()), chirality))
    }
}

impl fmt::Display for HandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.peer, self.chirality)
    }
}

/// Unreliable point-to-multipoint frame channel
pub trait FrameChannel {
    /// Sends a frame to every other peer. Returns once the frame is handed off.
    fn publish(&mut self, key: &HandKey, frame: &[u8]) -> Result<(), TransportError>;

    /// Moves whatever arrived since the last call into the per-hand buffers
    fn poll(&mut self);

    /// Frames currently buffered for `key`
    fn pending(&self, key: &HandKey) -> usize;

    /// Newest buffered frame for `key`
    fn receive(&mut self, key: &HandKey) -> Option<Vec<u8>>;

    /// Drops whatever is still buffered for `key`, returns how many frames went
    fn discard(&mut self, key: &HandKey) -> usize;

    /// Stops tracking `key` until it sends again
    fn forget(&mut self, key: &HandKey);

    /// Remote hands that have sent at least one frame
    fn remote_keys(&self) -> Vec<HandKey>;
}

/// Bounded per-hand frame queues shared by channel implementations
#[derive(Debug, Clone)]
pub struct FrameBuffers {
    queues: BTreeMap<HandKey, VecDeque<Vec<u8>>>,
    capacity: usize,
}

impl FrameBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Queues a frame, dropping the oldest one when full
    pub fn push(&mut self, key: HandKey, frame: Vec<u8>) {
        let capacity = self.capacity;
        let queue = self.queues.entry(key).or_insert_with(VecDeque::new);
        while queue.len() >= capacity {
            queue.pop_front();
        }
        queue.push_back(frame);
    }

    pub fn pending(&self, key: &HandKey) -> usize {
        self.queues.get(key).map(VecDeque::len).unwrap_or(0)
    }

    /// Takes the most recent frame
    pub fn pop(&mut self, key: &HandKey) -> Option<Vec<u8>> {
        self.queues.get_mut(key)?.pop_back()
    }

    pub fn clear(&mut self, key: &HandKey) -> usize {
        match self.queues.get_mut(key) {
            Some(queue) => {
                let stale = queue.len();
                queue.clear();
                stale
            }
            None => 0,
        }
    }

    pub fn remove(&mut self, key: &HandKey) {
        self.queues.remove(key);
    }

    pub fn keys(&self) -> Vec<HandKey> {
        self.queues.keys().cloned().collect()
    }
}

/// In-process channel, every published frame is delivered to every other peer
/// attached to the same loopback
#[derive(Debug, Clone)]
pub struct LoopbackChannel {
    local: PeerId,
    outbox: Vec<(HandKey, Vec<u8>)>,
    buffers: FrameBuffers,
}

impl LoopbackChannel {
    pub fn new(local: PeerId, capacity: usize) -> Self {
        Self {
            local,
            outbox: Vec::new(),
            buffers: FrameBuffers::new(capacity),
        }
    }

    /// Frames published since the last call
    pub fn take_outbox(&mut self) -> Vec<(HandKey, Vec<u8>)> {
        std::mem::take(&mut self.outbox)
    }

    /// Delivers a frame as if it came from the network
    pub fn deliver(&mut self, key: HandKey, frame: Vec<u8>) {
        if key.peer == self.local {
            return;
        }
        self.buffers.push(key, frame);
    }

    /// Moves every frame `from` published into `to`
    pub fn forward(from: &mut LoopbackChannel, to: &mut LoopbackChannel) {
        for (key, frame) in from.take_outbox() {
            to.deliver(key, frame);
        }
    }
}

impl FrameChannel for LoopbackChannel {
    fn publish(&mut self, key: &HandKey, frame: &[u8]) -> Result<(), TransportError> {
        self.outbox.push((key.clone(), frame.to_vec()));
        Ok(())
    }

    fn poll(&mut self) {}

    fn pending(&self, key: &HandKey) -> usize {
        self.buffers.pending(key)
    }

    fn receive(&mut self, key: &HandKey) -> Option<Vec<u8>> {
        self.buffers.pop(key)
    }

    fn discard(&mut self, key: &HandKey) -> usize {
        self.buffers.clear(key)
    }

    fn forget(&mut self, key: &HandKey) {
        self.buffers.remove(key)
    }

    fn remote_keys(&self) -> Vec<HandKey> {
        self.buffers.keys()
    }
}

/// How many extra receive attempts a corrupt frame earns within one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// One retry per frame buffered when the receive started, capped
    QueueDepth { cap: usize },
    /// A fixed number of retries regardless of backlog
    Fixed(usize),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::QueueDepth { cap: 8 }
    }
}

impl RetryPolicy {
    pub fn bound(&self, pending: usize) -> usize {
        match *self {
            RetryPolicy::QueueDepth { cap } => pending.min(cap),
            RetryPolicy::Fixed(retries) => retries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A pose frame was applied
    Applied,
    /// The sender's hand went away
    Hidden,
    /// Nothing arrived for this hand
    Idle,
    /// Every attempt failed, the previous pose stays
    Dropped { attempts: usize },
}

/// Owner side of one tick: serialize and publish once
pub fn send_frame<C: FrameChannel + ?Sized>(
    channel: &mut C,
    key: &HandKey,
    avatar: &AvatarHand,
) -> Result<(), TransportError> {
    let frame = avatar.encode();
    trace!("publishing {} byte frame for {}", frame.len(), key);
    channel.publish(key, &frame)
}

/// Receiver side of one tick: apply at most one frame for `key`.
///
/// The newest frame wins. Older frames are only tried when a newer one fails to
/// decode, and whatever is left afterwards is thrown away, so a receiver that fell
/// behind catches up on the next tick.
pub fn receive_frame<C: FrameChannel + ?Sized>(
    channel: &mut C,
    key: &HandKey,
    avatar: &mut AvatarHand,
    policy: &RetryPolicy,
) -> ReceiveOutcome {
    let outcome = apply_newest(channel, key, avatar, policy);
    let stale = channel.discard(key);
    if stale > 0 {
        trace!("discarded {} stale frames for {}", stale, key);
    }
    outcome
}

fn apply_newest<C: FrameChannel + ?Sized>(
    channel: &mut C,
    key: &HandKey,
    avatar: &mut AvatarHand,
    policy: &RetryPolicy,
) -> ReceiveOutcome {
    let retries = policy.bound(channel.pending(key));
    let mut attempts = 0;

    loop {
        let frame = match channel.receive(key) {
            Some(frame) => frame,
            None if attempts == 0 => return ReceiveOutcome::Idle,
            None => break,
        };
        attempts += 1;

        match avatar.apply_frame(&frame) {
            Ok(FrameOutcome::Shown) => return ReceiveOutcome::Applied,
            Ok(FrameOutcome::Hidden) => return ReceiveOutcome::Hidden,
            Err(e) => {
                debug!("attempt {} for {} failed: {}", attempts, key, e);
                if attempts > retries {
                    break;
                }
            }
        }
    }

    warn!("dropped frame for {} after {} attempts", key, attempts);
    ReceiveOutcome::Dropped { attempts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::{HandData, Pose};
    use crate::input::ControllerHand;
    use nalgebra as na;
    use crate::reconstruction::{Calibration, DEFAULT_SAFETY_OFFSET};

    fn key(peer: &str, chirality: Chirality) -> HandKey {
        HandKey::new(PeerId(peer.to_owned()), chirality)
    }

    fn avatar(chirality: Chirality) -> AvatarHand {
        AvatarHand::new(chirality, &Calibration::default(), DEFAULT_SAFETY_OFFSET)
    }

    fn tracked_avatar(chirality: Chirality) -> AvatarHand {
        let mut source = ControllerHand::new(chirality);
        source.update(Some(Pose::identity()), 0.2);
        let mut avatar = avatar(chirality);
        avatar.sync_from(&source);
        avatar
    }

    #[test]
    fn topic_round_trip() {
        let key = key("alice", Chirality::Left);
        assert_eq!(key.topic("hands"), "hands/alice/left");
        assert_eq!(HandKey::from_topic("hands", "hands/alice/left"), Some(key));
        assert_eq!(HandKey::from_topic("hands", "hands/alice/middle"), None);
        assert_eq!(HandKey::from_topic("hands", "hands//left"), None);
        assert_eq!(HandKey::from_topic("hands", "hands/alice/left/extra"), None);
        assert_eq!(HandKey::from_topic("hands", "tracking/hand"), None);
        assert_eq!(HandKey::from_topic("hands", "handsalice/left"), None);
    }

    #[test]
    fn buffers_drop_oldest() {
        let mut buffers = FrameBuffers::new(2);
        let k = key("bob", Chirality::Right);
        buffers.push(k.clone(), vec![1]);
        buffers.push(k.clone(), vec![2]);
        buffers.push(k.clone(), vec![3]);
        assert_eq!(buffers.pending(&k), 2);
        assert_eq!(buffers.pop(&k), Some(vec![3]));
        assert_eq!(buffers.pop(&k), Some(vec![2]));
        assert_eq!(buffers.pop(&k), None);
        assert_eq!(buffers.keys(), vec![k.clone()]);

        buffers.push(k.clone(), vec![4]);
        assert_eq!(buffers.clear(&k), 1);
        buffers.remove(&k);
        assert!(buffers.keys().is_empty());
    }

    #[test]
    fn loopback_ignores_own_frames() {
        let mut channel = LoopbackChannel::new(PeerId("me".to_owned()), 4);
        channel.deliver(key("me", Chirality::Left), vec![]);
        assert!(channel.remote_keys().is_empty());
        channel.deliver(key("you", Chirality::Left), vec![]);
        assert_eq!(channel.remote_keys(), vec![key("you", Chirality::Left)]);
    }

    #[test]
    fn policy_bounds() {
        assert_eq!(RetryPolicy::QueueDepth { cap: 8 }.bound(3), 3);
        assert_eq!(RetryPolicy::QueueDepth { cap: 8 }.bound(30), 8);
        assert_eq!(RetryPolicy::Fixed(2).bound(30), 2);
    }

    #[test]
    fn send_then_receive() {
        let mut alice = LoopbackChannel::new(PeerId("alice".to_owned()), 4);
        let mut bob = LoopbackChannel::new(PeerId("bob".to_owned()), 4);
        let k = key("alice", Chirality::Right);

        send_frame(&mut alice, &k, &tracked_avatar(Chirality::Right)).unwrap();
        LoopbackChannel::forward(&mut alice, &mut bob);

        let mut remote = avatar(Chirality::Right);
        let policy = RetryPolicy::default();
        assert_eq!(receive_frame(&mut bob, &k, &mut remote, &policy), ReceiveOutcome::Applied);
        assert!(remote.is_valid());
        assert_eq!(receive_frame(&mut bob, &k, &mut remote, &policy), ReceiveOutcome::Idle);
        assert!(remote.is_valid());

        send_frame(&mut alice, &k, &avatar(Chirality::Right)).unwrap();
        LoopbackChannel::forward(&mut alice, &mut bob);
        assert_eq!(receive_frame(&mut bob, &k, &mut remote, &policy), ReceiveOutcome::Hidden);
        assert!(!remote.is_valid());
    }

    #[test]
    fn corrupt_newest_falls_back_to_older() {
        let mut channel = LoopbackChannel::new(PeerId("bob".to_owned()), 8);
        let k = key("alice", Chirality::Left);
        channel.deliver(k.clone(), tracked_avatar(Chirality::Left).encode());
        channel.deliver(k.clone(), vec![0; 40]);

        let mut remote = avatar(Chirality::Left);
        let outcome = receive_frame(&mut channel, &k, &mut remote, &RetryPolicy::default());
        assert_eq!(outcome, ReceiveOutcome::Applied);
        assert!(remote.is_valid());
        assert_eq!(channel.pending(&k), 0);
    }

    #[test]
    fn all_corrupt_is_dropped_without_panic() {
        let mut channel = LoopbackChannel::new(PeerId("bob".to_owned()), 8);
        let k = key("alice", Chirality::Left);
        for len in &[1, 5, 72] {
            channel.deliver(k.clone(), vec![0xFF; *len]);
        }

        let mut remote = tracked_avatar(Chirality::Left);
        let before = remote.hand().clone();
        let outcome = receive_frame(&mut channel, &k, &mut remote, &RetryPolicy::default());
        assert_eq!(outcome, ReceiveOutcome::Dropped { attempts: 3 });
        assert_eq!(remote.hand(), &before);
    }

    #[test]
    fn fixed_policy_limits_attempts() {
        let mut channel = LoopbackChannel::new(PeerId("bob".to_owned()), 8);
        let k = key("alice", Chirality::Right);
        for _ in 0..5 {
            channel.deliver(k.clone(), vec![7; 9]);
        }

        let mut remote = avatar(Chirality::Right);
        let outcome = receive_frame(&mut channel, &k, &mut remote, &RetryPolicy::Fixed(1));
        assert_eq!(outcome, ReceiveOutcome::Dropped { attempts: 2 });
        assert_eq!(channel.pending(&k), 0);
    }

    fn avatar_at(chirality: Chirality, x: f32) -> AvatarHand {
        let mut source = ControllerHand::new(chirality);
        source.update(Some(Pose::at(na::Vector3::new(x, 1.0, 0.0))), 0.0);
        let mut avatar = avatar(chirality);
        avatar.sync_from(&source);
        avatar
    }

    #[test]
    fn receiver_catches_up_after_burst() {
        let mut alice = LoopbackChannel::new(PeerId("alice".to_owned()), 4);
        let mut bob = LoopbackChannel::new(PeerId("bob".to_owned()), 4);
        let k = key("alice", Chirality::Right);
        let mut remote = avatar(Chirality::Right);
        let policy = RetryPolicy::default();

        // two frames land in the same receive tick
        send_frame(&mut alice, &k, &avatar_at(Chirality::Right, 0.1)).unwrap();
        send_frame(&mut alice, &k, &avatar_at(Chirality::Right, 0.2)).unwrap();
        LoopbackChannel::forward(&mut alice, &mut bob);
        assert_eq!(receive_frame(&mut bob, &k, &mut remote, &policy), ReceiveOutcome::Applied);
        assert_eq!(remote.hand().wrist().position.x, 0.2);
        assert_eq!(bob.pending(&k), 0);

        for step in 3..10 {
            let x = step as f32 * 0.1;
            send_frame(&mut alice, &k, &avatar_at(Chirality::Right, x)).unwrap();
            LoopbackChannel::forward(&mut alice, &mut bob);
            receive_frame(&mut bob, &k, &mut remote, &policy);
            assert_eq!(remote.hand().wrist().position.x, x);
            assert_eq!(bob.pending(&k), 0);
        }
    }
}
