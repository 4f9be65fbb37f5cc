//! Matchmaking queue
//!
//! Maintains the wait queue of channels looking for a multiplayer game and
//! pairs the two oldest entries. Enqueue, dequeue, and matching are
//! serialized under one lock; endpoint selection runs inside the match
//! step so a pair is only committed once a playable board exists for it.
//!
//! Pairing uses the first (oldest) entry's difficulty. The head of the
//! queue is part of every attempted pair, so no entry can be starved
//! except by endpoint exhaustion, in which case both entries return to
//! the front in their original order.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{info, warn};

use gridlink_shared::{Difficulty, PlayerInfo};

use crate::endpoints::EndpointPicker;
use crate::engine::{ChannelHandle, ChannelId};

/// A channel waiting in the queue.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub handle: ChannelHandle,
    pub difficulty: Difficulty,
    pub enqueued_at: Instant,
}

/// A pair of entries handed off to the session engine, with the endpoints
/// their session will race between.
#[derive(Debug, Clone)]
pub struct PairedMatch {
    pub difficulty: Difficulty,
    pub start_player: PlayerInfo,
    pub end_player: PlayerInfo,
    pub first: ChannelHandle,
    pub second: ChannelHandle,
}

/// Result of an enqueue attempt.
#[derive(Debug)]
pub enum EnqueueResult {
    /// Entry accepted; zero or more pairs became ready to start.
    Queued(Vec<PairedMatch>),
    /// The channel already has a queue entry.
    Duplicate,
}

struct QueueState {
    entries: VecDeque<QueueEntry>,
    channels: HashSet<ChannelId>,
}

/// The process-wide matchmaking queue.
pub struct Matchmaker {
    state: Mutex<QueueState>,
    picker: Arc<EndpointPicker>,
}

impl Matchmaker {
    pub fn new(picker: Arc<EndpointPicker>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                channels: HashSet::new(),
            }),
            picker,
        }
    }

    /// Append a channel to the queue and attempt matching.
    pub fn enqueue(&self, handle: ChannelHandle, difficulty: Difficulty) -> EnqueueResult {
        let mut state = self.state.lock().unwrap();
        if !state.channels.insert(handle.channel) {
            warn!("channel {} is already queued", handle.channel);
            return EnqueueResult::Duplicate;
        }
        info!(
            "channel {} queued for {:?} ({} waiting)",
            handle.channel,
            difficulty,
            state.entries.len() + 1
        );
        state.entries.push_back(QueueEntry {
            handle,
            difficulty,
            enqueued_at: Instant::now(),
        });
        EnqueueResult::Queued(self.try_match(&mut state))
    }

    /// Remove a channel's entry if present. Returns whether one existed.
    pub fn dequeue(&self, channel: ChannelId) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.channels.remove(&channel) {
            return false;
        }
        state.entries.retain(|e| e.handle.channel != channel);
        info!("channel {} left the queue", channel);
        true
    }

    /// Number of waiting entries.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every waiting entry. Used at shutdown so each
    /// queued client can be sent a dequeue acknowledgement.
    pub fn drain(&self) -> Vec<ChannelHandle> {
        let mut state = self.state.lock().unwrap();
        state.channels.clear();
        state.entries.drain(..).map(|e| e.handle).collect()
    }

    /// Pair the two oldest entries while at least two are waiting.
    ///
    /// The first entry's difficulty decides the game parameters. When the
    /// endpoint picker reports exhaustion both entries are re-prepended in
    /// their original order and matching stops.
    fn try_match(&self, state: &mut QueueState) -> Vec<PairedMatch> {
        let mut matches = Vec::new();
        while state.entries.len() >= 2 {
            // Both pops succeed under the length guard.
            let Some(first) = state.entries.pop_front() else {
                break;
            };
            let Some(second) = state.entries.pop_front() else {
                state.entries.push_front(first);
                break;
            };

            let difficulty = first.difficulty;
            match self.picker.pick(difficulty) {
                Some((start_player, end_player)) => {
                    state.channels.remove(&first.handle.channel);
                    state.channels.remove(&second.handle.channel);
                    info!(
                        "matched channels {} and {} at {:?}",
                        first.handle.channel, second.handle.channel, difficulty
                    );
                    matches.push(PairedMatch {
                        difficulty,
                        start_player,
                        end_player,
                        first: first.handle,
                        second: second.handle,
                    });
                }
                None => {
                    warn!(
                        "endpoint exhaustion at {:?}; re-queueing channels {} and {}",
                        difficulty, first.handle.channel, second.handle.channel
                    );
                    state.entries.push_front(second);
                    state.entries.push_front(first);
                    break;
                }
            }
        }
        matches
    }
}
