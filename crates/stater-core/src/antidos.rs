//! Validation anti-DoS helpers.
//!
//! Network-facing layers use these to bound the work a misbehaving peer
//! can trigger: a token-bucket rate limiter in front of validation, and a
//! bounded FIFO buffer for blocks whose parents have not arrived yet.

use std::collections::VecDeque;
use std::time::Instant;

use crate::types::{Block, Hash256};

/// Token bucket limiting validation work.
///
/// Tokens refill continuously at `max_tokens_per_minute / 60` per second
/// up to `burst`. A request heavier than the whole bucket is refused
/// outright.
pub struct ValidationRateLimiter {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl ValidationRateLimiter {
    pub fn new(max_tokens_per_minute: u64, burst: u64) -> Self {
        Self {
            tokens: (burst.max(1)) as f64,
            capacity: (burst.max(1)) as f64,
            refill_per_sec: ((max_tokens_per_minute as f64) / 60.0).max(1.0 / 60.0),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
    }

    /// Consume `weight` tokens of validation work. Returns `false` when
    /// the caller should defer the work.
    pub fn consume(&mut self, weight: u64) -> bool {
        self.refill();
        if weight as f64 > self.capacity {
            return false;
        }
        if self.tokens < weight as f64 {
            return false;
        }
        self.tokens -= weight as f64;
        true
    }

    /// Tokens currently available.
    pub fn tokens(&self) -> u64 {
        self.tokens as u64
    }
}

impl Default for ValidationRateLimiter {
    fn default() -> Self {
        Self::new(120, 240)
    }
}

/// A block received before its parent.
#[derive(Clone, Debug)]
pub struct OrphanBlock {
    pub block: Block,
    pub hash: Hash256,
    pub parent: Hash256,
    pub received: Instant,
}

/// Bounded FIFO of orphan blocks awaiting their parents.
pub struct OrphanBuffer {
    max_entries: usize,
    fifo: VecDeque<OrphanBlock>,
}

impl OrphanBuffer {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            fifo: VecDeque::new(),
        }
    }

    /// Insert an orphan, evicting the oldest when at capacity. Returns
    /// the evicted orphan's hash when eviction occurred.
    pub fn add(&mut self, orphan: OrphanBlock) -> Option<Hash256> {
        let mut evicted = None;
        if self.fifo.len() >= self.max_entries {
            evicted = self.fifo.pop_front().map(|o| o.hash);
        }
        self.fifo.push_back(orphan);
        evicted
    }

    /// Remove and return every orphan whose parent is `parent_hash`,
    /// ready for validation now that the parent connected.
    pub fn pop_children(&mut self, parent_hash: &Hash256) -> Vec<OrphanBlock> {
        let mut ready = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.fifo.len());
        for orphan in self.fifo.drain(..) {
            if orphan.parent == *parent_hash {
                ready.push(orphan);
            } else {
                remaining.push_back(orphan);
            }
        }
        self.fifo = remaining;
        ready
    }

    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }
}

impl Default for OrphanBuffer {
    fn default() -> Self {
        Self::new(64)
    }
}
