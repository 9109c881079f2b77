//! Identifier generators.
//!
//! [`LinearUuidGenerator`] hands out a bounded, strictly increasing sequence
//! and backs monotonic markers such as the user generation. Entity
//! identifiers come from [`RandomUuidGenerator`], rooted at the server's own
//! id so that servers never mint the same identifier. The controller still
//! checks every candidate against its tables before using it.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use relaychat_shared::Uuid;

use crate::error::CoreError;

pub trait UuidGenerator: Send {
    fn make(&mut self) -> Result<Uuid, CoreError>;
}

/// Sequential ids `start..=end` under an optional root.
#[derive(Debug, Clone)]
pub struct LinearUuidGenerator {
    root: Option<Uuid>,
    next: u64,
    end: u32,
}

impl LinearUuidGenerator {
    pub fn new(root: Option<Uuid>, start: u32, end: u32) -> Self {
        Self {
            root,
            next: u64::from(start),
            end,
        }
    }
}

impl UuidGenerator for LinearUuidGenerator {
    fn make(&mut self) -> Result<Uuid, CoreError> {
        if self.next > u64::from(self.end) {
            return Err(CoreError::ExhaustedRange);
        }
        // `next <= end` so the narrowing cannot truncate.
        let id = self.next as u32;
        self.next += 1;
        Ok(Uuid::new(self.root.clone(), id))
    }
}

/// Random ids rooted at a server id.
pub struct RandomUuidGenerator {
    root: Uuid,
    rng: StdRng,
}

impl RandomUuidGenerator {
    pub fn new(root: Uuid, seed: u64) -> Self {
        Self {
            root,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seed from the wall clock at construction time.
    pub fn from_clock(root: Uuid) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self::new(root, seed)
    }
}

impl UuidGenerator for RandomUuidGenerator {
    fn make(&mut self) -> Result<Uuid, CoreError> {
        Ok(Uuid::new(Some(self.root.clone()), self.rng.gen()))
    }
}
