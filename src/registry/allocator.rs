//! Randomized probing for a port not yet present in the ledger.

use std::collections::{BTreeSet, VecDeque};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

use crate::lib::errors::RegistryError;

pub const DEFAULT_RANGE_START: u16 = 8000;
pub const DEFAULT_RANGE_END: u32 = 9000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Half-open port range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortRange {
    start: u16,
    end: u32,
}

impl PortRange {
    pub fn new(start: u32, end: u32) -> Result<Self, RegistryError> {
        if start == 0 || start >= end || end > u32::from(u16::MAX) + 1 {
            return Err(RegistryError::InvalidRange { start, end });
        }
        let start = u16::try_from(start).map_err(|_| RegistryError::InvalidRange { start, end })?;
        Ok(Self { start, end })
    }

    pub const fn start(&self) -> u16 {
        self.start
    }

    pub const fn end(&self) -> u32 {
        self.end
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && u32::from(port) < self.end
    }

    pub fn len(&self) -> u32 {
        self.end - u32::from(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_RANGE_START,
            end: DEFAULT_RANGE_END,
        }
    }
}

/// Supplies candidate ports for the allocator.
pub trait PortSource {
    fn next_candidate(&mut self, range: &PortRange) -> u16;
}

/// Uniform draws from an entropy-seeded RNG.
#[derive(Debug)]
pub struct RandomPortSource<R: Rng = StdRng> {
    rng: R,
}

impl RandomPortSource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for RandomPortSource {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> RandomPortSource<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> PortSource for RandomPortSource<R> {
    fn next_candidate(&mut self, range: &PortRange) -> u16 {
        let drawn = self.rng.gen_range(u32::from(range.start())..range.end());
        // `end <= 65536`, so every draw fits.
        u16::try_from(drawn).unwrap_or(u16::MAX)
    }
}

/// Replays a fixed sequence of candidates, repeating the last one once the
/// script runs out, and counts how many were drawn.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPortSource {
    script: VecDeque<u16>,
    last: Option<u16>,
    draws: u32,
}

impl ScriptedPortSource {
    pub fn new(script: impl IntoIterator<Item = u16>) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: None,
            draws: 0,
        }
    }

    pub fn draws(&self) -> u32 {
        self.draws
    }
}

impl PortSource for ScriptedPortSource {
    fn next_candidate(&mut self, range: &PortRange) -> u16 {
        self.draws += 1;
        if let Some(next) = self.script.pop_front() {
            self.last = Some(next);
        }
        self.last.unwrap_or(range.start())
    }
}

/// Bounded random prober over one range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAllocator {
    range: PortRange,
    max_attempts: u32,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self {
            range: PortRange::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PortAllocator {
    pub fn new(range: PortRange, max_attempts: u32) -> Result<Self, RegistryError> {
        if max_attempts == 0 {
            return Err(RegistryError::InvalidAttempts);
        }
        Ok(Self {
            range,
            max_attempts,
        })
    }

    pub const fn range(&self) -> PortRange {
        self.range
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Return the first drawn port absent from `occupied`.
    ///
    /// The result is only free as observed now; nothing reserves it until the
    /// caller appends it to the ledger.
    pub fn allocate(
        &self,
        occupied: &BTreeSet<u16>,
        source: &mut impl PortSource,
    ) -> Result<u16, RegistryError> {
        for _ in 0..self.max_attempts {
            let candidate = source.next_candidate(&self.range);
            if self.range.contains(candidate) && !occupied.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(RegistryError::AllocationExhausted {
            start: self.range.start(),
            end: self.range.end(),
            attempts: self.max_attempts,
        })
    }
}

/// One-shot allocation over `[range_low, range_high_exclusive)`.
pub fn allocate(
    occupied: &BTreeSet<u16>,
    range_low: u32,
    range_high_exclusive: u32,
    max_attempts: u32,
    source: &mut impl PortSource,
) -> Result<u16, RegistryError> {
    let range = PortRange::new(range_low, range_high_exclusive)?;
    PortAllocator::new(range, max_attempts)?.allocate(occupied, source)
}
