//! Users: packet-size strategies, per-application communication paths, and
//! the access pattern that triggers packet generation.

use rand::rngs::StdRng;
use rand::Rng;
use rustc_hash::FxHashMap;

use crate::service::AppId;
use crate::topology::{Coordinates, SwitchId};
use crate::units::{Bytes, Ticks};

identifier!(UserId, usize);

/// How a user sizes the packets it generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketSizeStrategy {
    /// Every packet has the same size.
    Fixed(Bytes),
    /// Packet sizes are drawn uniformly from `min..=max`.
    Random { min: Bytes, max: Bytes },
}

impl PacketSizeStrategy {
    pub(crate) fn draw(&self, rng: &mut StdRng) -> Bytes {
        match *self {
            Self::Fixed(size) => size,
            Self::Random { min, max } => {
                Bytes::new(rng.gen_range(min.into_u64()..=max.into_u64()))
            }
        }
    }
}

/// A circular duration-and-interval access pattern: starting at `start`, the
/// user requests its applications for `duration` consecutive ticks, pauses
/// for `interval` ticks, and repeats, cycling through the value lists.
#[derive(Debug, Clone)]
pub struct AccessPattern {
    start: Ticks,
    durations: Vec<Ticks>,
    intervals: Vec<Ticks>,
    repetitions: Option<usize>,
}

impl AccessPattern {
    /// Creates a pattern that cycles forever through `durations` and
    /// `intervals`.
    ///
    /// Both lists must be non-empty and every duration must be at least one
    /// tick.
    pub fn circular(start: Ticks, durations: Vec<Ticks>, intervals: Vec<Ticks>) -> Self {
        assert!(
            !durations.is_empty() && !intervals.is_empty(),
            "access pattern needs at least one duration and one interval"
        );
        assert!(
            durations.iter().all(|&d| d >= Ticks::ONE),
            "access pattern durations must be at least one tick"
        );
        Self {
            start,
            durations,
            intervals,
            repetitions: None,
        }
    }

    /// Limits the pattern to `n` duration blocks.
    pub fn with_repetitions(mut self, n: usize) -> Self {
        self.repetitions = Some(n);
        self
    }

    /// Returns whether the pattern requests its applications at `now`.
    pub(crate) fn fires_at(&self, now: Ticks) -> bool {
        let mut block_start = self.start;
        for i in 0.. {
            if self.repetitions.is_some_and(|n| i >= n) {
                return false;
            }
            if now < block_start {
                return false;
            }
            let duration = self.durations[i % self.durations.len()];
            if now < block_start + duration {
                return true;
            }
            block_start = block_start + duration + self.intervals[i % self.intervals.len()];
        }
        unreachable!()
    }

    /// Returns whether the pattern can fire at or after `now`. A pattern
    /// without a repetition limit never exhausts.
    pub(crate) fn exhausted_by(&self, now: Ticks) -> bool {
        let Some(n) = self.repetitions else {
            return false;
        };
        let mut block_start = self.start;
        let mut last_tick = self.start;
        for i in 0..n {
            let duration = self.durations[i % self.durations.len()];
            last_tick = block_start + duration - Ticks::ONE;
            block_start = block_start + duration + self.intervals[i % self.intervals.len()];
        }
        n == 0 || now > last_tick
    }
}

/// A mobile user generating packets for the applications it is attached to.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub coordinates: Coordinates,
    strategy: PacketSizeStrategy,
    pub(crate) apps: Vec<AppId>,
    pub(crate) communication_paths: FxHashMap<AppId, Vec<Vec<SwitchId>>>,
    pub(crate) delay_sla: FxHashMap<AppId, Ticks>,
    pub(crate) access: Option<AccessPattern>,
}

impl User {
    /// Creates a new user with the given packet-size strategy.
    pub fn new(id: UserId, coordinates: Coordinates, strategy: PacketSizeStrategy) -> Self {
        Self {
            id,
            coordinates,
            strategy,
            apps: Vec::new(),
            communication_paths: FxHashMap::default(),
            delay_sla: FxHashMap::default(),
            access: None,
        }
    }

    /// Attaches the user to an application with its pre-computed
    /// communication paths, one switch walk per service leg.
    pub fn attach_application(mut self, app: AppId, paths: Vec<Vec<SwitchId>>) -> Self {
        self.apps.push(app);
        self.communication_paths.insert(app, paths);
        self
    }

    /// Declares a delay SLA (in ticks) for one of the user's applications.
    pub fn with_delay_sla(mut self, app: AppId, sla: Ticks) -> Self {
        self.delay_sla.insert(app, sla);
        self
    }

    /// Installs the access pattern that drives packet generation.
    pub fn with_access_pattern(mut self, pattern: AccessPattern) -> Self {
        self.access = Some(pattern);
        self
    }

    /// Returns the user's packet-size strategy.
    pub fn strategy(&self) -> PacketSizeStrategy {
        self.strategy
    }

    /// Returns the applications the user is attached to.
    pub fn applications(&self) -> &[AppId] {
        &self.apps
    }

    /// Returns the communication paths for an application, if attached.
    pub fn communication_paths(&self, app: AppId) -> Option<&Vec<Vec<SwitchId>>> {
        self.communication_paths.get(&app)
    }

    /// Returns the delay SLA declared for an application, if any.
    pub fn delay_sla(&self, app: AppId) -> Option<Ticks> {
        self.delay_sla.get(&app).copied()
    }
}
