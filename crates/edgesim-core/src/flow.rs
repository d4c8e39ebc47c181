//! Single-link network flows: one leg-segment transfer between two adjacent
//! switches, driven by the per-tick bandwidth allocation.

use petgraph::graph::EdgeIndex;

use crate::packet::PacketId;
use crate::topology::SwitchId;
use crate::units::Ticks;

identifier!(FlowId, usize);

// Repeated fair-share subtraction leaves float residue; remainders below
// this threshold count as fully transferred.
const RESIDUE: f64 = 1e-9;

/// The lifecycle state of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Active,
    Finished,
}

/// Identifies the packet and path position a flow is transferring for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowMeta {
    pub packet: PacketId,
    pub hop_index: usize,
    pub link_index: usize,
}

/// A one-leg transfer of a byte count between two adjacent switches.
///
/// Flows do not pull bandwidth themselves; the
/// [`World`](crate::world::World) hands each active flow its max-min fair
/// allocation once per tick. A flow launched at tick `t` first receives
/// bandwidth at tick `t + 1`.
#[derive(Debug, Clone)]
pub struct NetworkFlow {
    pub id: FlowId,
    pub source: SwitchId,
    pub target: SwitchId,
    pub(crate) link: EdgeIndex,
    pub start: Ticks,
    pub end: Option<Ticks>,
    pub(crate) meta: FlowMeta,
    data_to_transfer: f64,
    bandwidth_history: Vec<f64>,
    queue_delay: Ticks,
    status: FlowStatus,
}

impl NetworkFlow {
    pub(crate) fn new(
        id: FlowId,
        source: SwitchId,
        target: SwitchId,
        link: EdgeIndex,
        start: Ticks,
        data_to_transfer: f64,
        meta: FlowMeta,
    ) -> Self {
        Self {
            id,
            source,
            target,
            link,
            start,
            end: None,
            meta,
            data_to_transfer,
            bandwidth_history: Vec::new(),
            queue_delay: Ticks::ZERO,
            status: FlowStatus::Active,
        }
    }

    /// Advances the flow by one tick with the given bandwidth allocation.
    /// Returns `true` when the transfer completed this tick.
    pub(crate) fn step(&mut self, now: Ticks, allocation: Option<f64>) -> bool {
        debug_assert_eq!(self.status, FlowStatus::Active, "stepped a finished flow");
        match allocation {
            Some(b) if b > 0.0 => {
                self.data_to_transfer -= b.min(self.data_to_transfer);
                if self.data_to_transfer < RESIDUE {
                    self.data_to_transfer = 0.0;
                }
                self.bandwidth_history.push(b);
                if self.data_to_transfer == 0.0 {
                    self.end = Some(now);
                    self.status = FlowStatus::Finished;
                    return true;
                }
            }
            _ => {
                // Zero-allocation ticks before any progress count as
                // queueing; later stalls fall under transmission time.
                if self.bandwidth_history.is_empty() {
                    self.queue_delay += Ticks::ONE;
                }
            }
        }
        false
    }

    /// Returns the flow's status.
    pub fn status(&self) -> FlowStatus {
        self.status
    }

    /// Returns the switch sequence the flow traverses.
    pub fn path(&self) -> [SwitchId; 2] {
        [self.source, self.target]
    }

    /// Returns the bytes still to transfer.
    pub fn data_to_transfer(&self) -> f64 {
        self.data_to_transfer
    }

    /// Returns the per-tick bandwidth allocations observed so far.
    pub fn bandwidth_history(&self) -> &[f64] {
        &self.bandwidth_history
    }

    /// Returns the ticks spent without any allocation before the first
    /// transfer.
    pub fn queue_delay(&self) -> Ticks {
        self.queue_delay
    }

    /// Returns the ticks spent transmitting, excluding queueing. Only
    /// meaningful once the flow has finished.
    pub(crate) fn transmission_delay(&self) -> Ticks {
        let end = self
            .end
            .unwrap_or_else(|| panic!("flow {}: transmission delay before completion", self.id));
        end - self.start - self.queue_delay
    }

    pub(crate) fn min_bandwidth(&self) -> f64 {
        self.bandwidth_history.iter().copied().fold(f64::MAX, f64::min)
    }

    pub(crate) fn max_bandwidth(&self) -> f64 {
        self.bandwidth_history.iter().copied().fold(0.0, f64::max)
    }

    pub(crate) fn avg_bandwidth(&self) -> f64 {
        let total = self.bandwidth_history.iter().sum::<f64>();
        total / self.bandwidth_history.len() as f64
    }
}
