//! Data packets: the hop-by-hop state machine composing flows and service
//! processing stages into an end-to-end journey.

use crate::flow::FlowId;
use crate::service::AppId;
use crate::topology::SwitchId;
use crate::units::{Bytes, Ticks};
use crate::user::UserId;

identifier!(PacketId, usize);

/// The lifecycle state of a packet. `Finished` and `Dropped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketStatus {
    Active,
    Processing,
    Finished,
    Dropped,
}

impl PacketStatus {
    /// Returns whether the status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Dropped)
    }
}

/// An immutable record of one traversal unit: a single transport edge, or a
/// same-switch service-processing stage (`source == target`).
///
/// `end_time` covers everything the hop charges for:
/// `end_time = start_time + queue_delay + transmission_delay +
/// processing_delay`. Propagation delay is accounted separately and only
/// enters the packet's total delay.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LinkHop {
    pub hop_index: usize,
    pub link_index: usize,
    pub source: SwitchId,
    pub target: SwitchId,
    pub start_time: Ticks,
    pub end_time: Ticks,
    pub queue_delay: Ticks,
    pub transmission_delay: Ticks,
    pub processing_delay: Ticks,
    pub propagation_delay: Ticks,
    pub min_bandwidth: f64,
    pub max_bandwidth: f64,
    pub avg_bandwidth: f64,
    pub data_input: Bytes,
    pub data_output: Bytes,
}

/// A data packet travelling from a user through an application's service
/// chain.
#[derive(Debug, Clone)]
pub struct DataPacket {
    pub id: PacketId,
    pub user: UserId,
    pub application: AppId,
    pub(crate) size: Bytes,
    pub(crate) total_path: Vec<Vec<SwitchId>>,
    pub(crate) current_hop: usize,
    pub(crate) current_link: usize,
    pub(crate) status: PacketStatus,
    pub(crate) is_processing: bool,
    pub(crate) processing_remaining_time: Ticks,
    pub(crate) processing_switch: Option<SwitchId>,
    pub(crate) current_flow: Option<FlowId>,
    link_hops: Vec<LinkHop>,
}

impl DataPacket {
    pub(crate) fn new(
        id: PacketId,
        user: UserId,
        application: AppId,
        size: Bytes,
        total_path: Vec<Vec<SwitchId>>,
    ) -> Result<Self, PacketError> {
        if size == Bytes::ZERO {
            return Err(PacketError::NonPositiveSize);
        }
        if total_path.is_empty() {
            return Err(PacketError::EmptyPath);
        }
        if let Some(hop) = total_path.iter().position(|leg| leg.is_empty()) {
            return Err(PacketError::EmptyLeg { hop });
        }
        Ok(Self {
            id,
            user,
            application,
            size,
            total_path,
            current_hop: 0,
            current_link: 0,
            status: PacketStatus::Active,
            is_processing: false,
            processing_remaining_time: Ticks::ZERO,
            processing_switch: None,
            current_flow: None,
            link_hops: Vec::new(),
        })
    }

    /// Returns the packet's status.
    pub fn status(&self) -> PacketStatus {
        self.status
    }

    /// Returns the packet's current size. Services rewrite the size when
    /// they finish processing.
    pub fn size(&self) -> Bytes {
        self.size
    }

    /// Returns the packet's legs, one switch walk per application service.
    pub fn total_path(&self) -> &[Vec<SwitchId>] {
        &self.total_path
    }

    /// Returns the index of the leg the packet is currently on.
    pub fn current_hop(&self) -> usize {
        self.current_hop
    }

    /// Returns the index of the link within the current leg.
    pub fn current_link(&self) -> usize {
        self.current_link
    }

    /// Returns whether a service is currently processing the packet.
    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    /// Returns the remaining processing ticks.
    pub fn processing_remaining_time(&self) -> Ticks {
        self.processing_remaining_time
    }

    /// Returns the flow currently transferring the packet, if any.
    pub fn current_flow(&self) -> Option<FlowId> {
        self.current_flow
    }

    /// Returns a snapshot of the packet's hop history.
    pub fn hops(&self) -> Vec<LinkHop> {
        self.link_hops.clone()
    }

    pub(crate) fn push_hop(&mut self, hop: LinkHop) {
        assert!(
            !self.status.is_terminal(),
            "packet {}: hop appended in terminal state {:?} (hop {}, link {})",
            self.id,
            self.status,
            hop.hop_index,
            hop.link_index,
        );
        self.link_hops.push(hop);
    }

    /// Returns the total ticks the packet spent queueing for bandwidth.
    pub fn queue_delay_total(&self) -> Ticks {
        self.link_hops.iter().map(|h| h.queue_delay).sum()
    }

    /// Returns the total ticks the packet spent in transmission.
    pub fn transmission_delay_total(&self) -> Ticks {
        self.link_hops.iter().map(|h| h.transmission_delay).sum()
    }

    /// Returns the total ticks services spent processing the packet.
    pub fn processing_delay_total(&self) -> Ticks {
        self.link_hops.iter().map(|h| h.processing_delay).sum()
    }

    /// Returns the total propagation delay across all traversed links.
    pub fn propagation_delay_total(&self) -> Ticks {
        self.link_hops.iter().map(|h| h.propagation_delay).sum()
    }

    /// Returns the end-to-end delay: queueing, transmission, processing, and
    /// propagation combined.
    pub fn total_delay(&self) -> Ticks {
        self.queue_delay_total()
            + self.transmission_delay_total()
            + self.processing_delay_total()
            + self.propagation_delay_total()
    }

    /// Produces the metrics snapshot for this packet. `sla` is the delay SLA
    /// the user declared for the application, if any.
    pub fn collect(&self, sla: Option<Ticks>) -> PacketRecord {
        PacketRecord {
            id: self.id,
            user: self.user,
            application: self.application,
            size: self.size,
            status: self.status,
            queue_delay: self.queue_delay_total(),
            transmission_delay: self.transmission_delay_total(),
            processing_delay: self.processing_delay_total(),
            propagation_delay: self.propagation_delay_total(),
            total_delay: self.total_delay(),
            total_path: self.total_path.clone(),
            hops: self.hops(),
            sla_violated: sla.map(|sla| self.total_delay() > sla),
        }
    }

    /// Serializes the packet's full state as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "user": self.user,
            "application": self.application,
            "size": self.size,
            "status": self.status,
            "current_hop": self.current_hop,
            "current_link": self.current_link,
            "is_processing": self.is_processing,
            "processing_remaining_time": self.processing_remaining_time,
            "total_path": self.total_path,
            "hops": self.link_hops,
        })
    }
}

/// The metrics snapshot emitted by [`DataPacket::collect`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PacketRecord {
    pub id: PacketId,
    pub user: UserId,
    pub application: AppId,
    pub size: Bytes,
    pub status: PacketStatus,
    pub queue_delay: Ticks,
    pub transmission_delay: Ticks,
    pub processing_delay: Ticks,
    pub propagation_delay: Ticks,
    pub total_delay: Ticks,
    pub total_path: Vec<Vec<SwitchId>>,
    pub hops: Vec<LinkHop>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sla_violated: Option<bool>,
}

/// An error type listing the reasons a packet launch is invalid. No
/// simulation state mutates when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// Packet size must be positive.
    #[error("packet size must be positive")]
    NonPositiveSize,

    /// A packet needs at least one leg.
    #[error("packet path is empty")]
    EmptyPath,

    /// Every leg needs at least one switch.
    #[error("leg {hop} of the packet path is empty")]
    EmptyLeg {
        /// The offending leg index.
        hop: usize,
    },

    /// The path must have one leg per application service.
    #[error("path has {legs} legs but the application has {services} services")]
    LegCountMismatch {
        /// Number of legs in the path.
        legs: usize,
        /// Number of services in the application.
        services: usize,
    },

    /// A leg references a switch the topology does not declare.
    #[error("leg {hop} references unknown switch {switch}")]
    UnknownSwitch {
        /// The offending leg index.
        hop: usize,
        /// The unknown switch.
        switch: SwitchId,
    },

    /// Consecutive leg switches must be adjacent in the topology.
    #[error("leg {hop}: no link between {a} and {b}")]
    NotAdjacent {
        /// The offending leg index.
        hop: usize,
        /// The first switch.
        a: SwitchId,
        /// The second switch.
        b: SwitchId,
    },

    /// The user is not registered in the world.
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    /// The application is not registered in the world.
    #[error("unknown application {0}")]
    UnknownApplication(AppId),

    /// The user has no communication paths for the application.
    #[error("user {user} has no communication paths for application {app}")]
    NoPathForApplication {
        /// The user.
        user: UserId,
        /// The application.
        app: AppId,
    },
}
