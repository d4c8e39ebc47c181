#![warn(unreachable_pub, missing_debug_implementations)]

//! The core edgesim library: a tick-driven simulator for edge-computing
//! workloads. A [`Spec`] of switches, links, servers, services,
//! applications, and users validates into a [`World`], which steps packets,
//! services, the bandwidth scheduler, flows, and users in a fixed order
//! every tick and records each packet's hop-by-hop delay breakdown.

#[macro_use]
mod ident;

mod fairness;

pub mod flow;
pub mod packet;
pub mod service;
pub mod spec;
pub mod topology;
pub mod units;
pub mod user;
pub mod world;

#[cfg(test)]
pub(crate) mod testing;

pub use flow::{FlowId, FlowMeta, FlowStatus, NetworkFlow};
pub use packet::{DataPacket, LinkHop, PacketError, PacketId, PacketRecord, PacketStatus};
pub use service::{AppId, Application, EdgeServer, ServerId, Service, ServiceId};
pub use spec::{Spec, SpecError};
pub use topology::{Coordinates, Link, Switch, SwitchId, Topology, TopologyError};
pub use units::{Bytes, Ticks};
pub use user::{AccessPattern, PacketSizeStrategy, User, UserId};
pub use world::World;
