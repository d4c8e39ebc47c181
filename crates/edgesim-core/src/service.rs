//! Edge servers, the services they host, and applications (ordered service
//! chains).

use crate::packet::PacketId;
use crate::topology::SwitchId;
use crate::units::{Bytes, Ticks};

identifier!(ServerId, usize);
identifier!(ServiceId, usize);
identifier!(AppId, usize);

/// An edge server attached to exactly one switch.
#[derive(Debug, Clone)]
pub struct EdgeServer {
    pub id: ServerId,
    pub switch: SwitchId,
    pub(crate) services: Vec<ServiceId>,
}

impl EdgeServer {
    /// Creates a new edge server attached to `switch`.
    pub fn new(id: ServerId, switch: SwitchId) -> Self {
        Self {
            id,
            switch,
            services: Vec::new(),
        }
    }

    /// Returns the services hosted by this server.
    pub fn services(&self) -> &[ServiceId] {
        &self.services
    }
}

/// A service pinned to an edge server. Processing a packet takes
/// `processing_time` ticks and rewrites the packet's size to
/// `processing_output`.
#[derive(Debug, Clone)]
pub struct Service {
    pub id: ServiceId,
    pub processing_time: Ticks,
    pub processing_output: Bytes,
    pub(crate) server: Option<ServerId>,
    pub(crate) processing_queue: Vec<PacketId>,
}

impl Service {
    /// Creates a new, unplaced service.
    pub fn new(id: ServiceId, processing_time: Ticks, processing_output: Bytes) -> Self {
        Self {
            id,
            processing_time,
            processing_output,
            server: None,
            processing_queue: Vec::new(),
        }
    }

    /// Places the service on a server.
    pub fn hosted_by(mut self, server: ServerId) -> Self {
        self.server = Some(server);
        self
    }

    /// Returns the server currently hosting the service, if any.
    pub fn server(&self) -> Option<ServerId> {
        self.server
    }

    /// Returns the number of packets currently being processed.
    pub fn queue_depth(&self) -> usize {
        self.processing_queue.len()
    }

    pub(crate) fn enqueue(&mut self, packet: PacketId) {
        self.processing_queue.push(packet);
    }

    pub(crate) fn dequeue(&mut self, packet: PacketId) {
        self.processing_queue.retain(|&p| p != packet);
    }
}

/// An ordered sequence of services every packet of the application visits.
#[derive(Debug, Clone)]
pub struct Application {
    pub id: AppId,
    pub services: Vec<ServiceId>,
}

impl Application {
    /// Creates a new application from its ordered service chain.
    pub fn new(id: AppId, services: Vec<ServiceId>) -> Self {
        Self { id, services }
    }
}
