//! Simulation specifications: the validated configuration of switches,
//! links, servers, services, applications, and users that produces a
//! [`World`].

use rustc_hash::FxHashMap;

use crate::packet::PacketError;
use crate::service::{AppId, Application, EdgeServer, ServerId, Service, ServiceId};
use crate::topology::{Link, Switch, SwitchId, Topology, TopologyError};
use crate::units::{Bytes, Ticks};
use crate::user::{PacketSizeStrategy, User, UserId};
use crate::world::{validate_path, World};

/// A simulation specification.
#[derive(Debug, typed_builder::TypedBuilder)]
pub struct Spec {
    /// Topology switches.
    pub switches: Vec<Switch>,
    /// Topology links.
    pub links: Vec<Link>,
    /// Edge servers, each attached to a switch.
    #[builder(default)]
    pub servers: Vec<EdgeServer>,
    /// Services, optionally placed on servers.
    #[builder(default)]
    pub services: Vec<Service>,
    /// Applications (ordered service chains).
    #[builder(default)]
    pub applications: Vec<Application>,
    /// Users with their paths and access patterns.
    #[builder(default)]
    pub users: Vec<User>,
    /// Seed for the world's RNG (packet-size draws).
    #[builder(default = 0)]
    pub seed: u64,
}

impl Spec {
    /// Validates the specification and builds a [`World`] from it.
    ///
    /// Correctness properties:
    ///
    /// - Every entity must have a unique ID within its kind.
    /// - Servers must attach to declared switches; services must be placed
    ///   on declared servers.
    /// - Services must take at least one tick of processing.
    /// - Applications must name declared services and must not be empty.
    /// - Users must attach to declared applications, with one walkable leg
    ///   per service, and must draw positive packet sizes.
    pub fn validate(self) -> Result<World, SpecError> {
        let mut topology = Topology::new(&self.switches, &self.links)?;

        let mut servers: FxHashMap<ServerId, EdgeServer> = FxHashMap::default();
        for server in self.servers {
            let switch = topology
                .switch_mut(server.switch)
                .ok_or(SpecError::UnknownServerSwitch {
                    server: server.id,
                    switch: server.switch,
                })?;
            if servers.contains_key(&server.id) {
                return Err(SpecError::DuplicateServerId(server.id));
            }
            switch.servers.push(server.id);
            servers.insert(server.id, server);
        }

        let mut services: FxHashMap<ServiceId, Service> = FxHashMap::default();
        for service in self.services {
            if services.contains_key(&service.id) {
                return Err(SpecError::DuplicateServiceId(service.id));
            }
            if service.processing_time == Ticks::ZERO {
                return Err(SpecError::ZeroProcessingTime(service.id));
            }
            if let Some(server) = service.server {
                servers
                    .get_mut(&server)
                    .ok_or(SpecError::UnknownServiceServer {
                        service: service.id,
                        server,
                    })?
                    .services
                    .push(service.id);
            }
            services.insert(service.id, service);
        }

        let mut applications: FxHashMap<AppId, Application> = FxHashMap::default();
        for app in self.applications {
            if applications.contains_key(&app.id) {
                return Err(SpecError::DuplicateApplicationId(app.id));
            }
            if app.services.is_empty() {
                return Err(SpecError::EmptyApplication(app.id));
            }
            for &service in &app.services {
                if !services.contains_key(&service) {
                    return Err(SpecError::UnknownApplicationService {
                        app: app.id,
                        service,
                    });
                }
            }
            applications.insert(app.id, app);
        }

        let mut users: FxHashMap<UserId, User> = FxHashMap::default();
        for user in self.users {
            if users.contains_key(&user.id) {
                return Err(SpecError::DuplicateUserId(user.id));
            }
            match user.strategy() {
                PacketSizeStrategy::Fixed(size) if size == Bytes::ZERO => {
                    return Err(SpecError::InvalidPacketSize(user.id));
                }
                PacketSizeStrategy::Random { min, max } if min == Bytes::ZERO || min > max => {
                    return Err(SpecError::InvalidPacketSize(user.id));
                }
                _ => {}
            }
            for &app in user.applications() {
                let application =
                    applications
                        .get(&app)
                        .ok_or(SpecError::UnknownUserApplication {
                            user: user.id,
                            app,
                        })?;
                let path = user
                    .communication_paths(app)
                    .expect("attached applications always carry paths");
                validate_path(&topology, path, application.services.len()).map_err(|source| {
                    SpecError::InvalidUserPath {
                        user: user.id,
                        app,
                        source,
                    }
                })?;
            }
            users.insert(user.id, user);
        }

        Ok(World::new(
            topology,
            servers,
            services,
            applications,
            users,
            self.seed,
        ))
    }
}

/// Simulation specification error.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    /// The topology is invalid.
    #[error("invalid topology")]
    InvalidTopology(#[from] TopologyError),

    /// Duplicate server ID.
    #[error("duplicate server ID {0}")]
    DuplicateServerId(ServerId),

    /// A server attaches to an undeclared switch.
    #[error("server {server} attaches to unknown switch {switch}")]
    UnknownServerSwitch {
        /// The server.
        server: ServerId,
        /// The unknown switch.
        switch: SwitchId,
    },

    /// Duplicate service ID.
    #[error("duplicate service ID {0}")]
    DuplicateServiceId(ServiceId),

    /// A service is placed on an undeclared server.
    #[error("service {service} is placed on unknown server {server}")]
    UnknownServiceServer {
        /// The service.
        service: ServiceId,
        /// The unknown server.
        server: ServerId,
    },

    /// A service that takes no time cannot be scheduled.
    #[error("service {0} has zero processing time")]
    ZeroProcessingTime(ServiceId),

    /// Duplicate application ID.
    #[error("duplicate application ID {0}")]
    DuplicateApplicationId(AppId),

    /// An application with no services.
    #[error("application {0} has no services")]
    EmptyApplication(AppId),

    /// An application names an undeclared service.
    #[error("application {app} references unknown service {service}")]
    UnknownApplicationService {
        /// The application.
        app: AppId,
        /// The unknown service.
        service: ServiceId,
    },

    /// Duplicate user ID.
    #[error("duplicate user ID {0}")]
    DuplicateUserId(UserId),

    /// A user attaches to an undeclared application.
    #[error("user {user} attaches to unknown application {app}")]
    UnknownUserApplication {
        /// The user.
        user: UserId,
        /// The unknown application.
        app: AppId,
    },

    /// A user's packet-size strategy can draw a non-positive size.
    #[error("user {0} has an invalid packet-size strategy")]
    InvalidPacketSize(UserId),

    /// A user's communication path is unusable.
    #[error("user {user} has an invalid path for application {app}")]
    InvalidUserPath {
        /// The user.
        user: UserId,
        /// The application.
        app: AppId,
        /// What is wrong with the path.
        #[source]
        source: PacketError,
    },
}
