//! The [`World`] owns every entity of a simulation (topology, servers,
//! services, applications, users, packets, and flows) in typed collections
//! keyed by id, and drives the tick loop.
//!
//! Control flow per tick: packets step, services step, the bandwidth
//! scheduler recomputes allocations, flows step, users step. All phases of
//! tick `t` observe `now == t`.

use itertools::Itertools;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;

use crate::fairness::{self, Demand};
use crate::flow::{FlowId, FlowMeta, FlowStatus, NetworkFlow};
use crate::packet::{DataPacket, LinkHop, PacketError, PacketId, PacketRecord, PacketStatus};
use crate::service::{AppId, Application, EdgeServer, ServerId, Service, ServiceId};
use crate::topology::{SwitchId, Topology};
use crate::units::Ticks;
use crate::user::{User, UserId};

/// A single simulation instance.
#[derive(Debug)]
pub struct World {
    topology: Topology,
    servers: FxHashMap<ServerId, EdgeServer>,
    services: FxHashMap<ServiceId, Service>,
    applications: FxHashMap<AppId, Application>,
    users: FxHashMap<UserId, User>,
    packets: FxHashMap<PacketId, DataPacket>,
    flows: FxHashMap<FlowId, NetworkFlow>,
    now: Ticks,
    next_packet_id: usize,
    next_flow_id: usize,
    rng: StdRng,
}

impl World {
    pub(crate) fn new(
        topology: Topology,
        servers: FxHashMap<ServerId, EdgeServer>,
        services: FxHashMap<ServiceId, Service>,
        applications: FxHashMap<AppId, Application>,
        users: FxHashMap<UserId, User>,
        seed: u64,
    ) -> Self {
        Self {
            topology,
            servers,
            services,
            applications,
            users,
            packets: FxHashMap::default(),
            flows: FxHashMap::default(),
            now: Ticks::ZERO,
            next_packet_id: 0,
            next_flow_id: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Returns the current tick.
    pub fn now(&self) -> Ticks {
        self.now
    }

    /// Returns the network topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Returns the packet with the given ID, if any.
    pub fn packet(&self, id: PacketId) -> Option<&DataPacket> {
        self.packets.get(&id)
    }

    /// Returns an iterator over all packets, in ascending id order.
    pub fn packets(&self) -> impl Iterator<Item = &DataPacket> {
        self.packets
            .keys()
            .sorted()
            .map(move |id| &self.packets[id])
    }

    /// Returns the flow with the given ID, if any.
    pub fn flow(&self, id: FlowId) -> Option<&NetworkFlow> {
        self.flows.get(&id)
    }

    /// Returns an iterator over all flows ever launched, in ascending id
    /// order.
    pub fn flows(&self) -> impl Iterator<Item = &NetworkFlow> {
        self.flows.keys().sorted().map(move |id| &self.flows[id])
    }

    /// Returns an iterator over the flows still transferring.
    pub fn active_flows(&self) -> impl Iterator<Item = &NetworkFlow> {
        self.flows().filter(|f| f.status() == FlowStatus::Active)
    }

    /// Returns the service with the given ID, if any.
    pub fn service(&self, id: ServiceId) -> Option<&Service> {
        self.services.get(&id)
    }

    /// Returns the edge server with the given ID, if any.
    pub fn server(&self, id: ServerId) -> Option<&EdgeServer> {
        self.servers.get(&id)
    }

    /// Returns the application with the given ID, if any.
    pub fn application(&self, id: AppId) -> Option<&Application> {
        self.applications.get(&id)
    }

    /// Returns the user with the given ID, if any.
    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    /// Produces the metrics snapshot for a packet, applying the delay SLA
    /// its user declared for the application, if any.
    pub fn collect(&self, id: PacketId) -> Option<PacketRecord> {
        let packet = self.packets.get(&id)?;
        let sla = self
            .users
            .get(&packet.user)
            .and_then(|u| u.delay_sla(packet.application));
        Some(packet.collect(sla))
    }

    /// Moves a service to a different server (or unplaces it with `None`).
    /// Packets currently processing on the old switch, and packets whose
    /// in-flight leg targets it, will drop; there is no rerouting.
    pub fn assign_service_server(&mut self, service: ServiceId, server: Option<ServerId>) {
        if let Some(new) = server {
            assert!(
                self.servers.contains_key(&new),
                "assign_service_server: unknown server {new}"
            );
        }
        let svc = self
            .services
            .get_mut(&service)
            .unwrap_or_else(|| panic!("assign_service_server: unknown service {service}"));
        let old = svc.server;
        svc.server = server;
        if let Some(old) = old {
            self.servers
                .get_mut(&old)
                .unwrap()
                .services
                .retain(|&s| s != service);
        }
        if let Some(new) = server {
            self.servers.get_mut(&new).unwrap().services.push(service);
        }
        log::debug!("service {service}: moved from {old:?} to {server:?}");
    }

    /// Generates and launches a packet for one of `user`'s applications,
    /// sized by the user's strategy and routed along the user's
    /// pre-computed communication paths.
    pub fn launch_packet(&mut self, user: UserId, app: AppId) -> Result<PacketId, PacketError> {
        let u = self.users.get(&user).ok_or(PacketError::UnknownUser(user))?;
        let application = self
            .applications
            .get(&app)
            .ok_or(PacketError::UnknownApplication(app))?;
        let path = u
            .communication_paths(app)
            .ok_or(PacketError::NoPathForApplication { user, app })?
            .clone();
        let strategy = u.strategy();
        validate_path(&self.topology, &path, application.services.len())?;
        let size = strategy.draw(&mut self.rng);
        let id = PacketId::new(self.next_packet_id);
        let packet = DataPacket::new(id, user, app, size, path)?;
        self.next_packet_id += 1;
        log::debug!("packet {id}: user {user} -> application {app}, size {size}");
        self.packets.insert(id, packet);
        self.launch_leg(id, self.now);
        Ok(id)
    }

    /// Advances the simulation by one tick.
    pub fn step(&mut self) {
        self.now += Ticks::ONE;
        self.step_packets();
        self.step_services();
        let allocations = self.allocate_bandwidth();
        self.step_flows(allocations);
        self.step_users();
    }

    /// Advances the simulation until it quiesces or `cap` is reached, and
    /// returns the final tick.
    pub fn run(&mut self, cap: Ticks) -> Ticks {
        while self.now < cap && !self.is_quiescent() {
            self.step();
        }
        self.now
    }

    /// Returns whether nothing remains to simulate: every user's access
    /// pattern is exhausted and every packet is terminal.
    pub fn is_quiescent(&self) -> bool {
        let users_done = self.users.values().all(|u| match &u.access {
            None => true,
            Some(pattern) => pattern.exhausted_by(self.now + Ticks::ONE),
        });
        users_done && self.packets.values().all(|p| p.status().is_terminal())
    }

    // Phase 1: processing countdowns and the migration validity check.
    fn step_packets(&mut self) {
        let ids = self.packets.keys().copied().sorted().collect::<Vec<_>>();
        for id in ids {
            let packet = &self.packets[&id];
            if packet.status != PacketStatus::Processing {
                continue;
            }
            let service_id = self.processing_service(packet);
            let processing_switch = packet
                .processing_switch
                .unwrap_or_else(|| panic!("packet {id}: processing without a switch"));
            // The hosting server may have moved since processing started.
            let service = &self.services[&service_id];
            let attached = service
                .server
                .is_some_and(|srv| self.servers[&srv].switch == processing_switch);
            if !attached {
                self.drop_packet(id, "server migrated away during processing");
                continue;
            }
            let packet = self.packets.get_mut(&id).unwrap();
            packet.processing_remaining_time -= Ticks::ONE;
            if packet.processing_remaining_time == Ticks::ZERO {
                self.finish_processing(id, service_id);
            }
        }
    }

    // Phase 2: services only observe; queue depth is surfaced for tracing.
    fn step_services(&self) {
        if log::log_enabled!(log::Level::Trace) {
            for id in self.services.keys().sorted() {
                log::trace!(
                    "service {id}: queue depth {}",
                    self.services[id].queue_depth()
                );
            }
        }
    }

    // Phase 3: max-min fair shares for every flow launched before this tick.
    fn allocate_bandwidth(&self) -> FxHashMap<FlowId, f64> {
        let demands = self
            .flows
            .values()
            .filter(|f| f.status() == FlowStatus::Active && f.start < self.now)
            .map(|f| Demand::new(f.id, vec![f.link]))
            .sorted_by_key(|d| d.flow)
            .collect::<Vec<_>>();
        fairness::max_min_allocations(&self.topology, &demands)
    }

    // Phase 4: flows consume their allocations; completions are applied to
    // the owning packets in flow-id order.
    fn step_flows(&mut self, mut allocations: FxHashMap<FlowId, f64>) {
        let ids = self
            .flows
            .values()
            .filter(|f| f.status() == FlowStatus::Active && f.start < self.now)
            .map(|f| f.id)
            .sorted()
            .collect::<Vec<_>>();
        for id in ids {
            let allocation = allocations.remove(&id);
            let flow = self.flows.get_mut(&id).unwrap();
            if flow.step(self.now, allocation) {
                self.on_flow_finished(id);
            }
        }
    }

    // Phase 5: access patterns trigger packet generation.
    fn step_users(&mut self) {
        let ids = self.users.keys().copied().sorted().collect::<Vec<_>>();
        for user in ids {
            let Some(pattern) = &self.users[&user].access else {
                continue;
            };
            if !pattern.fires_at(self.now) {
                continue;
            }
            let apps = self.users[&user].apps.clone();
            for app in apps {
                // Paths and strategies were validated when the world was
                // built, so a failure here is a programming error.
                self.launch_packet(user, app).unwrap_or_else(|err| {
                    panic!("user {user}: launching packet for application {app}: {err}")
                });
            }
        }
    }

    // The service processing the packet: the one the leg just travelled
    // to, i.e. the leg before `current_hop`.
    fn processing_service(&self, packet: &DataPacket) -> ServiceId {
        let app = &self.applications[&packet.application];
        assert!(
            packet.current_hop > 0 && packet.current_hop <= app.services.len(),
            "packet {}: processing at hop {} of {}-service application {}",
            packet.id,
            packet.current_hop,
            app.services.len(),
            packet.application,
        );
        app.services[packet.current_hop - 1]
    }

    // Starts the packet's current leg at `start`: a network flow, or a
    // same-switch processing stage when the leg has no transport.
    fn launch_leg(&mut self, id: PacketId, start: Ticks) {
        let packet = &self.packets[&id];
        let leg = &packet.total_path[packet.current_hop];
        if leg.len() == 1 || (leg.len() == 2 && leg[0] == leg[1]) {
            self.start_local_processing(id, start);
        } else {
            self.launch_flow(id, start);
        }
    }

    fn launch_flow(&mut self, id: PacketId, start: Ticks) {
        let packet = &self.packets[&id];
        let (hop, link) = (packet.current_hop, packet.current_link);
        let leg = &packet.total_path[hop];
        let source = leg[link];
        let target = leg[link + 1];
        let edge = self.topology.edge_between(source, target).unwrap_or_else(|| {
            panic!("packet {id}: no link between {source} and {target} (hop {hop}, link {link})")
        });
        let flow_id = FlowId::new(self.next_flow_id);
        self.next_flow_id += 1;
        let flow = NetworkFlow::new(
            flow_id,
            source,
            target,
            edge,
            start,
            packet.size.into_f64(),
            FlowMeta {
                packet: id,
                hop_index: hop,
                link_index: link,
            },
        );
        log::debug!(
            "flow {flow_id}: {source} -> {target} for packet {id} ({} to transfer)",
            packet.size
        );
        self.flows.insert(flow_id, flow);
        self.packets.get_mut(&id).unwrap().current_flow = Some(flow_id);
    }

    // A leg whose source switch already hosts the target service: no flow,
    // only the service's processing delay.
    fn start_local_processing(&mut self, id: PacketId, start: Ticks) {
        let packet = &self.packets[&id];
        let hop = packet.current_hop;
        let switch = packet.total_path[hop][0];
        let service_id = self.applications[&packet.application].services[hop];
        let service = &self.services[&service_id];
        let attached = service
            .server
            .is_some_and(|srv| self.servers[&srv].switch == switch);
        if !attached {
            self.drop_packet(id, "service not hosted at the user's switch");
            return;
        }
        let processing_time = service.processing_time;
        let output = service.processing_output;
        let record = LinkHop {
            hop_index: hop,
            link_index: 0,
            source: switch,
            target: switch,
            start_time: start,
            end_time: start + processing_time,
            queue_delay: Ticks::ZERO,
            transmission_delay: Ticks::ZERO,
            processing_delay: processing_time,
            propagation_delay: Ticks::ZERO,
            min_bandwidth: 0.0,
            max_bandwidth: 0.0,
            avg_bandwidth: 0.0,
            data_input: packet.size,
            data_output: output,
        };
        let packet = self.packets.get_mut(&id).unwrap();
        packet.push_hop(record);
        packet.current_hop = hop + 1;
        packet.current_link = 0;
        packet.status = PacketStatus::Processing;
        packet.is_processing = true;
        packet.processing_remaining_time = processing_time;
        packet.processing_switch = Some(switch);
        self.services.get_mut(&service_id).unwrap().enqueue(id);
    }

    fn on_flow_finished(&mut self, flow_id: FlowId) {
        let flow = self.flows[&flow_id].clone();
        let FlowMeta {
            packet: id,
            hop_index: hop,
            link_index: link,
        } = flow.meta;
        let end = flow.end.unwrap();
        let packet = &self.packets[&id];
        let leg = &packet.total_path[hop];
        assert!(
            link + 1 < leg.len(),
            "packet {id}: link index {link} out of range for leg {hop} (length {})",
            leg.len(),
        );
        let propagation = self.topology.link(flow.link).delay;
        log::debug!(
            "flow {flow_id}: finished at {end} ({} -> {})",
            flow.source,
            flow.target
        );

        if link + 1 < leg.len() - 1 {
            // An intermediate link within the leg: record the hop and move
            // on to the next link, contiguous with this flow's end.
            let record = LinkHop {
                hop_index: hop,
                link_index: link,
                source: flow.source,
                target: flow.target,
                start_time: flow.start,
                end_time: end,
                queue_delay: flow.queue_delay(),
                transmission_delay: flow.transmission_delay(),
                processing_delay: Ticks::ZERO,
                propagation_delay: propagation,
                min_bandwidth: flow.min_bandwidth(),
                max_bandwidth: flow.max_bandwidth(),
                avg_bandwidth: flow.avg_bandwidth(),
                data_input: packet.size,
                data_output: packet.size,
            };
            let packet = self.packets.get_mut(&id).unwrap();
            packet.push_hop(record);
            packet.current_link = link + 1;
            packet.current_flow = None;
            self.launch_flow(id, end);
            return;
        }

        // The last link of the leg: the packet arrives at the service's
        // switch and is handed over for processing.
        let dest = leg[link + 1];
        let service_id = self.applications[&packet.application].services[hop];
        let service = &self.services[&service_id];
        let attached = service
            .server
            .is_some_and(|srv| self.servers[&srv].switch == dest);
        if !attached {
            self.drop_packet(id, "service no longer hosted at the leg destination");
            return;
        }
        let processing_time = service.processing_time;
        let output = service.processing_output;
        let record = LinkHop {
            hop_index: hop,
            link_index: link,
            source: flow.source,
            target: flow.target,
            start_time: flow.start,
            end_time: flow.start + flow.queue_delay() + flow.transmission_delay() + processing_time,
            queue_delay: flow.queue_delay(),
            transmission_delay: flow.transmission_delay(),
            processing_delay: processing_time,
            propagation_delay: propagation,
            min_bandwidth: flow.min_bandwidth(),
            max_bandwidth: flow.max_bandwidth(),
            avg_bandwidth: flow.avg_bandwidth(),
            data_input: packet.size,
            data_output: output,
        };
        let packet = self.packets.get_mut(&id).unwrap();
        packet.push_hop(record);
        packet.current_flow = None;
        packet.current_hop = hop + 1;
        packet.current_link = 0;
        packet.status = PacketStatus::Processing;
        packet.is_processing = true;
        packet.processing_remaining_time = processing_time;
        packet.processing_switch = Some(dest);
        self.services.get_mut(&service_id).unwrap().enqueue(id);
    }

    fn finish_processing(&mut self, id: PacketId, service_id: ServiceId) {
        let output = self.services[&service_id].processing_output;
        self.services.get_mut(&service_id).unwrap().dequeue(id);
        let packet = self.packets.get_mut(&id).unwrap();
        packet.size = output;
        packet.is_processing = false;
        packet.processing_switch = None;
        if packet.current_hop < packet.total_path.len() {
            packet.status = PacketStatus::Active;
            self.launch_leg(id, self.now);
        } else {
            packet.status = PacketStatus::Finished;
            log::debug!("packet {id}: finished at {}", self.now);
        }
    }

    fn drop_packet(&mut self, id: PacketId, reason: &str) {
        let packet = self.packets.get_mut(&id).unwrap();
        packet.status = PacketStatus::Dropped;
        packet.is_processing = false;
        packet.processing_remaining_time = Ticks::ZERO;
        packet.processing_switch = None;
        packet.current_flow = None;
        for service in self.services.values_mut() {
            service.dequeue(id);
        }
        log::debug!("packet {id}: dropped at {} ({reason})", self.now);
    }
}

// A packet path must have one non-empty leg per application service, every
// leg switch must exist, and consecutive leg switches must be linked. A
// two-entry leg with equal endpoints is the no-transport form and is exempt
// from the adjacency check.
pub(crate) fn validate_path(
    topology: &Topology,
    path: &[Vec<SwitchId>],
    nr_services: usize,
) -> Result<(), PacketError> {
    if path.is_empty() {
        return Err(PacketError::EmptyPath);
    }
    if path.len() != nr_services {
        return Err(PacketError::LegCountMismatch {
            legs: path.len(),
            services: nr_services,
        });
    }
    for (hop, leg) in path.iter().enumerate() {
        if leg.is_empty() {
            return Err(PacketError::EmptyLeg { hop });
        }
        for &switch in leg {
            if !topology.contains(switch) {
                return Err(PacketError::UnknownSwitch { hop, switch });
            }
        }
        if leg.len() == 2 && leg[0] == leg[1] {
            continue;
        }
        for (&a, &b) in leg.iter().tuple_windows() {
            if topology.edge_between(a, b).is_none() {
                return Err(PacketError::NotAdjacent { hop, a, b });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Spec;
    use crate::testing;
    use crate::topology::Coordinates;
    use crate::units::Bytes;
    use crate::user::{AccessPattern, PacketSizeStrategy};

    fn one_shot_pattern() -> AccessPattern {
        AccessPattern::circular(Ticks::new(1), vec![Ticks::ONE], vec![Ticks::ONE])
            .with_repetitions(1)
    }

    // One service hosted at `switch`, one application, and users with the
    // given paths, all emitting a fixed-size-20 packet at tick 1.
    fn single_service_spec(switch: usize, paths: &[Vec<Vec<usize>>]) -> Spec {
        let (switches, links) = testing::grid_config();
        let server = EdgeServer::new(ServerId::new(0), SwitchId::new(switch));
        let service = Service::new(ServiceId::new(0), Ticks::new(5), Bytes::new(21))
            .hosted_by(ServerId::new(0));
        let app = Application::new(AppId::new(1), vec![ServiceId::new(0)]);
        let users = paths
            .iter()
            .enumerate()
            .map(|(i, legs)| {
                User::new(
                    UserId::new(i + 1),
                    Coordinates::default(),
                    PacketSizeStrategy::Fixed(Bytes::new(20)),
                )
                .attach_application(AppId::new(1), testing::path(legs))
                .with_access_pattern(one_shot_pattern())
            })
            .collect();
        Spec::builder()
            .switches(switches)
            .links(links)
            .servers(vec![server])
            .services(vec![service])
            .applications(vec![app])
            .users(users)
            .build()
    }

    fn assert_hop_accounting(packet: &DataPacket) {
        let hops = packet.hops();
        for pair in hops.windows(2) {
            assert_eq!(
                pair[0].end_time, pair[1].start_time,
                "hops are not contiguous"
            );
        }
        for hop in &hops {
            assert_eq!(
                hop.start_time + hop.queue_delay + hop.transmission_delay + hop.processing_delay,
                hop.end_time,
                "hop delays do not add up"
            );
        }
    }

    #[test_log::test]
    fn single_user_four_service_chain() -> anyhow::Result<()> {
        let mut world = testing::four_service_spec().validate()?;
        world.run(Ticks::new(100));

        let packet = world.packet(PacketId::new(0)).unwrap();
        assert_eq!(packet.status(), PacketStatus::Finished);
        assert_eq!(world.now(), Ticks::new(44));

        let hops = packet.hops();
        assert_eq!(hops.len(), 6);
        assert_eq!(
            hops[0],
            LinkHop {
                hop_index: 0,
                link_index: 0,
                source: SwitchId::new(1),
                target: SwitchId::new(2),
                start_time: Ticks::new(1),
                end_time: Ticks::new(8),
                queue_delay: Ticks::ZERO,
                transmission_delay: Ticks::new(2),
                processing_delay: Ticks::new(5),
                propagation_delay: Ticks::ONE,
                min_bandwidth: 10.0,
                max_bandwidth: 10.0,
                avg_bandwidth: 10.0,
                data_input: Bytes::new(20),
                data_output: Bytes::new(21),
            }
        );
        assert_eq!(
            hops[1],
            LinkHop {
                hop_index: 1,
                link_index: 0,
                source: SwitchId::new(2),
                target: SwitchId::new(4),
                start_time: Ticks::new(8),
                end_time: Ticks::new(17),
                queue_delay: Ticks::ZERO,
                transmission_delay: Ticks::new(3),
                processing_delay: Ticks::new(6),
                propagation_delay: Ticks::ONE,
                min_bandwidth: 10.0,
                max_bandwidth: 10.0,
                avg_bandwidth: 10.0,
                data_input: Bytes::new(21),
                data_output: Bytes::new(22),
            }
        );
        // The middle link of leg 2 carries no processing delay.
        assert_eq!(hops[2].processing_delay, Ticks::ZERO);
        assert_eq!(hops[2].data_input, hops[2].data_output);
        assert_eq!(hops[5].end_time, Ticks::new(44));

        assert_hop_accounting(packet);
        assert_eq!(packet.queue_delay_total(), Ticks::ZERO);
        assert_eq!(packet.transmission_delay_total(), Ticks::new(17));
        assert_eq!(packet.processing_delay_total(), Ticks::new(26));
        assert_eq!(packet.propagation_delay_total(), Ticks::new(6));
        // The total is exactly the sum of the four components.
        assert_eq!(
            packet.total_delay(),
            packet.queue_delay_total()
                + packet.transmission_delay_total()
                + packet.processing_delay_total()
                + packet.propagation_delay_total()
        );
        assert_eq!(packet.total_delay(), Ticks::new(49));
        assert_eq!(packet.size(), Bytes::new(24));
        Ok(())
    }

    #[test]
    fn transfer_hands_packet_to_the_service() -> anyhow::Result<()> {
        let mut world = testing::four_service_spec().validate()?;
        for _ in 0..3 {
            world.step();
        }
        let packet = world.packet(PacketId::new(0)).unwrap();
        assert_eq!(packet.status(), PacketStatus::Processing);
        assert!(packet.is_processing());
        assert_eq!(packet.processing_remaining_time(), Ticks::new(5));
        // Size only changes when processing completes.
        assert_eq!(packet.size(), Bytes::new(20));
        assert_eq!(packet.current_hop(), 1);
        assert_eq!(packet.current_link(), 0);
        assert_eq!(packet.hops().len(), 1);
        assert_eq!(packet.total_delay(), Ticks::new(8));
        let service = world.service(ServiceId::new(0)).unwrap();
        assert_eq!(service.processing_queue, vec![PacketId::new(0)]);
        Ok(())
    }

    #[test]
    fn exactly_one_active_flow_per_transferring_packet() -> anyhow::Result<()> {
        let mut world = testing::four_service_spec().validate()?;
        world.step();
        world.step();
        let packet = world.packet(PacketId::new(0)).unwrap();
        let current = packet.current_flow().unwrap();
        let referencing = world
            .active_flows()
            .filter(|f| f.meta.packet == packet.id)
            .collect::<Vec<_>>();
        assert_eq!(referencing.len(), 1);
        assert_eq!(referencing[0].id, current);
        Ok(())
    }

    #[test]
    fn bottleneck_link_splits_fairly_between_users() -> anyhow::Result<()> {
        // Both users funnel through (2, 5) to reach the service at switch 5.
        let mut world =
            single_service_spec(5, &[vec![vec![1, 2, 5]], vec![vec![3, 2, 5]]]).validate()?;
        world.run(Ticks::new(100));

        for id in [PacketId::new(0), PacketId::new(1)] {
            let packet = world.packet(id).unwrap();
            assert_eq!(packet.status(), PacketStatus::Finished);
            let hops = packet.hops();
            assert_eq!(hops.len(), 2);
            // Alone on the access link, fair-split on the shared one.
            assert_eq!(hops[0].min_bandwidth, 10.0);
            assert_eq!(hops[1].max_bandwidth, 5.0);
            assert_eq!(hops[1].transmission_delay, Ticks::new(4));
            assert_hop_accounting(packet);
        }
        Ok(())
    }

    #[test_log::test]
    fn migration_drops_processing_packet() -> anyhow::Result<()> {
        let mut world = testing::four_service_spec().validate()?;
        for _ in 0..5 {
            world.step();
        }
        // Packet 0 is processing at switch 2; server 1 sits at switch 4.
        assert_eq!(
            world.packet(PacketId::new(0)).unwrap().status(),
            PacketStatus::Processing
        );
        world.assign_service_server(ServiceId::new(0), Some(ServerId::new(1)));
        world.step();

        let packet = world.packet(PacketId::new(0)).unwrap();
        assert_eq!(packet.status(), PacketStatus::Dropped);
        assert!(!packet.is_processing());
        assert_eq!(world.service(ServiceId::new(0)).unwrap().queue_depth(), 0);

        // Dropping is terminal: no further hops or flows appear.
        let hops = packet.hops();
        let nr_flows = world.flows().count();
        for _ in 0..10 {
            world.step();
        }
        let packet = world.packet(PacketId::new(0)).unwrap();
        assert_eq!(packet.hops(), hops);
        assert_eq!(world.flows().count(), nr_flows);
        Ok(())
    }

    #[test]
    fn migration_drops_packet_at_flow_completion() -> anyhow::Result<()> {
        let mut world = testing::four_service_spec().validate()?;
        for _ in 0..10 {
            world.step();
        }
        // The leg-1 flow towards switch 4 is in flight; unplace its service.
        assert!(world.packet(PacketId::new(0)).unwrap().current_flow().is_some());
        world.assign_service_server(ServiceId::new(1), None);
        world.step();

        let packet = world.packet(PacketId::new(0)).unwrap();
        assert_eq!(packet.status(), PacketStatus::Dropped);
        assert!(packet.current_flow().is_none());
        // Only leg 0's hop was recorded; the aborted leg leaves none.
        assert_eq!(packet.hops().len(), 1);
        Ok(())
    }

    #[test]
    fn same_switch_leg_skips_the_network() -> anyhow::Result<()> {
        let mut world = single_service_spec(2, &[vec![vec![2, 2]]]).validate()?;
        world.run(Ticks::new(100));

        let packet = world.packet(PacketId::new(0)).unwrap();
        assert_eq!(packet.status(), PacketStatus::Finished);
        assert_eq!(world.flows().count(), 0);
        let hops = packet.hops();
        assert_eq!(
            hops,
            vec![LinkHop {
                hop_index: 0,
                link_index: 0,
                source: SwitchId::new(2),
                target: SwitchId::new(2),
                start_time: Ticks::new(1),
                end_time: Ticks::new(6),
                queue_delay: Ticks::ZERO,
                transmission_delay: Ticks::ZERO,
                processing_delay: Ticks::new(5),
                propagation_delay: Ticks::ZERO,
                min_bandwidth: 0.0,
                max_bandwidth: 0.0,
                avg_bandwidth: 0.0,
                data_input: Bytes::new(20),
                data_output: Bytes::new(21),
            }]
        );
        assert_eq!(packet.size(), Bytes::new(21));

        // A one-entry leg is the same thing.
        let mut world = single_service_spec(2, &[vec![vec![2]]]).validate()?;
        world.run(Ticks::new(100));
        assert_eq!(world.packet(PacketId::new(0)).unwrap().hops(), hops);
        Ok(())
    }

    #[test]
    fn link_allocations_respect_capacity_every_tick() -> anyhow::Result<()> {
        // Three users share the (2, 5) link towards the service at switch 5.
        let mut world = single_service_spec(
            5,
            &[vec![vec![1, 2, 5]], vec![vec![3, 2, 5]], vec![vec![2, 5]]],
        )
        .validate()?;
        for _ in 0..30 {
            world.step();
            let mut by_link: FxHashMap<_, f64> = FxHashMap::default();
            for flow in world.active_flows() {
                if let Some(last) = flow.bandwidth_history().last() {
                    *by_link.entry(flow.link).or_default() += last;
                }
            }
            for (&link, &total) in &by_link {
                let capacity = world.topology().link(link).bandwidth;
                assert!(
                    total <= capacity + 1e-9,
                    "link over capacity at {}: {total} > {capacity}",
                    world.now()
                );
            }
        }
        Ok(())
    }

    #[test]
    fn world_without_work_is_quiescent() -> anyhow::Result<()> {
        let (switches, links) = testing::grid_config();
        let mut world = Spec::builder()
            .switches(switches)
            .links(links)
            .build()
            .validate()?;
        assert!(world.is_quiescent());
        assert_eq!(world.run(Ticks::new(100)), Ticks::ZERO);
        Ok(())
    }

    #[test]
    fn run_honors_the_step_cap() -> anyhow::Result<()> {
        // An unbounded access pattern never quiesces; the cap stops the run.
        let mut spec = single_service_spec(5, &[vec![vec![1, 2, 5]]]);
        spec.users[0].access = Some(AccessPattern::circular(
            Ticks::new(1),
            vec![Ticks::ONE],
            vec![Ticks::ONE],
        ));
        let mut world = spec.validate()?;
        assert_eq!(world.run(Ticks::new(25)), Ticks::new(25));
        assert!(world.packets().count() > 5);
        Ok(())
    }

    #[test]
    fn manual_launch_validates_against_the_topology() -> anyhow::Result<()> {
        let mut world = testing::four_service_spec().validate()?;
        let err = world
            .launch_packet(UserId::new(9), AppId::new(1))
            .unwrap_err();
        assert!(matches!(err, PacketError::UnknownUser(..)));
        let err = world
            .launch_packet(UserId::new(1), AppId::new(9))
            .unwrap_err();
        assert!(matches!(err, PacketError::UnknownApplication(..)));
        Ok(())
    }

    #[test]
    fn collect_applies_the_users_sla() -> anyhow::Result<()> {
        let mut spec = testing::four_service_spec();
        spec.users[0].delay_sla.insert(AppId::new(1), Ticks::new(10));
        let mut world = spec.validate()?;
        world.run(Ticks::new(100));
        let record = world.collect(PacketId::new(0)).unwrap();
        assert_eq!(record.total_delay, Ticks::new(49));
        assert_eq!(record.sla_violated, Some(true));
        Ok(())
    }
}
