//! Utilities for writing tests.

use crate::service::{AppId, Application, EdgeServer, ServerId, Service, ServiceId};
use crate::spec::Spec;
use crate::topology::{Coordinates, Link, Switch, SwitchId, Topology};
use crate::units::{Bytes, Ticks};
use crate::user::{AccessPattern, PacketSizeStrategy, User, UserId};

/// Generate a 3×3 hexagonal-mesh configuration: switches 1..=9 in three
/// rows, 16 links, all with bandwidth 10 and a 1-tick propagation delay.
pub(crate) fn grid_config() -> (Vec<Switch>, Vec<Link>) {
    let switches = (1..=9)
        .map(|i| {
            let row = (i - 1) / 3;
            let col = (i - 1) % 3;
            let x = col as f64 + if row == 1 { 0.5 } else { 0.0 };
            Switch::new(SwitchId::new(i), Coordinates::new(x, row as f64))
        })
        .collect::<Vec<_>>();
    let pairs = [
        // within rows
        (1, 2),
        (2, 3),
        (4, 5),
        (5, 6),
        (7, 8),
        (8, 9),
        // first to second row
        (1, 4),
        (2, 4),
        (2, 5),
        (3, 5),
        (3, 6),
        // second to third row
        (4, 7),
        (4, 8),
        (5, 8),
        (5, 9),
        (6, 9),
    ];
    let links = pairs
        .iter()
        .map(|&(a, b)| Link::new(SwitchId::new(a), SwitchId::new(b), 10.0, Ticks::ONE))
        .collect();
    (switches, links)
}

pub(crate) fn grid_topology() -> Topology {
    let (switches, links) = grid_config();
    Topology::new(&switches, &links).expect("grid config is valid")
}

/// The canonical four-service setup on the grid: servers 0..=3 at switches
/// {2, 4, 6, 8}, services 0..=3 with `processing_time = 5 + i` and
/// `processing_output = 21 + i`, one application chaining them, and user 1
/// at switch 1 emitting one fixed-size-20 packet at tick 1 along
/// `[[1,2], [2,4], [4,5,6], [6,5,8]]`.
pub(crate) fn four_service_spec() -> Spec {
    let (switches, links) = grid_config();
    let server_switches = [2, 4, 6, 8];
    let servers = server_switches
        .iter()
        .enumerate()
        .map(|(i, &s)| EdgeServer::new(ServerId::new(i), SwitchId::new(s)))
        .collect::<Vec<_>>();
    let services = (0..4)
        .map(|i| {
            Service::new(
                ServiceId::new(i),
                Ticks::new(5 + i as u64),
                Bytes::new(21 + i as u64),
            )
            .hosted_by(ServerId::new(i))
        })
        .collect::<Vec<_>>();
    let app = Application::new(AppId::new(1), (0..4).map(ServiceId::new).collect());
    let user = User::new(
        UserId::new(1),
        Coordinates::new(0.0, 0.0),
        PacketSizeStrategy::Fixed(Bytes::new(20)),
    )
    .attach_application(
        AppId::new(1),
        path(&[vec![1, 2], vec![2, 4], vec![4, 5, 6], vec![6, 5, 8]]),
    )
    .with_access_pattern(
        AccessPattern::circular(Ticks::new(1), vec![Ticks::ONE], vec![Ticks::ONE])
            .with_repetitions(1),
    );
    Spec::builder()
        .switches(switches)
        .links(links)
        .servers(servers)
        .services(services)
        .applications(vec![app])
        .users(vec![user])
        .build()
}

/// Builds a total path from raw switch ids.
pub(crate) fn path(legs: &[Vec<usize>]) -> Vec<Vec<SwitchId>> {
    legs.iter()
        .map(|leg| leg.iter().map(|&i| SwitchId::new(i)).collect())
        .collect()
}
