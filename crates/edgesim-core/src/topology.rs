//! This module defines the switch-and-link network topology.

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use rustc_hash::FxHashMap;

use crate::service::ServerId;
use crate::units::Ticks;

identifier!(SwitchId, usize);

/// A position on the simulated map.
#[derive(Debug, Default, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

impl Coordinates {
    /// Creates a new coordinate pair.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A network switch. Edge servers attach to switches; the set of attached
/// servers is maintained by the [`World`](crate::world::World).
#[derive(Debug, Clone)]
pub struct Switch {
    pub id: SwitchId,
    pub coordinates: Coordinates,
    pub(crate) servers: Vec<ServerId>,
}

impl Switch {
    /// Creates a new switch at the given coordinates.
    pub fn new(id: SwitchId, coordinates: Coordinates) -> Self {
        Self {
            id,
            coordinates,
            servers: Vec::new(),
        }
    }

    /// Returns the edge servers attached to this switch.
    pub fn servers(&self) -> &[ServerId] {
        &self.servers
    }
}

/// A `Link` is a bidirectional channel between two adjacent switches with a
/// fixed bandwidth (units per tick) and propagation delay (ticks).
#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub a: SwitchId,
    pub b: SwitchId,
    pub bandwidth: f64,
    pub delay: Ticks,
}

impl Link {
    /// Creates a new link between `a` and `b`.
    pub fn new(a: SwitchId, b: SwitchId, bandwidth: f64, delay: Ticks) -> Self {
        Self {
            a,
            b,
            bandwidth,
            delay,
        }
    }
}

/// The network topology: an undirected graph of switches connected by links.
#[derive(Debug, Clone)]
pub struct Topology {
    pub(crate) graph: UnGraph<Switch, Link>,
    pub(crate) id2idx: FxHashMap<SwitchId, NodeIndex>,
    links: Vec<Link>,
}

impl Topology {
    /// Creates a topology from a list of switches and links. This function
    /// returns an error if the given specification fails to produce a valid
    /// topology.
    ///
    /// Correctness properties:
    ///
    /// - Every switch must have a unique ID.
    /// - Every link must have distinct endpoints declared in `switches`.
    /// - For any two switches, there must be at most one link between them.
    /// - Every link must have positive bandwidth.
    pub fn new(switches: &[Switch], links: &[Link]) -> Result<Self, TopologyError> {
        let mut g = UnGraph::new_undirected();
        let mut id2idx = FxHashMap::default();
        for s in switches.iter().cloned() {
            let id = s.id;
            let idx = g.add_node(s);
            if id2idx.insert(id, idx).is_some() {
                // CORRECTNESS: Every switch must have a unique ID.
                return Err(TopologyError::DuplicateSwitchId(id));
            }
        }
        for link in links.iter().copied() {
            let Link { a, b, bandwidth, .. } = link;
            // CORRECTNESS: Every link must have distinct endpoints in `switches`.
            if a == b {
                return Err(TopologyError::SwitchAdjacentSelf(a));
            }
            let &ia = id2idx.get(&a).ok_or(TopologyError::UndeclaredSwitch(a))?;
            let &ib = id2idx.get(&b).ok_or(TopologyError::UndeclaredSwitch(b))?;
            // CORRECTNESS: At most one link per unordered switch pair.
            if g.find_edge(ia, ib).is_some() {
                return Err(TopologyError::DuplicateLink { s1: a, s2: b });
            }
            if bandwidth <= 0.0 {
                return Err(TopologyError::NonPositiveBandwidth { s1: a, s2: b });
            }
            g.add_edge(ia, ib, link);
        }
        Ok(Self {
            graph: g,
            id2idx,
            links: Vec::from(links),
        })
    }

    /// Returns the switch with the given ID, if any.
    pub fn switch(&self, id: SwitchId) -> Option<&Switch> {
        self.id2idx.get(&id).map(|&idx| &self.graph[idx])
    }

    pub(crate) fn switch_mut(&mut self, id: SwitchId) -> Option<&mut Switch> {
        self.id2idx.get(&id).map(|&idx| &mut self.graph[idx])
    }

    /// Returns whether a switch with the given ID exists.
    pub fn contains(&self, id: SwitchId) -> bool {
        self.id2idx.contains_key(&id)
    }

    /// Returns the edge connecting two switches, if any.
    pub fn edge_between(&self, a: SwitchId, b: SwitchId) -> Option<EdgeIndex> {
        let &ia = self.id2idx.get(&a)?;
        let &ib = self.id2idx.get(&b)?;
        self.graph.find_edge(ia, ib)
    }

    /// Returns the link connecting two switches, if any.
    pub fn link_between(&self, a: SwitchId, b: SwitchId) -> Option<&Link> {
        self.edge_between(a, b).map(|eidx| &self.graph[eidx])
    }

    /// Returns the link weight at the given edge index.
    pub(crate) fn link(&self, eidx: EdgeIndex) -> &Link {
        &self.graph[eidx]
    }

    /// Returns an iterator over all switches.
    pub fn switches(&self) -> impl Iterator<Item = &Switch> {
        self.graph.node_weights()
    }

    delegate::delegate! {
        to self.links {
            /// Returns an iterator over all links.
            #[call(iter)]
            pub fn links(&self) -> impl Iterator<Item = &Link>;
        }

        to self.graph {
            /// Returns the number of links in the topology.
            #[call(edge_count)]
            pub fn nr_links(&self) -> usize;

            /// Returns the number of switches in the topology.
            #[call(node_count)]
            pub fn nr_switches(&self) -> usize;
        }
    }
}

/// An error type listing some of the reasons a topology is invalid.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// Duplicate switch ID.
    #[error("duplicate switch ID {0}")]
    DuplicateSwitchId(SwitchId),

    /// A switch is connected to itself.
    #[error("switch {0} is connected to itself")]
    SwitchAdjacentSelf(SwitchId),

    /// A switch is referenced by a link but does not exist.
    #[error("switch {0} is not declared")]
    UndeclaredSwitch(SwitchId),

    /// Duplicate link between two switches.
    #[error("duplicate links between {s1} and {s2}")]
    DuplicateLink {
        /// The first switch.
        s1: SwitchId,
        /// The second switch.
        s2: SwitchId,
    },

    /// A link with zero or negative bandwidth.
    #[error("link between {s1} and {s2} has non-positive bandwidth")]
    NonPositiveBandwidth {
        /// The first switch.
        s1: SwitchId,
        /// The second switch.
        s2: SwitchId,
    },
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;
    use crate::testing;

    #[test]
    fn empty_topology_succeeds() {
        assert!(
            Topology::new(&[], &[]).is_ok(),
            "failed to create empty topology"
        );
    }

    #[test]
    fn grid_topology_works() -> anyhow::Result<()> {
        let (switches, links) = testing::grid_config();
        let topo = Topology::new(&switches, &links).context("failed to create topology")?;
        assert_eq!(topo.nr_switches(), 9);
        assert_eq!(topo.nr_links(), 16);
        assert!(topo.edge_between(SwitchId::new(2), SwitchId::new(4)).is_some());
        assert!(topo.edge_between(SwitchId::new(1), SwitchId::new(9)).is_none());
        Ok(())
    }

    #[test]
    fn links_are_undirected() -> anyhow::Result<()> {
        let (switches, links) = testing::grid_config();
        let topo = Topology::new(&switches, &links)?;
        let fwd = topo.edge_between(SwitchId::new(5), SwitchId::new(8));
        let rev = topo.edge_between(SwitchId::new(8), SwitchId::new(5));
        assert_eq!(fwd, rev);
        Ok(())
    }

    #[test]
    fn duplicate_switch_fails() {
        let s1 = Switch::new(SwitchId::new(0), Coordinates::default());
        let s2 = Switch::new(SwitchId::new(0), Coordinates::default()); // error
        let res = Topology::new(&[s1, s2], &[]);
        assert!(matches!(res, Err(TopologyError::DuplicateSwitchId(..))));
    }

    #[test]
    fn switch_adjacent_self_fails() {
        let s1 = Switch::new(SwitchId::new(0), Coordinates::default());
        let s2 = Switch::new(SwitchId::new(1), Coordinates::default());
        let l1 = Link::new(s1.id, s1.id, 10.0, Ticks::ONE); // error
        let res = Topology::new(&[s1, s2], &[l1]);
        assert!(matches!(res, Err(TopologyError::SwitchAdjacentSelf(..))));
    }

    #[test]
    fn undeclared_switch_fails() {
        let s1 = Switch::new(SwitchId::new(0), Coordinates::default());
        let s2 = Switch::new(SwitchId::new(1), Coordinates::default());
        let l1 = Link::new(s1.id, SwitchId::new(7), 10.0, Ticks::ONE); // error
        let res = Topology::new(&[s1, s2], &[l1]);
        assert!(matches!(res, Err(TopologyError::UndeclaredSwitch(..))));
    }

    #[test]
    fn duplicate_link_fails() {
        let s1 = Switch::new(SwitchId::new(0), Coordinates::default());
        let s2 = Switch::new(SwitchId::new(1), Coordinates::default());
        let l1 = Link::new(s1.id, s2.id, 10.0, Ticks::ONE);
        let l2 = Link::new(s2.id, s1.id, 10.0, Ticks::ONE); // error
        let res = Topology::new(&[s1, s2], &[l1, l2]);
        assert!(matches!(res, Err(TopologyError::DuplicateLink { .. })));
    }

    #[test]
    fn non_positive_bandwidth_fails() {
        let s1 = Switch::new(SwitchId::new(0), Coordinates::default());
        let s2 = Switch::new(SwitchId::new(1), Coordinates::default());
        let l1 = Link::new(s1.id, s2.id, 0.0, Ticks::ONE); // error
        let res = Topology::new(&[s1, s2], &[l1]);
        assert!(matches!(
            res,
            Err(TopologyError::NonPositiveBandwidth { .. })
        ));
    }
}
