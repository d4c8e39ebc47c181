//! Max-min fair bandwidth arbitration across the active flows of a tick.

use std::collections::BTreeMap;

use petgraph::graph::EdgeIndex;
use rustc_hash::FxHashMap;

use crate::flow::FlowId;
use crate::topology::Topology;

/// One flow's bandwidth demand: the links it occupies this tick.
#[derive(Debug, Clone)]
pub(crate) struct Demand {
    pub(crate) flow: FlowId,
    pub(crate) links: Vec<EdgeIndex>,
}

impl Demand {
    pub(crate) fn new(flow: FlowId, links: Vec<EdgeIndex>) -> Self {
        Self { flow, links }
    }
}

/// Computes a max-min fair allocation for the given demands.
///
/// Water-filling: repeatedly find the link with the minimum fair share
/// (residual capacity divided by the number of unsaturated flows crossing
/// it), grant that share to each of its flows, and subtract the grants from
/// every link those flows occupy. Ties are broken by ascending link index,
/// and flows saturate in ascending flow-id order, so the result is
/// deterministic for a given demand set.
///
/// POSTCONDITION: For every link, the sum of allocations of flows crossing
/// it never exceeds the link's bandwidth.
pub(crate) fn max_min_allocations(
    topology: &Topology,
    demands: &[Demand],
) -> FxHashMap<FlowId, f64> {
    let mut residual: BTreeMap<EdgeIndex, f64> = BTreeMap::new();
    let mut counts: BTreeMap<EdgeIndex, usize> = BTreeMap::new();
    for d in demands {
        for &e in &d.links {
            residual
                .entry(e)
                .or_insert_with(|| topology.link(e).bandwidth);
            *counts.entry(e).or_insert(0) += 1;
        }
    }

    let mut unsaturated: BTreeMap<FlowId, &[EdgeIndex]> =
        demands.iter().map(|d| (d.flow, d.links.as_slice())).collect();
    let mut allocations = FxHashMap::default();

    while !unsaturated.is_empty() {
        // The bottleneck is the link with the smallest fair share. Strict
        // comparison keeps the lowest link index on ties.
        let mut bottleneck: Option<(EdgeIndex, f64)> = None;
        for (&e, &n) in &counts {
            if n == 0 {
                continue;
            }
            let share = residual[&e] / n as f64;
            if bottleneck.map_or(true, |(_, s)| share < s) {
                bottleneck = Some((e, share));
            }
        }
        let Some((edge, share)) = bottleneck else {
            break;
        };
        let share = share.max(0.0);

        let saturated = unsaturated
            .iter()
            .filter(|(_, links)| links.contains(&edge))
            .map(|(&f, _)| f)
            .collect::<Vec<_>>();
        for flow in saturated {
            let links = unsaturated.remove(&flow).unwrap();
            allocations.insert(flow, share);
            for e in links {
                *counts.get_mut(e).unwrap() -= 1;
                let r = residual.get_mut(e).unwrap();
                *r = (*r - share).max(0.0);
            }
        }
    }
    allocations
}
