//! `edgesim` is a discrete-event simulator for edge-computing workloads. It
//! models data packets generated by mobile users traversing a network of
//! switches, competing for link bandwidth under max-min fairness, and being
//! processed by services pinned to edge servers, with every hop's queueing,
//! transmission, processing, and propagation delay attributed.

#![warn(unreachable_pub, missing_docs)]

pub mod core;
