//! IPv6 Neighbor Discovery neighbor-state engine.
//!
//! This crate is the neighbor-reachability core of a modular routing stack:
//! the per-neighbor RFC 4861 state machine with its timer set, the
//! per-interface Router Advertisement scheduler and the cache/dispatch layer
//! feeding them. The embedding daemon feeds decoded ICMPv6 events in and
//! drains packet requests out; packet capture, transmission, RPC and logging
//! bootstrap live elsewhere.
//!
//! The entry point is [`NdpServer`]: enable interfaces on it, hand it
//! decoded [`packet::NdpEvent`]s (directly or through a spawned dispatch
//! loop) and drain the returned packet request channels from the transmit
//! side.

pub mod config;
pub mod interface;
pub mod metrics;
pub mod neighbor;
pub mod packet;
pub mod server;
pub mod timer;

pub use server::{InterfaceExists, InterfaceNotFound, NdpServer};
