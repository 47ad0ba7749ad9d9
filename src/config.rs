//! Configuration and oper-state events handed to the engine by the
//! management layer.

use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

/// Default base of the reachable window, in minutes.
pub const REACHABLE_TIME_MINS_DEFAULT: u16 = 30;
/// Default interval between unicast probe retransmissions, in milliseconds
/// (RFC 4861 RetransTimer).
pub const RETRANS_TIME_MS_DEFAULT: u32 = 1000;
/// Default steady-state interval between unsolicited Router Advertisements,
/// in seconds (RFC 4861 MaxRtrAdvInterval).
pub const RA_RETRANSMIT_SECS_DEFAULT: u16 = 600;

/// Neighbor reachability timing, per interface.
///
/// Units follow RFC 4861: the reachable window is configured in minutes, the
/// probe retransmit interval in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachabilityConfig {
    /// Configured base of the reachable window, in minutes.
    pub reachable_time_mins: u16,
    /// Interval between unicast probe retransmissions, in milliseconds.
    pub retrans_time_ms: u32,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        ReachabilityConfig {
            reachable_time_mins: REACHABLE_TIME_MINS_DEFAULT,
            retrans_time_ms: RETRANS_TIME_MS_DEFAULT,
        }
    }
}

/// Per-interface configuration for neighbor discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub if_index: u32,
    /// Human readable interface reference, e.g. "eth0".
    pub intf_ref: String,
    /// Steady-state interval between unsolicited Router Advertisements, in
    /// seconds.
    pub ra_retransmit_secs: u16,
    #[serde(default)]
    pub reachability: ReachabilityConfig,
}

impl InterfaceConfig {
    pub fn new(if_index: u32, intf_ref: impl Into<String>) -> Self {
        InterfaceConfig {
            if_index,
            intf_ref: intf_ref.into(),
            ra_retransmit_secs: RA_RETRANSMIT_SECS_DEFAULT,
            reachability: ReachabilityConfig::default(),
        }
    }
}

/// Operational state of an interface as reported by the link monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperState {
    Up,
    Down,
}

/// Notification that an IPv6 interface changed operational state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ipv6IntfEvent {
    pub if_index: u32,
    pub ip_addr: Ipv6Addr,
    pub oper_state: OperState,
}
