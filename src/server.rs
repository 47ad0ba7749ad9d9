//! The neighbor discovery engine: neighbor cache, interface table and event
//! dispatch.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::{InterfaceConfig, Ipv6IntfEvent, OperState, ReachabilityConfig};
use crate::interface::Interface;
use crate::metrics::Metrics;
use crate::neighbor::{Neighbor, NeighborKey, NeighborStats, NudState};
use crate::packet::{
    MacAddr, NdpEvent, NeighborAdvert, NeighborSolicit, PacketRequest, RouterAdvert,
};

/// Capacity of the outbound packet channels. Sends block until the transmit
/// collaborator drains them, so a stalled consumer stalls the producing
/// state machine rather than dropping requests.
const PACKET_CHANNEL_SIZE: usize = 1;

/// Marker error for enabling neighbor discovery on an interface twice.
#[derive(Debug)]
pub struct InterfaceExists;

impl fmt::Display for InterfaceExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Neighbor discovery already enabled on interface")
    }
}

impl std::error::Error for InterfaceExists {}

/// Marker error for operations on an interface neighbor discovery is not
/// enabled on.
#[derive(Debug)]
pub struct InterfaceNotFound;

impl fmt::Display for InterfaceNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Neighbor discovery not enabled on interface")
    }
}

impl std::error::Error for InterfaceNotFound {}

/// The neighbor discovery engine. Owns every neighbor record and interface;
/// clones share the same state.
pub struct NdpServer<M> {
    inner: Arc<ServerInner<M>>,
}

impl<M> Clone for NdpServer<M> {
    fn clone(&self) -> Self {
        NdpServer {
            inner: self.inner.clone(),
        }
    }
}

struct ServerInner<M> {
    neighbors: DashMap<NeighborKey, Neighbor<M>, ahash::RandomState>,
    interfaces: Mutex<HashMap<u32, InterfaceInfo<M>>>,
    /// Sender half of the expiry channel, handed to every neighbor record.
    expired_sink: mpsc::Sender<NeighborKey>,
    metrics: M,
}

struct InterfaceInfo<M> {
    interface: Interface<M>,
    /// Reachability timing handed to neighbor records learned on this
    /// interface.
    reachability: ReachabilityConfig,
    /// Sender half of the interface's outbound packet channel.
    pkt_out: mpsc::Sender<PacketRequest>,
}

impl<M> NdpServer<M>
where
    M: Metrics + Clone + Send + Sync + 'static,
{
    /// Create a new engine and spawn its expiry processing task.
    ///
    /// # Panics
    ///
    /// This will panic if not executed in the context of a tokio runtime.
    pub fn new(metrics: M) -> Self {
        let (expired_sink, expired_stream) = mpsc::channel(1);
        let server = NdpServer {
            inner: Arc::new(ServerInner {
                neighbors: DashMap::with_hasher(ahash::RandomState::new()),
                interfaces: Mutex::new(HashMap::new()),
                expired_sink,
                metrics,
            }),
        };

        tokio::spawn(server.clone().process_expired_neighbors(expired_stream));

        server
    }

    /// Remove neighbor entries which ran out their router lifetime or
    /// exhausted their probes.
    async fn process_expired_neighbors(self, mut expired_stream: mpsc::Receiver<NeighborKey>) {
        while let Some(key) = expired_stream.recv().await {
            debug!(neighbor = %key, "Removing expired neighbor entry");
            self.remove_neighbor(key);
        }
    }

    /// Enable neighbor discovery on an interface. Advertising starts
    /// immediately with the bootstrap burst.
    ///
    /// Returns the receiver half of the interface's outbound packet channel,
    /// to be drained by the transmit collaborator.
    pub fn enable_interface(
        &self,
        config: InterfaceConfig,
    ) -> Result<mpsc::Receiver<PacketRequest>, InterfaceExists> {
        let mut interfaces = self.inner.interfaces.lock().unwrap();
        if interfaces.contains_key(&config.if_index) {
            return Err(InterfaceExists);
        }
        let (pkt_out, pkt_in) = mpsc::channel(PACKET_CHANNEL_SIZE);
        let mut interface = Interface::new(&config, pkt_out.clone(), self.inner.metrics.clone());
        interface.schedule_next_ra();
        info!(
            interface = %config.intf_ref,
            if_index = config.if_index,
            "Enabled neighbor discovery"
        );
        interfaces.insert(
            config.if_index,
            InterfaceInfo {
                interface,
                reachability: config.reachability,
                pkt_out,
            },
        );
        Ok(pkt_in)
    }

    /// Disable neighbor discovery on an interface: stop advertising and drop
    /// every neighbor learned on it, stopping their timers first.
    pub fn disable_interface(&self, if_index: u32) -> Result<(), InterfaceNotFound> {
        let mut info = {
            let mut interfaces = self.inner.interfaces.lock().unwrap();
            interfaces.remove(&if_index).ok_or(InterfaceNotFound)?
        };
        info.interface.stop_ra_timer();
        self.inner.neighbors.retain(|key, neighbor| {
            if key.if_index == if_index {
                neighbor.stop_all_timers();
                self.inner.metrics.nbr_entry_removed();
                false
            } else {
                true
            }
        });
        info!(if_index, "Disabled neighbor discovery");
        Ok(())
    }

    /// The transmit collaborator put the previous advertisement on the
    /// wire; pace the next one.
    pub fn advertisement_sent(&self, if_index: u32) -> Result<(), InterfaceNotFound> {
        let mut interfaces = self.inner.interfaces.lock().unwrap();
        let info = interfaces.get_mut(&if_index).ok_or(InterfaceNotFound)?;
        info.interface.schedule_next_ra();
        Ok(())
    }

    /// Link state change from the link monitor.
    pub fn set_link_state(&self, if_index: u32, up: bool) -> Result<(), InterfaceNotFound> {
        let mut interfaces = self.inner.interfaces.lock().unwrap();
        let info = interfaces.get_mut(&if_index).ok_or(InterfaceNotFound)?;
        if up {
            info.interface.link_up();
        } else {
            info.interface.link_down();
        }
        Ok(())
    }

    /// IPv6 oper-state notification from the management layer.
    pub fn handle_intf_event(&self, event: &Ipv6IntfEvent) -> Result<(), InterfaceNotFound> {
        debug!(
            if_index = event.if_index,
            ip = %event.ip_addr,
            state = ?event.oper_state,
            "Interface oper state change"
        );
        match event.oper_state {
            OperState::Up => self.set_link_state(event.if_index, true),
            OperState::Down => self.set_link_state(event.if_index, false),
        }
    }

    /// Spawn the dispatch loop for an interface, draining decoded events
    /// from the capture collaborator. The loop ends when the sender half is
    /// dropped.
    pub fn spawn_dispatch(&self, if_index: u32, mut events: mpsc::Receiver<NdpEvent>) {
        let server = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event.if_index() != if_index {
                    warn!(
                        if_index,
                        event_if_index = event.if_index(),
                        "Dropping event for foreign interface"
                    );
                    continue;
                }
                server.handle_event(event);
            }
            trace!(if_index, "Event channel closed, dispatch loop done");
        });
    }

    /// Feed one decoded neighbor discovery event through the state machine.
    pub fn handle_event(&self, event: NdpEvent) {
        self.inner.metrics.ndp_event_received();
        match event {
            NdpEvent::RouterAdvertisement(ra) => self.handle_router_advertisement(ra),
            NdpEvent::NeighborSolicitation(ns) => self.handle_neighbor_solicitation(ns),
            NdpEvent::NeighborAdvertisement(na) => self.handle_neighbor_advertisement(na),
        }
    }

    fn handle_router_advertisement(&self, ra: RouterAdvert) {
        let Some(neighbor) = self.get_or_create(ra.if_index, ra.src_ip, ra.src_mac, NudState::Stale)
        else {
            return;
        };
        neighbor.apply_advertised_timings(ra.reachable_time, ra.retrans_time);
        neighbor.confirm_reachable(ra.src_mac);
        neighbor.refresh_invalidation_timer(Duration::from_secs(ra.router_lifetime as u64));
        neighbor.schedule_reachable_recompute();
    }

    fn handle_neighbor_solicitation(&self, ns: NeighborSolicit) {
        // A solicitation proves the neighbor exists, not that it is
        // reachable.
        let initial = if ns.src_mac.is_some() {
            NudState::Stale
        } else {
            NudState::Incomplete
        };
        let Some(neighbor) = self.get_or_create(ns.if_index, ns.src_ip, ns.src_mac, initial) else {
            return;
        };
        if let Some(mac) = ns.src_mac {
            neighbor.learn_link_layer(mac);
        }
    }

    fn handle_neighbor_advertisement(&self, na: NeighborAdvert) {
        let Some(neighbor) = self.get_or_create(na.if_index, na.target, na.mac, NudState::Stale)
        else {
            return;
        };
        if na.solicited {
            neighbor.confirm_reachable(na.mac);
        } else if let Some(mac) = na.mac {
            // Unsolicited advertisements update the link-layer address but
            // do not confirm reachability.
            neighbor.learn_link_layer(mac);
        }
    }

    fn get_or_create(
        &self,
        if_index: u32,
        ip: Ipv6Addr,
        mac: Option<MacAddr>,
        initial: NudState,
    ) -> Option<Neighbor<M>> {
        let key = NeighborKey { if_index, ip };
        if let Some(existing) = self.inner.neighbors.get(&key) {
            return Some(existing.clone());
        }
        let (reachability, pkt_out) = {
            let interfaces = self.inner.interfaces.lock().unwrap();
            match interfaces.get(&if_index) {
                Some(info) => (info.reachability, info.pkt_out.clone()),
                None => {
                    warn!(
                        %ip,
                        if_index,
                        "Ignoring event for interface without neighbor discovery"
                    );
                    return None;
                }
            }
        };
        let neighbor = self
            .inner
            .neighbors
            .entry(key)
            .or_insert_with(|| {
                debug!(neighbor = %key, state = %initial, "Learned new neighbor");
                self.inner.metrics.nbr_entry_added();
                Neighbor::new(
                    key,
                    reachability,
                    initial,
                    mac,
                    pkt_out,
                    self.inner.expired_sink.clone(),
                    self.inner.metrics.clone(),
                )
            })
            .value()
            .clone();
        Some(neighbor)
    }

    /// Remove a neighbor entry, stopping its timers first. No-op for an
    /// unknown key.
    pub fn remove_neighbor(&self, key: NeighborKey) {
        if let Some((_, neighbor)) = self.inner.neighbors.remove(&key) {
            neighbor.stop_all_timers();
            self.inner.metrics.nbr_entry_removed();
        }
    }

    /// Snapshot of a single neighbor entry, for the management plane.
    pub fn neighbor(&self, key: &NeighborKey) -> Option<NeighborStats> {
        self.inner.neighbors.get(key).map(|n| n.stats())
    }

    /// Snapshots of all tracked neighbors.
    pub fn neighbors(&self) -> Vec<NeighborStats> {
        self.inner
            .neighbors
            .iter()
            .map(|entry| entry.value().stats())
            .collect()
    }
}
