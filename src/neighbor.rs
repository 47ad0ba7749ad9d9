//! Per-neighbor reachability tracking.
//!
//! Every discovered neighbor owns the timer set driving the
//! REACHABLE/STALE/DELAY/PROBE part of the RFC 4861 neighbor state machine.
//! Timer expiries and inbound packets race freely; all mutation funnels
//! through the record's internal lock so transitions are processed one at a
//! time per neighbor. Address resolution itself (the INCOMPLETE phase) is
//! handled elsewhere.

use std::fmt;
use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::config::ReachabilityConfig;
use crate::metrics::Metrics;
use crate::packet::{MacAddr, PacketRequest};
use crate::timer::Timer;

/// Grace period before the first unicast probe, giving upper-layer traffic a
/// chance to confirm reachability first (RFC 4861 DELAY_FIRST_PROBE_TIME).
pub const DELAY_FIRST_PROBE_TIME: Duration = Duration::from_secs(5);

/// Unicast probes sent before a neighbor is given up on (RFC 4861
/// MAX_UNICAST_SOLICIT).
pub const MAX_UNICAST_SOLICIT: u8 = 3;

/// Interval between recomputations of the jittered reachable base.
pub const RECOMPUTE_BASE_REACHABLE_TIMER: Duration = Duration::from_secs(2 * 60 * 60);

/// Lower jitter bound on the effective reachable time (RFC 4861
/// MIN_RANDOM_FACTOR).
pub const MIN_RANDOM_FACTOR: f64 = 0.5;
/// Upper jitter bound on the effective reachable time (RFC 4861
/// MAX_RANDOM_FACTOR).
pub const MAX_RANDOM_FACTOR: f64 = 1.5;

/// Reachability state of a neighbor, RFC 4861 section 7.3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NudState {
    /// Address resolution is still in progress; no link-layer address is
    /// known yet.
    Incomplete,
    /// The neighbor confirmed reachability within the current window.
    Reachable,
    /// The window lapsed; reachability is revalidated lazily on next use.
    Stale,
    /// About to probe, waiting for upper-layer traffic to confirm first.
    Delay,
    /// Actively soliciting the neighbor.
    Probe,
}

impl fmt::Display for NudState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NudState::Incomplete => "INCOMPLETE",
            NudState::Reachable => "REACHABLE",
            NudState::Stale => "STALE",
            NudState::Delay => "DELAY",
            NudState::Probe => "PROBE",
        };
        f.write_str(s)
    }
}

/// Key of a neighbor entry: the interface it was learned on and its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NeighborKey {
    pub if_index: u32,
    pub ip: Ipv6Addr,
}

impl fmt::Display for NeighborKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on interface {}", self.ip, self.if_index)
    }
}

/// Which timers a neighbor currently has armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub reachable: bool,
    pub retransmit: bool,
    pub delay_probe: bool,
    pub recompute: bool,
    pub invalidation: bool,
}

/// Point in time view of a neighbor entry, as exposed to the management
/// plane.
#[derive(Debug, Clone, Serialize)]
pub struct NeighborStats {
    pub if_index: u32,
    pub ip: Ipv6Addr,
    pub state: NudState,
    pub link_layer_addr: Option<MacAddr>,
    pub probes_sent: u8,
    pub base_reachable_time: Duration,
}

/// A single tracked neighbor.
///
/// This is a cheaply cloneable handle; timer callbacks hold clones of it, so
/// a record is only truly gone once [`Neighbor::stop_all_timers`] ran and
/// every handle is dropped.
pub struct Neighbor<M> {
    inner: Arc<NeighborInner<M>>,
}

impl<M> Clone for Neighbor<M> {
    fn clone(&self) -> Self {
        Neighbor {
            inner: self.inner.clone(),
        }
    }
}

struct NeighborInner<M> {
    key: NeighborKey,
    /// Requests for packets this neighbor wants on the wire, drained by the
    /// transmit collaborator.
    return_ch: mpsc::Sender<PacketRequest>,
    /// Where the record reports its own demise: router lifetime expiry or
    /// probe exhaustion. The owner drains this and removes the entry.
    expired_sink: mpsc::Sender<NeighborKey>,
    metrics: M,
    state: Mutex<NeighborState>,
}

struct NeighborState {
    nud: NudState,
    link_layer_addr: Option<MacAddr>,
    /// Unicast probes sent since probing started.
    probes_sent: u8,
    /// Effective reachable window, jittered from the configured value.
    base_reachable_time: Duration,
    /// Configured base of the reachable window.
    reachable_time_config: Duration,
    /// Configured probe retransmit interval.
    retrans_time_config: Duration,
    reachable_timer: Option<Timer>,
    retrans_timer: Option<Timer>,
    delay_probe_timer: Option<Timer>,
    recompute_timer: Option<Timer>,
    invalidation_timer: Option<Timer>,
}

impl NeighborState {
    fn stop_delay_probe(&mut self) {
        self.delay_probe_timer = None;
    }

    fn stop_retrans(&mut self) {
        self.retrans_timer = None;
    }
}

/// Jitter the configured reachable time into the effective base, uniformly
/// within [MIN_RANDOM_FACTOR, MAX_RANDOM_FACTOR] (RFC 4861 section 6.3.2).
fn compute_base_reachable_time(configured: Duration) -> Duration {
    let factor = rand::rng().random_range(MIN_RANDOM_FACTOR..=MAX_RANDOM_FACTOR);
    configured.mul_f64(factor)
}

impl<M> Neighbor<M> {
    pub fn key(&self) -> NeighborKey {
        self.inner.key
    }

    pub fn nud_state(&self) -> NudState {
        self.inner.state.lock().unwrap().nud
    }

    pub fn link_layer_addr(&self) -> Option<MacAddr> {
        self.inner.state.lock().unwrap().link_layer_addr
    }

    pub fn probes_sent(&self) -> u8 {
        self.inner.state.lock().unwrap().probes_sent
    }

    /// The effective reachable window currently in use.
    pub fn base_reachable_time(&self) -> Duration {
        self.inner.state.lock().unwrap().base_reachable_time
    }

    pub fn timers(&self) -> TimerSnapshot {
        let state = self.inner.state.lock().unwrap();
        TimerSnapshot {
            reachable: state.reachable_timer.is_some(),
            retransmit: state.retrans_timer.is_some(),
            delay_probe: state.delay_probe_timer.is_some(),
            recompute: state.recompute_timer.is_some(),
            invalidation: state.invalidation_timer.is_some(),
        }
    }

    pub fn stats(&self) -> NeighborStats {
        let state = self.inner.state.lock().unwrap();
        NeighborStats {
            if_index: self.inner.key.if_index,
            ip: self.inner.key.ip,
            state: state.nud,
            link_layer_addr: state.link_layer_addr,
            probes_sent: state.probes_sent,
            base_reachable_time: state.base_reachable_time,
        }
    }

    /// Stop the retransmit timer. No-op when it is not armed.
    pub fn stop_retrans_timer(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.retrans_timer.take().is_some() {
            trace!(neighbor = %self.inner.key, "Stopped retransmit timer");
        }
    }

    /// Stop the reachable timer. No-op when it is not armed.
    pub fn stop_reachable_timer(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.reachable_timer.take().is_some() {
            trace!(neighbor = %self.inner.key, "Stopped reachable timer");
        }
    }

    /// Stop the delay-probe timer. No-op when it is not armed.
    pub fn stop_delay_probe_timer(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.delay_probe_timer.take().is_some() {
            trace!(neighbor = %self.inner.key, "Stopped delay probe timer");
        }
    }

    /// Stop the base-reachable recompute timer. No-op when it is not armed.
    pub fn stop_recompute_timer(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.recompute_timer.take().is_some() {
            trace!(neighbor = %self.inner.key, "Stopped recompute timer");
        }
    }

    /// Stop the invalidation timer. No-op when it is not armed.
    pub fn stop_invalidation_timer(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.invalidation_timer.take().is_some() {
            trace!(neighbor = %self.inner.key, "Stopped invalidation timer");
        }
    }

    /// Tear down every timer owned by this record. This must run before the
    /// record is removed from the cache, so no expiry callback outlives it.
    pub fn stop_all_timers(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.reachable_timer = None;
        state.retrans_timer = None;
        state.delay_probe_timer = None;
        state.recompute_timer = None;
        state.invalidation_timer = None;
    }

    /// Reachability was reconfirmed externally: stop probing and reset the
    /// probe count.
    ///
    /// The reachable window is deliberately left alone; callers refresh it
    /// separately when the confirmation should restart it.
    pub fn update_probe(&self) {
        debug!(neighbor = %self.inner.key, "Clearing probe state");
        let mut state = self.inner.state.lock().unwrap();
        state.stop_delay_probe();
        state.stop_retrans();
        state.probes_sent = 0;
    }

    /// Record the neighbor's link-layer address.
    pub fn learn_link_layer(&self, mac: MacAddr) {
        let mut state = self.inner.state.lock().unwrap();
        state.link_layer_addr = Some(mac);
        if state.nud == NudState::Incomplete {
            state.nud = NudState::Stale;
        }
    }

    /// Apply the reachable/retransmit times advertised by a router, when set.
    ///
    /// Advertised values are in milliseconds (RFC 4861 section 4.2); zero
    /// means unspecified and leaves the configured value alone.
    pub fn apply_advertised_timings(&self, reachable_time_ms: u32, retrans_time_ms: u32) {
        let mut state = self.inner.state.lock().unwrap();
        if reachable_time_ms != 0 {
            state.reachable_time_config = Duration::from_millis(reachable_time_ms as u64);
            state.base_reachable_time = compute_base_reachable_time(state.reachable_time_config);
        }
        if retrans_time_ms != 0 {
            state.retrans_time_config = Duration::from_millis(retrans_time_ms as u64);
        }
    }
}

impl<M> Neighbor<M>
where
    M: Metrics + Send + Sync + 'static,
{
    pub fn new(
        key: NeighborKey,
        config: ReachabilityConfig,
        initial_state: NudState,
        link_layer_addr: Option<MacAddr>,
        return_ch: mpsc::Sender<PacketRequest>,
        expired_sink: mpsc::Sender<NeighborKey>,
        metrics: M,
    ) -> Self {
        let reachable_time_config = Duration::from_secs(config.reachable_time_mins as u64 * 60);
        let state = NeighborState {
            nud: initial_state,
            link_layer_addr,
            probes_sent: 0,
            base_reachable_time: compute_base_reachable_time(reachable_time_config),
            reachable_time_config,
            retrans_time_config: Duration::from_millis(config.retrans_time_ms as u64),
            reachable_timer: None,
            retrans_timer: None,
            delay_probe_timer: None,
            recompute_timer: None,
            invalidation_timer: None,
        };
        Neighbor {
            inner: Arc::new(NeighborInner {
                key,
                return_ch,
                expired_sink,
                metrics,
                state: Mutex::new(state),
            }),
        }
    }

    /// Process a confirmed advertisement from this neighbor: learn its
    /// link-layer address and restart the reachable window.
    pub fn confirm_reachable(&self, mac: Option<MacAddr>) {
        if let Some(mac) = mac {
            self.inner.state.lock().unwrap().link_layer_addr = Some(mac);
        }
        self.inner.metrics.nbr_reachable_confirmed();
        self.update_probe();
        self.start_reachable_timer();
    }

    /// Enter or refresh the reachable window.
    ///
    /// The delay-probe and retransmit timers are stopped no matter what,
    /// then the reachable timer is armed or reset to the current base.
    /// Expiry moves the neighbor straight into unicast probing.
    pub fn start_reachable_timer(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.stop_delay_probe();
        state.stop_retrans();
        state.nud = NudState::Reachable;
        let base = state.base_reachable_time;
        match &state.reachable_timer {
            Some(timer) => timer.reset(base),
            None => {
                trace!(neighbor = %self.inner.key, ?base, "Arming reachable timer");
                let nbr = self.clone();
                state.reachable_timer = Some(Timer::arm(base, move || async move {
                    nbr.reachable_expired().await;
                }));
            }
        }
    }

    /// Enter DELAY: give upper-layer traffic [`DELAY_FIRST_PROBE_TIME`] to
    /// confirm reachability before probing starts.
    pub fn start_delay_probe(&self) {
        let mut state = self.inner.state.lock().unwrap();
        match &state.delay_probe_timer {
            Some(timer) => {
                // Re-entering DELAY while already delaying is not an expected
                // transition.
                warn!(neighbor = %self.inner.key, "Delay probe timer already armed, resetting");
                timer.reset(DELAY_FIRST_PROBE_TIME);
            }
            None => {
                trace!(neighbor = %self.inner.key, "Arming delay probe timer");
                state.nud = NudState::Delay;
                let nbr = self.clone();
                state.delay_probe_timer =
                    Some(Timer::arm(DELAY_FIRST_PROBE_TIME, move || async move {
                        nbr.delay_probe_expired().await;
                    }));
            }
        }
    }

    /// Schedule a single future recomputation of the jittered reachable
    /// base. No-op when one is already scheduled.
    ///
    /// The expiry does not reschedule itself; the advertisement receipt path
    /// invokes this again, so recomputation recurs for as long as the router
    /// keeps advertising.
    pub fn schedule_reachable_recompute(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.recompute_timer.is_some() {
            return;
        }
        trace!(neighbor = %self.inner.key, "Arming base reachable recompute timer");
        let nbr = self.clone();
        state.recompute_timer = Some(Timer::arm(RECOMPUTE_BASE_REACHABLE_TIMER, move || {
            async move {
                nbr.recompute_base_reachable();
            }
        }));
    }

    /// Bound the entry's validity by the advertised router lifetime.
    ///
    /// A lifetime of zero expires immediately: the sender withdrew itself as
    /// a router.
    pub fn refresh_invalidation_timer(&self, lifetime: Duration) {
        let mut state = self.inner.state.lock().unwrap();
        match &state.invalidation_timer {
            Some(timer) => timer.reset(lifetime),
            None => {
                trace!(neighbor = %self.inner.key, ?lifetime, "Arming invalidation timer");
                let nbr = self.clone();
                state.invalidation_timer = Some(Timer::arm(lifetime, move || async move {
                    nbr.invalidation_expired().await;
                }));
            }
        }
    }

    /// The reachable window lapsed: move straight to PROBE and solicit.
    async fn reachable_expired(&self) {
        let request = {
            let mut state = self.inner.state.lock().unwrap();
            state.reachable_timer = None;
            debug!(neighbor = %self.inner.key, "Reachable timer expired, starting unicast probes");
            self.inner.metrics.nbr_reachable_expired();
            self.begin_probe(&mut state)
        };
        self.send_request(request).await;
    }

    /// The delay grace period lapsed without passive confirmation.
    async fn delay_probe_expired(&self) {
        let request = {
            let mut state = self.inner.state.lock().unwrap();
            state.delay_probe_timer = None;
            debug!(neighbor = %self.inner.key, "Delay probe timer expired, sending first unicast probe");
            self.begin_probe(&mut state)
        };
        self.send_request(request).await;
    }

    /// A probe went unanswered. Solicit again, or give the neighbor up after
    /// [`MAX_UNICAST_SOLICIT`] attempts.
    async fn retrans_expired(&self) {
        let request = {
            let mut state = self.inner.state.lock().unwrap();
            state.retrans_timer = None;
            if state.probes_sent >= MAX_UNICAST_SOLICIT {
                warn!(
                    neighbor = %self.inner.key,
                    probes = state.probes_sent,
                    "Unicast probes exhausted, giving up on neighbor"
                );
                self.inner.metrics.nbr_probes_exhausted();
                None
            } else {
                debug!(neighbor = %self.inner.key, "Retransmit timer expired, soliciting again");
                Some(self.begin_probe(&mut state))
            }
        };
        match request {
            Some(request) => self.send_request(request).await,
            None => self.report_expired().await,
        }
    }

    /// The router lifetime ran out; ask the owner to remove the entry.
    async fn invalidation_expired(&self) {
        self.inner.state.lock().unwrap().invalidation_timer = None;
        debug!(neighbor = %self.inner.key, "Router lifetime expired, requesting entry removal");
        self.inner.metrics.nbr_invalidated();
        self.report_expired().await;
    }

    /// Re-jitter the reachable base and stretch the current window to it.
    fn recompute_base_reachable(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.recompute_timer = None;
        state.base_reachable_time = compute_base_reachable_time(state.reachable_time_config);
        debug!(
            neighbor = %self.inner.key,
            base = ?state.base_reachable_time,
            "Recomputed base reachable time"
        );
        self.inner.metrics.nbr_base_reachable_recomputed();
        if let Some(timer) = &state.reachable_timer {
            timer.reset(state.base_reachable_time);
        }
    }

    /// Transition to PROBE: count the probe, (re)arm the retransmit timer
    /// and build the solicitation request for the caller to enqueue.
    fn begin_probe(&self, state: &mut NeighborState) -> PacketRequest {
        state.nud = NudState::Probe;
        state.probes_sent += 1;
        let retrans = state.retrans_time_config;
        match &state.retrans_timer {
            Some(timer) => timer.reset(retrans),
            None => {
                let nbr = self.clone();
                state.retrans_timer = Some(Timer::arm(retrans, move || async move {
                    nbr.retrans_expired().await;
                }));
            }
        }
        PacketRequest::neighbor_solicitation(
            self.inner.key.if_index,
            self.inner.key.ip,
            state.link_layer_addr,
        )
    }

    /// Enqueue a packet request for the transmit collaborator. The channel
    /// is drained on the transmit side; when it stalls, so do we.
    async fn send_request(&self, request: PacketRequest) {
        self.inner.metrics.nbr_solicitation_requested();
        if let Err(e) = self.inner.return_ch.send(request).await {
            error!(
                neighbor = %self.inner.key,
                "Failed to hand packet request to transmit collaborator: {e}"
            );
        }
    }

    /// Hand our key to the owner for removal from the cache.
    async fn report_expired(&self) {
        if let Err(e) = self.inner.expired_sink.send(self.inner.key).await {
            error!(neighbor = %e.0, "Failed to report expired neighbor for removal");
        }
    }
}

impl<M> fmt::Debug for Neighbor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neighbor")
            .field("key", &self.inner.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv6Addr;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::{
        compute_base_reachable_time, Neighbor, NeighborKey, NudState, MAX_RANDOM_FACTOR,
        MAX_UNICAST_SOLICIT, MIN_RANDOM_FACTOR,
    };
    use crate::config::ReachabilityConfig;
    use crate::metrics::Metrics;
    use crate::packet::{MacAddr, PacketRequest, SendPacketType};

    #[derive(Clone)]
    struct NoMetrics;
    impl Metrics for NoMetrics {}

    const TEST_MAC: MacAddr = MacAddr([2, 0, 0, 0, 0, 1]);

    fn test_neighbor() -> (
        Neighbor<NoMetrics>,
        mpsc::Receiver<PacketRequest>,
        mpsc::Receiver<NeighborKey>,
    ) {
        let (return_ch, packets) = mpsc::channel(1);
        let (expired_sink, expired) = mpsc::channel(1);
        let key = NeighborKey {
            if_index: 1,
            ip: Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x10),
        };
        let config = ReachabilityConfig {
            reachable_time_mins: 1,
            retrans_time_ms: 1000,
        };
        let neighbor = Neighbor::new(
            key,
            config,
            NudState::Stale,
            Some(TEST_MAC),
            return_ch,
            expired_sink,
            NoMetrics,
        );
        (neighbor, packets, expired)
    }

    #[test]
    fn jittered_base_stays_within_bounds() {
        let configured = Duration::from_secs(600);
        for _ in 0..1000 {
            let base = compute_base_reachable_time(configured);
            assert!(base >= configured.mul_f64(MIN_RANDOM_FACTOR));
            assert!(base <= configured.mul_f64(MAX_RANDOM_FACTOR));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_arms_only_the_reachable_timer() {
        let (neighbor, _packets, _expired) = test_neighbor();

        assert!(!neighbor.timers().reachable);
        neighbor.confirm_reachable(Some(TEST_MAC));

        let timers = neighbor.timers();
        assert!(timers.reachable);
        assert!(!timers.retransmit);
        assert!(!timers.delay_probe);
        assert_eq!(neighbor.nud_state(), NudState::Reachable);
        assert_eq!(neighbor.probes_sent(), 0);

        // The effective base is jittered from the 1 minute config.
        let base = neighbor.base_reachable_time();
        assert!(base >= Duration::from_secs(30) && base <= Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn reachable_expiry_emits_one_probe_and_arms_retransmit() {
        let (neighbor, mut packets, _expired) = test_neighbor();
        neighbor.confirm_reachable(Some(TEST_MAC));

        let request = packets.recv().await.expect("solicitation on expiry");
        assert_eq!(request.kind, SendPacketType::NeighborSolicitation);
        assert_eq!(request.neighbor_ip, Some(neighbor.key().ip));
        assert_eq!(request.neighbor_mac, Some(TEST_MAC));

        let timers = neighbor.timers();
        assert!(!timers.reachable);
        assert!(timers.retransmit);
        assert!(!timers.delay_probe);
        assert_eq!(neighbor.nud_state(), NudState::Probe);
        assert_eq!(neighbor.probes_sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn probes_retransmit_until_exhaustion() {
        let (neighbor, mut packets, mut expired) = test_neighbor();
        neighbor.confirm_reachable(Some(TEST_MAC));

        for _ in 0..MAX_UNICAST_SOLICIT {
            let request = packets.recv().await.expect("solicitation");
            assert_eq!(request.kind, SendPacketType::NeighborSolicitation);
        }

        // The fourth expiry gives the neighbor up instead of probing again.
        let key = expired.recv().await.expect("expiry report");
        assert_eq!(key, neighbor.key());
        assert_eq!(neighbor.probes_sent(), MAX_UNICAST_SOLICIT);

        let timers = neighbor.timers();
        assert!(!timers.reachable);
        assert!(!timers.retransmit);
        assert!(!timers.delay_probe);
        assert!(packets.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_probe_fires_after_grace_period() {
        let (neighbor, mut packets, _expired) = test_neighbor();
        let start = tokio::time::Instant::now();

        neighbor.start_delay_probe();
        assert_eq!(neighbor.nud_state(), NudState::Delay);
        let timers = neighbor.timers();
        assert!(timers.delay_probe);
        assert!(!timers.reachable && !timers.retransmit);

        let request = packets.recv().await.expect("first probe");
        assert_eq!(start.elapsed(), super::DELAY_FIRST_PROBE_TIME);
        assert_eq!(request.kind, SendPacketType::NeighborSolicitation);
        assert_eq!(neighbor.nud_state(), NudState::Probe);
        assert_eq!(neighbor.probes_sent(), 1);
        assert!(neighbor.timers().retransmit);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_probe_reentry_resets_the_grace_period() {
        let (neighbor, mut packets, _expired) = test_neighbor();
        let start = tokio::time::Instant::now();

        neighbor.start_delay_probe();
        tokio::time::advance(Duration::from_secs(2)).await;
        neighbor.start_delay_probe();

        packets.recv().await.expect("first probe");
        assert_eq!(
            start.elapsed(),
            Duration::from_secs(2) + super::DELAY_FIRST_PROBE_TIME
        );
    }

    #[tokio::test(start_paused = true)]
    async fn update_probe_clears_probe_state() {
        let (neighbor, mut packets, _expired) = test_neighbor();
        neighbor.confirm_reachable(Some(TEST_MAC));

        // Let probing start so both a probe count and a retransmit timer
        // exist.
        packets.recv().await.expect("solicitation");
        assert_eq!(neighbor.probes_sent(), 1);
        assert!(neighbor.timers().retransmit);

        neighbor.update_probe();
        assert_eq!(neighbor.probes_sent(), 0);
        let timers = neighbor.timers();
        assert!(!timers.retransmit);
        assert!(!timers.delay_probe);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_an_absent_timer_is_idempotent() {
        let (neighbor, _packets, _expired) = test_neighbor();

        neighbor.stop_retrans_timer();
        neighbor.stop_retrans_timer();
        neighbor.stop_reachable_timer();
        neighbor.stop_delay_probe_timer();
        neighbor.stop_recompute_timer();
        neighbor.stop_invalidation_timer();

        let timers = neighbor.timers();
        assert!(!timers.reachable);
        assert!(!timers.retransmit);
        assert!(!timers.delay_probe);
        assert!(!timers.recompute);
        assert!(!timers.invalidation);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_lifetime_invalidates_immediately() {
        let (neighbor, _packets, mut expired) = test_neighbor();

        neighbor.refresh_invalidation_timer(Duration::ZERO);
        let key = expired.recv().await.expect("expiry report");
        assert_eq!(key, neighbor.key());
        assert!(!neighbor.timers().invalidation);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_refresh_extends_the_lifetime() {
        let (neighbor, _packets, mut expired) = test_neighbor();
        let start = tokio::time::Instant::now();

        neighbor.refresh_invalidation_timer(Duration::from_secs(30));
        tokio::time::advance(Duration::from_secs(20)).await;
        neighbor.refresh_invalidation_timer(Duration::from_secs(30));

        expired.recv().await.expect("expiry report");
        assert_eq!(start.elapsed(), Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn recompute_rejitters_within_bounds_and_does_not_rearm() {
        let (neighbor, _packets, _expired) = test_neighbor();
        neighbor.confirm_reachable(Some(TEST_MAC));
        neighbor.schedule_reachable_recompute();
        assert!(neighbor.timers().recompute);

        // Scheduling again while armed is a no-op.
        neighbor.schedule_reachable_recompute();

        tokio::time::advance(super::RECOMPUTE_BASE_REACHABLE_TIMER).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        let base = neighbor.base_reachable_time();
        assert!(base >= Duration::from_secs(30) && base <= Duration::from_secs(90));
        // One-shot: the callback does not reschedule itself.
        assert!(!neighbor.timers().recompute);
    }

    #[tokio::test(start_paused = true)]
    async fn advertised_reachable_time_overrides_the_config() {
        let (neighbor, _packets, _expired) = test_neighbor();

        // A router advertising a 60 second reachable time replaces the
        // 1 minute static config as the jitter base.
        neighbor.apply_advertised_timings(60_000, 0);
        let base = neighbor.base_reachable_time();
        assert!(base >= Duration::from_secs(30) && base <= Duration::from_secs(90));

        // An advertisement of 10 minutes moves the base out of the old
        // bounds entirely.
        neighbor.apply_advertised_timings(600_000, 0);
        let base = neighbor.base_reachable_time();
        assert!(base >= Duration::from_secs(300) && base <= Duration::from_secs(900));
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_probing_timer_is_armed() {
        let (neighbor, mut packets, _expired) = test_neighbor();

        let armed = |n: &Neighbor<NoMetrics>| {
            let t = n.timers();
            [t.reachable, t.retransmit, t.delay_probe]
                .iter()
                .filter(|armed| **armed)
                .count()
        };

        assert_eq!(armed(&neighbor), 0);
        neighbor.start_delay_probe();
        assert_eq!(armed(&neighbor), 1);
        neighbor.confirm_reachable(Some(TEST_MAC));
        assert_eq!(armed(&neighbor), 1);
        packets.recv().await.expect("solicitation");
        assert_eq!(armed(&neighbor), 1);
    }
}
