//! Per-interface Router Advertisement scheduling.
//!
//! Advertisements are paced by a single timer owned by the interface: a
//! short burst when the interface comes up, then the configured steady-state
//! interval. The transmit capability is re-read at every scheduling decision
//! since the link monitor can revoke it at any time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::config::InterfaceConfig;
use crate::metrics::Metrics;
use crate::packet::PacketRequest;
use crate::timer::Timer;

/// Advertisements sent back to back when an interface comes up (RFC 4861
/// MAX_INITIAL_RTR_ADVERTISEMENTS).
pub const MAX_INITIAL_RTR_ADVERTISEMENTS: u8 = 3;

/// Interval between advertisements of the bootstrap burst (RFC 4861
/// MAX_INITIAL_RTR_ADVERT_INTERVAL).
pub const MAX_INITIAL_RTR_ADVERT_INTERVAL: Duration = Duration::from_secs(16);

/// An NDP-enabled interface and its advertisement pacing state.
pub struct Interface<M> {
    if_index: u32,
    intf_ref: String,
    /// Steady-state advertisement interval once the bootstrap burst is done.
    ra_retransmit_time: Duration,
    /// Advertisements scheduled so far in the bootstrap burst.
    initial_ra_send: u8,
    ra_timer: Option<Timer>,
    /// Whether the interface can currently transmit. Flipped by the link
    /// monitor, re-read at every scheduling decision.
    tx: Arc<AtomicBool>,
    pkt_data_ch: mpsc::Sender<PacketRequest>,
    metrics: M,
}

impl<M> Interface<M>
where
    M: Metrics + Clone + Send + Sync + 'static,
{
    pub fn new(config: &InterfaceConfig, pkt_data_ch: mpsc::Sender<PacketRequest>, metrics: M) -> Self {
        Interface {
            if_index: config.if_index,
            intf_ref: config.intf_ref.clone(),
            ra_retransmit_time: Duration::from_secs(config.ra_retransmit_secs as u64),
            initial_ra_send: 0,
            ra_timer: None,
            tx: Arc::new(AtomicBool::new(true)),
            pkt_data_ch,
            metrics,
        }
    }

    pub fn if_index(&self) -> u32 {
        self.if_index
    }

    pub fn intf_ref(&self) -> &str {
        &self.intf_ref
    }

    /// Handle to the transmit capability flag, for the link state monitor.
    pub fn tx_flag(&self) -> Arc<AtomicBool> {
        self.tx.clone()
    }

    /// Whether the interface can currently put packets on the wire.
    pub fn tx_enabled(&self) -> bool {
        self.tx.load(Ordering::Relaxed)
    }

    pub fn set_tx_enabled(&self, enabled: bool) {
        self.tx.store(enabled, Ordering::Relaxed);
    }

    pub fn ra_timer_armed(&self) -> bool {
        self.ra_timer.is_some()
    }

    /// Advertisements scheduled so far in the bootstrap burst.
    pub fn initial_ra_send(&self) -> u8 {
        self.initial_ra_send
    }

    /// Schedule the next unsolicited Router Advertisement.
    ///
    /// Called on bring-up and again every time the previous advertisement
    /// went out. An interface without transmit capability tears the timer
    /// down instead; capability can be revoked at any time, so this is
    /// checked on every call, not only at creation.
    pub fn schedule_next_ra(&mut self) {
        if !self.tx_enabled() {
            self.stop_ra_timer();
            return;
        }
        match &self.ra_timer {
            Some(timer) => {
                if self.initial_ra_send < MAX_INITIAL_RTR_ADVERTISEMENTS {
                    timer.reset(MAX_INITIAL_RTR_ADVERT_INTERVAL);
                    self.initial_ra_send += 1;
                } else {
                    timer.reset(self.ra_retransmit_time);
                }
            }
            None => {
                trace!(
                    interface = %self.intf_ref,
                    "Arming router advertisement timer for bootstrap burst"
                );
                let pkt_data_ch = self.pkt_data_ch.clone();
                let metrics = self.metrics.clone();
                let if_index = self.if_index;
                let intf_ref = self.intf_ref.clone();
                self.ra_timer = Some(Timer::arm(
                    MAX_INITIAL_RTR_ADVERT_INTERVAL,
                    move || async move {
                        metrics.router_advertisement_requested();
                        if let Err(e) = pkt_data_ch
                            .send(PacketRequest::router_advertisement(if_index))
                            .await
                        {
                            error!(
                                interface = %intf_ref,
                                "Failed to hand advertisement request to transmit collaborator: {e}"
                            );
                        }
                    },
                ));
                self.initial_ra_send = 1;
            }
        }
    }

    /// Stop advertising. No-op when no advertisement is scheduled.
    pub fn stop_ra_timer(&mut self) {
        if self.ra_timer.take().is_some() {
            debug!(interface = %self.intf_ref, "Stopped router advertisement timer");
        }
    }

    /// Bring the interface (back) up: restore transmit capability and
    /// restart the advertisement burst from the beginning.
    pub fn link_up(&mut self) {
        self.set_tx_enabled(true);
        self.initial_ra_send = 0;
        self.stop_ra_timer();
        self.schedule_next_ra();
    }

    /// The link went away: advertisements stop until it comes back.
    pub fn link_down(&mut self) {
        self.set_tx_enabled(false);
        self.stop_ra_timer();
    }
}
