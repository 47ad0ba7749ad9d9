//! Runtime metrics of the neighbor discovery engine. The main item of
//! interest is the [`Metrics`] trait. Users can provide their own
//! implementation, or rely on the default method bodies to disable gathering
//! metrics.

/// The collection of metrics exported by the engine. All methods have a
/// default no-op implementation, so a user who is not interested in any
/// metrics can implement a NOOP handler as follows:
///
/// ```rust
/// use ndpd::metrics::Metrics;
///
/// #[derive(Clone)]
/// struct NoMetrics;
/// impl Metrics for NoMetrics {}
/// ```
pub trait Metrics {
    /// A decoded neighbor discovery event entered the engine.
    #[inline]
    fn ndp_event_received(&self) {}

    /// A Neighbor Solicitation request was handed to the transmit
    /// collaborator.
    #[inline]
    fn nbr_solicitation_requested(&self) {}

    /// A Router Advertisement request was handed to the transmit
    /// collaborator.
    #[inline]
    fn router_advertisement_requested(&self) {}

    /// A neighbor confirmed reachability and (re)entered the reachable
    /// window.
    #[inline]
    fn nbr_reachable_confirmed(&self) {}

    /// A reachable window lapsed and unicast probing started.
    #[inline]
    fn nbr_reachable_expired(&self) {}

    /// A neighbor exhausted its unicast probes without answering.
    #[inline]
    fn nbr_probes_exhausted(&self) {}

    /// A router lifetime ran out and the entry was invalidated.
    #[inline]
    fn nbr_invalidated(&self) {}

    /// A neighbor entry was added to the cache.
    #[inline]
    fn nbr_entry_added(&self) {}

    /// A neighbor entry was removed from the cache.
    #[inline]
    fn nbr_entry_removed(&self) {}

    /// The effective reachable base was recomputed with fresh jitter.
    #[inline]
    fn nbr_base_reachable_recomputed(&self) {}
}
