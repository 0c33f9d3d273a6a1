/// Running totals for one relay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayStats {
    /// Completed outer-loop passes.
    pub passes: usize,
    /// Topics this relay could not lock because another worker owned them.
    pub lock_skips: usize,
    /// Topics drained to empty and released.
    pub topics_drained: usize,
    /// Topics quarantined after an error.
    pub topic_errors: usize,
    pub batches: usize,
    pub messages_published: usize,
    pub messages_deleted: usize,
}
