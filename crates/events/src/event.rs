use chrono::{DateTime, Utc};

/// A notification about something that has already been committed.
///
/// Events are facts: they are never edited after publication, and each type
/// carries a schema version so subscribers can tell layouts apart.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted type name, e.g. `"inventory.level.changed"`.
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Business time of the change, not publication time.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// `event_type` qualified with its schema version (`"inventory.level.changed.v1"`).
    fn topic(&self) -> String {
        format!("{}.v{}", self.event_type(), self.version())
    }
}
