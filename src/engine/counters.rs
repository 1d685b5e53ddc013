// src/engine/counters.rs

/// Aggregate simulation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub alarm_events: u64,
    pub nodes_added: u64,
    pub nodes_deleted: u64,
    pub node_failures: u64,
    pub node_recoveries: u64,
    pub ping_requests: u64,
    pub cli_commands: u64,
}

/// Named accessor for one counter.
pub type CounterField = (&'static str, fn(&Counters) -> u64);

/// Display order of [`Counters`].
pub const FIELDS: &[CounterField] = &[
    ("AlarmEvents", |c| c.alarm_events),
    ("NodesAdded", |c| c.nodes_added),
    ("NodesDeleted", |c| c.nodes_deleted),
    ("NodeFailures", |c| c.node_failures),
    ("NodeRecoveries", |c| c.node_recoveries),
    ("PingRequests", |c| c.ping_requests),
    ("CliCommands", |c| c.cli_commands),
];

impl Counters {
    /// `(name, value)` pairs in table order.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        FIELDS.iter().map(move |(name, get)| (*name, get(self)))
    }
}
