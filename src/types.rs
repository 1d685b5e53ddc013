use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Numeric identity of a simulated node (and of its device process).
pub type NodeId = i32;

/// Device role requested by `add`.
///
/// - `Router`: full thread device, rx-on-when-idle, router eligible.
/// - `Fed`: full end device; same radio mode as a router but never upgrades.
/// - `Med`: minimal end device, rx-on-when-idle.
/// - `Sed`: sleepy end device, rx-off-when-idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Router,
    Fed,
    Med,
    Sed,
}

impl NodeType {
    /// Device-shell `mode` string for this role.
    pub fn mode(self) -> &'static str {
        match self {
            NodeType::Router | NodeType::Fed => "rdn",
            NodeType::Med => "rn",
            NodeType::Sed => "n",
        }
    }

    pub fn is_router_eligible(self) -> bool {
        matches!(self, NodeType::Router)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeType::Router => "router",
            NodeType::Fed => "fed",
            NodeType::Med => "med",
            NodeType::Sed => "sed",
        };
        f.write_str(s)
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "router" => Ok(NodeType::Router),
            "fed" => Ok(NodeType::Fed),
            "med" => Ok(NodeType::Med),
            "sed" => Ok(NodeType::Sed),
            other => Err(format!(
                "wrong node type: {other} (expected router, fed, med or sed)"
            )),
        }
    }
}

/// Address category used to pick a ping destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddrType {
    #[default]
    Any,
    /// Mesh-local EID.
    Mleid,
    /// Routing locator.
    Rloc,
    LinkLocal,
}

impl AddrType {
    /// Whether addresses of `category` are acceptable for this selection.
    pub fn accepts(self, category: AddrType) -> bool {
        self == AddrType::Any || self == category
    }
}

impl FromStr for AddrType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any" => Ok(AddrType::Any),
            "mleid" => Ok(AddrType::Mleid),
            "rloc" => Ok(AddrType::Rloc),
            "linklocal" => Ok(AddrType::LinkLocal),
            other => Err(format!("invalid address type: {other}")),
        }
    }
}

/// Periodic failure-injection schedule for a node's radio.
///
/// When enabled, the node is failed for the first `fail_duration` of every
/// `fail_interval` of virtual time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailTime {
    pub fail_duration: Duration,
    pub fail_interval: Duration,
}

impl FailTime {
    /// Schedule that never fails the node.
    pub const NEVER: FailTime = FailTime {
        fail_duration: Duration::ZERO,
        fail_interval: Duration::ZERO,
    };

    pub fn is_enabled(&self) -> bool {
        !self.fail_interval.is_zero() && !self.fail_duration.is_zero()
    }

    /// Whether the schedule has the node failed at virtual time `now`.
    pub fn is_failed_at(&self, now: Duration) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let phase = now.as_nanos() % self.fail_interval.as_nanos();
        phase < self.fail_duration.as_nanos()
    }
}
