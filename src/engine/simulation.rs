// src/engine/simulation.rs

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::clock::VirtualClock;
use super::counters::Counters;
use super::executor::Steppable;
use crate::config::{ConfigFile, ProtocolConfig, SimulationConfig};
use crate::errors::{MeshsimError, Result};
use crate::exec::NodeProcessDriver;
use crate::types::{AddrType, FailTime, NodeId, NodeType};

pub const DEFAULT_RADIO_RANGE: i32 = 160;

/// Network credentials every node is provisioned with on add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkParams {
    pub panid: u16,
    pub channel: u8,
    pub network_key: String,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            panid: 0xface,
            channel: 11,
            network_key: "00112233445566778899aabbccddeeff".to_string(),
        }
    }
}

/// Parameters of a node to add. `None` fields get simulation defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub id: Option<NodeId>,
    pub node_type: NodeType,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub radio_range: Option<i32>,
}

impl NodeConfig {
    pub fn new(node_type: NodeType) -> Self {
        Self {
            id: None,
            node_type,
            x: None,
            y: None,
            radio_range: None,
        }
    }
}

/// One simulated node and the driver for its device process.
#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    pub x: i32,
    pub y: i32,
    pub radio_range: i32,
    pub ext_addr: u64,
    pub rloc16: u16,
    pub fail_time: FailTime,
    radio_off: bool,
    schedule_failed: bool,
    driver: NodeProcessDriver,
}

impl Node {
    /// Failed by a manual `radio off` or by the failure schedule.
    pub fn is_failed(&self) -> bool {
        self.radio_off || self.schedule_failed
    }

    pub fn driver(&self) -> &NodeProcessDriver {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut NodeProcessDriver {
        &mut self.driver
    }

    /// Ping destinations of this node, preferring mesh-local, then
    /// routing-locator, then link-local addresses.
    pub async fn addrs(&mut self, filter: AddrType) -> Result<Vec<String>> {
        for category in [AddrType::Mleid, AddrType::Rloc, AddrType::LinkLocal] {
            if !filter.accepts(category) {
                continue;
            }
            let addrs = self.driver.ip_addrs(category).await?;
            if !addrs.is_empty() {
                return Ok(addrs);
            }
        }
        Ok(Vec::new())
    }
}

/// Simulation state owned by the executor task.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    protocol: ProtocolConfig,
    network: NetworkParams,
    clock: VirtualClock,
    nodes: BTreeMap<NodeId, Node>,
    packet_loss_ratio: f64,
    counters: Counters,
    cancel: CancellationToken,
}

impl Simulation {
    pub fn new(cfg: &ConfigFile, cancel: CancellationToken) -> Self {
        Self {
            config: cfg.simulation.clone(),
            protocol: cfg.protocol,
            network: NetworkParams::default(),
            clock: VirtualClock::new(cfg.simulation.step, cfg.simulation.speed),
            nodes: BTreeMap::new(),
            packet_loss_ratio: 0.0,
            counters: Counters::default(),
            cancel,
        }
    }

    pub fn protocol(&self) -> &ProtocolConfig {
        &self.protocol
    }

    pub fn network(&self) -> &NetworkParams {
        &self.network
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Spawn, provision and start a new node. Returns its id.
    pub async fn add_node(&mut self, cfg: NodeConfig) -> Result<NodeId> {
        let id = match cfg.id {
            Some(id) if id <= 0 => {
                return Err(MeshsimError::user(format!("invalid node id {id}")));
            }
            Some(id) if self.nodes.contains_key(&id) => {
                return Err(MeshsimError::user(format!("node {id} already exists")));
            }
            Some(id) => id,
            None => self.nodes.keys().next_back().map_or(1, |max| max + 1),
        };

        info!(node = id, node_type = %cfg.node_type, "adding node");
        let mut driver = NodeProcessDriver::spawn(
            &self.config.node_exe,
            id,
            self.protocol,
            self.cancel.child_token(),
        )
        .await?;

        let provisioned = provision(&mut driver, cfg.node_type, &self.network).await;
        let (ext_addr, rloc16) = match provisioned {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!(node = id, error = %e, "provisioning failed; stopping node process");
                if let Err(exit_err) = driver.exit().await {
                    warn!(node = id, error = %exit_err, "node exit failed");
                }
                return Err(e);
            }
        };

        self.nodes.insert(
            id,
            Node {
                id,
                node_type: cfg.node_type,
                x: cfg.x.unwrap_or_default(),
                y: cfg.y.unwrap_or_default(),
                radio_range: cfg.radio_range.unwrap_or(DEFAULT_RADIO_RANGE),
                ext_addr,
                rloc16,
                fail_time: FailTime::NEVER,
                radio_off: false,
                schedule_failed: false,
                driver,
            },
        );
        self.counters.nodes_added += 1;
        Ok(id)
    }

    /// Remove a node and shut its process down.
    ///
    /// The node is gone from the registry even when the process exit faults.
    pub async fn delete_node(&mut self, id: NodeId) -> Result<()> {
        let node = self
            .nodes
            .remove(&id)
            .ok_or_else(|| MeshsimError::user(format!("node {id} not found")))?;
        self.counters.nodes_deleted += 1;
        info!(node = id, "deleting node");
        node.driver.exit().await
    }

    pub fn move_node(&mut self, id: NodeId, x: i32, y: i32) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| MeshsimError::user(format!("node {id} not found")))?;
        node.x = x;
        node.y = y;
        debug!(node = id, x, y, "node moved");
        Ok(())
    }

    /// Manual radio override. An `off` node stays failed regardless of its
    /// failure schedule.
    pub fn set_node_failed(&mut self, id: NodeId, failed: bool) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| MeshsimError::user(format!("node {id} not found")))?;

        let was_failed = node.is_failed();
        node.radio_off = failed;
        if !failed {
            node.schedule_failed = node.fail_time.is_failed_at(self.clock.now());
        }
        record_transition(&mut self.counters, id, was_failed, node.is_failed());
        Ok(())
    }

    pub fn set_fail_time(&mut self, id: NodeId, fail_time: FailTime) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| MeshsimError::user(format!("node {id} not found")))?;
        let was_failed = node.is_failed();
        node.fail_time = if fail_time.is_enabled() {
            fail_time
        } else {
            FailTime::NEVER
        };
        // A disabled schedule no longer holds the node down.
        if !node.fail_time.is_enabled() {
            node.schedule_failed = false;
        }
        debug!(node = id, fail_time = ?node.fail_time, "fail time set");
        record_transition(&mut self.counters, id, was_failed, node.is_failed());
        Ok(())
    }

    pub fn packet_loss_ratio(&self) -> f64 {
        self.packet_loss_ratio
    }

    /// Set the global packet loss ratio, clamped to `0.0..=1.0`.
    pub fn set_packet_loss_ratio(&mut self, ratio: f64) -> f64 {
        self.packet_loss_ratio = if ratio.is_nan() {
            0.0
        } else {
            ratio.clamp(0.0, 1.0)
        };
        self.packet_loss_ratio
    }

    /// Exit every node process. Failures are logged and the remaining nodes
    /// are still stopped.
    ///
    /// Once cancelled, waits are no longer possible and the processes are
    /// killed instead.
    pub async fn shutdown(&mut self) {
        let nodes = std::mem::take(&mut self.nodes);
        if self.cancel.is_cancelled() {
            if !nodes.is_empty() {
                warn!(count = nodes.len(), "cancelled; killing node processes");
            }
            drop(nodes);
            return;
        }
        for (id, node) in nodes {
            if let Err(e) = node.driver.exit().await {
                warn!(node = id, error = %e, "node exit failed");
            }
        }
        info!("simulation stopped");
    }
}

impl Steppable for Simulation {
    fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    fn clock_mut(&mut self) -> &mut VirtualClock {
        &mut self.clock
    }

    fn on_time_advanced(&mut self, now: Duration) {
        self.counters.alarm_events += 1;
        for node in self.nodes.values_mut() {
            if node.radio_off || !node.fail_time.is_enabled() {
                continue;
            }
            let failed = node.fail_time.is_failed_at(now);
            if failed != node.schedule_failed {
                node.schedule_failed = failed;
                record_transition(&mut self.counters, node.id, !failed, failed);
            }
        }
    }
}

async fn provision(
    driver: &mut NodeProcessDriver,
    node_type: NodeType,
    network: &NetworkParams,
) -> Result<(u64, u16)> {
    driver.set_mode(node_type.mode()).await?;
    if !node_type.is_router_eligible() {
        driver.set_router_eligible(false).await?;
    }
    driver.set_panid(network.panid).await?;
    driver.set_channel(network.channel).await?;
    driver.set_network_key(&network.network_key).await?;
    driver.start().await?;

    let ext_addr = driver.ext_addr().await?;
    let rloc16 = driver.rloc16().await?;
    Ok((ext_addr, rloc16))
}

fn record_transition(counters: &mut Counters, id: NodeId, was_failed: bool, failed: bool) {
    match (was_failed, failed) {
        (false, true) => {
            counters.node_failures += 1;
            info!(node = id, "node failed");
        }
        (true, false) => {
            counters.node_recoveries += 1;
            info!(node = id, "node recovered");
        }
        _ => {}
    }
}
