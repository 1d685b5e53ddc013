// src/shell/runner.rs

//! Command dispatch.
//!
//! [`CommandExecutor::execute`] is the recovery boundary for a whole command:
//! whatever a handler returns as an error lands in the command's context.
//! Handlers that walk several nodes keep going after a per-node failure and
//! report the last one.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::context::{CommandContext, OutputSink};
use super::{
    AddCmd, Command, DebugCmd, DelCmd, GoCmd, GoDuration, MoveCmd, NodeCmd, NodeSelector, PingCmd,
    PingDst, PlrCmd, RadioAction, RadioCmd, ScanCmd, SpeedCmd,
};
use crate::engine::{MAX_SPEED, NodeConfig, SimProxy};
use crate::errors::{MeshsimError, Result};
use crate::types::{FailTime, NodeId, NodeType};

/// Virtual time requested per iteration of `go ever`.
const FOREVER_CHUNK: Duration = Duration::from_secs(3600);

const PING_DATA_SIZE: u32 = 4;
const PING_COUNT: u32 = 1;
const PING_INTERVAL: u32 = 1;
const PING_HOP_LIMIT: u32 = 64;

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    proxy: SimProxy,
    output: OutputSink,
    cancel: CancellationToken,
}

impl CommandExecutor {
    pub fn new(proxy: SimProxy, output: OutputSink, cancel: CancellationToken) -> Self {
        Self {
            proxy,
            output,
            cancel,
        }
    }

    pub fn proxy(&self) -> &SimProxy {
        &self.proxy
    }

    /// Run `cmd` to completion. Never fails: faults end up in the returned
    /// context next to whatever output was produced before them.
    pub async fn execute(&self, cmd: Command) -> CommandContext {
        let mut cc = CommandContext::new(self.output.clone());
        debug!(?cmd, "executing command");

        if let Err(e) = self.dispatch(&mut cc, cmd).await {
            warn!(error = %e, "command failed");
            cc.error(e);
        }
        cc
    }

    async fn dispatch(&self, cc: &mut CommandContext, cmd: Command) -> Result<()> {
        match cmd {
            Command::Add(cmd) => self.execute_add(cc, cmd).await,
            Command::Del(cmd) => self.execute_del(cc, cmd).await,
            Command::Move(cmd) => self.execute_move(cmd).await,
            Command::Go(cmd) => self.execute_go(cmd).await,
            Command::Speed(cmd) => self.execute_speed(cc, cmd).await,
            Command::Nodes => self.execute_nodes(cc).await,
            Command::Partitions => self.execute_partitions(cc).await,
            Command::Ping(cmd) => self.execute_ping(cmd).await,
            Command::Node(cmd) => self.execute_node(cc, cmd).await,
            Command::Radio(cmd) => self.execute_radio(cc, cmd).await,
            Command::Plr(cmd) => self.execute_plr(cc, cmd).await,
            Command::Counters => self.execute_counters(cc).await,
            Command::Scan(cmd) => self.execute_scan(cc, cmd).await,
            Command::Debug(cmd) => {
                execute_debug(cc, cmd);
                Ok(())
            }
            Command::Exit => self.execute_exit(cc).await,
        }
    }

    async fn execute_add(&self, cc: &mut CommandContext, cmd: AddCmd) -> Result<()> {
        info!(?cmd, "add");
        let node_type: NodeType = cmd.node_type.parse().map_err(MeshsimError::User)?;
        if let Some(id) = cmd.id {
            NodeSelector::new(id).resolve()?;
        }

        let cfg = NodeConfig {
            id: cmd.id,
            node_type,
            x: cmd.x,
            y: cmd.y,
            radio_range: cmd.radio_range,
        };

        let id = self
            .proxy
            .call(move |sim| Box::pin(async move { sim.add_node(cfg).await }))
            .await??;
        cc.outputf(id);
        Ok(())
    }

    async fn execute_del(&self, cc: &mut CommandContext, cmd: DelCmd) -> Result<()> {
        let targets = resolve_each(&cmd.nodes);

        let last_err = self
            .proxy
            .call(move |sim| {
                Box::pin(async move {
                    let mut last_err = None;
                    for target in targets {
                        let id = match target {
                            Ok(id) => id,
                            Err(e) => {
                                last_err = Some(e);
                                continue;
                            }
                        };
                        if let Err(e) = sim.delete_node(id).await {
                            warn!(node = id, error = %e, "delete failed");
                            last_err = Some(e);
                        }
                    }
                    last_err
                })
            })
            .await?;

        cc.maybe_error(last_err);
        Ok(())
    }

    async fn execute_move(&self, cmd: MoveCmd) -> Result<()> {
        let id = cmd.target.resolve()?;
        let (x, y) = (cmd.x, cmd.y);
        self.proxy
            .call(move |sim| Box::pin(async move { sim.move_node(id, x, y) }))
            .await?
    }

    async fn execute_go(&self, cmd: GoCmd) -> Result<()> {
        if let Some(speed) = cmd.speed {
            self.proxy.set_rate(checked_speed(speed)?).await?;
        }

        match cmd.duration {
            GoDuration::Seconds(secs) => self.proxy.go(seconds(secs)?).await,
            GoDuration::Ever => self.proxy.go_forever(FOREVER_CHUNK, &self.cancel).await,
        }
    }

    async fn execute_speed(&self, cc: &mut CommandContext, cmd: SpeedCmd) -> Result<()> {
        match cmd {
            SpeedCmd::Get => cc.outputf(self.proxy.rate().await?),
            SpeedCmd::Max => self.proxy.set_rate(MAX_SPEED).await?,
            SpeedCmd::Set(speed) => self.proxy.set_rate(checked_speed(speed)?).await?,
        }
        Ok(())
    }

    async fn execute_nodes(&self, cc: &mut CommandContext) -> Result<()> {
        let out = cc.output().clone();

        let last_err = self
            .proxy
            .call(move |sim| {
                Box::pin(async move {
                    let mut last_err = None;
                    for id in sim.node_ids() {
                        let Some(node) = sim.node_mut(id) else {
                            continue;
                        };
                        match node.driver_mut().rloc16().await {
                            Ok(rloc16) => node.rloc16 = rloc16,
                            Err(e) => last_err = Some(e),
                        }
                        out.line(format_args!(
                            "id={}\textaddr={:016x}\trloc16={:04x}\tx={}\ty={}\tfailed={}",
                            node.id,
                            node.ext_addr,
                            node.rloc16,
                            node.x,
                            node.y,
                            node.is_failed()
                        ));
                    }
                    last_err
                })
            })
            .await?;

        cc.maybe_error(last_err);
        Ok(())
    }

    async fn execute_partitions(&self, cc: &mut CommandContext) -> Result<()> {
        let (partitions, last_err) = self
            .proxy
            .call(|sim| {
                Box::pin(async move {
                    let mut partitions: BTreeMap<u32, Vec<NodeId>> = BTreeMap::new();
                    let mut last_err = None;
                    for id in sim.node_ids() {
                        let Some(node) = sim.node_mut(id) else {
                            continue;
                        };
                        match node.driver_mut().leader_partition_id().await {
                            Ok(parid) => partitions.entry(parid).or_default().push(id),
                            Err(e) => last_err = Some(e),
                        }
                    }
                    (partitions, last_err)
                })
            })
            .await?;

        for (parid, nodes) in partitions {
            let nodes: Vec<String> = nodes.iter().map(ToString::to_string).collect();
            cc.outputf(format_args!("partition={:08x}\tnodes={}", parid, nodes.join(",")));
        }
        cc.maybe_error(last_err);
        Ok(())
    }

    async fn execute_ping(&self, cmd: PingCmd) -> Result<()> {
        debug!(?cmd, "ping");
        let src = cmd.src.resolve()?;
        if let PingDst::Node(sel) = &cmd.dst {
            sel.resolve()?;
        }
        let dst = cmd.dst;
        let addr_type = cmd.addr_type;
        let data_size = cmd.data_size.unwrap_or(PING_DATA_SIZE);
        let count = cmd.count.unwrap_or(PING_COUNT);
        let interval = cmd.interval.unwrap_or(PING_INTERVAL);
        let hop_limit = cmd.hop_limit.unwrap_or(PING_HOP_LIMIT);

        self.proxy
            .call(move |sim| {
                Box::pin(async move {
                    if sim.node(src).is_none() {
                        return Err(MeshsimError::user("src node not found"));
                    }

                    let dst_addr = match dst {
                        PingDst::Addr(addr) => addr,
                        PingDst::Node(sel) => {
                            let dst_node = sim
                                .node_mut(sel.id)
                                .ok_or_else(|| MeshsimError::user("dst node not found"))?;
                            dst_node
                                .addrs(addr_type)
                                .await?
                                .into_iter()
                                .next()
                                .ok_or_else(|| MeshsimError::user("dst addr not found"))?
                        }
                    };

                    sim.counters_mut().ping_requests += 1;
                    let src_node = sim
                        .node_mut(src)
                        .ok_or_else(|| MeshsimError::user("src node not found"))?;
                    src_node
                        .driver_mut()
                        .ping(&dst_addr, data_size, count, interval, hop_limit)
                        .await
                })
            })
            .await?
    }

    async fn execute_node(&self, cc: &mut CommandContext, cmd: NodeCmd) -> Result<()> {
        let id = cmd.node.resolve()?;
        let out = cc.output().clone();

        let Some(line) = cmd.command else {
            let exists = self
                .proxy
                .call(move |sim| Box::pin(async move { sim.node(id).is_some() }))
                .await?;
            if !exists {
                return Err(MeshsimError::user("node not found"));
            }
            cc.set_enter_node(id);
            return Ok(());
        };

        self.proxy
            .call(move |sim| {
                Box::pin(async move {
                    sim.counters_mut().cli_commands += 1;
                    let node = sim
                        .node_mut(id)
                        .ok_or_else(|| MeshsimError::user("node not found"))?;
                    let driver = node.driver_mut();
                    let timeout = driver.protocol().command_timeout;
                    for output in driver.command(&line, timeout).await? {
                        out.line(output);
                    }
                    Ok(())
                })
            })
            .await?
    }

    async fn execute_radio(&self, cc: &mut CommandContext, cmd: RadioCmd) -> Result<()> {
        let action = cmd.action;
        let schedule = match action {
            RadioAction::FailTime { interval, duration } => fail_time(interval, duration)?,
            RadioAction::On | RadioAction::Off => FailTime::NEVER,
        };
        let targets = resolve_each(&cmd.nodes);

        let last_err = self
            .proxy
            .call(move |sim| {
                Box::pin(async move {
                    let mut last_err = None;
                    for target in targets {
                        let res = target.and_then(|id| match action {
                            RadioAction::On => sim.set_node_failed(id, false),
                            RadioAction::Off => sim.set_node_failed(id, true),
                            RadioAction::FailTime { .. } => sim.set_fail_time(id, schedule),
                        });
                        if let Err(e) = res {
                            last_err = Some(e);
                        }
                    }
                    last_err
                })
            })
            .await?;

        cc.maybe_error(last_err);
        Ok(())
    }

    async fn execute_plr(&self, cc: &mut CommandContext, cmd: PlrCmd) -> Result<()> {
        let ratio = match cmd.ratio {
            None => {
                self.proxy
                    .call(|sim| Box::pin(async move { sim.packet_loss_ratio() }))
                    .await?
            }
            Some(ratio) => {
                self.proxy
                    .call(move |sim| Box::pin(async move { sim.set_packet_loss_ratio(ratio) }))
                    .await?
            }
        };
        cc.outputf(ratio);
        Ok(())
    }

    async fn execute_counters(&self, cc: &mut CommandContext) -> Result<()> {
        let counters = self
            .proxy
            .call(|sim| Box::pin(async move { *sim.counters() }))
            .await?;
        for (name, value) in counters.entries() {
            cc.outputf(format_args!("{name:<40} {value}"));
        }
        Ok(())
    }

    /// Start a scan, then keep resynchronizing with the node for the scan
    /// window, printing the table rows that arrive in between.
    async fn execute_scan(&self, cc: &mut CommandContext, cmd: ScanCmd) -> Result<()> {
        let id = cmd.node.resolve()?;

        let window = self
            .proxy
            .call(move |sim| {
                Box::pin(async move {
                    let window = sim.protocol().scan_window;
                    let node = sim
                        .node_mut(id)
                        .ok_or_else(|| MeshsimError::user("node not found"))?;
                    let driver = node.driver_mut();
                    let timeout = driver.protocol().command_timeout;
                    driver.command_expect_none("scan", timeout).await?;
                    Ok::<_, MeshsimError>(window)
                })
            })
            .await??;

        let deadline = Instant::now() + window;
        while Instant::now() < deadline {
            let out = cc.output().clone();
            let found = self
                .proxy
                .call(move |sim| {
                    Box::pin(async move {
                        let Some(node) = sim.node_mut(id) else {
                            return Ok(false);
                        };
                        for line in node.driver_mut().assure_prompt().await? {
                            if line.starts_with('|') || line.starts_with('+') {
                                out.line(line);
                            }
                        }
                        Ok::<_, MeshsimError>(true)
                    })
                })
                .await??;
            if !found {
                break;
            }
        }
        Ok(())
    }

    async fn execute_exit(&self, cc: &mut CommandContext) -> Result<()> {
        cc.set_exit_requested();
        self.proxy
            .call(|sim| Box::pin(async move { sim.shutdown().await }))
            .await?;
        self.cancel.cancel();
        Ok(())
    }
}

fn execute_debug(cc: &mut CommandContext, cmd: DebugCmd) {
    info!(?cmd, "debug");
    if let Some(echo) = cmd.echo {
        cc.outputf(echo);
    }
    if cmd.fail {
        cc.errorf("debug failed");
    }
}

/// Resolve every selector on its own; a bad one only fails its own item.
fn resolve_each(selectors: &[NodeSelector]) -> Vec<Result<NodeId>> {
    selectors.iter().map(NodeSelector::resolve).collect()
}

fn seconds(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| MeshsimError::user(format!("invalid seconds: {secs}")))
}

fn checked_speed(speed: f64) -> Result<f64> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(MeshsimError::user(format!("invalid speed: {speed}")));
    }
    Ok(speed.min(MAX_SPEED))
}

/// Non-positive values disable the schedule.
fn fail_time(interval: f64, duration: f64) -> Result<FailTime> {
    if !(interval > 0.0 && duration > 0.0) {
        return Ok(FailTime::NEVER);
    }
    Ok(FailTime {
        fail_duration: seconds(duration)?,
        fail_interval: seconds(interval)?,
    })
}
