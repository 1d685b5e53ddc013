// src/exec/accessors.rs

//! Typed device-shell accessors layered on the command protocol.

use crate::errors::{MeshsimError, Result};
use crate::types::{AddrType, NodeId};

use super::driver::NodeProcessDriver;

/// Parsed `leaderdata` output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaderData {
    pub partition_id: u32,
    pub weighting: u32,
    pub data_version: u32,
    pub stable_data_version: u32,
    pub leader_router_id: u32,
}

impl LeaderData {
    fn parse(node: NodeId, lines: &[String]) -> Result<Self> {
        let mut data = LeaderData::default();
        for line in lines {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let slot = match key.trim() {
                "Partition ID" => &mut data.partition_id,
                "Weighting" => &mut data.weighting,
                "Data Version" => &mut data.data_version,
                "Stable Data Version" => &mut data.stable_data_version,
                "Leader Router ID" => &mut data.leader_router_id,
                _ => continue,
            };
            *slot = value.trim().parse().map_err(|_| {
                MeshsimError::protocol(node, format!("unexpected leaderdata line: {line:?}"))
            })?;
        }
        Ok(data)
    }
}

impl NodeProcessDriver {
    pub async fn channel(&mut self) -> Result<u8> {
        let timeout = self.protocol().command_timeout;
        let ch = self.command_expect_int("channel", timeout).await?;
        u8::try_from(ch).map_err(|_| MeshsimError::protocol(self.id(), format!("bad channel {ch}")))
    }

    pub async fn set_channel(&mut self, ch: u8) -> Result<()> {
        if !(11..=26).contains(&ch) {
            return Err(MeshsimError::user(format!(
                "channel {ch} out of range (11..=26)"
            )));
        }
        self.run(&format!("channel {ch}")).await.map(drop)
    }

    pub async fn panid(&mut self) -> Result<u16> {
        let timeout = self.protocol().command_timeout;
        let v = self.command_expect_int("panid", timeout).await?;
        u16::try_from(v).map_err(|_| MeshsimError::protocol(self.id(), format!("bad panid {v}")))
    }

    pub async fn set_panid(&mut self, panid: u16) -> Result<()> {
        self.run(&format!("panid 0x{panid:x}")).await.map(drop)
    }

    pub async fn ext_addr(&mut self) -> Result<u64> {
        let timeout = self.protocol().command_timeout;
        self.command_expect_hex("extaddr", timeout).await
    }

    pub async fn set_ext_addr(&mut self, extaddr: u64) -> Result<()> {
        self.run(&format!("extaddr {extaddr:016x}")).await.map(drop)
    }

    pub async fn rloc16(&mut self) -> Result<u16> {
        let timeout = self.protocol().command_timeout;
        let v = self.command_expect_hex("rloc16", timeout).await?;
        u16::try_from(v).map_err(|_| MeshsimError::protocol(self.id(), format!("bad rloc16 {v:x}")))
    }

    pub async fn state(&mut self) -> Result<String> {
        let timeout = self.protocol().command_timeout;
        self.command_expect_string("state", timeout).await
    }

    pub async fn mode(&mut self) -> Result<String> {
        let timeout = self.protocol().command_timeout;
        self.command_expect_string("mode", timeout).await
    }

    pub async fn set_mode(&mut self, mode: &str) -> Result<()> {
        self.run(&format!("mode {mode}")).await.map(drop)
    }

    pub async fn network_name(&mut self) -> Result<String> {
        let timeout = self.protocol().command_timeout;
        self.command_expect_string("networkname", timeout).await
    }

    pub async fn set_network_name(&mut self, name: &str) -> Result<()> {
        self.run(&format!("networkname {name}")).await.map(drop)
    }

    pub async fn network_key(&mut self) -> Result<String> {
        let timeout = self.protocol().command_timeout;
        self.command_expect_string("masterkey", timeout).await
    }

    pub async fn set_network_key(&mut self, key: &str) -> Result<()> {
        self.run(&format!("masterkey {key}")).await.map(drop)
    }

    pub async fn router_eligible(&mut self) -> Result<bool> {
        let timeout = self.protocol().command_timeout;
        self.command_expect_enabled("routereligible", timeout).await
    }

    pub async fn set_router_eligible(&mut self, enabled: bool) -> Result<()> {
        let arg = if enabled { "enable" } else { "disable" };
        self.run(&format!("routereligible {arg}")).await.map(drop)
    }

    pub async fn leader_partition_id(&mut self) -> Result<u32> {
        let timeout = self.protocol().command_timeout;
        let v = self.command_expect_int("leaderpartitionid", timeout).await?;
        u32::try_from(v)
            .map_err(|_| MeshsimError::protocol(self.id(), format!("bad partition id {v}")))
    }

    pub async fn leader_data(&mut self) -> Result<LeaderData> {
        let output = self.run("leaderdata").await?;
        LeaderData::parse(self.id(), &output)
    }

    pub async fn version(&mut self) -> Result<String> {
        let timeout = self.protocol().command_timeout;
        self.command_expect_string("version", timeout).await
    }

    pub async fn singleton(&mut self) -> Result<bool> {
        let timeout = self.protocol().command_timeout;
        self.command_expect_bool("singleton", timeout).await
    }

    pub async fn ifconfig_up(&mut self) -> Result<()> {
        self.run("ifconfig up").await.map(drop)
    }

    pub async fn ifconfig_down(&mut self) -> Result<()> {
        self.run("ifconfig down").await.map(drop)
    }

    pub async fn thread_start(&mut self) -> Result<()> {
        self.run("thread start").await.map(drop)
    }

    pub async fn thread_stop(&mut self) -> Result<()> {
        self.run("thread stop").await.map(drop)
    }

    /// Addresses of one category. `AddrType::Any` lists every address.
    pub async fn ip_addrs(&mut self, category: AddrType) -> Result<Vec<String>> {
        let cmd = match category {
            AddrType::Any => "ipaddr",
            AddrType::Mleid => "ipaddr mleid",
            AddrType::Rloc => "ipaddr rloc",
            AddrType::LinkLocal => "ipaddr linklocal",
        };
        self.run(cmd).await
    }

    /// Bring the interface up and start the mesh stack.
    pub async fn start(&mut self) -> Result<()> {
        self.ifconfig_up().await?;
        self.thread_start().await?;

        let panid = self.panid().await?;
        let channel = self.channel().await?;
        let extaddr = self.ext_addr().await?;
        let state = self.state().await?;
        let mode = self.mode().await?;
        tracing::info!(
            node = self.id(),
            panid = format_args!("0x{panid:04x}"),
            channel,
            extaddr = format_args!("{extaddr:016x}"),
            %state,
            %mode,
            "started"
        );
        Ok(())
    }

    /// Stop the mesh stack and bring the interface down.
    pub async fn stop(&mut self) -> Result<()> {
        self.thread_stop().await?;
        self.ifconfig_down().await?;
        let state = self.state().await?;
        tracing::debug!(node = self.id(), %state, "stopped");
        Ok(())
    }
}
