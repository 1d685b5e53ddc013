// tests/node_driver.rs

use std::error::Error;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use meshsim::config::ProtocolConfig;
use meshsim::errors::MeshsimError;
use meshsim::exec::{CommandOutcome, NodeProcessDriver};
use meshsim::types::AddrType;
use meshsim_test_utils::builders::ConfigFileBuilder;
use meshsim_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn stub_node() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_stub_node"))
}

fn protocol() -> ProtocolConfig {
    ConfigFileBuilder::new()
        .command_timeout("2s")
        .prompt_timeout("200ms")
        .build_protocol()
}

async fn spawn(id: i32) -> Result<NodeProcessDriver, MeshsimError> {
    NodeProcessDriver::spawn(stub_node(), id, protocol(), CancellationToken::new()).await
}

#[tokio::test]
async fn channel_command_returns_lines_between_echo_and_done() -> TestResult {
    init_tracing();
    with_timeout(async {
        let mut node = spawn(1).await?;
        let timeout = node.protocol().command_timeout;

        let output = node.command("channel", timeout).await?;
        assert_eq!(output, vec!["11"]);

        node.set_channel(15).await?;
        assert_eq!(node.channel().await?, 15);

        node.exit().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn typed_accessors_parse_device_replies() -> TestResult {
    init_tracing();
    with_timeout(async {
        let mut node = spawn(2).await?;

        // "0xffff" is hexadecimal because of its prefix.
        assert_eq!(node.panid().await?, 0xffff);
        node.set_panid(0xface).await?;
        assert_eq!(node.panid().await?, 0xface);

        assert_eq!(node.ext_addr().await?, 0x1666_0000_0000_0002);
        assert_eq!(node.rloc16().await?, 0x0400);
        assert!(node.router_eligible().await?);
        node.set_router_eligible(false).await?;
        assert!(!node.router_eligible().await?);
        assert!(node.singleton().await?);

        node.set_mode("rn").await?;
        assert_eq!(node.mode().await?, "rn");

        node.start().await?;
        assert_eq!(node.state().await?, "child");
        let data = node.leader_data().await?;
        assert_eq!(data.partition_id, node.leader_partition_id().await?);
        assert_eq!(data.weighting, 64);

        let mleid = node.ip_addrs(AddrType::Mleid).await?;
        assert_eq!(mleid.len(), 1);
        assert!(mleid[0].starts_with("fdde:ad00:beef:0:"));

        node.exit().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn error_reply_is_a_command_fault() -> TestResult {
    init_tracing();
    with_timeout(async {
        let mut node = spawn(3).await?;
        let timeout = node.protocol().command_timeout;

        let outcome = node.try_command("frobnicate", timeout).await?;
        assert_eq!(
            outcome,
            CommandOutcome::Failed {
                code: 35,
                message: "InvalidCommand".into()
            }
        );

        let err = node
            .command("channel 99", timeout)
            .await
            .expect_err("out of range channel must fail");
        match err {
            MeshsimError::Command { node, code, message } => {
                assert_eq!((node, code, message.as_str()), (3, 7, "InvalidArgs"));
            }
            other => panic!("expected Command error, got {other:?}"),
        }

        // The driver is still usable after a failed exchange.
        assert_eq!(node.channel().await?, 11);
        node.exit().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn out_of_range_channel_is_rejected_before_sending() -> TestResult {
    init_tracing();
    with_timeout(async {
        let mut node = spawn(4).await?;
        let err = node.set_channel(27).await.expect_err("27 is not a valid channel");
        assert!(matches!(err, MeshsimError::User(_)));
        node.exit().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn silent_device_times_out_and_can_resync() -> TestResult {
    init_tracing();
    with_timeout(async {
        let mut node = spawn(5).await?;

        let err = node
            .command("hang", Duration::from_millis(200))
            .await
            .expect_err("no terminal line");
        assert!(matches!(err, MeshsimError::Timeout { node: 5, .. }), "got {err:?}");

        node.assure_prompt().await?;
        assert_eq!(node.version().await?, "OPENTHREAD/stub_node");
        node.exit().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn dying_device_reports_eof_with_diagnostics() -> TestResult {
    init_tracing();
    with_timeout(async {
        let mut node = spawn(6).await?;
        let timeout = node.protocol().command_timeout;

        let err = node.command("crash", timeout).await.expect_err("process died");
        match err {
            MeshsimError::ProcessEof { node, diagnostics } => {
                assert_eq!(node, 6);
                assert!(diagnostics.contains("crash requested"), "{diagnostics}");
            }
            other => panic!("expected ProcessEof, got {other:?}"),
        }
        Ok(())
    })
    .await
}

#[tokio::test]
async fn ping_waits_for_echo_then_resyncs() -> TestResult {
    init_tracing();
    with_timeout(async {
        let mut node = spawn(7).await?;
        node.ifconfig_up().await?;
        node.ping("fdde:ad00:beef:0:0:ff:fe00:0", 4, 1, 1, 64).await?;

        // The exchange is complete: the next command sees only its own reply.
        assert_eq!(node.channel().await?, 11);
        node.exit().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn factory_reset_restores_defaults() -> TestResult {
    init_tracing();
    with_timeout(async {
        let mut node = spawn(8).await?;
        node.set_channel(20).await?;
        node.factory_reset().await?;
        assert_eq!(node.channel().await?, 11);
        node.reset().await?;
        node.exit().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn missing_executable_fails_to_spawn() -> TestResult {
    init_tracing();
    let res = NodeProcessDriver::spawn(
        Path::new("./definitely-not-a-node-binary"),
        1,
        protocol(),
        CancellationToken::new(),
    )
    .await;
    assert!(res.is_err());
    Ok(())
}

#[tokio::test]
async fn malformed_replies_are_protocol_faults() -> TestResult {
    init_tracing();
    with_timeout(async {
        let mut node = spawn(9).await?;
        let timeout = node.protocol().command_timeout;

        let err = node.command_expect_int("lines zz", timeout).await.expect_err("not a number");
        assert!(matches!(err, MeshsimError::Protocol { node: 9, .. }), "got {err:?}");

        let err = node
            .command_expect_hex("lines 0xnothex", timeout)
            .await
            .expect_err("not hexadecimal");
        assert!(matches!(err, MeshsimError::Protocol { node: 9, .. }), "got {err:?}");

        let err = node
            .command_expect_string("lines first second", timeout)
            .await
            .expect_err("two lines");
        match err {
            MeshsimError::Protocol { node, reason } => {
                assert_eq!(node, 9);
                assert!(reason.contains("expected 1 line, but received 2"), "{reason}");
            }
            other => panic!("expected Protocol error, got {other:?}"),
        }

        // The exchanges completed, so the stream is still in step.
        assert_eq!(node.command_expect_string("lines 42", timeout).await?, "42");
        assert_eq!(node.command_expect_int("lines 0x2a", timeout).await?, 42);
        node.exit().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn frozen_device_fails_prompt_sync_and_exit() -> TestResult {
    init_tracing();
    with_timeout(async {
        let protocol = ConfigFileBuilder::new()
            .command_timeout("500ms")
            .prompt_timeout("100ms")
            .build_protocol();
        let mut node =
            NodeProcessDriver::spawn(stub_node(), 10, protocol, CancellationToken::new()).await?;

        node.command_expect_none("freeze", protocol.command_timeout).await?;

        let err = node.assure_prompt().await.expect_err("device never goes idle");
        match err {
            MeshsimError::Timeout { node, timeout, .. } => {
                assert_eq!(node, 10);
                // Only the last attempt faults, at the full command timeout.
                assert_eq!(timeout, Duration::from_millis(500));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }

        // The output stream never closes, so teardown faults too.
        let err = node.exit().await.expect_err("no EOF after exit");
        assert!(matches!(err, MeshsimError::Timeout { node: 10, .. }), "got {err:?}");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn non_zero_exit_status_is_not_a_fault() -> TestResult {
    init_tracing();
    with_timeout(async {
        let mut node = spawn(11).await?;
        node.run("exitcode 4").await?;
        node.exit().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn identity_settings_and_stop() -> TestResult {
    init_tracing();
    with_timeout(async {
        let mut node = spawn(12).await?;

        assert_eq!(node.network_name().await?, "OpenThread");
        node.set_network_name("meshsim").await?;
        assert_eq!(node.network_name().await?, "meshsim");

        node.set_ext_addr(0xdead_beef_0000_0012).await?;
        assert_eq!(node.ext_addr().await?, 0xdead_beef_0000_0012);

        node.start().await?;
        assert_eq!(node.state().await?, "leader");
        node.stop().await?;
        assert_eq!(node.state().await?, "disabled");
        assert!(node.ip_addrs(AddrType::Any).await?.is_empty());

        node.exit().await?;
        Ok(())
    })
    .await
}
