// tests/command_parse.rs

use meshsim::errors::MeshsimError;
use meshsim::shell::{
    AddCmd, Command, DebugCmd, GoCmd, GoDuration, NodeCmd, NodeSelector, PingCmd, PingDst, PlrCmd,
    RadioAction, RadioCmd, SpeedCmd,
};
use meshsim::types::AddrType;

fn parse(line: &str) -> Command {
    line.parse()
        .unwrap_or_else(|e| panic!("`{line}` should parse: {e}"))
}

fn syntax_error(line: &str) -> String {
    match line.parse::<Command>() {
        Err(MeshsimError::Syntax(msg)) => msg,
        other => panic!("`{line}` should be a syntax error, got {other:?}"),
    }
}

fn sel(id: i32) -> NodeSelector {
    NodeSelector::new(id)
}

#[test]
fn add_with_options_in_any_order() {
    assert_eq!(
        parse("add med rr 80 id 4 y -3 x 12"),
        Command::Add(AddCmd {
            node_type: "med".into(),
            x: Some(12),
            y: Some(-3),
            id: Some(4),
            radio_range: Some(80),
        })
    );

    // The node type is validated when the command runs.
    assert!(matches!(parse("add toaster"), Command::Add(AddCmd { node_type, .. }) if node_type == "toaster"));
}

#[test]
fn go_forms() {
    assert_eq!(
        parse("go 1.5"),
        Command::Go(GoCmd {
            duration: GoDuration::Seconds(1.5),
            speed: None,
        })
    );
    assert_eq!(
        parse("go ever speed 4"),
        Command::Go(GoCmd {
            duration: GoDuration::Ever,
            speed: Some(4.0),
        })
    );
    assert!(syntax_error("go -1").contains("invalid seconds"));
    assert!(syntax_error("go").contains("missing seconds"));
}

#[test]
fn speed_forms() {
    assert_eq!(parse("speed"), Command::Speed(SpeedCmd::Get));
    assert_eq!(parse("speed max"), Command::Speed(SpeedCmd::Max));
    assert_eq!(parse("speed 10"), Command::Speed(SpeedCmd::Set(10.0)));
    assert!(syntax_error("speed fast").contains("invalid speed"));
}

#[test]
fn listing_aliases() {
    assert_eq!(parse("nodes"), Command::Nodes);
    assert_eq!(parse("ls nodes"), Command::Nodes);
    assert_eq!(parse("partitions"), Command::Partitions);
    assert_eq!(parse("pts"), Command::Partitions);
    assert_eq!(parse("counters"), Command::Counters);
    assert_eq!(parse("exit"), Command::Exit);
    assert!(syntax_error("ls").contains("ls nodes"));
}

#[test]
fn ping_to_node_with_options() {
    assert_eq!(
        parse("ping 1 2 rloc ds 32 c 3 itv 2 hop 10"),
        Command::Ping(PingCmd {
            src: sel(1),
            dst: PingDst::Node(sel(2)),
            addr_type: AddrType::Rloc,
            data_size: Some(32),
            count: Some(3),
            interval: Some(2),
            hop_limit: Some(10),
        })
    );

    match parse("ping 3 \"fdde::1\" datasize 8 hoplimit 2") {
        Command::Ping(cmd) => {
            assert_eq!(cmd.dst, PingDst::Addr("fdde::1".into()));
            assert_eq!(cmd.addr_type, AddrType::Any);
            assert_eq!(cmd.data_size, Some(8));
            assert_eq!(cmd.hop_limit, Some(2));
            assert_eq!(cmd.count, None);
        }
        other => panic!("expected ping, got {other:?}"),
    }

    assert!(syntax_error("ping 1 2 loud").contains("unexpected ping option"));
}

#[test]
fn node_passthrough_requires_quotes() {
    assert_eq!(
        parse("node 2 \"ipaddr mleid\""),
        Command::Node(NodeCmd {
            node: sel(2),
            command: Some("ipaddr mleid".into()),
        })
    );
    assert_eq!(
        parse("node 2"),
        Command::Node(NodeCmd {
            node: sel(2),
            command: None,
        })
    );
    assert!(syntax_error("node 2 state").contains("unexpected argument"));
}

#[test]
fn radio_takes_several_selectors() {
    assert_eq!(
        parse("radio 1 2 3 off"),
        Command::Radio(RadioCmd {
            nodes: vec![sel(1), sel(2), sel(3)],
            action: RadioAction::Off,
        })
    );
    assert_eq!(
        parse("radio 4 ft 60 5.5"),
        Command::Radio(RadioCmd {
            nodes: vec![sel(4)],
            action: RadioAction::FailTime {
                interval: 60.0,
                duration: 5.5,
            },
        })
    );
    assert!(syntax_error("radio 1 sideways").contains("expected on, off or ft"));
}

#[test]
fn plr_and_debug() {
    assert_eq!(parse("plr"), Command::Plr(PlrCmd { ratio: None }));
    assert_eq!(parse("plr 0.1"), Command::Plr(PlrCmd { ratio: Some(0.1) }));

    assert_eq!(
        parse("debug echo \"say \\\"hi\\\"\" fail"),
        Command::Debug(DebugCmd {
            echo: Some("say \"hi\"".into()),
            fail: true,
        })
    );
    assert_eq!(parse("debug"), Command::Debug(DebugCmd::default()));
}

#[test]
fn selectors_parse_but_non_positive_ones_do_not_resolve() {
    match parse("del 0 -2 5") {
        Command::Del(cmd) => {
            let resolved: Vec<_> = cmd.nodes.iter().map(|s| s.resolve().is_ok()).collect();
            assert_eq!(resolved, vec![false, false, true]);
        }
        other => panic!("expected del, got {other:?}"),
    }
}

#[test]
fn malformed_lines() {
    assert!(syntax_error("").contains("missing command"));
    assert!(syntax_error("teleport 1").contains("unknown command"));
    assert!(syntax_error("move 1 2").contains("missing y"));
    assert!(syntax_error("move one 2 3").contains("invalid node id"));
    assert!(syntax_error("debug echo \"open").contains("unterminated"));
    assert!(syntax_error("counters now").contains("unexpected argument"));
}
