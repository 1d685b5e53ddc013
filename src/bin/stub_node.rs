// src/bin/stub_node.rs

//! Minimal device shell for tests and demos.
//!
//! Speaks the same line protocol as a real device CLI: prints a `> ` prompt,
//! echoes every input line, and ends each response with `Done` or
//! `Error <code>: <message>`. A few extra commands exist only to exercise
//! fault paths:
//!
//! - `sleep <ms>`: answer `Done` after a delay.
//! - `hang`: echo, then never answer.
//! - `crash`: print to stderr and exit without answering.
//! - `freeze`: echo, then stop reading input altogether.
//! - `lines <word>...`: answer each word on its own line.
//! - `exitcode <n>`: status used by a later `exit`.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "stub_node", about = "Line-protocol device stub")]
struct Args {
    /// Node id, also used to derive addresses.
    id: u16,
}

struct Device {
    id: u16,
    settings: HashMap<&'static str, String>,
    router_eligible: bool,
    if_up: bool,
    started: bool,
    exit_code: i32,
}

enum Reply {
    Done(Vec<String>),
    Error(u32, &'static str),
    /// Nothing more is printed for this command.
    Silent,
    Exit(i32),
    Freeze,
}

fn invalid_args() -> Reply {
    Reply::Error(7, "InvalidArgs")
}

impl Device {
    fn new(id: u16) -> Self {
        let mut dev = Self {
            id,
            settings: HashMap::new(),
            router_eligible: true,
            if_up: false,
            started: false,
            exit_code: 0,
        };
        dev.factory_defaults();
        dev
    }

    fn factory_defaults(&mut self) {
        self.settings = HashMap::from([
            ("channel", "11".to_string()),
            ("panid", "0xffff".to_string()),
            ("mode", "rdn".to_string()),
            ("networkname", "OpenThread".to_string()),
            ("masterkey", "00112233445566778899aabbccddeeff".to_string()),
            ("extaddr", format!("{:016x}", 0x1666_0000_0000_0000u64 | u64::from(self.id))),
        ]);
        self.router_eligible = true;
        self.if_up = false;
        self.started = false;
    }

    fn rloc16(&self) -> u16 {
        self.id.wrapping_sub(1) << 10
    }

    fn addrs(&self, category: &str) -> Vec<String> {
        if !self.if_up {
            return Vec::new();
        }
        let mleid = format!("fdde:ad00:beef:0:{:x}:{:x}:{:x}:{:x}", 0x5a, self.id, 0x1234, self.id);
        let rloc = format!("fdde:ad00:beef:0:0:ff:fe00:{:x}", self.rloc16());
        let linklocal = format!("fe80:0:0:0:{:x}:0:0:{:x}", 0x1666, self.id);
        match category {
            "mleid" => vec![mleid],
            "rloc" => vec![rloc],
            "linklocal" => vec![linklocal],
            _ => vec![rloc, linklocal, mleid],
        }
    }

    /// Get or set a plain string setting.
    fn setting(&mut self, key: &'static str, arg: Option<&str>) -> Reply {
        match arg {
            None => Reply::Done(vec![self.settings.get(key).cloned().unwrap_or_default()]),
            Some(v) => {
                self.settings.insert(key, v.to_string());
                Reply::Done(Vec::new())
            }
        }
    }

    fn handle(&mut self, line: &str, out: &mut impl Write) -> io::Result<Reply> {
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            return Ok(Reply::Silent);
        };
        let arg = words.next();

        let reply = match cmd {
            "exit" => Reply::Exit(self.exit_code),
            "exitcode" => match arg.and_then(|a| a.parse::<i32>().ok()) {
                Some(code) => {
                    self.exit_code = code;
                    Reply::Done(Vec::new())
                }
                None => invalid_args(),
            },
            "freeze" => Reply::Freeze,
            "lines" => Reply::Done(
                arg.into_iter()
                    .chain(words.by_ref())
                    .map(str::to_string)
                    .collect(),
            ),
            "crash" => {
                eprintln!("stub_node {}: crash requested", self.id);
                Reply::Exit(3)
            }
            "hang" => Reply::Silent,
            "sleep" => match arg.and_then(|a| a.parse::<u64>().ok()) {
                Some(ms) => {
                    thread::sleep(Duration::from_millis(ms));
                    Reply::Done(Vec::new())
                }
                None => invalid_args(),
            },
            "channel" => match arg {
                Some(a) => match a.parse::<u8>() {
                    Ok(ch) if (11..=26).contains(&ch) => self.setting("channel", Some(a)),
                    _ => invalid_args(),
                },
                None => self.setting("channel", None),
            },
            "panid" => self.setting("panid", arg),
            "mode" => self.setting("mode", arg),
            "networkname" => self.setting("networkname", arg),
            "masterkey" => self.setting("masterkey", arg),
            "extaddr" => self.setting("extaddr", arg),
            "rloc16" => Reply::Done(vec![format!("{:04x}", self.rloc16())]),
            "state" => {
                let state = match (self.started, self.router_eligible) {
                    (false, _) => "disabled",
                    (true, true) => "leader",
                    (true, false) => "child",
                };
                Reply::Done(vec![state.to_string()])
            }
            "routereligible" => match arg {
                None => Reply::Done(vec![
                    if self.router_eligible { "Enabled" } else { "Disabled" }.to_string(),
                ]),
                Some("enable") => {
                    self.router_eligible = true;
                    Reply::Done(Vec::new())
                }
                Some("disable") => {
                    self.router_eligible = false;
                    Reply::Done(Vec::new())
                }
                Some(_) => invalid_args(),
            },
            "leaderpartitionid" => Reply::Done(vec![(0x4000_0000u32 + 7).to_string()]),
            "leaderdata" => Reply::Done(vec![
                format!("Partition ID: {}", 0x4000_0000u32 + 7),
                "Weighting: 64".to_string(),
                "Data Version: 1".to_string(),
                "Stable Data Version: 1".to_string(),
                "Leader Router ID: 0".to_string(),
            ]),
            "version" => Reply::Done(vec!["OPENTHREAD/stub_node".to_string()]),
            "singleton" => Reply::Done(vec!["true".to_string()]),
            "ifconfig" => match arg {
                Some("up") => {
                    self.if_up = true;
                    Reply::Done(Vec::new())
                }
                Some("down") => {
                    self.if_up = false;
                    Reply::Done(Vec::new())
                }
                None => Reply::Done(vec![if self.if_up { "up" } else { "down" }.to_string()]),
                Some(_) => invalid_args(),
            },
            "thread" => match arg {
                Some("start") if self.if_up => {
                    self.started = true;
                    Reply::Done(Vec::new())
                }
                Some("start") => Reply::Error(13, "InvalidState"),
                Some("stop") => {
                    self.started = false;
                    Reply::Done(Vec::new())
                }
                _ => invalid_args(),
            },
            "ipaddr" => Reply::Done(self.addrs(arg.unwrap_or("all"))),
            "ping" => {
                // Replies are asynchronous: nothing but the echo belongs to
                // this exchange.
                let dst = arg.unwrap_or("::");
                let size = words.next().unwrap_or("4");
                writeln!(out, "{size} bytes from {dst}: icmp_seq=1 hlim=64 time=0ms")?;
                Reply::Silent
            }
            "scan" => {
                writeln!(out, "| J | Network Name     | Extended PAN     | PAN  | MAC Address      | Ch | dBm | LQI |")?;
                writeln!(out, "+---+------------------+------------------+------+------------------+----+-----+-----+")?;
                writeln!(
                    out,
                    "| 0 | {:<16} | dead00beef00cafe | face | {} | 11 | -20 |   0 |",
                    self.settings.get("networkname").map_or("", String::as_str),
                    self.settings.get("extaddr").map_or("", String::as_str),
                )?;
                Reply::Done(Vec::new())
            }
            "reset" => {
                self.if_up = false;
                self.started = false;
                Reply::Silent
            }
            "factoryreset" => {
                self.factory_defaults();
                Reply::Silent
            }
            _ => Reply::Error(35, "InvalidCommand"),
        };
        Ok(reply)
    }
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    let mut dev = Device::new(args.id);

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut input = stdin.lock();
    let mut line = String::new();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let cmd = line.trim_end_matches(['\r', '\n']);
        writeln!(stdout, "{cmd}")?;

        match dev.handle(cmd, &mut stdout)? {
            Reply::Done(lines) => {
                for l in lines {
                    writeln!(stdout, "{l}")?;
                }
                writeln!(stdout, "Done")?;
            }
            Reply::Error(code, msg) => writeln!(stdout, "Error {code}: {msg}")?,
            Reply::Silent => {}
            Reply::Exit(code) => {
                stdout.flush()?;
                std::process::exit(code);
            }
            Reply::Freeze => {
                stdout.flush()?;
                loop {
                    thread::sleep(Duration::from_secs(3600));
                }
            }
        }
        stdout.flush()?;
    }
}
