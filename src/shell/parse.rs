// src/shell/parse.rs

use std::str::FromStr;

use crate::errors::{MeshsimError, Result};
use crate::types::AddrType;

use super::{
    AddCmd, Command, DebugCmd, DelCmd, GoCmd, GoDuration, MoveCmd, NodeCmd, NodeSelector, PingCmd,
    PingDst, PlrCmd, RadioAction, RadioCmd, ScanCmd, SpeedCmd,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
}

/// Split a line on whitespace, keeping `"double quoted"` runs together.
fn tokenize(line: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(escaped) => text.push(escaped),
                        None => return Err(syntax("unterminated escape")),
                    },
                    Some(ch) => text.push(ch),
                    None => return Err(syntax("unterminated quoted string")),
                }
            }
            tokens.push(Token::Quoted(text));
            continue;
        }

        let mut word = String::new();
        while let Some(&ch) = chars.peek() {
            if ch.is_whitespace() || ch == '"' {
                break;
            }
            word.push(ch);
            chars.next();
        }
        tokens.push(Token::Word(word));
    }

    Ok(tokens)
}

fn syntax(msg: impl Into<String>) -> MeshsimError {
    MeshsimError::Syntax(msg.into())
}

/// Cursor over the tokens of one command line.
struct Tokens {
    items: Vec<Token>,
    pos: usize,
}

impl Tokens {
    fn peek_word(&self) -> Option<&str> {
        match self.items.get(self.pos) {
            Some(Token::Word(w)) => Some(w.as_str()),
            _ => None,
        }
    }

    fn peek_quoted(&self) -> Option<&str> {
        match self.items.get(self.pos) {
            Some(Token::Quoted(q)) => Some(q.as_str()),
            _ => None,
        }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.items.len()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    /// Consume `keyword` if it is next.
    fn eat(&mut self, keyword: &str) -> bool {
        if self.peek_word() == Some(keyword) {
            self.advance();
            return true;
        }
        false
    }

    fn word(&mut self, what: &str) -> Result<String> {
        match self.items.get(self.pos) {
            Some(Token::Word(w)) => {
                let w = w.clone();
                self.advance();
                Ok(w)
            }
            Some(Token::Quoted(q)) => Err(syntax(format!("expected {what}, found \"{q}\""))),
            None => Err(syntax(format!("missing {what}"))),
        }
    }

    fn quoted(&mut self, what: &str) -> Result<String> {
        match self.peek_quoted() {
            Some(q) => {
                let q = q.to_string();
                self.advance();
                Ok(q)
            }
            None => Err(syntax(format!("expected quoted {what}"))),
        }
    }

    fn number<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let w = self.word(what)?;
        w.parse()
            .map_err(|_| syntax(format!("invalid {what}: {w}")))
    }

    fn selector(&mut self) -> Result<NodeSelector> {
        self.number("node id").map(NodeSelector::new)
    }

    /// One or more selectors, stopping at the first non-numeric token.
    fn selectors(&mut self) -> Result<Vec<NodeSelector>> {
        let mut nodes = vec![self.selector()?];
        while self.peek_word().is_some_and(|w| w.parse::<i32>().is_ok()) {
            nodes.push(self.selector()?);
        }
        Ok(nodes)
    }

    fn finish(self) -> Result<()> {
        match self.items.get(self.pos) {
            None => Ok(()),
            Some(Token::Word(w)) => Err(syntax(format!("unexpected argument: {w}"))),
            Some(Token::Quoted(q)) => Err(syntax(format!("unexpected argument: \"{q}\""))),
        }
    }
}

impl FromStr for Command {
    type Err = MeshsimError;

    fn from_str(line: &str) -> Result<Self> {
        let mut t = Tokens {
            items: tokenize(line)?,
            pos: 0,
        };

        let keyword = t.word("command")?;
        let cmd = match keyword.as_str() {
            "add" => parse_add(&mut t)?,
            "del" => Command::Del(DelCmd {
                nodes: t.selectors()?,
            }),
            "move" => Command::Move(MoveCmd {
                target: t.selector()?,
                x: t.number("x")?,
                y: t.number("y")?,
            }),
            "go" => parse_go(&mut t)?,
            "speed" => parse_speed(&mut t)?,
            "nodes" => Command::Nodes,
            "ls" => {
                if !t.eat("nodes") {
                    return Err(syntax("expected: ls nodes"));
                }
                Command::Nodes
            }
            "partitions" | "pts" => Command::Partitions,
            "ping" => parse_ping(&mut t)?,
            "node" => Command::Node(NodeCmd {
                node: t.selector()?,
                command: if t.peek_quoted().is_some() {
                    Some(t.quoted("command")?)
                } else {
                    None
                },
            }),
            "radio" => parse_radio(&mut t)?,
            "plr" => Command::Plr(PlrCmd {
                ratio: if t.is_empty() {
                    None
                } else {
                    Some(t.number("ratio")?)
                },
            }),
            "counters" => Command::Counters,
            "scan" => Command::Scan(ScanCmd {
                node: t.selector()?,
            }),
            "debug" => parse_debug(&mut t)?,
            "exit" => Command::Exit,
            other => return Err(syntax(format!("unknown command: {other}"))),
        };

        t.finish()?;
        Ok(cmd)
    }
}

fn parse_add(t: &mut Tokens) -> Result<Command> {
    let mut cmd = AddCmd {
        node_type: t.word("node type")?,
        x: None,
        y: None,
        id: None,
        radio_range: None,
    };

    while let Some(key) = t.peek_word().map(str::to_string) {
        t.advance();
        match key.as_str() {
            "x" => cmd.x = Some(t.number("x")?),
            "y" => cmd.y = Some(t.number("y")?),
            "id" => cmd.id = Some(t.number("id")?),
            "rr" => cmd.radio_range = Some(t.number("radio range")?),
            other => return Err(syntax(format!("unexpected add option: {other}"))),
        }
    }

    Ok(Command::Add(cmd))
}

fn parse_go(t: &mut Tokens) -> Result<Command> {
    let duration = if t.eat("ever") {
        GoDuration::Ever
    } else {
        let secs: f64 = t.number("seconds")?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(syntax(format!("invalid seconds: {secs}")));
        }
        GoDuration::Seconds(secs)
    };

    let speed = if t.eat("speed") {
        Some(t.number("speed")?)
    } else {
        None
    };

    Ok(Command::Go(GoCmd { duration, speed }))
}

fn parse_speed(t: &mut Tokens) -> Result<Command> {
    if t.is_empty() {
        return Ok(Command::Speed(SpeedCmd::Get));
    }
    if t.eat("max") {
        return Ok(Command::Speed(SpeedCmd::Max));
    }
    Ok(Command::Speed(SpeedCmd::Set(t.number("speed")?)))
}

fn parse_ping(t: &mut Tokens) -> Result<Command> {
    let src = t.selector()?;
    let dst = if t.peek_quoted().is_some() {
        PingDst::Addr(t.quoted("address")?)
    } else {
        PingDst::Node(t.selector()?)
    };

    let mut cmd = PingCmd {
        src,
        dst,
        addr_type: AddrType::Any,
        data_size: None,
        count: None,
        interval: None,
        hop_limit: None,
    };

    while let Some(key) = t.peek_word().map(str::to_string) {
        t.advance();
        match key.as_str() {
            "any" | "mleid" | "rloc" | "linklocal" => {
                cmd.addr_type = key.parse().map_err(syntax)?;
            }
            "datasize" | "ds" => cmd.data_size = Some(t.number("datasize")?),
            "count" | "c" => cmd.count = Some(t.number("count")?),
            "interval" | "itv" => cmd.interval = Some(t.number("interval")?),
            "hop" | "hoplimit" => cmd.hop_limit = Some(t.number("hop limit")?),
            other => return Err(syntax(format!("unexpected ping option: {other}"))),
        }
    }

    Ok(Command::Ping(cmd))
}

fn parse_radio(t: &mut Tokens) -> Result<Command> {
    let nodes = t.selectors()?;
    let action = match t.word("on, off or ft")?.as_str() {
        "on" => RadioAction::On,
        "off" => RadioAction::Off,
        "ft" => RadioAction::FailTime {
            interval: t.number("fail interval")?,
            duration: t.number("fail duration")?,
        },
        other => return Err(syntax(format!("expected on, off or ft, found {other}"))),
    };
    Ok(Command::Radio(RadioCmd { nodes, action }))
}

fn parse_debug(t: &mut Tokens) -> Result<Command> {
    let mut cmd = DebugCmd::default();
    while let Some(key) = t.peek_word().map(str::to_string) {
        t.advance();
        match key.as_str() {
            "echo" => cmd.echo = Some(t.quoted("echo text")?),
            "fail" => cmd.fail = true,
            other => return Err(syntax(format!("unexpected debug option: {other}"))),
        }
    }
    Ok(Command::Debug(cmd))
}
