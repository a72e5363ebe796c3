use std::net::IpAddr;
use std::time::Duration;
use clap::Parser;
use shared::protocol::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_MATCH_CAPACITY, DEFAULT_QUERY_TIMEOUT_SECS,
};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "airlift",
    version,
    about = "Send a byte stream to one other host on the local network",
    long_about = "`airlift` moves a byte stream between two hosts on the same network with no setup.

The sending side advertises itself over mDNS and waits for exactly one
receiver; the receiving side finds it, connects, and writes the stream to
stdout. With piped stdin airlift sends, with a terminal on stdin it receives.

EXAMPLE:
    # on the sending host
    tar c ./photos | airlift

    # on the receiving host
    airlift | tar x"
)]
pub struct Args {
    /// Only publish, regardless of whether stdin is a terminal
    #[arg(short = 'p', long = "publish", conflicts_with = "receive")]
    pub publish: bool,

    /// Only receive, regardless of whether stdin is a terminal
    #[arg(short = 'r', long = "receive")]
    pub receive: bool,

    /// Address the rendezvous listener binds to
    ///
    /// Defaults to the unspecified address of the family being advertised.
    #[arg(long, value_name = "IP")]
    pub bind: Option<IpAddr>,

    /// Instance name to advertise (default: hostname)
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Seconds to collect discovery responses before giving up; 0 waits forever
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_QUERY_TIMEOUT_SECS)]
    pub query_timeout: u64,

    /// Per-candidate connect timeout in milliseconds
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    pub connect_timeout: u64,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: WARN)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Publish,
    Receive,
}

/// Everything a session needs once flags and the terminal check are settled.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub role: Role,
    pub bind: Option<IpAddr>,
    pub name: Option<String>,
    pub query_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub match_capacity: usize,
}

/// Explicit flags win; otherwise a terminal on stdin means there is nothing
/// to send.
pub fn pick_role(publish: bool, receive: bool, stdin_is_terminal: bool) -> Role {
    match (publish, receive) {
        (_, true) => Role::Receive,
        (true, false) => Role::Publish,
        (false, false) if stdin_is_terminal => Role::Receive,
        (false, false) => Role::Publish,
    }
}

impl Args {
    pub fn resolve(&self, stdin_is_terminal: bool) -> SessionConfig {
        SessionConfig {
            role: pick_role(self.publish, self.receive, stdin_is_terminal),
            bind: self.bind,
            name: self.name.clone(),
            query_timeout: match self.query_timeout {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            connect_timeout: Duration::from_millis(self.connect_timeout),
            match_capacity: DEFAULT_MATCH_CAPACITY,
        }
    }

    /// Fallback filter directive when `RUST_LOG` is unset.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "airlift=warn",
            1 => "airlift=info",
            2 => "airlift=debug",
            _ => "airlift=trace",
        }
    }
}
