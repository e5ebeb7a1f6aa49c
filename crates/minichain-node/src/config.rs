use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use minichain_core::constants::{HASH_HEX_SIZE, POW_DIFFICULTY};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:5000";
pub const DEFAULT_REWARD_RECEIVER: &str = "miner";
pub const DEFAULT_REWARD_AMOUNT: u64 = 1;
pub const DEFAULT_PEER_TIMEOUT_SECS: u64 = 10;

#[derive(Parser, Debug, Clone)]
#[command(name = "minichain-node", about = "Proof-of-work ledger node")]
pub struct Args {
    /// Address to listen on, e.g. 127.0.0.1:5000
    #[arg(long, env = "MINICHAIN_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// Leading zero hex digits a proof digest must have
    #[arg(long, env = "MINICHAIN_DIFFICULTY", default_value_t = POW_DIFFICULTY)]
    pub difficulty: usize,

    /// Receiver of the reward transaction added to every mined block
    #[arg(long, env = "MINICHAIN_REWARD_RECEIVER", default_value = DEFAULT_REWARD_RECEIVER)]
    pub reward_receiver: String,

    /// Amount of the mining reward
    #[arg(long, env = "MINICHAIN_REWARD_AMOUNT", default_value_t = DEFAULT_REWARD_AMOUNT)]
    pub reward_amount: u64,

    /// Keep a sled snapshot of the chain here; memory only when unset
    #[arg(long, env = "MINICHAIN_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Per-request timeout when fetching peer chains
    #[arg(long, env = "MINICHAIN_PEER_TIMEOUT_SECS", default_value_t = DEFAULT_PEER_TIMEOUT_SECS)]
    pub peer_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub listen: SocketAddr,
    pub difficulty: usize,
    pub reward_receiver: String,
    pub reward_amount: u64,
    pub data_dir: Option<PathBuf>,
    pub peer_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 5000)),
            difficulty: POW_DIFFICULTY,
            reward_receiver: DEFAULT_REWARD_RECEIVER.to_string(),
            reward_amount: DEFAULT_REWARD_AMOUNT,
            data_dir: None,
            peer_timeout: Duration::from_secs(DEFAULT_PEER_TIMEOUT_SECS),
        }
    }
}

impl TryFrom<Args> for NodeConfig {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        let listen: SocketAddr = args
            .listen
            .parse()
            .with_context(|| format!("invalid listen address {:?}", args.listen))?;
        ensure!(
            args.difficulty <= HASH_HEX_SIZE,
            "difficulty {} exceeds the {HASH_HEX_SIZE} hex digits of a digest",
            args.difficulty
        );
        ensure!(
            !args.reward_receiver.trim().is_empty(),
            "reward receiver must not be empty"
        );
        ensure!(args.peer_timeout_secs > 0, "peer timeout must be positive");

        Ok(Self {
            listen,
            difficulty: args.difficulty,
            reward_receiver: args.reward_receiver,
            reward_amount: args.reward_amount,
            data_dir: args.data_dir,
            peer_timeout: Duration::from_secs(args.peer_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<NodeConfig> {
        let mut argv = vec!["minichain-node"];
        argv.extend_from_slice(extra);
        NodeConfig::try_from(Args::try_parse_from(argv)?)
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.listen, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(config.difficulty, 4);
        assert_eq!(config.reward_receiver, "miner");
        assert_eq!(config.reward_amount, 1);
        assert!(config.data_dir.is_none());
        assert_eq!(config.peer_timeout, Duration::from_secs(10));
    }

    #[test]
    fn overrides() {
        let config = parse(&[
            "--listen",
            "0.0.0.0:5001",
            "--difficulty",
            "3",
            "--reward-receiver",
            "richard",
            "--reward-amount",
            "50",
            "--data-dir",
            "/tmp/node",
        ])
        .unwrap();
        assert_eq!(config.listen.port(), 5001);
        assert_eq!(config.difficulty, 3);
        assert_eq!(config.reward_receiver, "richard");
        assert_eq!(config.reward_amount, 50);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/node")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(&["--listen", "nowhere"]).is_err());
        assert!(parse(&["--difficulty", "65"]).is_err());
        assert!(parse(&["--reward-receiver", " "]).is_err());
        assert!(parse(&["--peer-timeout-secs", "0"]).is_err());
    }
}
