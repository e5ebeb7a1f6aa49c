use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "minichain")]
#[command(about = "CLI client for a minichain node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:5000)
    #[arg(long, global = true, env = "MINICHAIN_NODE", default_value = "http://127.0.0.1:5000")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mine one block on the node
    Mine,
    /// Print the node's chain
    Chain,
    /// Ask the node to validate its own chain
    Valid,
    /// Submit a transaction
    Submit {
        /// Sender
        #[arg(long)]
        sender: String,
        /// Receiver
        #[arg(long)]
        receiver: String,
        /// Amount
        #[arg(long)]
        amount: u64,
    },
    /// Register peer nodes
    Connect {
        /// Peer URLs, e.g. http://127.0.0.1:5001
        #[arg(required = true)]
        nodes: Vec<String>,
    },
    /// Run longest-chain resolution against the node's peers
    Resolve,
}

#[derive(Serialize)]
struct Tx {
    sender: String,
    receiver: String,
    amount: u64,
}

#[derive(Serialize)]
struct Connect {
    nodes: Vec<String>,
}

enum Request {
    Get(&'static str),
    Post(&'static str, Value),
}

impl Command {
    fn into_request(self) -> Result<Request> {
        Ok(match self {
            Command::Mine => Request::Get("/mine_block"),
            Command::Chain => Request::Get("/get_chain"),
            Command::Valid => Request::Get("/is_valid"),
            Command::Resolve => Request::Get("/replace_chain"),
            Command::Submit {
                sender,
                receiver,
                amount,
            } => Request::Post(
                "/add_transaction",
                serde_json::to_value(Tx {
                    sender,
                    receiver,
                    amount,
                })?,
            ),
            Command::Connect { nodes } => {
                Request::Post("/connect_node", serde_json::to_value(Connect { nodes })?)
            }
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let base = cli.node.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    let res = match cli.cmd.into_request()? {
        Request::Get(path) => {
            debug!(%base, path, "GET");
            client.get(format!("{base}{path}")).send().await
        }
        Request::Post(path, body) => {
            debug!(%base, path, "POST");
            client.post(format!("{base}{path}")).json(&body).send().await
        }
    }
    .with_context(|| format!("contacting node at {base}"))?;

    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}
