use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use minichain_core::{
    consensus::{gather_candidates, PeerTransport},
    mine::solve_parallel,
    Block, LedgerError,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::state::AppState;

pub const VALID_MESSAGE: &str = "All Good. The Blockchain is valid !!";
pub const INVALID_MESSAGE: &str = "Houston, we have a problem. The Blockchain is not valid !!";

pub fn router<T: PeerTransport + 'static>(state: AppState<T>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/mine_block", get(mine_block::<T>))
        .route("/get_chain", get(get_chain::<T>))
        .route("/is_valid", get(is_valid::<T>))
        .route("/add_transaction", post(add_transaction::<T>))
        .route("/connect_node", post(connect_node::<T>))
        .route("/replace_chain", get(replace_chain::<T>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MineResponse {
    pub message: String,
    #[serde(flatten)]
    pub block: Block,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub length: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct TxIn {
    sender: Option<String>,
    receiver: Option<String>,
    amount: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TxAccepted {
    pub message: String,
    pub index: u64,
}

#[derive(Debug, Deserialize)]
pub struct ConnectIn {
    nodes: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub message: String,
    pub total_nodes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplaceResponse {
    pub message: String,
    pub replaced: bool,
    pub chain: Vec<Block>,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn mine_block<T: PeerTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Result<Json<MineResponse>, ApiError> {
    loop {
        let template = state.ledger.read().await.mining_template()?;
        let (previous_proof, difficulty) = (template.previous_proof, template.difficulty);
        let proof = tokio::task::spawn_blocking(move || solve_parallel(previous_proof, difficulty))
            .await
            .map_err(|err| ApiError::internal(format!("proof search aborted: {err}")))?;

        let mut ledger = state.ledger.write().await;
        match ledger.commit_mined(&template, proof, &state.reward) {
            Ok(block) => {
                state.persist_tip(ledger.chain());
                return Ok(Json(MineResponse {
                    message: format!("Congratulations, you just mined block {}!", block.index),
                    block,
                }));
            }
            Err(LedgerError::StaleTip) => {
                debug!("chain tip moved during proof search, mining again");
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn get_chain<T: PeerTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Json<ChainResponse> {
    let ledger = state.ledger.read().await;
    Json(ChainResponse {
        chain: ledger.chain().to_vec(),
        length: ledger.len(),
    })
}

async fn is_valid<T: PeerTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Json<MessageResponse> {
    let ledger = state.ledger.read().await;
    let message = if ledger.is_chain_valid(ledger.chain()) {
        VALID_MESSAGE
    } else {
        INVALID_MESSAGE
    };
    Json(MessageResponse {
        message: message.to_string(),
    })
}

async fn add_transaction<T: PeerTransport + 'static>(
    State(state): State<AppState<T>>,
    payload: Result<Json<TxIn>, JsonRejection>,
) -> Result<(StatusCode, Json<TxAccepted>), ApiError> {
    let Json(tx) = payload?;
    let missing: Vec<&str> = [
        ("sender", tx.sender.is_none()),
        ("receiver", tx.receiver.is_none()),
        ("amount", tx.amount.is_none()),
    ]
    .into_iter()
    .filter_map(|(field, absent)| absent.then_some(field))
    .collect();
    let (Some(sender), Some(receiver), Some(amount)) = (tx.sender, tx.receiver, tx.amount) else {
        return Err(ApiError::bad_request(format!(
            "some elements of the transaction are missing: {}",
            missing.join(", ")
        )));
    };

    let index = state
        .ledger
        .write()
        .await
        .add_transaction(sender, receiver, amount);
    Ok((
        StatusCode::CREATED,
        Json(TxAccepted {
            message: format!("This transaction will be added to block {index}"),
            index,
        }),
    ))
}

async fn connect_node<T: PeerTransport + 'static>(
    State(state): State<AppState<T>>,
    payload: Result<Json<ConnectIn>, JsonRejection>,
) -> Result<(StatusCode, Json<ConnectResponse>), ApiError> {
    let Json(body) = payload?;
    let nodes = body.nodes.unwrap_or_default();
    if nodes.is_empty() {
        return Err(ApiError::bad_request("no nodes supplied"));
    }
    // Reject the whole request before registering anything.
    for node in &nodes {
        minichain_core::peers::normalize_peer(node)?;
    }

    let mut ledger = state.ledger.write().await;
    for node in &nodes {
        ledger.add_peer(node)?;
    }
    Ok((
        StatusCode::CREATED,
        Json(ConnectResponse {
            message: "All the nodes are now connected.".to_string(),
            total_nodes: ledger.peers().to_vec(),
        }),
    ))
}

async fn replace_chain<T: PeerTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Json<ReplaceResponse> {
    let peers = state.ledger.read().await.peers().to_vec();
    let candidates = gather_candidates(state.transport.as_ref(), peers).await;

    let mut ledger = state.ledger.write().await;
    let replaced = ledger.adopt_longest(candidates);
    if replaced {
        state.persist_chain(ledger.chain());
    }
    let message = if replaced {
        "The nodes had different chains so the chain was replaced by the longest one."
    } else {
        "All good. The chain is the largest one."
    };
    Json(ReplaceResponse {
        message: message.to_string(),
        replaced,
        chain: ledger.chain().to_vec(),
    })
}

/// Error returned by handlers, rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "{}", self.message);
        } else {
            info!(status = %self.status, "rejected request: {}", self.message);
        }
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::MalformedPeer(_) | LedgerError::InvalidChain(_) => {
                Self::bad_request(err.to_string())
            }
            LedgerError::EmptyChain
            | LedgerError::StaleTip
            | LedgerError::InvalidProof { .. } => Self::internal(err.to_string()),
        }
    }
}
