use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

pub mod chain;
pub mod consensus;
pub mod constants;
pub mod error;
pub mod mine;
pub mod peers;
pub mod validate;

pub use chain::{Blockchain, MiningReward, MiningTemplate};
pub use error::{ChainValidationError, LedgerError, TransportError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, amount: u64) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
        }
    }

    fn canonical_value(&self) -> Value {
        json!({
            "sender": self.sender,
            "receiver": self.receiver,
            "amount": self.amount,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: String,
    pub proof: u64,
    pub previous_hash: String,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Hex SHA-256 of the block's canonical JSON.
    pub fn hash(&self) -> String {
        hash_block(self)
    }

    pub fn canonical_value(&self) -> Value {
        json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "proof": self.proof,
            "previous_hash": self.previous_hash,
            "transactions": self
                .transactions
                .iter()
                .map(Transaction::canonical_value)
                .collect::<Vec<_>>(),
        })
    }
}

/// Local wall-clock time in the block timestamp format.
pub fn now_timestamp() -> String {
    chrono::Local::now()
        .format(constants::TIMESTAMP_FORMAT)
        .to_string()
}

pub fn hash_block(block: &Block) -> String {
    hash_value(&block.canonical_value())
}

/// Hash any JSON value in its canonical text form, see [`canonical_json`].
pub fn hash_value(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Canonical text of a JSON value: object keys sorted at every depth, `", "`
/// between items, `": "` after keys, and everything outside printable ASCII
/// escaped as lowercase `\uXXXX` (UTF-16 surrogate pairs above the BMP).
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, inner)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(key, out);
                out.push_str(": ");
                write_canonical(inner, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
        }
    }
    out.push('"');
}

pub mod pow {
    use super::sha256_hex;

    /// Hex digest of `proof² - previous_proof²` rendered as a decimal string.
    /// `None` when the squares do not fit in 128-bit arithmetic.
    pub fn proof_digest(previous_proof: u64, proof: u64) -> Option<String> {
        let p = i128::from(proof).checked_mul(i128::from(proof))?;
        let q = i128::from(previous_proof).checked_mul(i128::from(previous_proof))?;
        let delta = p.checked_sub(q)?;
        Some(sha256_hex(delta.to_string().as_bytes()))
    }

    pub fn meets_difficulty(digest: &str, difficulty: usize) -> bool {
        digest.len() >= difficulty && digest.bytes().take(difficulty).all(|b| b == b'0')
    }

    pub fn verify(previous_proof: u64, proof: u64, difficulty: usize) -> bool {
        proof_digest(previous_proof, proof)
            .map(|digest| meets_difficulty(&digest, difficulty))
            .unwrap_or(false)
    }

    /// Sequential search from 1 upwards. Returns the smallest proof that
    /// satisfies `verify`; there is no upper bound on how long this takes.
    pub fn solve(previous_proof: u64, difficulty: usize) -> u64 {
        let mut proof = 1u64;
        while !verify(previous_proof, proof, difficulty) {
            proof = proof.wrapping_add(1);
        }
        proof
    }
}
