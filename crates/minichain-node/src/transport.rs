use std::{future::Future, time::Duration};

use minichain_core::{
    consensus::{PeerChain, PeerTransport},
    TransportError,
};
use reqwest::Client;
use tracing::debug;

/// Fetches `/get_chain` from peers over plain HTTP.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl PeerTransport for HttpTransport {
    fn fetch_chain(
        &self,
        peer: &str,
    ) -> impl Future<Output = Result<PeerChain, TransportError>> + Send {
        let client = self.client.clone();
        let peer = peer.to_string();
        async move {
            let url = format!("http://{peer}/get_chain");
            debug!(%url, "fetching peer chain");
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|err| TransportError::Unreachable {
                    peer: peer.clone(),
                    reason: err.to_string(),
                })?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status {
                    peer,
                    status: status.as_u16(),
                });
            }
            response
                .json::<PeerChain>()
                .await
                .map_err(|err| TransportError::Decode {
                    peer,
                    reason: err.to_string(),
                })
        }
    }
}
