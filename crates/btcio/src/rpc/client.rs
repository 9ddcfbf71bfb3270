use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use bitcoin::{Address, Txid};
use reqwest::{
    header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use serde::{de, Deserialize, Serialize};
use serde_json::{json, value::Value};
use tokio::time::sleep;
use tracing::*;

use crate::rpc::{
    error::{BitcoinRpcError, ClientError},
    traits::FullNodeRpc,
    types::{GetTransaction, RawUtxo},
};

/// This is an alias for the result type returned by the [`BitcoinClient`].
pub type ClientResult<T> = Result<T, ClientError>;

/// The maximum number of transport retries for a request.
const MAX_RETRIES: u8 = 3;

/// Fixed timeout for a single request to the node.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Custom implementation to convert a value to a `Value` type.
pub fn to_value<T>(value: T) -> ClientResult<Value>
where
    T: Serialize,
{
    serde_json::to_value(value)
        .map_err(|e| ClientError::Param(format!("error creating value: {}", e)))
}

/// An `async` client for interacting with a `bitcoind` instance.
#[derive(Debug)]
pub struct BitcoinClient {
    /// The URL of the `bitcoind` instance.
    url: String,
    /// The underlying `async` HTTP client.
    client: Client,
    /// The ID of the current request.
    id: AtomicUsize,
}

/// Response returned by the `bitcoind` RPC server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Response<R> {
    pub result: Option<R>,
    pub error: Option<BitcoinRpcError>,
    pub id: u64,
}

impl BitcoinClient {
    /// Creates a new [`BitcoinClient`] with the given URL, username, and password.
    pub fn new(url: String, username: String, password: String) -> ClientResult<Self> {
        if username.is_empty() || password.is_empty() {
            return Err(ClientError::MissingUserPassword);
        }

        let user_pw = general_purpose::STANDARD.encode(format!("{username}:{password}"));
        let authorization = format!("Basic {user_pw}")
            .parse()
            .map_err(|_| ClientError::Other("error parsing auth header".to_string()))?;

        let content_type = "application/json"
            .parse()
            .map_err(|_| ClientError::Other("error parsing content-type header".to_string()))?;
        let headers =
            HeaderMap::from_iter([(AUTHORIZATION, authorization), (CONTENT_TYPE, content_type)]);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Other(format!("could not create client: {e}")))?;

        let id = AtomicUsize::new(0);

        trace!(url = %url, "created bitcoin client");

        Ok(Self { url, client, id })
    }

    fn next_id(&self) -> usize {
        self.id.fetch_add(1, Ordering::AcqRel)
    }

    /// Issues one RPC call, retrying transient transport failures a bounded
    /// number of times. Returns the raw optional result; RPCs that return
    /// `null` on success yield `None`.
    async fn call_opt<T: de::DeserializeOwned + fmt::Debug>(
        &self,
        method: &str,
        params: &[Value],
    ) -> ClientResult<Option<T>> {
        let mut retries = 0;
        loop {
            trace!(%method, ?params, %retries, "calling bitcoin client");

            let id = self.next_id();

            let response = self
                .client
                .post(&self.url)
                .json(&json!({
                    "jsonrpc": "1.0",
                    "id": id,
                    "method": method,
                    "params": params
                }))
                .send()
                .await;
            match response {
                Ok(resp) => {
                    let data = resp
                        .json::<Response<T>>()
                        .await
                        .map_err(|e| ClientError::Parse(e.to_string()))?;
                    if let Some(err) = data.error {
                        return Err(ClientError::Server(err.code, err.message));
                    }
                    return Ok(data.result);
                }
                Err(err) => {
                    warn!(%method, %err, "error calling bitcoin client");

                    if err.is_body() {
                        // Body error is unrecoverable
                        return Err(ClientError::Body(err.to_string()));
                    } else if err.is_status() {
                        // Status error is unrecoverable
                        let e = match err.status() {
                            Some(code) => ClientError::Status(code.to_string(), err.to_string()),
                            _ => ClientError::Other(err.to_string()),
                        };
                        return Err(e);
                    } else if err.is_decode() {
                        // Error decoding the response, might be recoverable
                        let e = ClientError::MalformedResponse(err.to_string());
                        warn!(%e, "decoding error, retrying...");
                    } else if err.is_connect() {
                        // Connection error, might be recoverable
                        let e = ClientError::Connection(err.to_string());
                        warn!(%e, "connection error, retrying...");
                    } else if err.is_timeout() {
                        // Timeout, might be recoverable
                        let e = ClientError::Timeout;
                        warn!(%e, "timeout error, retrying...");
                    } else if err.is_request() {
                        // General request error, might be recoverable
                        let e = ClientError::Request(err.to_string());
                        warn!(%e, "request error, retrying...");
                    } else if err.is_builder() {
                        // Request builder error is unrecoverable
                        return Err(ClientError::ReqBuilder(err.to_string()));
                    } else if err.is_redirect() {
                        // Redirect error is unrecoverable
                        return Err(ClientError::HttpRedirect(err.to_string()));
                    } else {
                        // Unknown error is unrecoverable
                        return Err(ClientError::Other("unknown error".to_string()));
                    }
                }
            }
            retries += 1;
            if retries >= MAX_RETRIES {
                return Err(ClientError::MaxRetriesExceeded(MAX_RETRIES));
            }
            sleep(Duration::from_millis(1_000)).await;
        }
    }

    async fn call<T: de::DeserializeOwned + fmt::Debug>(
        &self,
        method: &str,
        params: &[Value],
    ) -> ClientResult<T> {
        self.call_opt(method, params)
            .await?
            .ok_or_else(|| ClientError::Other("empty data received".to_string()))
    }

    /// For RPCs like `importaddress` and `ping` whose success result is
    /// `null`.
    async fn call_void(&self, method: &str, params: &[Value]) -> ClientResult<()> {
        self.call_opt::<Value>(method, params).await?;
        Ok(())
    }
}

#[async_trait]
impl FullNodeRpc for BitcoinClient {
    async fn import_watch_address(&self, address: &Address) -> ClientResult<()> {
        // Empty label, no rescan. Deposits only matter from import time on.
        self.call_void(
            "importaddress",
            &[to_value(address.to_string())?, to_value("")?, to_value(false)?],
        )
        .await
    }

    async fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        addresses: &[Address],
    ) -> ClientResult<Vec<RawUtxo>> {
        let addresses: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
        let resp = self
            .call::<Vec<RawUtxo>>(
                "listunspent",
                &[
                    to_value(min_conf)?,
                    to_value(max_conf)?,
                    to_value(addresses)?,
                ],
            )
            .await?;
        trace!(count = resp.len(), "got deposit utxos");
        Ok(resp)
    }

    async fn get_transaction(&self, txid: &Txid) -> ClientResult<GetTransaction> {
        self.call::<GetTransaction>("gettransaction", &[to_value(txid.to_string())?])
            .await
    }

    async fn ping(&self) -> ClientResult<()> {
        self.call_void("ping", &[]).await
    }
}
