//! Esplora (Blockstream-style) HTTP provider

use super::{Broadcaster, FeeRateSource, ProviderError, StatusProvider, TxStatus, UtxoProvider};
use crate::script::{Address, Network};
use crate::tx::{FeeRate, OutPoint, Txid, Utxo};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;

/// Esplora API endpoints
pub const MAINNET_URL: &str = "https://blockstream.info/api";
pub const TESTNET_URL: &str = "https://blockstream.info/testnet/api";

/// Esplora HTTP client
#[derive(Debug, Clone)]
pub struct EsploraClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    network: Network,
}

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraTxStatus {
    confirmed: bool,
    block_height: Option<u64>,
}

impl EsploraClient {
    /// Create a new client with custom URL
    pub fn new(base_url: &str, network: Network) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            network,
        }
    }

    /// Public endpoint for `network`; regtest has none and uses localhost
    pub fn for_network(network: Network) -> Self {
        let url = match network {
            Network::Mainnet => MAINNET_URL,
            Network::Testnet => TESTNET_URL,
            Network::Regtest => "http://127.0.0.1:3002",
        };
        Self::new(url, network)
    }

    /// Send `Authorization: Bearer <key>` with every request
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Current chain tip height
    pub async fn tip_height(&self) -> Result<u64, ProviderError> {
        let resp = self.get("/blocks/tip/height").send().await.map_err(network)?;
        if let Some(err) = status_error(resp.status(), "tip height") {
            return Err(err);
        }
        let text = resp.text().await.map_err(network)?;
        text.trim()
            .parse()
            .map_err(|_| ProviderError::InvalidResponse(format!("block height {:?}", text)))
    }
}

fn network(err: reqwest::Error) -> ProviderError {
    ProviderError::Network(err.to_string())
}

/// Non-success HTTP statuses are transport failures, not bad data
fn status_error(status: StatusCode, what: &str) -> Option<ProviderError> {
    (!status.is_success()).then(|| ProviderError::Network(format!("{}: HTTP {}", what, status)))
}

#[async_trait]
impl UtxoProvider for EsploraClient {
    async fn list_unspent(&self, address: &str) -> Result<Vec<Utxo>, ProviderError> {
        let script_pubkey = Address::parse(address, self.network)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?
            .script_pubkey();

        let resp = self
            .get(&format!("/address/{}/utxo", address))
            .send()
            .await
            .map_err(network)?;
        if !resp.status().is_success() {
            return Err(ProviderError::Network(format!("HTTP {}", resp.status())));
        }

        let entries: Vec<EsploraUtxo> = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        entries
            .into_iter()
            .map(|e| {
                let txid: Txid = e
                    .txid
                    .parse()
                    .map_err(|_| ProviderError::InvalidResponse(format!("txid {}", e.txid)))?;
                Ok(Utxo {
                    outpoint: OutPoint { txid, vout: e.vout },
                    value: e.value,
                    script_pubkey: script_pubkey.clone(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Broadcaster for EsploraClient {
    async fn submit(&self, raw: &[u8]) -> Result<Txid, ProviderError> {
        let request = self
            .client
            .post(format!("{}/tx", self.base_url))
            .body(hex::encode(raw));
        let resp = self.authorize(request).send().await.map_err(network)?;

        let status = resp.status();
        let text = resp.text().await.map_err(network)?;
        if status == StatusCode::BAD_REQUEST {
            return Err(ProviderError::Rejected(text));
        }
        if !status.is_success() {
            return Err(ProviderError::Network(format!("HTTP {}: {}", status, text)));
        }

        text.trim()
            .parse()
            .map_err(|_| ProviderError::InvalidResponse(format!("txid {:?}", text)))
    }
}

#[async_trait]
impl StatusProvider for EsploraClient {
    async fn get_status(&self, txid: &Txid) -> Result<TxStatus, ProviderError> {
        let resp = self
            .get(&format!("/tx/{}/status", txid))
            .send()
            .await
            .map_err(network)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(txid.to_string()));
        }
        if !resp.status().is_success() {
            return Err(ProviderError::Network(format!("HTTP {}", resp.status())));
        }

        let status: EsploraTxStatus = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if !status.confirmed {
            return Ok(TxStatus::mempool());
        }

        let tip = self.tip_height().await?;
        let height = status.block_height.unwrap_or(tip);
        Ok(TxStatus {
            in_mempool: false,
            confirmations: (tip.saturating_sub(height) + 1) as u32,
            block_height: status.block_height,
        })
    }
}

#[async_trait]
impl FeeRateSource for EsploraClient {
    async fn fee_rate(&self, target_blocks: u16) -> Result<FeeRate, ProviderError> {
        let resp = self.get("/fee-estimates").send().await.map_err(network)?;
        if let Some(err) = status_error(resp.status(), "fee estimates") {
            return Err(err);
        }
        let estimates: HashMap<String, f64> = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        // Nearest target at or above the requested one, else the slowest
        let mut targets: Vec<(u16, f64)> = estimates
            .iter()
            .filter_map(|(k, v)| k.parse().ok().map(|t| (t, *v)))
            .collect();
        targets.sort_by_key(|(t, _)| *t);

        let rate = targets
            .iter()
            .find(|(t, _)| *t >= target_blocks)
            .or_else(|| targets.last())
            .map(|(_, r)| *r)
            .ok_or_else(|| ProviderError::InvalidResponse("empty fee estimates".into()))?;

        Ok(FeeRate::from_sat_per_vb_f64(rate))
    }
}
