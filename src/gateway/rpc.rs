//! JSON-RPC gateway over an alloy provider.
//!
//! The provider is built with the recommended fillers disabled: nothing on
//! this side fills nonce, gas or chain id implicitly. Node-signed
//! submissions go out with exactly the fields the orchestrator set, and the
//! locally signed path reads what it needs through explicit calls.

use crate::gateway::{ChainGateway, FilterId, GatewayError, TxReceipt};

use alloy::network::{ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionReceipt, TransactionRequest};
use alloy::transports::TransportError;
use std::time::Duration;
use tracing::{debug, info};

pub struct RpcGateway {
    provider: DynProvider,
    receipt_poll: Duration,
}

impl RpcGateway {
    /// Connect to an http(s) or ws(s) endpoint.
    pub async fn connect(url: &str, receipt_poll: Duration) -> Result<Self, GatewayError> {
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect(url)
            .await
            .map_err(transport)?;

        let head = provider.get_block_number().await.map_err(transport)?;
        info!(url = %url, block = head, "connected to RPC endpoint");

        Ok(Self {
            provider: provider.erased(),
            receipt_poll,
        })
    }

    async fn poll_receipt(&self, tx: B256) -> Result<TransactionReceipt, GatewayError> {
        loop {
            if let Some(receipt) = self
                .provider
                .get_transaction_receipt(tx)
                .await
                .map_err(transport)?
            {
                return Ok(receipt);
            }
            debug!(tx = %tx, "receipt not yet available");
            tokio::time::sleep(self.receipt_poll).await;
        }
    }
}

impl ChainGateway for RpcGateway {
    async fn block_number(&self) -> Result<u64, GatewayError> {
        self.provider.get_block_number().await.map_err(transport)
    }

    async fn accounts(&self) -> Result<Vec<Address>, GatewayError> {
        self.provider.get_accounts().await.map_err(transport)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, GatewayError> {
        let request = TransactionRequest::default().with_to(to).with_input(data);
        self.provider.call(request).await.map_err(rpc_error)
    }

    async fn create_filter(&self, filter: &Filter) -> Result<FilterId, GatewayError> {
        self.provider.new_filter(filter).await.map_err(transport)
    }

    async fn poll_filter(&self, id: FilterId) -> Result<Vec<Log>, GatewayError> {
        self.provider
            .get_filter_changes::<Log>(id)
            .await
            .map_err(transport)
    }

    async fn uninstall_filter(&self, id: FilterId) -> Result<bool, GatewayError> {
        self.provider.uninstall_filter(id).await.map_err(transport)
    }

    async fn nonce(&self, address: Address) -> Result<u64, GatewayError> {
        self.provider
            .get_transaction_count(address)
            .await
            .map_err(transport)
    }

    async fn chain_id(&self) -> Result<u64, GatewayError> {
        self.provider.get_chain_id().await.map_err(transport)
    }

    async fn gas_price(&self) -> Result<u128, GatewayError> {
        self.provider.get_gas_price().await.map_err(transport)
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256, GatewayError> {
        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(transport)?;
        Ok(*pending.tx_hash())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, GatewayError> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(transport)?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx: B256, timeout: Duration) -> Result<TxReceipt, GatewayError> {
        let receipt = tokio::time::timeout(timeout, self.poll_receipt(tx))
            .await
            .map_err(|_| GatewayError::ReceiptTimeout { tx, waited: timeout })??;

        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash(),
            status: receipt.status(),
            block_number: receipt.block_number(),
            gas_used: receipt.gas_used(),
        })
    }
}

fn transport<E: std::fmt::Display>(e: E) -> GatewayError {
    GatewayError::Transport(e.to_string())
}

/// Keep error responses from the node apart from connection failures.
fn rpc_error(e: TransportError) -> GatewayError {
    match e.as_error_resp() {
        Some(payload) => GatewayError::Rejected {
            code: payload.code,
            message: payload.message.to_string(),
        },
        None => transport(e),
    }
}
