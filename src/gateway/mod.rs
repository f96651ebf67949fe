//! Boundary to the remote ledger.
//!
//! Every component talks to the chain through [`ChainGateway`]: read calls,
//! log filters, nonce/fee reads for local signing, transaction submission and
//! receipt retrieval. [`rpc::RpcGateway`] implements it over an alloy
//! provider; tests use the scripted `mock::MockGateway`.

pub mod rpc;

#[cfg(test)]
pub mod mock;

pub use rpc::RpcGateway;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Server-side identifier of an installed log filter (the filter cursor).
pub type FilterId = U256;

#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    /// The node answered with a JSON-RPC error, e.g. a reverted call.
    #[error("rpc error {code}: {message}")]
    Rejected { code: i64, message: String },
    #[error("failed to decode result of {call}: {reason}")]
    Decode { call: &'static str, reason: String },
    #[error("no receipt for {tx} within {waited:?}")]
    ReceiptTimeout { tx: B256, waited: Duration },
    #[error("signing failed: {0}")]
    Signing(String),
}

impl GatewayError {
    /// The remote side answered but would not serve the request. Retrying
    /// the same call will not change the answer.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Decode { .. })
    }
}

/// The ledger's confirmation record for a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    /// True for status flag 1.
    pub status: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// Remote ledger surface consumed by this crate.
///
/// Implementations are shared read-only (`&self`) by every component; none of
/// the methods may hold a lock across an await.
pub trait ChainGateway: Send + Sync + 'static {
    fn block_number(&self) -> impl Future<Output = Result<u64, GatewayError>> + Send;

    /// Accounts managed (and signed for) by the node.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>, GatewayError>> + Send;

    /// `eth_call` against the current head.
    fn call(
        &self,
        to: Address,
        data: Bytes,
    ) -> impl Future<Output = Result<Bytes, GatewayError>> + Send;

    fn create_filter(
        &self,
        filter: &Filter,
    ) -> impl Future<Output = Result<FilterId, GatewayError>> + Send;

    /// Entries appended to the filter since the previous poll.
    fn poll_filter(
        &self,
        id: FilterId,
    ) -> impl Future<Output = Result<Vec<Log>, GatewayError>> + Send;

    fn uninstall_filter(
        &self,
        id: FilterId,
    ) -> impl Future<Output = Result<bool, GatewayError>> + Send;

    fn nonce(&self, address: Address) -> impl Future<Output = Result<u64, GatewayError>> + Send;

    fn chain_id(&self) -> impl Future<Output = Result<u64, GatewayError>> + Send;

    fn gas_price(&self) -> impl Future<Output = Result<u128, GatewayError>> + Send;

    /// `eth_sendTransaction`: the node fills in and signs for `from`.
    fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> impl Future<Output = Result<B256, GatewayError>> + Send;

    /// `eth_sendRawTransaction` with a locally signed, encoded envelope.
    fn send_raw_transaction(
        &self,
        raw: Bytes,
    ) -> impl Future<Output = Result<B256, GatewayError>> + Send;

    fn wait_for_receipt(
        &self,
        tx: B256,
        timeout: Duration,
    ) -> impl Future<Output = Result<TxReceipt, GatewayError>> + Send;
}
