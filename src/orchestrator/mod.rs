//! Transaction orchestration.
//!
//! One invocation walks `Built -> (Signed) -> Submitted -> Pending` and ends in
//! `Success`, `Reverted` or `Failed`. Nothing here retries: a reverted or failed
//! submission goes back to the caller as-is, since resubmitting against a
//! stateful ledger can execute twice.

use crate::auth::Identity;
use crate::gateway::{ChainGateway, GatewayError, TxReceipt};

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fixed gas limit when none is configured. Gas is never estimated.
pub const DEFAULT_GAS_LIMIT: u64 = 5_000_000;

/// Encoded contract call ready for submission.
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub to: Address,
    pub data: Bytes,
    /// Function name, for logs.
    pub label: &'static str,
}

impl PreparedCall {
    pub fn new<C: SolCall>(to: Address, call: &C) -> Self {
        let label = C::SIGNATURE.split('(').next().unwrap_or(C::SIGNATURE);
        Self {
            to,
            data: call.abi_encode().into(),
            label,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStage {
    Built,
    Signed,
    Submitted,
    Pending,
}

impl fmt::Display for TxStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStage::Built => write!(f, "built"),
            TxStage::Signed => write!(f, "signed"),
            TxStage::Submitted => write!(f, "submitted"),
            TxStage::Pending => write!(f, "pending"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TxOutcome {
    /// Receipt status 1.
    Success(TxReceipt),
    /// Receipt status 0: executed, rejected by the contract.
    Reverted(TxReceipt),
    /// No receipt. `stage` is the last state the submission reached.
    Failed { stage: TxStage, error: GatewayError },
}

impl TxOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TxOutcome::Success(_))
    }

    pub fn receipt(&self) -> Option<&TxReceipt> {
        match self {
            TxOutcome::Success(r) | TxOutcome::Reverted(r) => Some(r),
            TxOutcome::Failed { .. } => None,
        }
    }
}

impl fmt::Display for TxOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxOutcome::Success(r) => write!(
                f,
                "success: tx {} in block {} (gas {})",
                r.tx_hash,
                block_label(r),
                r.gas_used
            ),
            TxOutcome::Reverted(r) => write!(
                f,
                "reverted: tx {} in block {} (gas {})",
                r.tx_hash,
                block_label(r),
                r.gas_used
            ),
            TxOutcome::Failed { stage, error } => write!(f, "failed after {stage}: {error}"),
        }
    }
}

fn block_label(receipt: &TxReceipt) -> String {
    receipt
        .block_number
        .map(|b| b.to_string())
        .unwrap_or_else(|| "?".to_string())
}

pub struct TransactionOrchestrator<G> {
    gateway: Arc<G>,
    receipt_timeout: Duration,
}

impl<G: ChainGateway> TransactionOrchestrator<G> {
    pub fn new(gateway: Arc<G>, receipt_timeout: Duration) -> Self {
        Self {
            gateway,
            receipt_timeout,
        }
    }

    /// Build, sign if needed, broadcast and wait for the receipt.
    pub async fn submit(&self, identity: &Identity, call: &PreparedCall, gas_limit: u64) -> TxOutcome {
        let request = TransactionRequest::default()
            .with_from(identity.address())
            .with_to(call.to)
            .with_input(call.data.clone())
            .with_gas_limit(gas_limit);
        debug!(call = call.label, to = %call.to, from = %identity.address(), gas_limit, "built");

        let sent = match identity {
            Identity::Account(_) => self.gateway.send_transaction(request).await,
            Identity::PrivateKey(signer) => match self.sign(signer, request).await {
                Ok(raw) => {
                    debug!(call = call.label, bytes = raw.len(), "signed");
                    self.gateway.send_raw_transaction(raw).await
                }
                Err(error) => return self.failed(call, TxStage::Built, error),
            },
        };

        let stage = if identity.signs_locally() {
            TxStage::Signed
        } else {
            TxStage::Built
        };
        let tx_hash = match sent {
            Ok(hash) => hash,
            Err(error) => return self.failed(call, stage, error),
        };
        debug!(call = call.label, tx = %tx_hash, "submitted");

        debug!(call = call.label, tx = %tx_hash, timeout = ?self.receipt_timeout, "pending");
        let receipt = match self.gateway.wait_for_receipt(tx_hash, self.receipt_timeout).await {
            Ok(receipt) => receipt,
            Err(error) => return self.failed(call, TxStage::Pending, error),
        };

        if receipt.status {
            info!(
                call = call.label,
                tx = %receipt.tx_hash,
                block = ?receipt.block_number,
                gas_used = receipt.gas_used,
                "transaction succeeded"
            );
            TxOutcome::Success(receipt)
        } else {
            warn!(
                call = call.label,
                tx = %receipt.tx_hash,
                block = ?receipt.block_number,
                gas_used = receipt.gas_used,
                "transaction reverted"
            );
            TxOutcome::Reverted(receipt)
        }
    }

    /// Fill nonce, chain id and gas price, then sign into a raw envelope.
    /// The key never leaves this process.
    async fn sign(&self, signer: &PrivateKeySigner, request: TransactionRequest) -> Result<Bytes, GatewayError> {
        let from = signer.address();
        let (nonce, chain_id, gas_price) = tokio::try_join!(
            self.gateway.nonce(from),
            self.gateway.chain_id(),
            self.gateway.gas_price(),
        )?;

        let request = request
            .with_nonce(nonce)
            .with_chain_id(chain_id)
            .with_gas_price(gas_price);

        let wallet = EthereumWallet::from(signer.clone());
        let envelope = request
            .build(&wallet)
            .await
            .map_err(|e| GatewayError::Signing(e.to_string()))?;
        Ok(envelope.encoded_2718().into())
    }

    fn failed(&self, call: &PreparedCall, stage: TxStage, error: GatewayError) -> TxOutcome {
        warn!(call = call.label, stage = %stage, error = %error, "transaction failed");
        TxOutcome::Failed { stage, error }
    }
}
