//! Vault contract interface and typed read helper.

pub mod abi;

pub use abi::{IOracleGuidedVault, IPriceOracle, IVaultToken};

use crate::gateway::{ChainGateway, GatewayError};
use alloy::primitives::Address;
use alloy::sol_types::SolCall;

/// Call a view function on `to` and decode its return value.
pub async fn read<G, C>(gateway: &G, to: Address, call: C) -> Result<C::Return, GatewayError>
where
    G: ChainGateway,
    C: SolCall + Send,
{
    let data = gateway.call(to, call.abi_encode().into()).await?;
    C::abi_decode_returns(&data).map_err(|e| GatewayError::Decode {
        call: C::SIGNATURE,
        reason: e.to_string(),
    })
}
