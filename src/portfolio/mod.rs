//! Portfolio snapshots.
//!
//! A snapshot is a handful of independent reads issued concurrently. They are
//! not pinned to one block, so under concurrent activity the figures may come
//! from slightly different heights.

use crate::gateway::{ChainGateway, GatewayError};
use crate::vault::{self, IOracleGuidedVault, IVaultToken};

use alloy::primitives::{Address, U256};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Assumed precision for tokens that do not answer `decimals()`.
pub const FALLBACK_DECIMALS: u8 = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHolding {
    pub token: Address,
    /// `None` when the token does not expose ERC-20 metadata.
    pub symbol: Option<String>,
    pub decimals: u8,
    pub amount: U256,
}

impl TokenHolding {
    pub fn label(&self) -> &str {
        self.symbol.as_deref().unwrap_or("unknown token")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPosition {
    pub account: Address,
    pub shares: U256,
    /// Shares valued at `total_assets / total_supply`, floored.
    pub share_value: U256,
    /// The account's own balance of the vault asset.
    pub wallet_balance: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioView {
    pub vault: Address,
    pub asset: Address,
    pub asset_symbol: String,
    pub asset_decimals: u8,
    pub share_decimals: u8,
    pub total_assets: U256,
    pub total_supply: U256,
    pub strategy_enabled: bool,
    /// Idle base asset held by the vault.
    pub base_asset_amount: U256,
    pub holdings: Vec<TokenHolding>,
    pub position: Option<AccountPosition>,
}

pub struct PortfolioReader<G> {
    gateway: Arc<G>,
    vault: Address,
}

impl<G: ChainGateway> PortfolioReader<G> {
    pub fn new(gateway: Arc<G>, vault: Address) -> Self {
        Self { gateway, vault }
    }

    pub async fn snapshot(&self, account: Option<Address>) -> Result<PortfolioView, GatewayError> {
        let gateway = self.gateway.as_ref();
        let v = self.vault;

        let (asset, share_decimals, total_assets, total_supply, strategy_enabled, composition) = tokio::try_join!(
            vault::read(gateway, v, IOracleGuidedVault::assetCall {}),
            vault::read(gateway, v, IOracleGuidedVault::decimalsCall {}),
            vault::read(gateway, v, IOracleGuidedVault::totalAssetsCall {}),
            vault::read(gateway, v, IOracleGuidedVault::totalSupplyCall {}),
            vault::read(gateway, v, IOracleGuidedVault::strategyEnabledCall {}),
            vault::read(gateway, v, IOracleGuidedVault::getPortfolioCompositionCall {}),
        )?;

        let (asset_symbol, asset_decimals) = tokio::try_join!(
            vault::read(gateway, asset, IVaultToken::symbolCall {}),
            vault::read(gateway, asset, IVaultToken::decimalsCall {}),
        )?;

        if composition.tokens.len() != composition.amounts.len() {
            warn!(
                tokens = composition.tokens.len(),
                amounts = composition.amounts.len(),
                "portfolio composition arrays differ in length"
            );
        }
        let holdings = try_join_all(
            composition
                .tokens
                .iter()
                .zip(composition.amounts.iter())
                .map(|(token, amount)| self.holding(*token, *amount)),
        )
        .await?;

        let position = match account {
            Some(account) => {
                let (shares, wallet_balance) = tokio::try_join!(
                    vault::read(gateway, v, IOracleGuidedVault::balanceOfCall { account }),
                    vault::read(gateway, asset, IVaultToken::balanceOfCall { account }),
                )?;
                Some(AccountPosition {
                    account,
                    shares,
                    share_value: share_value(shares, total_assets, total_supply),
                    wallet_balance,
                })
            }
            None => None,
        };

        debug!(
            vault = %v,
            total_assets = %total_assets,
            total_supply = %total_supply,
            holdings = holdings.len(),
            "portfolio snapshot"
        );

        Ok(PortfolioView {
            vault: v,
            asset,
            asset_symbol,
            asset_decimals,
            share_decimals,
            total_assets,
            total_supply,
            strategy_enabled,
            base_asset_amount: composition.baseAssetAmount,
            holdings,
            position,
        })
    }

    /// Token metadata with a fallback: a token that rejects either metadata
    /// read is still listed, unlabelled, at 18 decimals. Transport failures
    /// fail the snapshot.
    async fn holding(&self, token: Address, amount: U256) -> Result<TokenHolding, GatewayError> {
        let gateway = self.gateway.as_ref();
        let metadata = tokio::try_join!(
            vault::read(gateway, token, IVaultToken::symbolCall {}),
            vault::read(gateway, token, IVaultToken::decimalsCall {}),
        );
        match metadata {
            Ok((symbol, decimals)) => Ok(TokenHolding {
                token,
                symbol: Some(symbol),
                decimals,
                amount,
            }),
            Err(e) if e.is_rejection() => {
                debug!(token = %token, error = %e, "token metadata unavailable");
                Ok(TokenHolding {
                    token,
                    symbol: None,
                    decimals: FALLBACK_DECIMALS,
                    amount,
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// `shares * total_assets / total_supply`, floored; zero for an empty vault.
pub fn share_value(shares: U256, total_assets: U256, total_supply: U256) -> U256 {
    if total_supply.is_zero() {
        return U256::ZERO;
    }
    match shares.checked_mul(total_assets) {
        Some(product) => product / total_supply,
        None => (shares / total_supply).saturating_mul(total_assets),
    }
}
