//! Operator commands.
//!
//! Each mutating command runs the same pipeline: role check (where the
//! contract requires one), precondition reads, amount resolution, then one
//! orchestrated submission. Anything that fails before the submission aborts
//! with a `CommandError` and nothing is sent.

use crate::amount::{self, AmountError, AmountSpec, MAX_BPS};
use crate::auth::Identity;
use crate::config::{ConfigError, MonitorConfig, TxConfig};
use crate::gateway::{ChainGateway, GatewayError};
use crate::monitor::EventMonitor;
use crate::orchestrator::{PreparedCall, TransactionOrchestrator, TxOutcome};
use crate::portfolio::{PortfolioReader, PortfolioView, FALLBACK_DECIMALS};
use crate::roles::{RoleGate, VaultRole};
use crate::vault::{self, IOracleGuidedVault, IPriceOracle, IVaultToken};

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Oracle prices are fixed-point with 18 decimals.
const PRICE_DECIMALS: u8 = 18;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{account} does not hold {role} on {contract}")]
    Unauthorized {
        account: Address,
        role: VaultRole,
        contract: Address,
    },
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("{0}")]
    Precondition(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("{action} did not succeed ({outcome}), aborting")]
    Rejected { action: String, outcome: TxOutcome },
}

/// A submitted command and how it ended.
#[derive(Debug, Clone)]
pub struct Submission {
    pub action: String,
    pub outcome: TxOutcome,
}

struct TokenMeta {
    symbol: String,
    decimals: u8,
}

pub struct CommandDispatcher<G> {
    gateway: Arc<G>,
    vault: Option<Address>,
    orchestrator: TransactionOrchestrator<G>,
    gas_limit: u64,
}

impl<G: ChainGateway> CommandDispatcher<G> {
    /// `vault` may be absent for the plain token utilities (`mint`, `transfer`).
    pub fn new(gateway: Arc<G>, vault: Option<Address>, tx: &TxConfig) -> Self {
        Self {
            orchestrator: TransactionOrchestrator::new(gateway.clone(), tx.receipt_timeout()),
            gateway,
            vault,
            gas_limit: tx.gas_limit,
        }
    }

    fn vault(&self) -> Result<Address, CommandError> {
        self.vault.ok_or(CommandError::Config(ConfigError::MissingVault))
    }

    // ─── Reads ───────────────────────────────────────────────────────────

    /// Vault figures plus, when `account` is given, that account's position.
    pub async fn snapshot(&self, account: Option<Address>) -> Result<PortfolioView, CommandError> {
        let reader = PortfolioReader::new(self.gateway.clone(), self.vault()?);
        Ok(reader.snapshot(account).await?)
    }

    pub fn monitor(&self, config: MonitorConfig) -> Result<EventMonitor<G>, CommandError> {
        Ok(EventMonitor::new(self.gateway.clone(), self.vault()?, config))
    }

    // ─── Funds ───────────────────────────────────────────────────────────

    /// Approve the vault for `amount` of its asset, then deposit it.
    pub async fn deposit(&self, identity: &Identity, amount: Decimal) -> Result<Submission, CommandError> {
        AmountSpec::Absolute(amount).validate()?;
        let vault = self.vault()?;
        let owner = identity.address();

        let asset = vault::read(self.gateway.as_ref(), vault, IOracleGuidedVault::assetCall {}).await?;
        let meta = self.token_meta(asset).await?;
        let base = nonzero(amount::to_base_units(amount, meta.decimals)?, "deposit amount")?;

        let balance = self.balance_of(asset, owner).await?;
        if balance < base {
            return Err(CommandError::Precondition(format!(
                "insufficient balance: need {amount} {sym}, have {have} {sym}",
                sym = meta.symbol,
                have = amount::format_units(balance, meta.decimals),
            )));
        }

        let approval = self
            .submit(
                identity,
                PreparedCall::new(asset, &IVaultToken::approveCall { spender: vault, amount: base }),
                format!("approve vault to spend {amount} {}", meta.symbol),
            )
            .await;
        if !approval.outcome.is_success() {
            return Err(CommandError::Rejected {
                action: approval.action,
                outcome: approval.outcome,
            });
        }

        Ok(self
            .submit(
                identity,
                PreparedCall::new(
                    vault,
                    &IOracleGuidedVault::depositCall {
                        assets: base,
                        receiver: owner,
                    },
                ),
                format!("deposit {amount} {}", meta.symbol),
            )
            .await)
    }

    /// Withdraw by asset amount, by percentage of shares (bps), or redeem
    /// every share.
    pub async fn withdraw(&self, identity: &Identity, spec: AmountSpec) -> Result<Submission, CommandError> {
        spec.validate()?;
        let vault = self.vault()?;
        let owner = identity.address();

        let shares = vault::read(
            self.gateway.as_ref(),
            vault,
            IOracleGuidedVault::balanceOfCall { account: owner },
        )
        .await?;
        if shares.is_zero() {
            return Err(CommandError::Precondition(format!("{owner} holds no vault shares")));
        }

        let (call, action) = match spec {
            AmountSpec::All => (
                PreparedCall::new(
                    vault,
                    &IOracleGuidedVault::redeemCall {
                        shares,
                        receiver: owner,
                        owner,
                    },
                ),
                "redeem all shares".to_string(),
            ),
            AmountSpec::Percentage(pct) => {
                let resolved = amount::resolve(spec, FALLBACK_DECIMALS, shares)?;
                let bps = resolved.bps.unwrap_or(MAX_BPS);
                (
                    PreparedCall::new(
                        vault,
                        &IOracleGuidedVault::percentageWithdrawCall {
                            percentageBps: U256::from(bps),
                            receiver: owner,
                        },
                    ),
                    format!("withdraw {pct}% of shares ({bps} bps)"),
                )
            }
            AmountSpec::Absolute(value) => {
                let asset = vault::read(self.gateway.as_ref(), vault, IOracleGuidedVault::assetCall {}).await?;
                let meta = self.token_meta(asset).await?;
                let base = nonzero(
                    amount::resolve(spec, meta.decimals, U256::ZERO)?.base,
                    "withdraw amount",
                )?;
                (
                    PreparedCall::new(
                        vault,
                        &IOracleGuidedVault::withdrawCall {
                            assets: base,
                            receiver: owner,
                            owner,
                        },
                    ),
                    format!("withdraw {value} {}", meta.symbol),
                )
            }
        };

        Ok(self.submit(identity, call, action).await)
    }

    // ─── Signals ─────────────────────────────────────────────────────────

    /// Spend vault asset on `token`. A percentage is taken of the vault's
    /// asset balance and doubles as the allocation cap.
    pub async fn buy(
        &self,
        identity: &Identity,
        token: Address,
        spec: AmountSpec,
        min_amount_out: U256,
    ) -> Result<Submission, CommandError> {
        spec.validate()?;
        let vault = self.vault()?;
        self.require(identity, vault, VaultRole::Oracle).await?;
        self.require_active_pair(vault, token).await?;

        let asset = vault::read(self.gateway.as_ref(), vault, IOracleGuidedVault::assetCall {}).await?;
        let meta = self.token_meta(asset).await?;
        let available = self.balance_of(asset, vault).await?;

        let resolved = amount::resolve(spec, meta.decimals, available)?;
        let base = nonzero(resolved.base, "buy amount")?;
        let bps = match spec {
            AmountSpec::Percentage(_) => resolved.bps.unwrap_or(MAX_BPS),
            AmountSpec::Absolute(_) => amount::allocation_bps(base, available),
            AmountSpec::All => MAX_BPS,
        };

        let call = IOracleGuidedVault::executeBuySignalCall {
            token,
            amount: base,
            minAmountOut: min_amount_out,
            maxAllocationBps: U256::from(bps),
        };
        let action = format!(
            "buy {token} with {} {} (allocation cap {bps} bps)",
            amount::format_units(base, meta.decimals),
            meta.symbol
        );
        Ok(self.submit(identity, PreparedCall::new(vault, &call), action).await)
    }

    /// Sell the vault's `token`. `All` is sent as the contract's zero
    /// sentinel; an absolute amount above the holding is clamped to it.
    pub async fn sell(
        &self,
        identity: &Identity,
        token: Address,
        spec: AmountSpec,
        min_amount_out: U256,
    ) -> Result<Submission, CommandError> {
        spec.validate()?;
        let vault = self.vault()?;
        self.require(identity, vault, VaultRole::Oracle).await?;
        self.require_active_pair(vault, token).await?;

        let meta = self.token_meta(token).await?;
        let holding = self.balance_of(token, vault).await?;
        if holding.is_zero() {
            return Err(CommandError::Precondition(format!(
                "vault holds no {}",
                meta.symbol
            )));
        }

        let sell_amount = match spec {
            AmountSpec::All => U256::ZERO,
            AmountSpec::Percentage(_) => {
                nonzero(amount::resolve(spec, meta.decimals, holding)?.base, "sell amount")?
            }
            AmountSpec::Absolute(_) => {
                let base = nonzero(amount::resolve(spec, meta.decimals, holding)?.base, "sell amount")?;
                if base > holding {
                    warn!(
                        requested = %amount::format_units(base, meta.decimals),
                        held = %amount::format_units(holding, meta.decimals),
                        token = %meta.symbol,
                        "sell amount exceeds holding, selling entire holding"
                    );
                    holding
                } else {
                    base
                }
            }
        };

        let described = if sell_amount.is_zero() {
            format!("all ({})", amount::format_units(holding, meta.decimals))
        } else {
            amount::format_units(sell_amount, meta.decimals)
        };
        let call = IOracleGuidedVault::executeSellSignalCall {
            token,
            amount: sell_amount,
            minAmountOut: min_amount_out,
        };
        Ok(self
            .submit(
                identity,
                PreparedCall::new(vault, &call),
                format!("sell {described} {}", meta.symbol),
            )
            .await)
    }

    // ─── Strategy administration ─────────────────────────────────────────

    /// Activate or update a trading pair. `max_allocation_pct` is a percentage
    /// of the vault, stored as bps.
    pub async fn set_pair(
        &self,
        identity: &Identity,
        token: Address,
        max_allocation_pct: Decimal,
        min_exit_amount: U256,
    ) -> Result<Submission, CommandError> {
        let bps = amount::resolve(AmountSpec::Percentage(max_allocation_pct), 0, U256::ZERO)?
            .bps
            .unwrap_or(MAX_BPS);
        let vault = self.vault()?;
        self.require(identity, vault, VaultRole::StrategyManager).await?;

        let call = IOracleGuidedVault::setTradingPairCall {
            token,
            maxAllocation: U256::from(bps),
            minExitAmount: min_exit_amount,
        };
        let action = format!("set pair {token}: max allocation {bps} bps, min exit {min_exit_amount}");
        Ok(self.submit(identity, PreparedCall::new(vault, &call), action).await)
    }

    pub async fn disable_pair(&self, identity: &Identity, token: Address) -> Result<Submission, CommandError> {
        let vault = self.vault()?;
        self.require(identity, vault, VaultRole::StrategyManager).await?;
        let call = IOracleGuidedVault::disableTradingPairCall { token };
        Ok(self
            .submit(identity, PreparedCall::new(vault, &call), format!("disable pair {token}"))
            .await)
    }

    pub async fn set_strategy(&self, identity: &Identity, enabled: bool) -> Result<Submission, CommandError> {
        let vault = self.vault()?;
        self.require(identity, vault, VaultRole::StrategyManager).await?;
        let call = IOracleGuidedVault::updateStrategySettingsCall { enabled };
        let state = if enabled { "enable" } else { "disable" };
        Ok(self
            .submit(identity, PreparedCall::new(vault, &call), format!("{state} strategy"))
            .await)
    }

    /// Grant or revoke `role` for `target`. Needs the admin role.
    pub async fn manage_role(
        &self,
        identity: &Identity,
        role: VaultRole,
        target: Address,
        revoke: bool,
    ) -> Result<Submission, CommandError> {
        let vault = self.vault()?;
        self.require(identity, vault, VaultRole::Admin).await?;
        let role_id = RoleGate::new(self.gateway.clone(), vault).role_id(role).await?;

        let (call, action) = if revoke {
            (
                PreparedCall::new(vault, &IOracleGuidedVault::revokeRoleCall { role: role_id, account: target }),
                format!("revoke {role} from {target}"),
            )
        } else {
            (
                PreparedCall::new(vault, &IOracleGuidedVault::grantRoleCall { role: role_id, account: target }),
                format!("grant {role} to {target}"),
            )
        };
        Ok(self.submit(identity, call, action).await)
    }

    /// Push a price to the vault's oracle: `price` units of `token_b` per
    /// `token_a`.
    pub async fn update_price(
        &self,
        identity: &Identity,
        token_a: Address,
        token_b: Address,
        price: Decimal,
    ) -> Result<Submission, CommandError> {
        AmountSpec::Absolute(price).validate()?;
        let scaled = amount::to_base_units(price, PRICE_DECIMALS)?;
        let vault = self.vault()?;

        let oracle = vault::read(self.gateway.as_ref(), vault, IOracleGuidedVault::priceOracleCall {}).await?;
        self.require(identity, oracle, VaultRole::Oracle).await?;

        let call = IPriceOracle::updatePriceCall {
            tokenA: token_a,
            tokenB: token_b,
            price: scaled,
        };
        Ok(self
            .submit(
                identity,
                PreparedCall::new(oracle, &call),
                format!("set price 1 {token_a} = {price} {token_b}"),
            )
            .await)
    }

    // ─── Token utilities ─────────────────────────────────────────────────

    /// Mint test tokens. Only the owner can mint; a mismatch is warned about
    /// and the contract left to decide.
    pub async fn mint(
        &self,
        identity: &Identity,
        token: Address,
        amount: Decimal,
        to: Option<Address>,
    ) -> Result<Submission, CommandError> {
        AmountSpec::Absolute(amount).validate()?;
        let recipient = to.unwrap_or_else(|| identity.address());
        let meta = self.token_meta(token).await?;
        let base = nonzero(amount::to_base_units(amount, meta.decimals)?, "mint amount")?;

        match vault::read(self.gateway.as_ref(), token, IVaultToken::ownerCall {}).await {
            Ok(owner) if owner != identity.address() => warn!(
                account = %identity.address(),
                owner = %owner,
                token = %meta.symbol,
                "account is not the token owner, mint will likely revert"
            ),
            Ok(_) => {}
            Err(e) => warn!(token = %meta.symbol, error = %e, "could not check token ownership, minting anyway"),
        }

        let call = IVaultToken::mintCall { to: recipient, amount: base };
        Ok(self
            .submit(
                identity,
                PreparedCall::new(token, &call),
                format!("mint {amount} {} to {recipient}", meta.symbol),
            )
            .await)
    }

    pub async fn transfer(
        &self,
        identity: &Identity,
        token: Address,
        recipient: Address,
        amount: Decimal,
    ) -> Result<Submission, CommandError> {
        AmountSpec::Absolute(amount).validate()?;
        let meta = self.token_meta(token).await?;
        let base = nonzero(amount::to_base_units(amount, meta.decimals)?, "transfer amount")?;

        let balance = self.balance_of(token, identity.address()).await?;
        if balance < base {
            return Err(CommandError::Precondition(format!(
                "insufficient balance: need {amount} {sym}, have {have} {sym}",
                sym = meta.symbol,
                have = amount::format_units(balance, meta.decimals),
            )));
        }

        let call = IVaultToken::transferCall { to: recipient, amount: base };
        Ok(self
            .submit(
                identity,
                PreparedCall::new(token, &call),
                format!("transfer {amount} {} to {recipient}", meta.symbol),
            )
            .await)
    }

    // ─── Helpers ─────────────────────────────────────────────────────────

    async fn require(&self, identity: &Identity, contract: Address, role: VaultRole) -> Result<(), CommandError> {
        let check = RoleGate::new(self.gateway.clone(), contract)
            .authorize(identity, role)
            .await?;
        if !check.granted {
            warn!(account = %check.account, role = %role, contract = %contract, "missing role, not submitting");
            return Err(CommandError::Unauthorized {
                account: check.account,
                role,
                contract,
            });
        }
        Ok(())
    }

    async fn require_active_pair(&self, vault: Address, token: Address) -> Result<(), CommandError> {
        let pair = vault::read(
            self.gateway.as_ref(),
            vault,
            IOracleGuidedVault::tradingPairsCall { token },
        )
        .await?;
        if !pair.isActive {
            return Err(CommandError::Precondition(format!(
                "trading pair for {token} is not active"
            )));
        }
        Ok(())
    }

    async fn balance_of(&self, token: Address, account: Address) -> Result<U256, GatewayError> {
        vault::read(self.gateway.as_ref(), token, IVaultToken::balanceOfCall { account }).await
    }

    async fn token_meta(&self, token: Address) -> Result<TokenMeta, GatewayError> {
        let (symbol, decimals) = tokio::try_join!(
            vault::read(self.gateway.as_ref(), token, IVaultToken::symbolCall {}),
            vault::read(self.gateway.as_ref(), token, IVaultToken::decimalsCall {}),
        )?;
        Ok(TokenMeta { symbol, decimals })
    }

    async fn submit(&self, identity: &Identity, call: PreparedCall, action: String) -> Submission {
        info!(action = %action, account = %identity.address(), "submitting");
        let outcome = self.orchestrator.submit(identity, &call, self.gas_limit).await;
        Submission { action, outcome }
    }
}

/// Zero base units means a no-op transaction; refuse it.
fn nonzero(base: U256, what: &str) -> Result<U256, CommandError> {
    if base.is_zero() {
        return Err(CommandError::Precondition(format!(
            "{what} resolves to zero base units, nothing to submit"
        )));
    }
    Ok(base)
}
