//! Pre-flight role checks.
//!
//! Every check reads the role identifier and then the membership flag from the
//! contract. Nothing is cached: membership can change between two commands.
//! A passing check is advisory only; the contract enforces the role again when
//! the transaction executes.

use crate::auth::Identity;
use crate::gateway::{ChainGateway, GatewayError};
use crate::vault::{self, IOracleGuidedVault};

use alloy::primitives::{Address, B256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultRole {
    Oracle,
    StrategyManager,
    Admin,
}

impl VaultRole {
    pub fn name(&self) -> &'static str {
        match self {
            VaultRole::Oracle => "ORACLE_ROLE",
            VaultRole::StrategyManager => "STRATEGY_MANAGER_ROLE",
            VaultRole::Admin => "DEFAULT_ADMIN_ROLE",
        }
    }
}

impl fmt::Display for VaultRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VaultRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oracle" | "oracle_role" => Ok(VaultRole::Oracle),
            "strategy_manager" | "strategy-manager" | "strategy_manager_role" => {
                Ok(VaultRole::StrategyManager)
            }
            "admin" | "default_admin" | "default_admin_role" => Ok(VaultRole::Admin),
            other => Err(format!(
                "unknown role {other:?} (expected oracle, strategy_manager or admin)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCheck {
    pub role: VaultRole,
    pub role_id: B256,
    pub account: Address,
    pub contract: Address,
    pub granted: bool,
}

/// Role checks against one access-controlled contract (the vault or its
/// price oracle).
pub struct RoleGate<G> {
    gateway: Arc<G>,
    contract: Address,
}

impl<G: ChainGateway> RoleGate<G> {
    pub fn new(gateway: Arc<G>, contract: Address) -> Self {
        Self { gateway, contract }
    }

    /// Exactly two reads. A missing role is `granted: false`, not an error;
    /// only transport failures surface as `Err`.
    pub async fn authorize(&self, identity: &Identity, role: VaultRole) -> Result<RoleCheck, GatewayError> {
        let account = identity.address();
        let role_id = self.role_id(role).await?;
        let granted = vault::read(
            self.gateway.as_ref(),
            self.contract,
            IOracleGuidedVault::hasRoleCall {
                role: role_id,
                account,
            },
        )
        .await?;

        debug!(
            role = %role,
            account = %account,
            contract = %self.contract,
            granted,
            "role check"
        );
        Ok(RoleCheck {
            role,
            role_id,
            account,
            contract: self.contract,
            granted,
        })
    }

    /// Role identifier as the contract defines it.
    pub async fn role_id(&self, role: VaultRole) -> Result<B256, GatewayError> {
        let gateway = self.gateway.as_ref();
        match role {
            VaultRole::Oracle => {
                vault::read(gateway, self.contract, IOracleGuidedVault::ORACLE_ROLECall {}).await
            }
            VaultRole::StrategyManager => {
                vault::read(
                    gateway,
                    self.contract,
                    IOracleGuidedVault::STRATEGY_MANAGER_ROLECall {},
                )
                .await
            }
            VaultRole::Admin => {
                vault::read(
                    gateway,
                    self.contract,
                    IOracleGuidedVault::DEFAULT_ADMIN_ROLECall {},
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use alloy::primitives::{address, keccak256, Bytes};
    use alloy::sol_types::{SolCall, SolValue};

    const VAULT: Address = address!("934A389CaBFB84cdB3f0260B2a4FD575b8B345A3");
    const ORACLE: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
    const STRANGER: Address = address!("3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");

    fn gateway() -> Arc<MockGateway> {
        let gateway = MockGateway::new();
        let oracle_role = keccak256("ORACLE_ROLE");
        gateway.respond_any::<IOracleGuidedVault::ORACLE_ROLECall>(VAULT, oracle_role.abi_encode());
        gateway.respond_any::<IOracleGuidedVault::hasRoleCall>(VAULT, false.abi_encode());
        gateway.respond(
            VAULT,
            IOracleGuidedVault::hasRoleCall {
                role: oracle_role,
                account: ORACLE,
            },
            true.abi_encode(),
        );
        Arc::new(gateway)
    }

    #[tokio::test]
    async fn test_member_is_granted() {
        let gateway = gateway();
        let gate = RoleGate::new(gateway.clone(), VAULT);
        let check = gate
            .authorize(&Identity::Account(ORACLE), VaultRole::Oracle)
            .await
            .unwrap();
        assert!(check.granted);
        assert_eq!(check.role_id, keccak256("ORACLE_ROLE"));
        let reads = gateway.read_calls();
        assert_eq!(reads.len(), 2);
        assert_eq!(
            reads[0],
            (VAULT, Bytes::from(IOracleGuidedVault::ORACLE_ROLECall {}.abi_encode()))
        );
    }

    #[tokio::test]
    async fn test_non_member_is_denied_without_error() {
        let gateway = gateway();
        let gate = RoleGate::new(gateway.clone(), VAULT);
        let check = gate
            .authorize(&Identity::Account(STRANGER), VaultRole::Oracle)
            .await
            .unwrap();
        assert!(!check.granted);
        assert_eq!(check.account, STRANGER);
        assert_eq!(gateway.submissions(), 0);
    }

    #[tokio::test]
    async fn test_each_check_rereads() {
        let gateway = gateway();
        let gate = RoleGate::new(gateway.clone(), VAULT);
        let identity = Identity::Account(ORACLE);
        gate.authorize(&identity, VaultRole::Oracle).await.unwrap();
        gate.authorize(&identity, VaultRole::Oracle).await.unwrap();
        assert_eq!(gateway.read_calls().len(), 4);
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces() {
        let gateway = gateway();
        gateway.fail_call::<IOracleGuidedVault::hasRoleCall>(VAULT);
        let gate = RoleGate::new(gateway, VAULT);
        assert!(gate
            .authorize(&Identity::Account(ORACLE), VaultRole::Oracle)
            .await
            .is_err());
    }

    #[test]
    fn test_role_names_parse() {
        assert_eq!("oracle".parse::<VaultRole>().unwrap(), VaultRole::Oracle);
        assert_eq!(
            "STRATEGY_MANAGER".parse::<VaultRole>().unwrap(),
            VaultRole::StrategyManager
        );
        assert_eq!("admin".parse::<VaultRole>().unwrap(), VaultRole::Admin);
        assert!("root".parse::<VaultRole>().is_err());
    }
}
