//! Contract interfaces for the oracle-guided vault, its asset tokens and the
//! price oracle.
//!
//! Calls are encoded/decoded through the `sol!`-generated types. Events are
//! also listed as human-readable signatures (with parameter names and
//! `indexed` markers) so the monitor can build decoding schemas from them.

use alloy::sol;

sol! {
    interface IOracleGuidedVault {
        // ─── Views ───────────────────────────────────────────────────────
        function asset() external view returns (address);
        function priceOracle() external view returns (address);
        function decimals() external view returns (uint8);
        function totalAssets() external view returns (uint256);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function strategyEnabled() external view returns (bool);
        function tradingPairs(address token) external view returns (
            address tokenAddress,
            bool isActive,
            uint256 maxAllocation,
            uint256 minExitAmount
        );
        function getPortfolioComposition() external view returns (
            uint256 baseAssetAmount,
            address[] tokens,
            uint256[] amounts
        );

        // ─── Access control ──────────────────────────────────────────────
        function ORACLE_ROLE() external view returns (bytes32);
        function STRATEGY_MANAGER_ROLE() external view returns (bytes32);
        function DEFAULT_ADMIN_ROLE() external view returns (bytes32);
        function hasRole(bytes32 role, address account) external view returns (bool);
        function grantRole(bytes32 role, address account) external;
        function revokeRole(bytes32 role, address account) external;

        // ─── Funds ───────────────────────────────────────────────────────
        function deposit(uint256 assets, address receiver) external returns (uint256 shares);
        function withdraw(uint256 assets, address receiver, address owner) external returns (uint256 shares);
        function redeem(uint256 shares, address receiver, address owner) external returns (uint256 assets);
        function percentageWithdraw(uint256 percentageBps, address receiver) external returns (uint256 assets);

        // ─── Signals and strategy ────────────────────────────────────────
        function executeBuySignal(address token, uint256 amount, uint256 minAmountOut, uint256 maxAllocationBps) external;
        /// `amount == 0` sells the vault's entire holding of `token`.
        function executeSellSignal(address token, uint256 amount, uint256 minAmountOut) external;
        function setTradingPair(address token, uint256 maxAllocation, uint256 minExitAmount) external;
        function disableTradingPair(address token) external;
        function updateStrategySettings(bool enabled) external;

        // ─── Events ──────────────────────────────────────────────────────
        event SignalReceived(uint8 signalType, address indexed token, uint256 timestamp);
        event TradeExecuted(uint8 signalType, address indexed token, uint256 amount, uint256 result);
        event Deposit(address indexed sender, address indexed owner, uint256 assets, uint256 shares);
        event Withdraw(address indexed sender, address indexed receiver, address indexed owner, uint256 assets, uint256 shares);
        event TradingPairUpdated(address indexed token, bool isActive, uint256 maxAllocation, uint256 minExitAmount);
        event StrategySettingsUpdated(bool enabled);
        event RoleGranted(bytes32 indexed role, address indexed account, address indexed sender);
        event RoleRevoked(bytes32 indexed role, address indexed account, address indexed sender);
    }

    interface IVaultToken {
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function owner() external view returns (address);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
        function mint(address to, uint256 amount) external;
    }

    interface IPriceOracle {
        function ORACLE_ROLE() external view returns (bytes32);
        function hasRole(bytes32 role, address account) external view returns (bool);
        /// `price` is tokenB per tokenA scaled by 1e18.
        function updatePrice(address tokenA, address tokenB, uint256 price) external;
    }
}

/// Vault events in declaration order, parseable by `alloy::json_abi::Event::parse`.
pub const VAULT_EVENTS: &[&str] = &[
    "event SignalReceived(uint8 signalType, address indexed token, uint256 timestamp)",
    "event TradeExecuted(uint8 signalType, address indexed token, uint256 amount, uint256 result)",
    "event Deposit(address indexed sender, address indexed owner, uint256 assets, uint256 shares)",
    "event Withdraw(address indexed sender, address indexed receiver, address indexed owner, uint256 assets, uint256 shares)",
    "event TradingPairUpdated(address indexed token, bool isActive, uint256 maxAllocation, uint256 minExitAmount)",
    "event StrategySettingsUpdated(bool enabled)",
    "event RoleGranted(bytes32 indexed role, address indexed account, address indexed sender)",
    "event RoleRevoked(bytes32 indexed role, address indexed account, address indexed sender)",
];
