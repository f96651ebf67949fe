use vaultctl::amount::{self, AmountSpec};
use vaultctl::auth::Identity;
use vaultctl::commands::{CommandDispatcher, Submission};
use vaultctl::config::{parse_address, Config, LoggingConfig};
use vaultctl::gateway::RpcGateway;
use vaultctl::monitor::{builtin_vault_events, load_abi_events, schema};
use vaultctl::portfolio::PortfolioView;
use vaultctl::roles::VaultRole;

use alloy::primitives::{Address, U256};
use clap::{ArgAction, Args, Parser, Subcommand};
use futures::StreamExt;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "vaultctl", version, about = "Operate an oracle-guided vault")]
struct Cli {
    /// Config file (missing file = defaults + environment)
    #[arg(long, global = true, default_value = "vaultctl.toml")]
    config: PathBuf,
    /// JSON-RPC endpoint
    #[arg(long, global = true)]
    rpc: Option<String>,
    /// Vault contract address
    #[arg(long, global = true)]
    vault: Option<String>,
    /// Acting account address, or a private key to sign locally
    #[arg(long, global = true)]
    account: Option<String>,
    /// Gas limit for every submission
    #[arg(long, global = true)]
    gas_limit: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Vault totals and the acting account's position
    Info,
    /// Vault holdings per token
    Portfolio,
    /// Approve and deposit vault asset
    Deposit { amount: Decimal },
    /// Withdraw by amount, percentage of shares, or everything
    Withdraw(WithdrawTarget),
    /// Execute a buy signal (requires ORACLE_ROLE)
    Buy {
        #[arg(value_parser = cli_address)]
        token: Address,
        /// Asset amount, or a percentage of the vault's asset balance ("30%")
        amount: AmountSpec,
        /// Minimum output, in base units
        #[arg(long, default_value = "0")]
        min: U256,
    },
    /// Execute a sell signal (requires ORACLE_ROLE)
    Sell {
        #[arg(value_parser = cli_address)]
        token: Address,
        /// Token amount, percentage of the holding, or "all"
        #[arg(long, default_value = "all")]
        amount: AmountSpec,
        /// Minimum output, in base units
        #[arg(long, default_value = "0")]
        min: U256,
    },
    /// Add, update or disable a trading pair (requires STRATEGY_MANAGER_ROLE)
    Pair {
        #[arg(value_parser = cli_address)]
        token: Address,
        /// Maximum allocation, "30%" or "30"
        #[arg(long, default_value = "30%", value_parser = amount::parse_percentage)]
        max: Decimal,
        /// Minimum exit amount, in base units
        #[arg(long, default_value = "0")]
        min_exit: U256,
        #[arg(long)]
        disable: bool,
    },
    /// Grant or revoke a role (requires DEFAULT_ADMIN_ROLE)
    Role {
        /// oracle, strategy_manager or admin
        role: VaultRole,
        #[arg(value_parser = cli_address)]
        address: Address,
        #[arg(long)]
        revoke: bool,
    },
    /// Enable or disable the strategy (requires STRATEGY_MANAGER_ROLE)
    Strategy {
        #[arg(long, action = ArgAction::Set)]
        enabled: bool,
    },
    /// Update an oracle price: 1 token_a = price token_b
    Price {
        #[arg(value_parser = cli_address)]
        token_a: Address,
        #[arg(value_parser = cli_address)]
        token_b: Address,
        price: Decimal,
    },
    /// Mint tokens (token owner only)
    Mint {
        #[arg(value_parser = cli_address)]
        token: Address,
        amount: Decimal,
        #[arg(long, value_parser = cli_address)]
        to: Option<Address>,
    },
    /// Transfer tokens from the acting account
    Transfer {
        #[arg(value_parser = cli_address)]
        token: Address,
        #[arg(value_parser = cli_address)]
        recipient: Address,
        amount: Decimal,
    },
    /// Stream vault events until Ctrl+C
    Listen {
        /// Event name to watch (repeatable; default: config, else all)
        #[arg(long = "event")]
        events: Vec<String>,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct WithdrawTarget {
    /// Asset amount
    #[arg(long)]
    amount: Option<Decimal>,
    /// Percentage of held shares
    #[arg(long, value_parser = amount::parse_percentage)]
    percentage: Option<Decimal>,
    /// Redeem every share
    #[arg(long)]
    all: bool,
}

impl WithdrawTarget {
    fn spec(&self) -> AmountSpec {
        match (self.amount, self.percentage) {
            (Some(value), _) => AmountSpec::Absolute(value),
            (None, Some(pct)) => AmountSpec::Percentage(pct),
            (None, None) => AmountSpec::All,
        }
    }
}

fn cli_address(raw: &str) -> Result<Address, String> {
    parse_address("address", raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::from_env()
    };
    if let Some(url) = cli.rpc {
        config.rpc.url = url;
    }
    if let Some(vault) = cli.vault {
        config.vault.address = Some(vault);
    }
    if let Some(account) = cli.account {
        config.account = Some(account);
    }
    if let Some(gas_limit) = cli.gas_limit {
        config.tx.gas_limit = gas_limit;
    }

    init_logging(&config.logging);
    info!("vaultctl v{} starting", env!("CARGO_PKG_VERSION"));

    let vault = match config.vault.address {
        Some(_) => Some(config.vault_address()?),
        None => None,
    };
    let gateway = Arc::new(RpcGateway::connect(&config.rpc.url, config.tx.receipt_poll()).await?);
    let dispatcher = CommandDispatcher::new(gateway.clone(), vault, &config.tx);
    let identity = || Identity::resolve(config.account.as_deref(), &*gateway);

    match cli.command {
        Command::Info => {
            let identity = identity().await?;
            let view = dispatcher.snapshot(Some(identity.address())).await?;
            print_info(&view);
        }
        Command::Portfolio => {
            let view = dispatcher.snapshot(None).await?;
            print_portfolio(&view);
        }
        Command::Deposit { amount } => {
            report(dispatcher.deposit(&identity().await?, amount).await?)?;
        }
        Command::Withdraw(target) => {
            report(dispatcher.withdraw(&identity().await?, target.spec()).await?)?;
        }
        Command::Buy { token, amount, min } => {
            report(dispatcher.buy(&identity().await?, token, amount, min).await?)?;
        }
        Command::Sell { token, amount, min } => {
            report(dispatcher.sell(&identity().await?, token, amount, min).await?)?;
        }
        Command::Pair {
            token,
            max,
            min_exit,
            disable,
        } => {
            let identity = identity().await?;
            let submission = if disable {
                dispatcher.disable_pair(&identity, token).await?
            } else {
                dispatcher.set_pair(&identity, token, max, min_exit).await?
            };
            report(submission)?;
        }
        Command::Role {
            role,
            address,
            revoke,
        } => {
            report(dispatcher.manage_role(&identity().await?, role, address, revoke).await?)?;
        }
        Command::Strategy { enabled } => {
            report(dispatcher.set_strategy(&identity().await?, enabled).await?)?;
        }
        Command::Price {
            token_a,
            token_b,
            price,
        } => {
            report(dispatcher.update_price(&identity().await?, token_a, token_b, price).await?)?;
        }
        Command::Mint { token, amount, to } => {
            report(dispatcher.mint(&identity().await?, token, amount, to).await?)?;
        }
        Command::Transfer {
            token,
            recipient,
            amount,
        } => {
            report(dispatcher.transfer(&identity().await?, token, recipient, amount).await?)?;
        }
        Command::Listen { events } => {
            let kinds = match &config.vault.abi_path {
                Some(path) => load_abi_events(path)?,
                None => builtin_vault_events()?,
            };
            let names = if events.is_empty() {
                config.monitor.events.clone()
            } else {
                events
            };
            let kinds = schema::select(kinds, &names)?;

            let monitor = dispatcher.monitor(config.monitor.clone())?;
            let mut handle = monitor.start(kinds).await?;
            println!("listening for {} (Ctrl+C to stop)", handle.kinds().join(", "));

            let mut stream = handle.merged();
            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);
            loop {
                tokio::select! {
                    _ = &mut ctrl_c => break,
                    next = stream.next() => match next {
                        Some(event) => println!("{event}"),
                        None => break,
                    },
                }
            }

            for summary in handle.stop().await {
                info!(
                    event = %summary.kind,
                    delivered = summary.delivered,
                    raw = summary.raw,
                    fetch_failures = summary.fetch_failures,
                    reinstalls = summary.reinstalls,
                    "event stream summary"
                );
            }
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Print the outcome; anything but success makes the process exit non-zero.
fn report(submission: Submission) -> anyhow::Result<()> {
    println!("{}: {}", submission.action, submission.outcome);
    if !submission.outcome.is_success() {
        anyhow::bail!("{} did not succeed", submission.action);
    }
    Ok(())
}

fn print_info(view: &PortfolioView) {
    let sym = &view.asset_symbol;
    println!("=== Vault ===");
    println!("address:      {}", view.vault);
    println!("asset:        {sym} ({})", view.asset);
    println!(
        "total assets: {} {sym}",
        amount::format_units(view.total_assets, view.asset_decimals)
    );
    println!(
        "total shares: {}",
        amount::format_units(view.total_supply, view.share_decimals)
    );
    println!(
        "strategy:     {}",
        if view.strategy_enabled { "enabled" } else { "disabled" }
    );

    if let Some(position) = &view.position {
        println!();
        println!("=== Account ===");
        println!("address:        {}", position.account);
        println!(
            "shares:         {}",
            amount::format_units(position.shares, view.share_decimals)
        );
        println!(
            "share value:    {} {sym}",
            amount::format_units(position.share_value, view.asset_decimals)
        );
        println!(
            "wallet balance: {} {sym}",
            amount::format_units(position.wallet_balance, view.asset_decimals)
        );
    }
}

fn print_portfolio(view: &PortfolioView) {
    println!("=== Holdings ===");
    println!(
        "{}: {}",
        view.asset_symbol,
        amount::format_units(view.base_asset_amount, view.asset_decimals)
    );
    for holding in &view.holdings {
        println!(
            "{}: {} ({})",
            holding.label(),
            amount::format_units(holding.amount, holding.decimals),
            holding.token
        );
    }
}
