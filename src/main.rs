// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use ethers::providers::{Http, Provider};
use ethers::types::{Address, U256};
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use tokio::sync::Mutex;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use simple_account::config::AccountConfig;
use simple_account::coordinator::{Coordinator, EntryPointCoordinator, InMemoryEntryPoint};
use simple_account::dispatch::{FailurePolicy, Ledger};
use simple_account::rpc::{AccountRpcImpl, AccountRpcServer};
use simple_account::Account;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, default_value = "127.0.0.1:8546")]
    rpc_server_addr: String,

    /// Address the hosted account lives at.
    #[clap(short, long)]
    account: Address,

    /// Owner whose signatures the account accepts.
    #[clap(short, long)]
    owner: Address,

    /// Coordinator (EntryPoint) allowed to drive the account.
    #[clap(short, long)]
    entry_point: Address,

    #[clap(short, long, default_value_t = 31337)]
    chain_id: u64,

    /// Relay nonce, deposit and submissions to a live EntryPoint instead of
    /// the in-memory one.
    #[clap(long)]
    eth_rpc_url: Option<String>,

    /// Fee recipient for `handleOps`; defaults to the zero address.
    #[clap(long)]
    beneficiary: Option<Address>,

    /// `fail-fast` or `best-effort`.
    #[clap(long, default_value = "fail-fast")]
    failure_policy: FailurePolicy,

    /// Native balance the account starts with, in wei.
    #[clap(long, default_value_t = 0)]
    initial_balance: u128,
}

impl From<Args> for AccountConfig {
    fn from(args: Args) -> Self {
        Self {
            account: args.account,
            owner: args.owner,
            entry_point: args.entry_point,
            chain_id: args.chain_id,
            eth_rpc_url: args.eth_rpc_url,
            beneficiary: args.beneficiary.unwrap_or_default(),
            failure_policy: args.failure_policy,
            initial_balance: U256::from(args.initial_balance),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let server_addr: SocketAddr = args.rpc_server_addr.parse()?;

    let config = AccountConfig::from(args);
    config.validate()?;

    let account = build_account(&config).await?;
    let account_rpc = AccountRpcImpl::new(Arc::new(Mutex::new(account)));

    info!("Starting account RPC server on {}", server_addr);

    let server_handle = start_server(server_addr, account_rpc).await?;

    // Keep the server running until Ctrl+C is pressed
    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

async fn build_account(config: &AccountConfig) -> anyhow::Result<Account> {
    let coordinator: Arc<dyn Coordinator> = match &config.eth_rpc_url {
        Some(url) => {
            let provider = Provider::<Http>::try_from(url.as_str())?;
            Arc::new(EntryPointCoordinator::new(
                config.entry_point,
                Arc::new(provider),
                config.chain_id,
                config.beneficiary,
            ))
        }
        None => Arc::new(InMemoryEntryPoint::new(config.entry_point, config.chain_id)),
    };

    let ledger = Arc::new(Ledger::new());
    ledger.credit(config.account, config.initial_balance).await;

    Ok(Account::new(config.account, config.owner, coordinator, ledger)
        .with_failure_policy(config.failure_policy))
}

async fn start_server(
    server_addr: SocketAddr,
    account_rpc: AccountRpcImpl,
) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default()
        .build(server_addr)
        .await?;

    let server_handle = server.start(account_rpc.into_rpc());

    Ok(server_handle)
}
