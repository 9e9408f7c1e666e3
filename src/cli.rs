// CLI commands

use crate::chain::Chain;
use crate::network::PeerManager;
use crate::params::{Params, UNIT};
use crate::storage::Store;
use crate::wallet::{KeyStore, Ledger, Payment, TxBuilder};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "monalite")]
#[command(about = "Headers-only SPV wallet node", long_about = None)]
pub struct Cli {
    /// Data directory for the wallet database
    #[arg(long, default_value = "./data")]
    pub data_dir: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the node: discover peers, sync headers and filtered blocks
    Start {
        /// Connect to this peer instead of the DNS seeds
        #[arg(long)]
        connect: Option<String>,
    },

    /// Wallet commands
    #[command(subcommand)]
    Wallet(WalletCommands),

    /// Chain commands
    #[command(subcommand)]
    Chain(ChainCommands),
}

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Create a new key and print its address
    NewAddress,

    /// List wallet addresses
    List,

    /// Total balance in base units
    Balance,

    /// Import a WIF private key
    ImportWif { wif: String },

    /// Build a signed payment and print its hex (broadcast it while the
    /// node is running)
    Send {
        /// Recipient address
        to: String,
        /// Amount in whole coins
        amount: f64,
    },
}

#[derive(Subcommand)]
pub enum ChainCommands {
    /// Best tip height
    Height,

    /// Best tip hash
    BestBlock,
}

/// CLI handler owning the opened stores
pub struct CliHandler {
    store: Store,
    chain: Arc<Chain>,
    keystore: Arc<KeyStore>,
    ledger: Arc<Ledger>,
}

impl CliHandler {
    pub fn new(data_dir: &str) -> Result<Self, String> {
        let params = Params::mainnet();
        let store = Store::open(data_dir).map_err(|e| e.to_string())?;
        let chain = Arc::new(Chain::open(&store, params.clone()).map_err(|e| e.to_string())?);
        let keystore = Arc::new(KeyStore::open(&store, params).map_err(|e| e.to_string())?);
        let ledger =
            Arc::new(Ledger::open(&store, keystore.clone()).map_err(|e| e.to_string())?);
        Ok(Self {
            store,
            chain,
            keystore,
            ledger,
        })
    }

    pub async fn handle(&self, cli: Cli) -> Result<(), String> {
        match cli.command {
            Commands::Start { connect } => self.start(connect).await,
            Commands::Wallet(cmd) => self.wallet(cmd),
            Commands::Chain(cmd) => self.chain_info(cmd),
        }
    }

    async fn start(&self, connect: Option<String>) -> Result<(), String> {
        let manager = PeerManager::new(
            &self.store,
            self.chain.clone(),
            self.ledger.clone(),
            self.keystore.clone(),
        )
        .map_err(|e| e.to_string())?;

        if let Some(peer) = connect {
            let addr = peer.parse().map_err(|e| format!("bad peer address: {}", e))?;
            manager.add_candidate(addr).await;
            manager.connect(addr).await;
        }

        let runner = manager.clone();
        let run = tokio::spawn(async move { runner.run().await });

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| format!("signal handler: {}", e))?;
        log::info!("shutting down");
        manager.stop();
        let _ = run.await;
        self.store.flush().map_err(|e| e.to_string())?;
        Ok(())
    }

    fn wallet(&self, cmd: WalletCommands) -> Result<(), String> {
        match cmd {
            WalletCommands::NewAddress => {
                let pair = self.keystore.generate().map_err(|e| e.to_string())?;
                println!("{}", pair.address(self.keystore.params()));
            }
            WalletCommands::List => {
                for pubkey in self.keystore.public_keys().map_err(|e| e.to_string())? {
                    println!(
                        "{}",
                        crate::core::base58::p2pkh_address(self.keystore.params(), &pubkey)
                    );
                }
            }
            WalletCommands::Balance => {
                let balance = self.ledger.balance().map_err(|e| e.to_string())?;
                println!("{} ({} units)", balance as f64 / UNIT as f64, balance);
            }
            WalletCommands::ImportWif { wif } => {
                let pair = self.keystore.import_wif(&wif).map_err(|e| e.to_string())?;
                println!("{}", pair.address(self.keystore.params()));
            }
            WalletCommands::Send { to, amount } => {
                let units = (amount * UNIT as f64).round() as u64;
                let builder = TxBuilder::new(&self.keystore, &self.ledger, self.chain.as_ref());
                let tx = builder
                    .build_p2pkh(&[Payment {
                        address: to,
                        amount: units,
                    }])
                    .map_err(|e| e.to_string())?;
                use crate::core::Serializable;
                println!("{}", hex::encode(tx.serialize()));
            }
        }
        Ok(())
    }

    fn chain_info(&self, cmd: ChainCommands) -> Result<(), String> {
        let tip = self.chain.best_tip().map_err(|e| e.to_string())?;
        match cmd {
            ChainCommands::Height => println!("{}", tip.height),
            ChainCommands::BestBlock => println!("{}", tip.hash),
        }
        Ok(())
    }
}
