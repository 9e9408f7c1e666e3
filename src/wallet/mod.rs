// Wallet: keys, coins and spending

pub mod channel;
pub mod keystore;
pub mod ledger;
pub mod tx_builder;

pub use channel::{Channel, ChannelPayee, ChannelPayer};
pub use keystore::{KeyError, KeyPair, KeyStore};
pub use ledger::{Coin, Ledger, LedgerError};
pub use tx_builder::{sighash, BuildError, MultisigInfo, Payment, TxBuilder};
