// Coin ledger
//
// Tracks spendable outputs keyed by owned public key. Transactions arrive
// from merkle blocks in arbitrary order across peers, so consuming an
// input always leaves a tombstone in the spend bucket; a funding output
// that hits its tombstone is dropped. Re-delivery of any transaction
// leaves the ledger unchanged.

use crate::core::script::{self, ScriptError};
use crate::core::{read_u32_le, read_u64_le, read_u8, read_hash, read_var_bytes,
                             write_var_bytes};
use crate::core::{CoinKind, Hash256, ScriptForm, Transaction};
use crate::storage::{outpoint_key, Store, StoreError, BUCKET_COIN, BUCKET_SPEND};
use crate::wallet::keystore::{KeyError, KeyStore};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unsupported script: {0}")]
    UnsupportedScript(#[from] ScriptError),
    #[error("script owner is not in the wallet")]
    NotOwned,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("corrupt coin record: {0}")]
    Corrupt(String),
}

impl From<sled::Error> for LedgerError {
    fn from(e: sled::Error) -> Self {
        LedgerError::Store(StoreError::Db(e))
    }
}

/// A spendable output owned by one of our keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub pubkey: Vec<u8>,
    pub tx_hash: Hash256,
    pub tx_index: u32,
    pub value: u64,
    pub script: Vec<u8>,
    pub block_hash: Hash256,
    pub coinbase: bool,
    pub kind: CoinKind,
}

impl Coin {
    fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_var_bytes(&mut buf, &self.pubkey).unwrap();
        buf.write_all(self.tx_hash.as_bytes()).unwrap();
        buf.write_all(&self.tx_index.to_le_bytes()).unwrap();
        buf.write_all(&self.value.to_le_bytes()).unwrap();
        write_var_bytes(&mut buf, &self.script).unwrap();
        buf.write_all(self.block_hash.as_bytes()).unwrap();
        buf.push(self.coinbase as u8);
        buf.push(self.kind as u8);
        buf
    }

    fn unpack(data: &[u8]) -> Result<Self, LedgerError> {
        let err = |e: std::io::Error| LedgerError::Corrupt(e.to_string());
        let mut r = Cursor::new(data);
        let pubkey = read_var_bytes(&mut r).map_err(err)?;
        let tx_hash = read_hash(&mut r).map_err(err)?;
        let tx_index = read_u32_le(&mut r).map_err(err)?;
        let value = read_u64_le(&mut r).map_err(err)?;
        let script = read_var_bytes(&mut r).map_err(err)?;
        let block_hash = read_hash(&mut r).map_err(err)?;
        let coinbase = read_u8(&mut r).map_err(err)? != 0;
        let kind = match read_u8(&mut r).map_err(err)? {
            0 => CoinKind::P2pkh,
            1 => CoinKind::P2pk,
            k => return Err(LedgerError::Corrupt(format!("coin kind {}", k))),
        };
        Ok(Self {
            pubkey,
            tx_hash,
            tx_index,
            value,
            script,
            block_hash,
            coinbase,
            kind,
        })
    }
}

type Subscriber = mpsc::UnboundedSender<Transaction>;

/// Process-wide coin ledger
pub struct Ledger {
    coins: sled::Tree,
    spends: sled::Tree,
    keystore: Arc<KeyStore>,
    subscribers: Mutex<HashMap<Vec<u8>, Subscriber>>,
}

impl Ledger {
    pub fn open(store: &Store, keystore: Arc<KeyStore>) -> Result<Self, LedgerError> {
        Ok(Self {
            coins: store.bucket(BUCKET_COIN)?,
            spends: store.bucket(BUCKET_SPEND)?,
            keystore,
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    /// Deliver the next transaction paying to exactly `script` to the
    /// returned receiver. One-shot per registration.
    pub fn subscribe_script(&self, script: Vec<u8>) -> mpsc::UnboundedReceiver<Transaction> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().expect("subscriber lock").insert(script, tx);
        rx
    }

    /// Apply one transaction observed inside `block_hash`
    pub fn ingest(&self, tx: &Transaction, block_hash: Hash256) -> Result<(), LedgerError> {
        let txid = tx.txid();
        let coinbase = tx.is_coinbase();

        for input in &tx.inputs {
            if input.is_coinbase() {
                continue;
            }
            match self.consume_input(input.prev_hash, input.prev_index, &input.script_sig, txid) {
                Ok(()) => {}
                Err(LedgerError::UnsupportedScript(e)) => {
                    log::debug!("tx {}: skipping input with {}", txid, e);
                }
                Err(LedgerError::NotOwned) => {}
                Err(e) => return Err(e),
            }
        }

        for (index, output) in tx.outputs.iter().enumerate() {
            self.notify(tx, &output.script_pubkey);
            match self.credit_output(tx, txid, index as u32, block_hash, coinbase) {
                Ok(()) => {}
                Err(LedgerError::UnsupportedScript(e)) => {
                    log::debug!("tx {} output {}: {}", txid, index, e);
                }
                Err(LedgerError::NotOwned) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Spend side: if the scriptsig's embedded pubkey is ours, drop the
    /// referenced coin and tombstone the outpoint.
    fn consume_input(
        &self,
        prev_hash: Hash256,
        prev_index: u32,
        script_sig: &[u8],
        spender: Hash256,
    ) -> Result<(), LedgerError> {
        let parsed = script::parse_script_sig(script_sig)?;
        if !self.keystore.owns(&parsed.pubkey)? {
            return Err(LedgerError::NotOwned);
        }
        let key = outpoint_key(&prev_hash, prev_index);
        if self.coins.remove(&key)?.is_some() {
            log::info!("coin {}:{} spent by {}", prev_hash, prev_index, spender);
        }
        self.spends.insert(key, spender.as_ref())?;
        Ok(())
    }

    /// Funding side: write a coin for an owned output unless the outpoint
    /// was already spent ahead of delivery.
    fn credit_output(
        &self,
        tx: &Transaction,
        txid: Hash256,
        index: u32,
        block_hash: Hash256,
        coinbase: bool,
    ) -> Result<(), LedgerError> {
        let output = &tx.outputs[index as usize];
        let (pubkey, kind) = match script::classify(&output.script_pubkey)? {
            ScriptForm::P2pkh(hash) => match self.keystore.find_by_hash160(&hash)? {
                Some(pubkey) => (pubkey, CoinKind::P2pkh),
                None => return Err(LedgerError::NotOwned),
            },
            ScriptForm::P2pk(pubkey) => {
                if !self.keystore.owns(&pubkey)? {
                    return Err(LedgerError::NotOwned);
                }
                (pubkey, CoinKind::P2pk)
            }
            // P2SH bonds are watched via script subscription, not owned
            ScriptForm::P2sh(_) => return Err(LedgerError::NotOwned),
        };

        let key = outpoint_key(&txid, index);
        if self.spends.contains_key(&key)? {
            log::debug!("output {}:{} was spent ahead of delivery", txid, index);
            return Ok(());
        }
        let coin = Coin {
            pubkey,
            tx_hash: txid,
            tx_index: index,
            value: output.value,
            script: output.script_pubkey.clone(),
            block_hash,
            coinbase,
            kind,
        };
        self.coins.insert(key, coin.pack())?;
        log::info!("new coin {}:{} worth {}", txid, index, output.value);
        Ok(())
    }

    /// One-shot delivery to a script subscriber
    fn notify(&self, tx: &Transaction, script: &[u8]) {
        let mut subs = self.subscribers.lock().expect("subscriber lock");
        if let Some(sender) = subs.remove(script) {
            let _ = sender.send(tx.clone());
        }
    }

    /// Insert a coin record directly, bypassing script recognition.
    /// Used when restoring wallet state that was established elsewhere.
    pub(crate) fn insert_coin(&self, coin: Coin) -> Result<(), LedgerError> {
        self.coins
            .insert(outpoint_key(&coin.tx_hash, coin.tx_index), coin.pack())?;
        Ok(())
    }

    /// Every coin, or only those paying `pubkey`
    pub fn coins_for(&self, pubkey: Option<&[u8]>) -> Result<Vec<Coin>, LedgerError> {
        let mut coins = Vec::new();
        for item in self.coins.iter() {
            let (_, value) = item?;
            let coin = Coin::unpack(&value)?;
            if pubkey.map_or(true, |p| coin.pubkey == p) {
                coins.push(coin);
            }
        }
        Ok(coins)
    }

    /// All coins sorted by value ascending (coin-selection order)
    pub fn sorted_coins(&self) -> Result<Vec<Coin>, LedgerError> {
        let mut coins = self.coins_for(None)?;
        coins.sort_by_key(|c| c.value);
        Ok(coins)
    }

    pub fn balance(&self) -> Result<u64, LedgerError> {
        Ok(self.coins_for(None)?.iter().map(|c| c.value).sum())
    }

    /// Forget the coins of a removed key
    pub fn remove_key(&self, pubkey: &[u8]) -> Result<(), LedgerError> {
        for coin in self.coins_for(Some(pubkey))? {
            self.coins
                .remove(outpoint_key(&coin.tx_hash, coin.tx_index))?;
        }
        Ok(())
    }
}
