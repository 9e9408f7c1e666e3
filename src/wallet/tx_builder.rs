// Transaction builder
//
// Builds and signs P2PKH spends and M-of-N multisig bonds/spends. The
// sighash construction is the wallet's simplified one: serialize the
// transaction with every scriptsig replaced by the previous output's
// pubkey script, append the SIGHASH_ALL suffix, and double-SHA-256 once
// for the whole transaction.

use crate::chain::ChainView;
use crate::core::base58::{self, AddressError};
use crate::core::script;
use crate::core::{hash160, hash256, Hash256, Serializable, Transaction, TxInput, TxOutput,
                  SEQUENCE_FINAL};
use crate::params::{FEE, NCONFIRMED, SPENDABLE_COINBASE_DEPTH};
use crate::storage::StoreError;
use crate::wallet::keystore::{KeyError, KeyStore};
use crate::wallet::ledger::{Coin, Ledger, LedgerError};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("insufficient funds: have {available}, need {needed}")]
    InsufficientFunds { available: u64, needed: u64 },
    #[error("no private key for a required signer")]
    MissingPrivateKey,
    #[error("a provided signature does not verify")]
    SignatureVerifyFailed,
    #[error("the funding transaction pays no output to the bond script")]
    NoBondOutput,
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("secp256k1: {0}")]
    Secp(#[from] secp256k1::Error),
}

impl From<KeyError> for BuildError {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::MissingPrivateKey => BuildError::MissingPrivateKey,
            KeyError::Address(e) => BuildError::Address(e),
            KeyError::Secp(e) => BuildError::Secp(e),
            KeyError::Store(e) => BuildError::Store(e),
        }
    }
}

/// One recipient of a built transaction
#[derive(Debug, Clone)]
pub struct Payment {
    pub address: String,
    pub amount: u64,
}

/// Sighash over the whole transaction: scriptsigs must already hold the
/// previous output scripts.
pub fn sighash(tx: &Transaction) -> Hash256 {
    let mut preimage = tx.serialize();
    preimage.extend_from_slice(&[script::SIGHASH_ALL, 0, 0, 0]);
    hash256(&preimage)
}

/// Transaction builder over the wallet's keys, coins and chain view
pub struct TxBuilder<'a> {
    keystore: &'a KeyStore,
    ledger: &'a Ledger,
    chain: &'a dyn ChainView,
}

impl<'a> TxBuilder<'a> {
    pub fn new(keystore: &'a KeyStore, ledger: &'a Ledger, chain: &'a dyn ChainView) -> Self {
        Self {
            keystore,
            ledger,
            chain,
        }
    }

    /// Build a signed P2PKH transaction paying `payments` plus the flat
    /// fee, with change back to the first spent key.
    pub fn build_p2pkh(&self, payments: &[Payment]) -> Result<Transaction, BuildError> {
        let (outputs, total) = self.payment_outputs(payments)?;
        self.build_with_outputs(outputs, total)
    }

    fn build_with_outputs(
        &self,
        mut outputs: Vec<TxOutput>,
        total: u64,
    ) -> Result<Transaction, BuildError> {
        let (inputs, coins, gathered) = self.select_coins(total)?;
        if gathered > total {
            let change_script = script::p2pkh_output(&hash160(&coins[0].pubkey));
            outputs.push(TxOutput::new(gathered - total, change_script));
        }

        let mut tx = Transaction::new(inputs, outputs);
        self.sign_inputs(&mut tx, &coins)?;
        Ok(tx)
    }

    /// Outputs for the recipients; returns (outputs, amount + fee)
    fn payment_outputs(&self, payments: &[Payment]) -> Result<(Vec<TxOutput>, u64), BuildError> {
        let mut total = FEE;
        let mut outputs = Vec::with_capacity(payments.len() + 1);
        for payment in payments {
            let hash = base58::decode_p2pkh_address(self.keystore.params(), &payment.address)?;
            outputs.push(TxOutput::new(payment.amount, script::p2pkh_output(&hash)));
            total += payment.amount;
        }
        Ok((outputs, total))
    }

    /// Pick spendable coins by ascending value until `total` is covered.
    /// Immature coinbase coins and unconfirmed coins are passed over.
    fn select_coins(&self, total: u64) -> Result<(Vec<TxInput>, Vec<Coin>, u64), BuildError> {
        let tip = self.chain.best_height();
        let mut inputs = Vec::new();
        let mut picked = Vec::new();
        let mut gathered = 0u64;

        for coin in self.ledger.sorted_coins()? {
            if gathered >= total {
                break;
            }
            let height = match self.chain.height_of(&coin.block_hash) {
                Some(h) => h,
                None => continue,
            };
            if tip - height < NCONFIRMED {
                continue;
            }
            if coin.coinbase && tip - height < SPENDABLE_COINBASE_DEPTH {
                continue;
            }
            gathered += coin.value;
            inputs.push(TxInput {
                prev_hash: coin.tx_hash,
                prev_index: coin.tx_index,
                // previous output script, to be hashed then replaced
                script_sig: coin.script.clone(),
                sequence: SEQUENCE_FINAL,
            });
            picked.push(coin);
        }

        if gathered < total {
            return Err(BuildError::InsufficientFunds {
                available: gathered,
                needed: total,
            });
        }
        Ok((inputs, picked, gathered))
    }

    /// Sign every input and install the standard scriptsigs
    fn sign_inputs(&self, tx: &mut Transaction, coins: &[Coin]) -> Result<(), BuildError> {
        let secp = Secp256k1::new();
        let digest = sighash(tx);
        let message = Message::from_digest_slice(digest.as_bytes())?;

        for (input, coin) in tx.inputs.iter_mut().zip(coins) {
            let secret = self.keystore.find(&coin.pubkey)?;
            let der = secp.sign_ecdsa(&message, &secret).serialize_der().to_vec();
            input.script_sig = script::standard_script_sig(&der, &coin.pubkey);
        }
        Ok(())
    }

    /// Sign a single-key spend of an arbitrary prepared transaction whose
    /// scriptsigs hold previous output scripts. Returns the raw DER
    /// signature.
    pub fn sign_with(&self, tx: &Transaction, pubkey_sec: &[u8]) -> Result<Vec<u8>, BuildError> {
        let secp = Secp256k1::new();
        let digest = sighash(tx);
        let message = Message::from_digest_slice(digest.as_bytes())?;
        let secret = self.keystore.find(pubkey_sec)?;
        Ok(secp.sign_ecdsa(&message, &secret).serialize_der().to_vec())
    }
}

/// Shared description of an M-of-N multisig arrangement
#[derive(Debug, Clone)]
pub struct MultisigInfo {
    /// Participant public keys in canonical order (SEC encoding)
    pub pubkeys: Vec<Vec<u8>>,
    /// Amount locked into the bond
    pub amount: u64,
    /// Required signatures
    pub m: u8,
    /// The funding (bond) transaction, once built or observed
    pub funding: Option<Transaction>,
}

impl MultisigInfo {
    pub fn new(pubkeys: Vec<Vec<u8>>, amount: u64, m: u8) -> Self {
        Self {
            pubkeys,
            amount,
            m,
            funding: None,
        }
    }

    /// OP_M <pubkey>... OP_N OP_CHECKMULTISIG
    pub fn redeem_script(&self) -> Vec<u8> {
        script::multisig_redeem(self.m, &self.pubkeys)
    }

    /// The P2SH output script locking the bond
    pub fn bond_script(&self) -> Vec<u8> {
        script::p2sh_output(&hash160(&self.redeem_script()))
    }

    /// Build and sign the bond transaction funding the arrangement
    pub fn build_bond(&mut self, builder: &TxBuilder) -> Result<Transaction, BuildError> {
        let outputs = vec![TxOutput::new(self.amount, self.bond_script())];
        let bond = builder.build_with_outputs(outputs, self.amount + FEE)?;
        self.funding = Some(bond.clone());
        Ok(bond)
    }

    fn bond_outpoint(&self) -> Result<(Hash256, u32, Vec<u8>), BuildError> {
        let funding = self.funding.as_ref().ok_or(BuildError::NoBondOutput)?;
        let wanted = self.bond_script();
        for (index, output) in funding.outputs.iter().enumerate() {
            if output.script_pubkey == wanted {
                return Ok((funding.txid(), index as u32, output.script_pubkey.clone()));
            }
        }
        Err(BuildError::NoBondOutput)
    }

    /// The unsigned spend whose sighash every participant signs: one
    /// input from the bond, outputs for `payments` (no change logic; the
    /// fee is whatever remains).
    pub fn spend_template(
        &self,
        sequence: u32,
        lock_time: u32,
        payments: &[Payment],
        keystore: &KeyStore,
    ) -> Result<Transaction, BuildError> {
        let (bond_txid, bond_index, bond_script) = self.bond_outpoint()?;
        let mut outputs = Vec::with_capacity(payments.len());
        for payment in payments {
            let hash = base58::decode_p2pkh_address(keystore.params(), &payment.address)?;
            outputs.push(TxOutput::new(payment.amount, script::p2pkh_output(&hash)));
        }
        let mut tx = Transaction::new(
            vec![TxInput {
                prev_hash: bond_txid,
                prev_index: bond_index,
                script_sig: bond_script,
                sequence,
            }],
            outputs,
        );
        tx.lock_time = lock_time;
        Ok(tx)
    }

    /// This participant's signature over a spend of the bond
    pub fn sign_spend(
        &self,
        builder: &TxBuilder,
        pubkey_sec: &[u8],
        sequence: u32,
        lock_time: u32,
        payments: &[Payment],
        keystore: &KeyStore,
    ) -> Result<Vec<u8>, BuildError> {
        let template = self.spend_template(sequence, lock_time, payments, keystore)?;
        builder.sign_with(&template, pubkey_sec)
    }

    /// Assemble the final spend. `partial_sigs` aligns with `pubkeys`;
    /// provided signatures are verified, missing ones are produced from
    /// our own keys until M signatures are gathered.
    pub fn assemble_spend(
        &self,
        builder: &TxBuilder,
        keystore: &KeyStore,
        sequence: u32,
        lock_time: u32,
        partial_sigs: &[Option<Vec<u8>>],
        payments: &[Payment],
    ) -> Result<Transaction, BuildError> {
        let mut tx = self.spend_template(sequence, lock_time, payments, keystore)?;
        let digest = sighash(&tx);
        let message = Message::from_digest_slice(digest.as_bytes())?;
        let secp = Secp256k1::new();

        let mut sigs: Vec<Vec<u8>> = Vec::with_capacity(self.m as usize);
        for (pubkey, partial) in self.pubkeys.iter().zip(partial_sigs) {
            if sigs.len() == self.m as usize {
                break;
            }
            match partial {
                Some(sig) => {
                    let parsed = Signature::from_der(sig)?;
                    let key = PublicKey::from_slice(pubkey)?;
                    if secp.verify_ecdsa(&message, &parsed, &key).is_err() {
                        return Err(BuildError::SignatureVerifyFailed);
                    }
                    sigs.push(sig.clone());
                }
                None => match builder.sign_with(&tx, pubkey) {
                    Ok(sig) => sigs.push(sig),
                    Err(BuildError::MissingPrivateKey) => continue,
                    Err(e) => return Err(e),
                },
            }
        }
        if sigs.len() != self.m as usize {
            return Err(BuildError::MissingPrivateKey);
        }

        tx.inputs[0].script_sig = script::multisig_script_sig(&sigs, &self.redeem_script());
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoinKind;
    use crate::params::{Params, UNIT};
    use crate::storage::Store;
    use crate::wallet::keystore::KeyPair;
    use std::sync::Arc;

    /// Chain stub: genesis-only history with an arbitrary tip height
    struct FixedChain {
        tip: u64,
        genesis: Hash256,
    }

    impl ChainView for FixedChain {
        fn best_height(&self) -> u64 {
            self.tip
        }
        fn height_of(&self, hash: &Hash256) -> Option<u64> {
            (*hash == self.genesis).then_some(0)
        }
    }

    struct Fixture {
        keystore: Arc<KeyStore>,
        ledger: Ledger,
        chain: FixedChain,
    }

    impl Fixture {
        fn new(tip: u64) -> Self {
            let params = Params::mainnet();
            let genesis = params.genesis_hash;
            let store = Store::memory().unwrap();
            let keystore = Arc::new(KeyStore::open(&store, params).unwrap());
            let ledger = Ledger::open(&store, keystore.clone()).unwrap();
            Self {
                keystore,
                ledger,
                chain: FixedChain { tip, genesis },
            }
        }

        fn builder(&self) -> TxBuilder<'_> {
            TxBuilder::new(&self.keystore, &self.ledger, &self.chain)
        }

        /// The two seeded coins paying the key behind WIF T81eGkQ2..
        fn seed_standard_coins(&self) -> KeyPair {
            let pair = self
                .keystore
                .import_wif("T81eGkQ2nrQZGvkcSKCtV1tZJ4WrsKhRsBA1jCgyfMdDjmn5TwGn")
                .unwrap();
            let script =
                hex::decode("76a914d94987ba89c258372030bc9d610f89547757896488ac").unwrap();
            let tx_hashes = [
                "12c2f61d839b2b38146715e4dfc0fd914906253920480298816f108513e53e5c",
                "12c2f61d839b2b38146715e4dfc0fd988806253920480298816f108513e53e5c",
            ];
            for (i, (hash, value)) in tx_hashes.iter().zip([100 * UNIT, 150 * UNIT]).enumerate() {
                self.ledger
                    .insert_coin(Coin {
                        pubkey: pair.pubkey_sec(),
                        tx_hash: Hash256::from_hex(hash).unwrap(),
                        tx_index: i as u32 + 1,
                        value,
                        script: script.clone(),
                        block_hash: self.chain.genesis,
                        coinbase: false,
                        kind: CoinKind::P2pkh,
                    })
                    .unwrap();
            }
            pair
        }
    }

    #[test]
    fn test_p2pkh_spend_known_sighash() {
        // S6: two coins totalling 250 spent toward 200 with change; the
        // simplified sighash has a known value and both scriptsigs must
        // verify against their embedded keys.
        let fx = Fixture::new(100);
        let pair = fx.seed_standard_coins();
        let tx = fx
            .builder()
            .build_p2pkh(&[Payment {
                address: "MS43dMzRKfEs99Q931zFECfUhdvtWmbsPt".to_string(),
                amount: 200 * UNIT,
            }])
            .unwrap();

        assert_eq!(tx.inputs.len(), 2);
        // payment output plus change back to our own address
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].value, 200 * UNIT);
        assert_eq!(tx.outputs[1].value, 50 * UNIT - FEE);
        assert_eq!(
            tx.outputs[1].script_pubkey,
            script::p2pkh_output(&pair.pubkey_hash())
        );

        // recompute the signed-over digest from the previous scripts
        let mut preimage_tx = tx.clone();
        let script = hex::decode("76a914d94987ba89c258372030bc9d610f89547757896488ac").unwrap();
        for input in &mut preimage_tx.inputs {
            input.script_sig = script.clone();
        }
        let digest = sighash(&preimage_tx);
        assert_eq!(
            hex::encode(digest.as_bytes()),
            "54d2f42aa370fea481145a699a86191f625b01e0160427062bb01fca91cb644c"
        );

        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(digest.as_bytes()).unwrap();
        for input in &tx.inputs {
            let parsed = script::parse_script_sig(&input.script_sig).unwrap();
            let sig = Signature::from_der(&parsed.signature).unwrap();
            let key = PublicKey::from_slice(&parsed.pubkey).unwrap();
            secp.verify_ecdsa(&message, &sig, &key).unwrap();
        }
    }

    #[test]
    fn test_coin_selection_ascending() {
        let fx = Fixture::new(100);
        fx.seed_standard_coins();
        let tx = fx
            .builder()
            .build_p2pkh(&[Payment {
                address: "MS43dMzRKfEs99Q931zFECfUhdvtWmbsPt".to_string(),
                amount: 50 * UNIT,
            }])
            .unwrap();
        // the 100-unit coin alone covers 50 + fee
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.inputs[0].prev_index, 1);
    }

    #[test]
    fn test_insufficient_funds() {
        let fx = Fixture::new(100);
        fx.seed_standard_coins();
        let result = fx.builder().build_p2pkh(&[Payment {
            address: "MS43dMzRKfEs99Q931zFECfUhdvtWmbsPt".to_string(),
            amount: 400 * UNIT,
        }]);
        assert!(matches!(
            result,
            Err(BuildError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_unconfirmed_coins_not_spent() {
        // tip at 3: the coins confirm at depth 3 < NCONFIRMED
        let fx = Fixture::new(3);
        fx.seed_standard_coins();
        let result = fx.builder().build_p2pkh(&[Payment {
            address: "MS43dMzRKfEs99Q931zFECfUhdvtWmbsPt".to_string(),
            amount: UNIT,
        }]);
        assert!(matches!(
            result,
            Err(BuildError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_immature_coinbase_not_spent() {
        let fx = Fixture::new(50);
        let pair = fx.keystore.generate().unwrap();
        fx.ledger
            .insert_coin(Coin {
                pubkey: pair.pubkey_sec(),
                tx_hash: Hash256::new([4; 32]),
                tx_index: 0,
                value: 100 * UNIT,
                script: script::p2pkh_output(&pair.pubkey_hash()),
                block_hash: fx.chain.genesis,
                coinbase: true,
                kind: CoinKind::P2pkh,
            })
            .unwrap();
        let result = fx.builder().build_p2pkh(&[Payment {
            address: pair.address(fx.keystore.params()),
            amount: UNIT,
        }]);
        // depth 50 < SPENDABLE_COINBASE_DEPTH
        assert!(matches!(
            result,
            Err(BuildError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_multisig_bond_and_spend() {
        let fx = Fixture::new(100);
        let pair = fx.seed_standard_coins();
        let pair2 = fx
            .keystore
            .import_wif("T4MzbNi83oaNzi8Yid22ZeNqHzaFhLqQkKmkffuQ58jR4ytz9QG2")
            .unwrap();
        let pair3 = fx
            .keystore
            .import_wif("T9QEmRobyTDTJe4qzSEu2mD1SMu6Wtzun6xkawnwRpBX5brimeCN")
            .unwrap();

        let mut info = MultisigInfo::new(
            vec![pair2.pubkey_sec(), pair3.pubkey_sec(), pair.pubkey_sec()],
            200 * UNIT,
            2,
        );
        assert_eq!(
            hex::encode(info.redeem_script()),
            "52210235dad6f5b0655e5ec633e71c3d8e0acee49a314c76a2650f6d60bc291d631c9d21\
             03bd9b94f58dd51233a1380accd944aa44d9846fab673497ca4de794f79ecdbccd210373\
             f0f5d4488616b20537810f5281ea27dd65213fa40be696086c6d2c3319419e53ae"
        );

        let bond = info.build_bond(&fx.builder()).unwrap();
        assert_eq!(bond.outputs[0].value, 200 * UNIT);
        assert_eq!(bond.outputs[0].script_pubkey, info.bond_script());
        assert_eq!(bond.outputs[0].script_pubkey.len(), 23);

        let payments = [Payment {
            address: "MTi4x2NtDpdyXSwEvwU3aZ1Uronz1JBNC3".to_string(),
            amount: 200 * UNIT - FEE,
        }];
        let sig2 = info
            .sign_spend(
                &fx.builder(),
                &pair2.pubkey_sec(),
                SEQUENCE_FINAL,
                0,
                &payments,
                &fx.keystore,
            )
            .unwrap();

        let spend = info
            .assemble_spend(
                &fx.builder(),
                &fx.keystore,
                SEQUENCE_FINAL,
                0,
                &[Some(sig2.clone()), None, None],
                &payments,
            )
            .unwrap();

        // scriptsig: OP_0, two signatures, the pushed redeem script
        let script_sig = &spend.inputs[0].script_sig;
        assert_eq!(script_sig[0], script::OP_0);
        let template = info
            .spend_template(SEQUENCE_FINAL, 0, &payments, &fx.keystore)
            .unwrap();
        let digest = sighash(&template);
        let message = Message::from_digest_slice(digest.as_bytes()).unwrap();
        let secp = Secp256k1::new();

        // first signature is pair2's as provided
        let len2 = script_sig[1] as usize;
        let embedded2 = &script_sig[2..2 + len2];
        assert_eq!(embedded2, &sig2[..]);
        let key2 = PublicKey::from_slice(&pair2.pubkey_sec()).unwrap();
        secp.verify_ecdsa(&message, &Signature::from_der(embedded2).unwrap(), &key2)
            .unwrap();

        // second was produced by our first key with a private key (pair3)
        let len3 = script_sig[2 + len2] as usize;
        let embedded3 = &script_sig[3 + len2..3 + len2 + len3];
        let key3 = PublicKey::from_slice(&pair3.pubkey_sec()).unwrap();
        secp.verify_ecdsa(&message, &Signature::from_der(embedded3).unwrap(), &key3)
            .unwrap();
    }

    #[test]
    fn test_assemble_rejects_bad_signature() {
        let fx = Fixture::new(100);
        let pair = fx.seed_standard_coins();
        let pair2 = fx.keystore.generate().unwrap();
        let mut info = MultisigInfo::new(vec![pair2.pubkey_sec(), pair.pubkey_sec()], 10 * UNIT, 2);
        info.build_bond(&fx.builder()).unwrap();

        let payments = [Payment {
            address: pair.address(fx.keystore.params()),
            amount: 9 * UNIT,
        }];
        // a signature over the wrong message
        let bogus_digest = Hash256::new([9; 32]);
        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(bogus_digest.as_bytes()).unwrap();
        let bogus = secp
            .sign_ecdsa(&message, &pair2.secret)
            .serialize_der()
            .to_vec();

        let result = info.assemble_spend(
            &fx.builder(),
            &fx.keystore,
            SEQUENCE_FINAL,
            0,
            &[Some(bogus), None],
            &payments,
        );
        assert!(matches!(result, Err(BuildError::SignatureVerifyFailed)));
    }
}
