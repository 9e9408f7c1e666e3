// Micropayment channel
//
// Payer and payee share a 2-of-2 bond. The payer must hold a payee-signed
// time-locked refund before broadcasting the bond; afterwards each payment
// is a final-sequence 2-of-2 spend moving a larger slice to the payee.
// Only the last increment is ever broadcast.

use crate::core::{base58, hash160, Transaction, SEQUENCE_FINAL};
use crate::params::FEE;
use crate::wallet::keystore::KeyStore;
use crate::wallet::tx_builder::{BuildError, MultisigInfo, Payment, TxBuilder};

/// State shared by both ends of a channel
#[derive(Debug, Clone)]
pub struct Channel {
    info: MultisigInfo,
}

impl Channel {
    /// `pubkeys[0]` is the payer, `pubkeys[1]` the payee
    pub fn new(payer_pubkey: Vec<u8>, payee_pubkey: Vec<u8>, amount: u64) -> Self {
        Self {
            info: MultisigInfo::new(vec![payer_pubkey, payee_pubkey], amount, 2),
        }
    }

    /// Redeem script and its HASH-160; the payee registers the hash so
    /// the bond shows up in filtered blocks.
    pub fn watch_script(&self) -> (Vec<u8>, [u8; 20]) {
        let redeem = self.info.redeem_script();
        let hash = hash160(&redeem);
        (redeem, hash)
    }

    /// Adopt the bond transaction observed or received out of band
    pub fn set_funding(&mut self, bond: Transaction) {
        self.info.funding = Some(bond);
    }

    /// Split the bond between the parties: `to_payee` for the payee, the
    /// rest minus the fee back to the payer. Zero outputs are elided.
    fn split(&self, to_payee: u64, keystore: &KeyStore) -> Result<Vec<Payment>, BuildError> {
        let total = self.info.amount;
        let to_payer = total
            .checked_sub(FEE + to_payee)
            .ok_or(BuildError::InsufficientFunds {
                available: total,
                needed: FEE + to_payee,
            })?;
        let params = keystore.params();
        let mut payments = Vec::with_capacity(2);
        if to_payer > 0 {
            payments.push(Payment {
                address: base58::p2pkh_address(params, &self.info.pubkeys[0]),
                amount: to_payer,
            });
        }
        if to_payee > 0 {
            payments.push(Payment {
                address: base58::p2pkh_address(params, &self.info.pubkeys[1]),
                amount: to_payee,
            });
        }
        Ok(payments)
    }
}

/// The funding side of a channel
pub struct ChannelPayer {
    pub channel: Channel,
}

impl ChannelPayer {
    pub fn new(payer_pubkey: Vec<u8>, payee_pubkey: Vec<u8>, amount: u64) -> Self {
        Self {
            channel: Channel::new(payer_pubkey, payee_pubkey, amount),
        }
    }

    /// Build the bond from our own coins. The bond must be shared with
    /// the payee and must NOT be broadcast until `finish_refund` has a
    /// payee signature.
    pub fn build_bond(&mut self, builder: &TxBuilder) -> Result<Transaction, BuildError> {
        self.channel.info.build_bond(builder)
    }

    /// Countersign the payee's refund signature into the complete
    /// time-locked refund transaction.
    pub fn finish_refund(
        &self,
        builder: &TxBuilder,
        keystore: &KeyStore,
        sequence: u32,
        lock_time: u32,
        refund_sig: Vec<u8>,
    ) -> Result<Transaction, BuildError> {
        debug_assert!(sequence < SEQUENCE_FINAL, "a refund must stay replaceable");
        let payments = self.channel.split(0, keystore)?;
        self.channel.info.assemble_spend(
            builder,
            keystore,
            sequence,
            lock_time,
            &[None, Some(refund_sig)],
            &payments,
        )
    }

    /// Sign an increment moving `to_payee` to the payee
    pub fn sign_increment(
        &self,
        builder: &TxBuilder,
        keystore: &KeyStore,
        to_payee: u64,
    ) -> Result<Vec<u8>, BuildError> {
        let payments = self.channel.split(to_payee, keystore)?;
        self.channel.info.sign_spend(
            builder,
            &self.channel.info.pubkeys[0],
            SEQUENCE_FINAL,
            0,
            &payments,
            keystore,
        )
    }
}

/// The receiving side of a channel
pub struct ChannelPayee {
    pub channel: Channel,
}

impl ChannelPayee {
    pub fn new(payer_pubkey: Vec<u8>, payee_pubkey: Vec<u8>, amount: u64) -> Self {
        Self {
            channel: Channel::new(payer_pubkey, payee_pubkey, amount),
        }
    }

    /// Sign the payer's time-locked refund
    pub fn sign_refund(
        &self,
        builder: &TxBuilder,
        keystore: &KeyStore,
        sequence: u32,
        lock_time: u32,
    ) -> Result<Vec<u8>, BuildError> {
        let payments = self.channel.split(0, keystore)?;
        self.channel.info.sign_spend(
            builder,
            &self.channel.info.pubkeys[1],
            sequence,
            lock_time,
            &payments,
            keystore,
        )
    }

    /// Countersign an increment into a broadcastable transaction
    pub fn accept_increment(
        &self,
        builder: &TxBuilder,
        keystore: &KeyStore,
        to_payee: u64,
        payer_sig: Vec<u8>,
    ) -> Result<Transaction, BuildError> {
        let payments = self.channel.split(to_payee, keystore)?;
        self.channel.info.assemble_spend(
            builder,
            keystore,
            SEQUENCE_FINAL,
            0,
            &[Some(payer_sig), None],
            &payments,
        )
    }
}
