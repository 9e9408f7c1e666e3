// Key management
//
// Keys persist in the `key` bucket as pubkey-SEC -> secret-scalar.
// Watch-only entries store an empty scalar. The bloom filter handed to
// peers is derived from every owned pubkey, its HASH-160 and any
// registered script hashes.

use crate::core::{base58, hash160, BloomFilter};
use crate::core::base58::AddressError;
use crate::params::Params;
use crate::storage::{Store, StoreError, BUCKET_KEY, BUCKET_SCRIPTHASH};
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("secp256k1: {0}")]
    Secp(#[from] secp256k1::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no private key for this public key")]
    MissingPrivateKey,
}

impl From<sled::Error> for KeyError {
    fn from(e: sled::Error) -> Self {
        KeyError::Store(StoreError::Db(e))
    }
}

/// An in-memory key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
    pub compressed: bool,
}

impl KeyPair {
    /// SEC encoding of the public key, honoring the compression flag
    pub fn pubkey_sec(&self) -> Vec<u8> {
        if self.compressed {
            self.public.serialize().to_vec()
        } else {
            self.public.serialize_uncompressed().to_vec()
        }
    }

    pub fn pubkey_hash(&self) -> [u8; 20] {
        hash160(&self.pubkey_sec())
    }

    pub fn address(&self, params: &Params) -> String {
        base58::p2pkh_address(params, &self.pubkey_sec())
    }

    pub fn wif(&self, params: &Params) -> String {
        base58::encode_wif(params, &self.secret.secret_bytes(), self.compressed)
    }
}

/// Persistent key store
pub struct KeyStore {
    params: Params,
    keys: sled::Tree,
    script_hashes: sled::Tree,
    secp: Secp256k1<All>,
}

impl KeyStore {
    pub fn open(store: &Store, params: Params) -> Result<Self, KeyError> {
        Ok(Self {
            keys: store.bucket(BUCKET_KEY)?,
            script_hashes: store.bucket(BUCKET_SCRIPTHASH)?,
            params,
            secp: Secp256k1::new(),
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Generate, persist and return a fresh compressed key
    pub fn generate(&self) -> Result<KeyPair, KeyError> {
        let mut rng = rand::rngs::OsRng;
        let secret = SecretKey::new(&mut rng);
        let pair = KeyPair {
            public: secret.public_key(&self.secp),
            secret,
            compressed: true,
        };
        self.insert(&pair)?;
        Ok(pair)
    }

    /// Import a WIF-encoded private key
    pub fn import_wif(&self, wif: &str) -> Result<KeyPair, KeyError> {
        let (scalar, compressed) = base58::decode_wif(&self.params, wif)?;
        let secret = SecretKey::from_slice(&scalar)?;
        let pair = KeyPair {
            public: secret.public_key(&self.secp),
            secret,
            compressed,
        };
        self.insert(&pair)?;
        Ok(pair)
    }

    fn insert(&self, pair: &KeyPair) -> Result<(), KeyError> {
        self.keys
            .insert(pair.pubkey_sec(), &pair.secret.secret_bytes()[..])?;
        Ok(())
    }

    /// Register a watch-only public key (no spending capability)
    pub fn watch(&self, pubkey_sec: &[u8]) -> Result<(), KeyError> {
        PublicKey::from_slice(pubkey_sec)?;
        self.keys.insert(pubkey_sec, &[] as &[u8])?;
        Ok(())
    }

    /// Remove a key (and its coins' future recognition)
    pub fn remove(&self, pubkey_sec: &[u8]) -> Result<(), KeyError> {
        self.keys.remove(pubkey_sec)?;
        Ok(())
    }

    /// Is this public key in the wallet (spendable or watch-only)?
    pub fn owns(&self, pubkey_sec: &[u8]) -> Result<bool, KeyError> {
        Ok(self.keys.contains_key(pubkey_sec)?)
    }

    /// Private key for a public key; `MissingPrivateKey` for watch-only
    pub fn find(&self, pubkey_sec: &[u8]) -> Result<SecretKey, KeyError> {
        match self.keys.get(pubkey_sec)? {
            Some(scalar) if scalar.len() == 32 => Ok(SecretKey::from_slice(&scalar)?),
            Some(_) => Err(KeyError::MissingPrivateKey),
            None => Err(KeyError::MissingPrivateKey),
        }
    }

    /// Owned public key whose HASH-160 equals `hash`, if any
    pub fn find_by_hash160(&self, hash: &[u8; 20]) -> Result<Option<Vec<u8>>, KeyError> {
        for item in self.keys.iter() {
            let (pubkey, _) = item?;
            if &hash160(&pubkey) == hash {
                return Ok(Some(pubkey.to_vec()));
            }
        }
        Ok(None)
    }

    /// All owned public keys in SEC encoding
    pub fn public_keys(&self) -> Result<Vec<Vec<u8>>, KeyError> {
        let mut keys = Vec::new();
        for item in self.keys.iter() {
            let (pubkey, _) = item?;
            keys.push(pubkey.to_vec());
        }
        Ok(keys)
    }

    /// Register an extra script hash to watch for (e.g. a channel bond)
    pub fn add_script_hash(&self, hash: &[u8; 20]) -> Result<(), KeyError> {
        self.script_hashes.insert(hash, &hash[..])?;
        Ok(())
    }

    pub fn remove_script_hash(&self, hash: &[u8; 20]) -> Result<(), KeyError> {
        self.script_hashes.remove(hash)?;
        Ok(())
    }

    /// Bloom filter over every owned pubkey, its address hash, and the
    /// registered script hashes. `tweak` is the process-lifetime random
    /// value chosen at startup.
    pub fn bloom_filter(&self, tweak: u32) -> Result<BloomFilter, KeyError> {
        let mut filter = BloomFilter::with_tweak(tweak);
        for item in self.keys.iter() {
            let (pubkey, _) = item?;
            filter.insert(&pubkey);
            filter.insert(&hash160(&pubkey));
        }
        for item in self.script_hashes.iter() {
            let (hash, _) = item?;
            filter.insert(&hash);
        }
        Ok(filter)
    }
}
