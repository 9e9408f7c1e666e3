// Network parameters
//
// Parameters are plain values constructed at startup and threaded through
// the node; nothing in the crate reads network constants from a global.

use crate::core::Hash256;

/// Protocol version this node speaks and requires
pub const PROTOCOL_VERSION: u32 = 70003;

/// Smallest indivisible amount per whole coin
pub const UNIT: u64 = 100_000_000;

/// Flat fee attached to every built transaction (0.001 coin)
pub const FEE: u64 = UNIT / 1000;

/// Blocks below `best - NCONFIRMED` are treated as immutable
pub const NCONFIRMED: u64 = 5;

/// Coinbase outputs may not be spent shallower than this
pub const SPENDABLE_COINBASE_DEPTH: u64 = 100;

/// Height at which proof-of-work switches from scrypt to Lyra2REv2
pub const LYRA2REV2_SWITCH_HEIGHT: u64 = 450_000;

/// Tolerated clock skew when checking header timestamps
pub const CLOCK_SKEW_SECS: u64 = 2 * 60 * 60;

/// A hard-coded (height, hash, prev-hash) anchor; any conflicting chain at
/// that height is rejected.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    pub height: u64,
    pub hash: &'static str,
    pub prev: &'static str,
}

/// Static per-network constants
#[derive(Debug, Clone)]
pub struct Params {
    /// Frame magic identifying the network
    pub magic: [u8; 4],
    /// Default TCP port
    pub port: u16,
    /// Hash of the genesis block (display order)
    pub genesis_hash: Hash256,
    /// Version byte of P2PKH addresses
    pub address_version: u8,
    /// Version byte of P2SH addresses
    pub p2sh_version: u8,
    /// Version byte of dumped private keys
    pub wif_version: u8,
    /// Alternative WIF version byte still accepted on import
    pub wif_version_alt: u8,
    /// Upper bound on the compact difficulty field
    pub pow_limit: u32,
    /// User agent advertised in version messages
    pub user_agent: String,
    /// DNS hostnames seeding peer discovery
    pub dns_seeds: Vec<String>,
    checkpoints: Vec<Checkpoint>,
}

const MAINNET_CHECKPOINTS: &[Checkpoint] = &[
    Checkpoint {
        height: 0,
        hash: "ff9f1c0116d19de7c9963845e129f9ed1bfc0b376eb54fd7afa42e0d418c8bb6",
        prev: "0000000000000000000000000000000000000000000000000000000000000000",
    },
    Checkpoint {
        height: 1500,
        hash: "9f42d51d18d0a8914a00664c433a0ca4be3eed02f9374d790bffbd3d3053d41d",
        prev: "9bfb0a32684c8e68839e08d59f2fbecc69586368540a2e1439e765d56072ff89",
    },
    Checkpoint {
        height: 4000,
        hash: "2c60edac7d9f44d90d1e218af2a8085e78b735185c5bf42f9fe9dbd0e604c97b",
        prev: "82f94da36aa810abda67263b5c97bc821297dd17432ee3d81bccc0fe42ba0078",
    },
    Checkpoint {
        height: 8000,
        hash: "61d4d053b1a4c6deb4c7e806cedd876f25b51da6c51b209109579c7b9892e5c2",
        prev: "cccfeff9a400a9dbd3b4d1ab181bc208cf08795558d2931483972e01b75cba47",
    },
    Checkpoint {
        height: 16000,
        hash: "3c4a8887bb3ae0599abfefe765f7c911fbfe98b3f23d7f70b05bf49cf62ebdaf",
        prev: "893efdeb009face8546e473469feba2950aa767de73b601e4572217083d99cd5",
    },
    Checkpoint {
        height: 32000,
        hash: "c0703986c1c6a9052478db5e52432e5a1e55d6b6362b85f0ffdbb61ce3311b77",
        prev: "a40c6ff7810f795c8c23f41fbe2a870278b3a4e7f68d66a46d21b06a678c9b51",
    },
    Checkpoint {
        height: 58700,
        hash: "a9c5d9878864b77ba52b068787b83ce2fcf526c5899f40af51c9d441eeb4c84d",
        prev: "6fd4812b5c71362a7702182902deb7dd647ccbf1b1af924dcb797fc23d7a14d5",
    },
    Checkpoint {
        height: 80000,
        hash: "c99b83da7328b58251d16f4646da222b0280f180bd208efa5e3256c9eb6ea2be",
        prev: "d458aef846dd58f9a22d60ae7a98d3cdf2e25ed6863ef05d529102fc435e164f",
    },
    Checkpoint {
        height: 115000,
        hash: "75e642c003e5bd748b679472e981b7b2f81f344b3f197029f84470256cef33e4",
        prev: "4568160e0d97abc3cbc89f87fd5015a681fb5438de05dde791c9041847b8f960",
    },
    Checkpoint {
        height: 189250,
        hash: "1bea3d5c25a8097eef2e70ece4beb6c502b895fe00056552948309beb3497c99",
        prev: "0b660afcef545fa4fdfecd02e8694b8d319839f908e1dd9e3388232a05ef7e50",
    },
    Checkpoint {
        height: 300000,
        hash: "11095515590421444ba29396d9122c234baced79be8b32604acc37cf094558ab",
        prev: "f9565504df0fd38529eb4d048e5ba2ce398b087dc202b315859677619a60543a",
    },
    Checkpoint {
        height: 444000,
        hash: "3ed05516cdce4db93b135189592c7e2b37d768f99a1819a1d2ea3a8e5b8439a8",
        prev: "d165120dbb2a3ada178a7c40961e3ddef94646127335b996d589d3573f870bdd",
    },
    Checkpoint {
        height: 655000,
        hash: "4c556ef37bc75e95820200d2ae25472d7e2c05a981667beef5b2f6a64b5ce546",
        prev: "fb72709f01a5a23fd998c71a1a2266dea3390e9ca59e18bacd80fe4626bdb7be",
    },
];

impl Params {
    /// Mainnet constants
    pub fn mainnet() -> Self {
        Self {
            magic: [0xfb, 0xc0, 0xb6, 0xdb],
            port: 9401,
            genesis_hash: Hash256::from_hex(
                "ff9f1c0116d19de7c9963845e129f9ed1bfc0b376eb54fd7afa42e0d418c8bb6",
            )
            .expect("compiled-in genesis hash"),
            address_version: 50,
            p2sh_version: 5,
            wif_version: 178, // address_version + 128
            wif_version_alt: 176,
            pow_limit: 0x1e0f_ffff,
            user_agent: format!("/monalite:{}/", env!("CARGO_PKG_VERSION")),
            dns_seeds: vec![
                "dnsseed.monacoin.org".to_string(),
                "dnsseed-multimona-test.tk".to_string(),
                "seed.givememona.tk".to_string(),
            ],
            checkpoints: MAINNET_CHECKPOINTS.to_vec(),
        }
    }

    /// Checkpoint hash at `height`, if that height is anchored
    pub fn checkpoint(&self, height: u64) -> Option<Hash256> {
        self.checkpoints
            .iter()
            .find(|c| c.height == height)
            .map(|c| Hash256::from_hex(c.hash).expect("compiled-in checkpoint hash"))
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_is_checkpoint_zero() {
        let params = Params::mainnet();
        assert_eq!(params.checkpoint(0), Some(params.genesis_hash));
        assert_eq!(params.checkpoint(17), None);
    }

    #[test]
    fn test_checkpoint_table_is_well_formed() {
        let params = Params::mainnet();
        for c in params.checkpoints() {
            assert!(Hash256::from_hex(c.hash).is_ok(), "hash at {}", c.height);
            assert!(Hash256::from_hex(c.prev).is_ok(), "prev at {}", c.height);
        }
        assert!(Hash256::from_hex(params.checkpoints()[0].prev)
            .unwrap()
            .is_zero());
    }

    #[test]
    fn test_fee_is_a_thousandth() {
        assert_eq!(FEE, 100_000);
        assert_eq!(UNIT, 100_000_000);
    }
}
