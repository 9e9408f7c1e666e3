// Consensus rules: proof-of-work selection and validation

pub mod lyra2rev2;
pub mod pow;

pub use pow::{pow_digest, Target};
