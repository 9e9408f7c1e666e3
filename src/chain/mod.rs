// Header chain maintenance

mod store;

pub use store::{Chain, ChainEntry, ChainError, ChainView};
