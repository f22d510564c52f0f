pub mod contract;
pub mod provider;

pub use contract::ScoreContract;
pub use provider::{ChainContext, FeeData, SignedClient};
