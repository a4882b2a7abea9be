//! Client core for the on-chain lottery: a cache of contract values, state
//! derived from it, and the controller that runs contract writes and keeps
//! the cache and notifications in step with them.

pub mod amount;

pub mod cache;

pub mod catalog;

pub mod config;

pub mod deployment;

pub mod derived;

pub mod errors;

pub mod gateway;

pub mod logging;

pub mod notification;

pub mod remote;

pub mod test_helpers;

pub mod transaction;

pub use cache::RemoteValueCache;
pub use catalog::ActionName;
pub use derived::{
    DerivedState,
    derive,
};
pub use transaction::TransactionController;
