pub mod approval;
pub mod competition;
pub mod config;
pub mod error;
pub mod game;
pub mod ledger;
pub mod notify;
pub mod ranking;
pub mod record;
pub mod service;
pub mod store;
pub mod utils;

pub use error::{GameError, LedgerError, StoreError};
pub use service::LeagueService;
pub use store::{GameStore, SledStore};
