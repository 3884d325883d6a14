//! Error types for the game lifecycle, the ledger and the document store.

use thiserror::Error;

/// Top-level error returned by [`LeagueService`](crate::service::LeagueService)
/// and the approval state machine.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{actor} is not a participant of {target}")]
    NotParticipant { actor: String, target: String },

    #[error("game {0} has already been finalised")]
    AlreadyFinal(String),

    #[error("invalid game result: {0}")]
    InvalidResult(String),

    #[error("{actor} has already approved game {game}")]
    AlreadyApproved { actor: String, game: String },

    #[error("game {0} is still inside its approval window")]
    ApprovalWindowOpen(String),

    #[error("gave up after {attempts} conflicting updates")]
    ConcurrentUpdateConflict { attempts: u32 },

    #[error("{0}")]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Error raised by the performance ledger when a record cannot absorb an
/// apply or a revert.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("no performance record for player {0}")]
    MissingRecord(String),

    #[error("invariant violated for {player}: {field} would drop below zero")]
    InvariantViolation { player: String, field: &'static str },
}

/// Error raised by a [`GameStore`](crate::store::GameStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),

    #[error("failed to encode document: {0}")]
    Encode(String),

    #[error("failed to decode document: {0}")]
    Decode(#[from] minicbor::decode::Error),

    #[error("document {key} changed since it was read")]
    Conflict { key: String },
}
