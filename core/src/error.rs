//! Orchestrator and listener errors.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use umbra_commitment::{Address, AssetClass, CommitmentHash, FtValue, ValueError, ZkpPublicKey};
use umbra_envelope::EnvelopeError;

use crate::clients::ClientError;

/// External call being made when a workflow failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CheckRegistered,
    ResolvePublicKey,
    ResolveAddress,
    ResolveMessagingKey,
    CreateAccount,
    UnlockAccount,
    LedgerMint,
    LedgerTransfer,
    LedgerBatchTransfer,
    LedgerConsolidate,
    LedgerBurn,
    CheckCorrectness,
    Seal,
    Publish,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::CheckRegistered => "directory.is_registered",
            Step::ResolvePublicKey => "directory.resolve_public_key",
            Step::ResolveAddress => "directory.resolve_address",
            Step::ResolveMessagingKey => "directory.resolve_messaging_key",
            Step::CreateAccount => "accounts.create_one_time_address",
            Step::UnlockAccount => "accounts.unlock",
            Step::LedgerMint => "ledger.mint",
            Step::LedgerTransfer => "ledger.transfer",
            Step::LedgerBatchTransfer => "ledger.batch_transfer",
            Step::LedgerConsolidate => "ledger.consolidate",
            Step::LedgerBurn => "ledger.burn",
            Step::CheckCorrectness => "ledger.check_correctness",
            Step::Seal => "envelope.seal",
            Step::Publish => "channel.publish",
        };
        f.write_str(name)
    }
}

/// An external call that failed or ran out of time.
#[derive(Debug)]
pub enum CallFailure {
    External { step: Step, source: ClientError },
    Timeout { step: Step, after: Duration },
}

/// Request rejected before any external call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("outputs total {requested} exceeds input value {available}")]
    Overspend { available: FtValue, requested: FtValue },

    #[error("spendable balance cannot cover {0}")]
    InsufficientFunds(FtValue),

    #[error("malformed value: {0}")]
    Malformed(#[from] ValueError),

    #[error("'{0}' is not registered")]
    NotRegistered(String),

    #[error("'{0}' is blacklisted")]
    Blacklisted(String),

    #[error("commitment {0} not found")]
    UnknownCommitment(CommitmentHash),

    #[error("commitment {0} is already spent")]
    AlreadySpent(CommitmentHash),

    #[error("expected {expected} input commitments, got {got}")]
    InputCount { expected: &'static str, got: usize },

    #[error("same commitment {0} used twice")]
    DuplicateInput(CommitmentHash),

    #[error("consolidation output {output} does not equal inputs total {inputs}")]
    ConsolidationMismatch { inputs: FtValue, output: FtValue },

    #[error("{0} outputs requested, at most {max} fit in a batch", max = umbra_commitment::BATCH_WIDTH)]
    TooManyOutputs(usize),

    #[error("a full batch leaves no slot for change {0}")]
    NoChangeSlot(FtValue),

    #[error("zero-valued transfer")]
    ZeroValue,

    #[error("expected a {expected:?} commitment")]
    WrongAssetClass { expected: AssetClass },

    #[error("no key material stored for user '{0}'")]
    UnknownUser(String),
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("{step} failed: {source}")]
    External {
        step: Step,
        #[source]
        source: ClientError,
    },

    #[error("{step} timed out after {after:?}")]
    Timeout { step: Step, after: Duration },

    #[error("sealing notification: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl From<ValueError> for TransferError {
    fn from(e: ValueError) -> Self {
        TransferError::Invalid(ValidationError::Malformed(e))
    }
}

impl From<CallFailure> for TransferError {
    fn from(e: CallFailure) -> Self {
        match e {
            CallFailure::External { step, source } => TransferError::External { step, source },
            CallFailure::Timeout { step, after } => TransferError::Timeout { step, after },
        }
    }
}

impl TransferError {
    /// Rejected before anything left the process.
    pub fn is_validation(&self) -> bool {
        matches!(self, TransferError::Invalid(_))
    }
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("cannot open envelope: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("{step} failed: {source}")]
    External {
        step: Step,
        #[source]
        source: ClientError,
    },

    #[error("{step} timed out after {after:?}")]
    Timeout { step: Step, after: Duration },

    #[error(
        "commitment {commitment} failed the correctness check \
         (reconciles: {z_correct}, on chain: {z_onchain_correct})"
    )]
    CorrectnessFailed {
        commitment: CommitmentHash,
        z_correct: bool,
        z_onchain_correct: bool,
    },

    #[error("commitment {commitment} is owned by {owner}, not by this listener")]
    WrongOwner {
        commitment: CommitmentHash,
        owner: ZkpPublicKey,
    },

    #[error("opening names token contract {claimed}, expected {expected}")]
    WrongContract { claimed: Address, expected: Address },

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl From<CallFailure> for ListenerError {
    fn from(e: CallFailure) -> Self {
        match e {
            CallFailure::External { step, source } => ListenerError::External { step, source },
            CallFailure::Timeout { step, after } => ListenerError::Timeout { step, after },
        }
    }
}
