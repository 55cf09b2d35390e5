use serde::{Deserialize, Serialize};

/// Stages of one run, in the only order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunState {
    Collecting,
    Chunking,
    Parsing,
    Canonicalizing,
    Aggregating,
    Validating,
    Ready,
}

impl RunState {
    pub fn next(self) -> Option<RunState> {
        match self {
            RunState::Collecting => Some(RunState::Chunking),
            RunState::Chunking => Some(RunState::Parsing),
            RunState::Parsing => Some(RunState::Canonicalizing),
            RunState::Canonicalizing => Some(RunState::Aggregating),
            RunState::Aggregating => Some(RunState::Validating),
            RunState::Validating => Some(RunState::Ready),
            RunState::Ready => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == RunState::Ready
    }
}

/// Why a row name was kept out of the statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "token", rename_all = "snake_case")]
pub enum RowRejection {
    TooShort,
    NoIncomeKeyword,
    Junk(String),
    CashFlow(String),
}

/// Things the pipeline absorbed instead of failing on. Collected per run so a
/// caller can see what was dropped and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    StateEntered { state: RunState },
    ChunkSkipped { index: usize },
    ChunkParsed { index: usize, rows: usize },
    /// The service answered but the chunk yielded nothing
    ChunkEmpty { index: usize },
    ChunkFailed { index: usize, attempts: u32, reason: String },
    RowRejected { name: String, reason: RowRejection },
    PeriodRejected { label: String },
    PeriodsPruned { dropped: Vec<i32> },
    /// Every value of the row sanitized to the sentinel
    RowDropped { key: String },
}
