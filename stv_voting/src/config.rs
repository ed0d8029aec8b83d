// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// One row of the normalized rank table.
///
/// Each slot corresponds to one candidate column, in the same order as the
/// candidate list handed to [crate::run_election]. `None` means the voter
/// expressed no preference for that candidate. Ranks are 1-based, 1 being the
/// most preferred. Rows that do not form a contiguous `1..k` sequence are
/// informal and get discarded before counting.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Ballot {
    pub ranks: Vec<Option<u32>>,
}

impl Ballot {
    pub fn new(ranks: Vec<Option<u32>>) -> Ballot {
        Ballot { ranks }
    }
}

// ********* Configuration **********

/// How a tie between lowest-scoring candidates is resolved when neither the
/// round history nor the raw preference scan can separate them.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TotalTiePolicy {
    /// Fail with [ElectionError::UnresolvedTie]. The default.
    Fail,
    /// Draw one of the tied candidates with a deterministic seeded shuffle.
    /// The same seed always reproduces the same outcome.
    RandomDraw { seed: u32 },
}

/// The rules that govern one role's count.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ElectionRules {
    /// Number of seats to fill. Must be at least 1 and strictly less than the
    /// number of candidates left after exclusions.
    pub seats: u32,
    /// Candidates withdrawn before counting begins. Ballots ranking them
    /// slide to their next preference. Every name must exist in the
    /// candidate list.
    pub excluded: Vec<String>,
    pub total_tie_policy: TotalTiePolicy,
}

impl ElectionRules {
    pub const DEFAULT_RULES: ElectionRules = ElectionRules {
        seats: 1,
        excluded: Vec::new(),
        total_tie_policy: TotalTiePolicy::Fail,
    };
}

// ******** Output data structures *********

/// Which tiebreak stage picked the eliminated candidate.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TiebreakStage {
    /// The recorded totals of an earlier round had a unique minimum.
    PriorRound { round: u32 },
    /// The raw (untransferred) preference counts at this level had a unique
    /// minimum.
    RawPreference { level: u32 },
    /// Drawn with the seeded shuffle after both stages failed.
    RandomDraw,
}

/// Record of one tie resolution, kept so that the transcript can name the
/// tied candidates and the stage that separated them.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TiebreakStats {
    pub tied: Vec<String>,
    pub stage: TiebreakStage,
}

/// Statistics for one round.
#[derive(PartialEq, Debug, Clone)]
pub struct RoundStats {
    pub round: u32,
    /// Totals for every candidate still remaining at the start of the round,
    /// in input column order.
    pub tally: Vec<(String, f64)>,
    /// Candidates that reached the quota this round, in input column order.
    pub elected: Vec<String>,
    /// The candidate eliminated this round, if any.
    pub eliminated: Option<String>,
    pub tiebreak: Option<TiebreakStats>,
}

/// The outcome of one role's count: the winners in election order and the
/// full per-round audit trail.
#[derive(PartialEq, Debug, Clone)]
pub struct ElectionResult {
    pub winners: Vec<String>,
    /// Droop quota, computed once from the formal ballot count.
    pub quota: f64,
    /// Number of informal ballots discarded before counting.
    pub informal_ballots: u64,
    pub round_stats: Vec<RoundStats>,
}

/// Errors that prevent a count from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ElectionError {
    /// Malformed request: seats not below the candidate count, unknown
    /// excluded candidate, or an empty candidate list.
    Configuration(String),
    /// Both tiebreak stages exhausted with random draws disallowed.
    UnresolvedTie { round: u32, tied: Vec<String> },
    /// More candidates elected in one round than seats remained. Signals a
    /// quota or transfer arithmetic bug, never a legitimate outcome.
    InvariantViolation(String),
}

impl Error for ElectionError {}

impl Display for ElectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElectionError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            ElectionError::UnresolvedTie { round, tied } => write!(
                f,
                "unresolved tie in round {} between {} (random tiebreak disallowed)",
                round,
                tied.join(", ")
            ),
            ElectionError::InvariantViolation(msg) => {
                write!(f, "invariant violation: {}", msg)
            }
        }
    }
}
