pub use crate::config::*;

use crate::run_election;

/// A builder for assembling an election from (candidate, rank) pairs.
///
/// It takes care of laying the ranks out as a table in candidate order, which
/// is the layout [run_election] expects.
///
/// ```
/// use stv_voting::{Builder, ElectionRules};
/// # use stv_voting::ElectionError;
///
/// let mut builder = Builder::new(&ElectionRules::DEFAULT_RULES)
///     .candidates(&["Anna".to_string(), "Bob".to_string(), "Clara".to_string()])?;
///
/// builder.add_ballot(&[("Anna".to_string(), 1), ("Bob".to_string(), 2)])?;
/// builder.add_ballot(&[("Bob".to_string(), 1)])?;
/// builder.add_ballot(&[("Clara".to_string(), 1), ("Anna".to_string(), 2)])?;
///
/// let result = builder.count()?;
/// # Ok::<(), ElectionError>(())
/// ```
pub struct Builder {
    pub(crate) _rules: ElectionRules,
    pub(crate) _candidates: Vec<String>,
    pub(crate) _ballots: Vec<Ballot>,
}

impl Builder {
    pub fn new(rules: &ElectionRules) -> Builder {
        Builder {
            _rules: rules.clone(),
            _candidates: Vec::new(),
            _ballots: Vec::new(),
        }
    }

    pub fn candidates(self, cands: &[String]) -> Result<Builder, ElectionError> {
        if cands.is_empty() {
            return Err(ElectionError::Configuration(
                "no candidates provided".to_string(),
            ));
        }
        Ok(Builder {
            _rules: self._rules,
            _candidates: cands.to_vec(),
            _ballots: Vec::new(),
        })
    }

    /// Adds one ballot given as (candidate, rank) pairs. Unlisted candidates
    /// get no preference. Unknown names are rejected; formality of the ranks
    /// themselves is judged later by the validator.
    pub fn add_ballot(&mut self, prefs: &[(String, u32)]) -> Result<(), ElectionError> {
        let mut ranks: Vec<Option<u32>> = vec![None; self._candidates.len()];
        for (name, rank) in prefs.iter() {
            let idx = self
                ._candidates
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| {
                    ElectionError::Configuration(format!("unknown candidate: {}", name))
                })?;
            ranks[idx] = Some(*rank);
        }
        self._ballots.push(Ballot::new(ranks));
        Ok(())
    }

    /// Runs the count over everything added so far.
    pub fn count(&self) -> Result<ElectionResult, ElectionError> {
        run_election(&self._ballots, &self._candidates, &self._rules)
    }
}
