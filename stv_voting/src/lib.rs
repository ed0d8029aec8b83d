mod config;
mod tiebreak;
use log::{debug, info};

use std::{
    collections::HashSet,
    iter::Sum,
    ops::{Add, AddAssign, Mul},
};

pub use crate::builder::Builder;
pub use crate::config::*;

pub mod builder;

// **** Private structures ****

type RoundId = u32;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub(crate) struct CandidateId(pub(crate) u32);

/// The worth of a ballot. Starts at one full vote and only ever shrinks as
/// surpluses are transferred.
#[derive(PartialEq, PartialOrd, Debug, Clone, Copy)]
pub(crate) struct VoteValue(pub(crate) f64);

impl VoteValue {
    pub(crate) const ZERO: VoteValue = VoteValue(0.0);
    const FULL: VoteValue = VoteValue(1.0);
}

impl Sum for VoteValue {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        VoteValue(iter.map(|vv| vv.0).sum())
    }
}

impl AddAssign for VoteValue {
    fn add_assign(&mut self, rhs: VoteValue) {
        self.0 += rhs.0;
    }
}

impl Add for VoteValue {
    type Output = VoteValue;
    fn add(self: VoteValue, rhs: VoteValue) -> VoteValue {
        VoteValue(self.0 + rhs.0)
    }
}

impl Mul<f64> for VoteValue {
    type Output = VoteValue;
    fn mul(self, rhs: f64) -> VoteValue {
        VoteValue(self.0 * rhs)
    }
}

/// A formal ballot. The preferences are fixed at validation time; only the
/// value changes afterwards, when a surplus gets transferred.
#[derive(PartialEq, Debug, Clone)]
pub(crate) struct BallotInternal {
    // (candidate, raw rank), sorted by ascending rank. Ranks are unique
    // within one ballot after validation, so this order is total.
    prefs: Vec<(CandidateId, u32)>,
    value: VoteValue,
}

impl BallotInternal {
    /// The candidate this ballot ranks at `level` (1-based) once the
    /// preferences are restricted to `active`. Ranks are re-derived relative
    /// to the active subset: if A=1, B=2, C=3 and B is gone, C sits at
    /// level 2. Returns `None` if fewer than `level` active candidates are
    /// ranked.
    pub(crate) fn preferred_candidate(
        &self,
        active: &HashSet<CandidateId>,
        level: usize,
    ) -> Option<CandidateId> {
        debug_assert!(level >= 1);
        self.prefs
            .iter()
            .filter(|(cid, _)| active.contains(cid))
            .nth(level - 1)
            .map(|(cid, _)| *cid)
    }

    /// The candidate this ballot currently counts towards, if any.
    pub(crate) fn top_choice(&self, active: &HashSet<CandidateId>) -> Option<CandidateId> {
        self.preferred_candidate(active, 1)
    }

    pub(crate) fn value(&self) -> VoteValue {
        self.value
    }
}

// One round of the audit trail, in internal ids. Entries are created once per
// round and never mutated afterwards.
#[derive(PartialEq, Debug, Clone)]
struct RoundInternal {
    // Totals for the candidates remaining at the start of the round, in
    // input column order.
    tally: Vec<(CandidateId, VoteValue)>,
    elected: Vec<CandidateId>,
    eliminated: Option<CandidateId>,
    tiebreak: Option<(Vec<CandidateId>, TiebreakStage)>,
}

/// Filters out informal ballots and freezes the surviving ones.
///
/// A row is informal iff it ranks nobody, has no rank 1, or its ranks sorted
/// are not exactly `1..k`. The check runs once; the counting loop relies on
/// rank uniqueness afterwards.
fn validate_ballots(
    rows: &[Ballot],
    num_candidates: usize,
) -> Result<(Vec<BallotInternal>, u64), ElectionError> {
    let mut formal: Vec<BallotInternal> = Vec::new();
    let mut discarded: u64 = 0;
    for (idx, row) in rows.iter().enumerate() {
        if row.ranks.len() != num_candidates {
            return Err(ElectionError::Configuration(format!(
                "ballot {} has {} columns, expected {}",
                idx,
                row.ranks.len(),
                num_candidates
            )));
        }
        let mut prefs: Vec<(CandidateId, u32)> = row
            .ranks
            .iter()
            .enumerate()
            .filter_map(|(col, r)| r.map(|rank| (CandidateId((col + 1) as u32), rank)))
            .collect();
        prefs.sort_by_key(|(_, rank)| *rank);
        let sequential = prefs
            .iter()
            .enumerate()
            .all(|(i, (_, rank))| *rank == (i + 1) as u32);
        if prefs.is_empty() || !sequential {
            debug!(
                "validate_ballots: discarding informal ballot {}: {:?}",
                idx, row
            );
            discarded += 1;
            continue;
        }
        formal.push(BallotInternal {
            prefs,
            value: VoteValue::FULL,
        });
    }
    Ok((formal, discarded))
}

fn lookup_total(
    tally: &[(CandidateId, VoteValue)],
    cid: CandidateId,
) -> Result<VoteValue, ElectionError> {
    tally
        .iter()
        .find(|(c, _)| *c == cid)
        .map(|(_, vv)| *vv)
        .ok_or_else(|| {
            ElectionError::InvariantViolation(format!("candidate {:?} missing from tally", cid))
        })
}

// Totals in input column order for the remaining candidates. A pure function
// of the ballot values and the active set.
fn compute_tally(
    ballots: &[BallotInternal],
    remaining: &[(String, CandidateId)],
    active: &HashSet<CandidateId>,
) -> Vec<(CandidateId, VoteValue)> {
    let mut tally: Vec<(CandidateId, VoteValue)> = remaining
        .iter()
        .map(|(_, cid)| (*cid, VoteValue::ZERO))
        .collect();
    for b in ballots.iter() {
        if let Some(cid) = b.top_choice(active) {
            if let Some(entry) = tally.iter_mut().find(|(c, _)| *c == cid) {
                entry.1 += b.value;
            }
        }
    }
    tally
}

/// Runs the Single Transferable Vote count for one role.
///
/// Arguments:
/// * `ballots` the normalized rank table, one row per ballot. Columns follow
///   `candidates`.
/// * `candidates` the candidate names, in input column order. That order is
///   also the bookkeeping tie-break for simultaneous elections.
/// * `rules` seats, exclusions and the total-tie policy.
pub fn run_election(
    ballots: &[Ballot],
    candidates: &[String],
    rules: &ElectionRules,
) -> Result<ElectionResult, ElectionError> {
    info!(
        "run_election: {} ballots, candidates: {:?}, rules: {:?}",
        ballots.len(),
        candidates,
        rules
    );
    if candidates.is_empty() {
        return Err(ElectionError::Configuration(
            "no candidates provided".to_string(),
        ));
    }
    {
        let mut seen: HashSet<&String> = HashSet::new();
        for name in candidates.iter() {
            if !seen.insert(name) {
                return Err(ElectionError::Configuration(format!(
                    "duplicate candidate name: {}",
                    name
                )));
            }
        }
    }
    for name in rules.excluded.iter() {
        if !candidates.contains(name) {
            return Err(ElectionError::Configuration(format!(
                "excluded candidate {} is not in the candidate list",
                name
            )));
        }
    }

    // Formality is judged on the table as voted; the excluded columns are
    // dropped afterwards, so a ballot whose top choice withdrew slides to its
    // next preference instead of becoming informal.
    let all_candidates: Vec<(String, CandidateId)> = candidates
        .iter()
        .enumerate()
        .filter(|(_, name)| !rules.excluded.contains(name))
        .map(|(idx, name)| (name.clone(), CandidateId((idx + 1) as u32)))
        .collect();
    let kept_ids: HashSet<CandidateId> = all_candidates.iter().map(|(_, cid)| *cid).collect();

    if rules.seats < 1 {
        return Err(ElectionError::Configuration(
            "at least one seat is required".to_string(),
        ));
    }
    if rules.seats as usize >= all_candidates.len() {
        return Err(ElectionError::Configuration(format!(
            "{} seats requested but only {} candidates are running",
            rules.seats,
            all_candidates.len()
        )));
    }

    let (mut cur_ballots, discarded) = {
        let (mut formal, discarded) = validate_ballots(ballots, candidates.len())?;
        // Drop the excluded candidates from the surviving ballots too. A
        // ballot emptied this way stays in the set: it still counts towards
        // the quota, it just never reaches a tally.
        for b in formal.iter_mut() {
            b.prefs.retain(|(cid, _)| kept_ids.contains(cid));
        }
        (formal, discarded)
    };
    info!(
        "run_election: {} formal ballots, {} informal discarded",
        cur_ballots.len(),
        discarded
    );
    for (name, cid) in all_candidates.iter() {
        info!("Candidate: {}: {}", cid.0, name);
    }

    // Droop quota. Computed exactly once, never revised mid-election.
    let quota = (cur_ballots.len() as f64 / (rules.seats as f64 + 1.0)).floor() + 1.0;
    info!("run_election: quota: {}", quota);

    let mut remaining: Vec<(String, CandidateId)> = all_candidates.clone();
    let mut winners: Vec<CandidateId> = Vec::new();
    let mut rounds: Vec<RoundInternal> = Vec::new();
    let mut done = false;

    // Every round removes at least one candidate, so the loop is bounded by
    // the candidate count.
    for round_id in 1..=(all_candidates.len() as RoundId) {
        if done || remaining.is_empty() {
            break;
        }
        info!("Round {}: remaining: {:?}", round_id, remaining);
        let active: HashSet<CandidateId> = remaining.iter().map(|(_, cid)| *cid).collect();
        let tally = compute_tally(&cur_ballots, &remaining, &active);
        debug!("Round {}: tally: {:?}", round_id, tally);

        let mut round = RoundInternal {
            tally: tally.clone(),
            elected: Vec::new(),
            eliminated: None,
            tiebreak: None,
        };

        // All quota reachers are elected this round, in column order.
        let elected_now: Vec<CandidateId> = tally
            .iter()
            .filter_map(|(cid, vv)| if vv.0 >= quota { Some(*cid) } else { None })
            .collect();

        if !elected_now.is_empty() {
            let open_seats = rules.seats as usize - winners.len();
            if elected_now.len() > open_seats {
                return Err(ElectionError::InvariantViolation(format!(
                    "round {}: {} candidates reached quota with {} seats open",
                    round_id,
                    elected_now.len(),
                    open_seats
                )));
            }
            winners.extend(elected_now.iter().cloned());
            round.elected = elected_now.clone();
            for cid in elected_now.iter() {
                info!("Round {}: {:?} elected", round_id, cid);
            }
            if winners.len() == rules.seats as usize {
                rounds.push(round);
                break;
            }
            // Seats still open: scale down the ballots sitting on each new
            // winner by the surplus fraction, then retire the winner.
            for cid in elected_now.iter() {
                let total = lookup_total(&tally, *cid)?;
                let transfer_value = (total.0 - quota) / total.0;
                debug!(
                    "Round {}: transferring surplus of {:?} at value {}",
                    round_id, cid, transfer_value
                );
                for b in cur_ballots.iter_mut() {
                    if b.top_choice(&active) == Some(*cid) {
                        b.value = b.value * transfer_value;
                    }
                }
            }
            remaining.retain(|(_, cid)| !elected_now.contains(cid));
        }

        // Elimination: lowest total among the candidates still remaining,
        // judged on this round's recorded totals.
        let lowest = {
            let still: Vec<(CandidateId, VoteValue)> = tally
                .iter()
                .filter(|(cid, _)| remaining.iter().any(|(_, c)| c == cid))
                .cloned()
                .collect();
            tiebreak::lowest_candidates(&still)
        };
        if lowest.is_empty() {
            return Err(ElectionError::InvariantViolation(format!(
                "round {}: no elimination candidate found",
                round_id
            )));
        }
        let eliminated = if lowest.len() == 1 {
            lowest[0]
        } else {
            info!("Round {}: tiebreak between {:?}", round_id, lowest);
            let history: Vec<Vec<(CandidateId, VoteValue)>> = rounds
                .iter()
                .map(|r| r.tally.clone())
                .chain([tally.clone()])
                .collect();
            // Candidates elected this round are gone from the active set, so
            // the ballots sitting on them take part with their transferred
            // value.
            let still_active: HashSet<CandidateId> =
                remaining.iter().map(|(_, cid)| *cid).collect();
            let ctx = tiebreak::TiebreakContext {
                ballots: &cur_ballots,
                all_candidates: &all_candidates,
                active: &still_active,
                history: &history,
                round: round_id,
                policy: rules.total_tie_policy,
            };
            let (loser, stage) = tiebreak::resolve(&lowest, &ctx)?;
            info!(
                "Round {}: tiebreak resolved by {:?}: {:?} eliminated",
                round_id, stage, loser
            );
            round.tiebreak = Some((lowest.clone(), stage));
            loser
        };
        info!("Round {}: {:?} eliminated", round_id, eliminated);
        round.eliminated = Some(eliminated);
        remaining.retain(|(_, cid)| *cid != eliminated);

        // The open seats may now be coverable by whoever is left.
        let open_seats = rules.seats as usize - winners.len();
        if !remaining.is_empty() && remaining.len() == open_seats {
            for (name, cid) in remaining.iter() {
                info!("Round {}: {} elected by default", round_id, name);
                winners.push(*cid);
                round.elected.push(*cid);
            }
            remaining.clear();
            done = true;
        }
        rounds.push(round);
    }

    if winners.len() != rules.seats as usize {
        return Err(ElectionError::InvariantViolation(format!(
            "count terminated with {} winners for {} seats",
            winners.len(),
            rules.seats
        )));
    }

    let name_of = |cid: CandidateId| -> Result<String, ElectionError> {
        all_candidates
            .iter()
            .find(|(_, c)| *c == cid)
            .map(|(n, _)| n.clone())
            .ok_or_else(|| {
                ElectionError::InvariantViolation(format!("unknown candidate id {:?}", cid))
            })
    };

    let mut round_stats: Vec<RoundStats> = Vec::new();
    for (idx, r) in rounds.iter().enumerate() {
        let mut rs = RoundStats {
            round: (idx + 1) as RoundId,
            tally: Vec::new(),
            elected: Vec::new(),
            eliminated: None,
            tiebreak: None,
        };
        for (cid, vv) in r.tally.iter() {
            rs.tally.push((name_of(*cid)?, vv.0));
        }
        for cid in r.elected.iter() {
            rs.elected.push(name_of(*cid)?);
        }
        if let Some(cid) = r.eliminated {
            rs.eliminated = Some(name_of(cid)?);
        }
        if let Some((tied, stage)) = &r.tiebreak {
            let mut names: Vec<String> = Vec::new();
            for cid in tied.iter() {
                names.push(name_of(*cid)?);
            }
            rs.tiebreak = Some(TiebreakStats {
                tied: names,
                stage: *stage,
            });
        }
        round_stats.push(rs);
    }

    let mut winner_names: Vec<String> = Vec::new();
    for cid in winners.iter() {
        winner_names.push(name_of(*cid)?);
    }
    info!("run_election: winners: {:?}", winner_names);

    Ok(ElectionResult {
        winners: winner_names,
        quota,
        informal_ballots: discarded,
        round_stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(ranks: &[Option<u32>]) -> Ballot {
        Ballot::new(ranks.to_vec())
    }

    fn names(ns: &[&str]) -> Vec<String> {
        ns.iter().map(|s| s.to_string()).collect()
    }

    fn rules(seats: u32) -> ElectionRules {
        ElectionRules {
            seats,
            excluded: vec![],
            total_tie_policy: TotalTiePolicy::Fail,
        }
    }

    #[test]
    fn preferred_candidate_reranks_against_active_subset() {
        // A=1, B=2, C=3 with B eliminated: A is level 1, C is level 2.
        let ballot = BallotInternal {
            prefs: vec![
                (CandidateId(1), 1),
                (CandidateId(2), 2),
                (CandidateId(3), 3),
            ],
            value: VoteValue::FULL,
        };
        let active: HashSet<CandidateId> =
            [CandidateId(1), CandidateId(3)].iter().cloned().collect();
        assert_eq!(ballot.preferred_candidate(&active, 1), Some(CandidateId(1)));
        assert_eq!(ballot.preferred_candidate(&active, 2), Some(CandidateId(3)));
        assert_eq!(ballot.preferred_candidate(&active, 3), None);
    }

    #[test]
    fn validator_discards_informal_ballots() {
        let rows = vec![
            b(&[Some(1), Some(2), Some(3)]), // formal
            b(&[Some(1), None, None]),       // formal, partial
            b(&[None, None, None]),          // empty
            b(&[None, Some(2), Some(3)]),    // no first preference
            b(&[Some(1), Some(1), None]),    // duplicate rank
            b(&[Some(1), Some(3), None]),    // gap
        ];
        let (formal, discarded) = validate_ballots(&rows, 3).unwrap();
        assert_eq!(formal.len(), 2);
        assert_eq!(discarded, 4);
    }

    #[test]
    fn validator_rejects_misshapen_rows() {
        let rows = vec![b(&[Some(1), Some(2)])];
        let res = validate_ballots(&rows, 3);
        assert!(matches!(res, Err(ElectionError::Configuration(_))));
    }

    // The worked single-seat example: quota 3, C eliminated in round 1, the
    // transferred ballot pushes A over quota in round 2.
    #[test]
    fn single_seat_transfer_example() {
        let candidates = names(&["A", "B", "C"]);
        let ballots = vec![
            b(&[Some(1), Some(2), Some(3)]),
            b(&[Some(1), Some(2), Some(3)]),
            b(&[Some(2), Some(1), Some(3)]),
            b(&[Some(2), Some(1), Some(3)]),
            b(&[Some(2), Some(3), Some(1)]),
        ];
        let res = run_election(&ballots, &candidates, &rules(1)).unwrap();
        assert_eq!(res.quota, 3.0);
        assert_eq!(res.informal_ballots, 0);
        assert_eq!(res.winners, vec!["A".to_string()]);
        assert_eq!(res.round_stats.len(), 2);

        let r1 = &res.round_stats[0];
        assert_eq!(
            r1.tally,
            vec![
                ("A".to_string(), 2.0),
                ("B".to_string(), 2.0),
                ("C".to_string(), 1.0)
            ]
        );
        assert_eq!(r1.eliminated, Some("C".to_string()));
        assert!(r1.tiebreak.is_none());

        let r2 = &res.round_stats[1];
        assert_eq!(
            r2.tally,
            vec![("A".to_string(), 3.0), ("B".to_string(), 2.0)]
        );
        assert_eq!(r2.elected, vec!["A".to_string()]);
    }

    #[test]
    fn informal_ballots_never_reach_the_tally() {
        let candidates = names(&["A", "B", "C"]);
        let ballots = vec![
            b(&[Some(1), Some(2), None]),
            b(&[Some(1), None, Some(1)]), // duplicate rank, informal
            b(&[None, Some(1), None]),
        ];
        let res = run_election(&ballots, &candidates, &rules(1)).unwrap();
        assert_eq!(res.informal_ballots, 1);
        // Quota over the 2 formal ballots only.
        assert_eq!(res.quota, 2.0);
        let total: f64 = res.round_stats[0].tally.iter().map(|(_, v)| v).sum();
        assert_eq!(total, 2.0);
    }

    #[test]
    fn surplus_transfer_scales_values_in_later_rounds() {
        // Seats: 2. A is elected outright in round 1 with a surplus of 2
        // over 8 ballots, so each A ballot continues at value 0.25 towards C.
        let candidates = names(&["A", "B", "C", "D"]);
        let mut ballots: Vec<Ballot> = Vec::new();
        for _ in 0..8 {
            ballots.push(b(&[Some(1), None, Some(2), None]));
        }
        for _ in 0..4 {
            ballots.push(b(&[None, Some(1), None, None]));
        }
        for _ in 0..3 {
            ballots.push(b(&[None, None, Some(1), None]));
        }
        ballots.push(b(&[None, None, None, Some(1)]));

        let res = run_election(&ballots, &candidates, &rules(2)).unwrap();
        // N = 16, quota = floor(16/3) + 1 = 6.
        assert_eq!(res.quota, 6.0);

        let r1 = &res.round_stats[0];
        assert_eq!(r1.elected, vec!["A".to_string()]);
        assert_eq!(r1.eliminated, Some("D".to_string()));

        // Round 2: C carries 3 full votes plus 8 quarter votes.
        let r2 = &res.round_stats[1];
        assert_eq!(
            r2.tally,
            vec![("B".to_string(), 4.0), ("C".to_string(), 5.0)]
        );
        assert_eq!(r2.eliminated, Some("B".to_string()));
        // C is the last candidate standing for the last open seat.
        assert_eq!(res.winners, names(&["A", "C"]));
    }

    #[test]
    fn remaining_candidates_fill_open_seats_by_default() {
        // Seats: 2, quota 3. A elected in round 1, C eliminated on round-1
        // totals, B takes the open seat without reaching quota.
        let candidates = names(&["A", "B", "C"]);
        let mut ballots: Vec<Ballot> = Vec::new();
        for _ in 0..4 {
            ballots.push(b(&[Some(1), Some(2), None]));
        }
        for _ in 0..2 {
            ballots.push(b(&[None, Some(1), None]));
        }
        ballots.push(b(&[None, None, Some(1)]));

        let res = run_election(&ballots, &candidates, &rules(2)).unwrap();
        assert_eq!(res.quota, 3.0);
        assert_eq!(res.round_stats.len(), 1);
        let r1 = &res.round_stats[0];
        assert_eq!(r1.eliminated, Some("C".to_string()));
        assert_eq!(r1.elected, names(&["A", "B"]));
        assert_eq!(res.winners, names(&["A", "B"]));
    }

    // Two ties in one election: the first is separated by the raw preference
    // scan, the second by the recorded history of round 1.
    #[test]
    fn tiebreak_stages_are_recorded_in_the_audit_trail() {
        let candidates = names(&["A", "B", "C", "D"]);
        let mut ballots: Vec<Ballot> = Vec::new();
        for _ in 0..4 {
            ballots.push(b(&[Some(1), None, None, None]));
        }
        for _ in 0..3 {
            ballots.push(b(&[None, Some(1), None, None]));
        }
        for _ in 0..2 {
            // C first, D second, A third.
            ballots.push(b(&[Some(3), None, Some(1), Some(2)]));
        }
        for _ in 0..2 {
            // D first, A second.
            ballots.push(b(&[Some(2), None, None, Some(1)]));
        }

        let res = run_election(&ballots, &candidates, &rules(1)).unwrap();
        // N = 11, quota = floor(11/2) + 1 = 6.
        assert_eq!(res.quota, 6.0);
        assert_eq!(res.round_stats.len(), 3);

        // Round 1: C and D tied at 2. History cannot separate them (there is
        // only this round), the raw preference scan finds D ahead at level 2.
        let r1 = &res.round_stats[0];
        assert_eq!(r1.eliminated, Some("C".to_string()));
        let tb1 = r1.tiebreak.as_ref().unwrap();
        assert_eq!(tb1.tied, names(&["C", "D"]));
        assert_eq!(tb1.stage, TiebreakStage::RawPreference { level: 2 });

        // Round 2: B is the unique minimum, no tiebreak involved.
        let r2 = &res.round_stats[1];
        assert_eq!(r2.eliminated, Some("B".to_string()));
        assert!(r2.tiebreak.is_none());

        // Round 3: A and D tied at 4, but round 1 recorded D below A. The
        // backward stage settles it, so the preference scan must not run.
        let r3 = &res.round_stats[2];
        assert_eq!(r3.eliminated, Some("D".to_string()));
        let tb3 = r3.tiebreak.as_ref().unwrap();
        assert_eq!(tb3.tied, names(&["A", "D"]));
        assert_eq!(tb3.stage, TiebreakStage::PriorRound { round: 1 });

        assert_eq!(res.winners, vec!["A".to_string()]);
    }

    #[test]
    fn total_tie_fails_without_random_policy() {
        let candidates = names(&["A", "B"]);
        let ballots = vec![b(&[Some(1), None]), b(&[None, Some(1)])];
        let res = run_election(&ballots, &candidates, &rules(1));
        match res {
            Err(ElectionError::UnresolvedTie { round, tied }) => {
                assert_eq!(round, 1);
                assert_eq!(tied, names(&["A", "B"]));
            }
            other => panic!("expected an unresolved tie, got {:?}", other),
        }
    }

    #[test]
    fn total_tie_with_seed_is_reproducible() {
        let candidates = names(&["A", "B"]);
        let ballots = vec![b(&[Some(1), None]), b(&[None, Some(1)])];
        let seeded = ElectionRules {
            seats: 1,
            excluded: vec![],
            total_tie_policy: TotalTiePolicy::RandomDraw { seed: 42 },
        };
        let res1 = run_election(&ballots, &candidates, &seeded).unwrap();
        let res2 = run_election(&ballots, &candidates, &seeded).unwrap();
        assert_eq!(res1, res2);
        assert_eq!(res1.winners.len(), 1);
        let tb = res1.round_stats[0].tiebreak.as_ref().unwrap();
        assert_eq!(tb.stage, TiebreakStage::RandomDraw);
    }

    #[test]
    fn excluded_candidates_are_removed_before_counting() {
        let candidates = names(&["A", "B", "C"]);
        let ballots = vec![
            b(&[Some(1), Some(2), None]),
            b(&[Some(1), Some(2), None]),
            b(&[None, Some(2), Some(1)]),
        ];
        let r = ElectionRules {
            seats: 1,
            excluded: vec!["A".to_string()],
            total_tie_policy: TotalTiePolicy::Fail,
        };
        let res = run_election(&ballots, &candidates, &r).unwrap();
        // With the A column gone the B=2 ranks have no rank 1 ahead of them
        // anymore; the two A-first ballots keep counting for B at level 1.
        assert_eq!(res.winners, vec!["B".to_string()]);
        for rs in res.round_stats.iter() {
            assert!(rs.tally.iter().all(|(name, _)| name != "A"));
        }
    }

    #[test]
    fn exhausted_ballots_still_count_towards_the_quota() {
        let candidates = names(&["A", "B", "C"]);
        let mut ballots: Vec<Ballot> = Vec::new();
        for _ in 0..3 {
            ballots.push(b(&[Some(1), None, None]));
        }
        for _ in 0..2 {
            ballots.push(b(&[None, Some(1), None]));
        }
        // Formal, but only ranks the withdrawn candidate.
        ballots.push(b(&[None, None, Some(1)]));
        let r = ElectionRules {
            seats: 1,
            excluded: vec!["C".to_string()],
            total_tie_policy: TotalTiePolicy::Fail,
        };
        let res = run_election(&ballots, &candidates, &r).unwrap();
        // All 6 formal ballots set the quota, exhausted or not.
        assert_eq!(res.quota, 4.0);
        assert_eq!(res.informal_ballots, 0);
        // The exhausted ballot contributes nothing to any tally.
        let total: f64 = res.round_stats[0].tally.iter().map(|(_, v)| v).sum();
        assert_eq!(total, 5.0);
        assert_eq!(res.winners, vec!["A".to_string()]);
    }

    #[test]
    fn transferred_ballots_take_part_in_same_round_tiebreaks() {
        // Seats: 2. A is elected in round 1; the eight A ballots continue
        // towards B at value 0.375 and must weigh in on the B/C tie.
        let candidates = names(&["A", "B", "C"]);
        let mut ballots: Vec<Ballot> = Vec::new();
        for _ in 0..8 {
            ballots.push(b(&[Some(1), Some(2), None]));
        }
        for _ in 0..2 {
            ballots.push(b(&[None, Some(1), Some(2)]));
        }
        for _ in 0..2 {
            ballots.push(b(&[None, None, Some(1)]));
        }
        let res = run_election(&ballots, &candidates, &rules(2)).unwrap();
        // N = 12, quota = floor(12/3) + 1 = 5.
        assert_eq!(res.quota, 5.0);
        assert_eq!(res.round_stats.len(), 1);
        let r1 = &res.round_stats[0];
        let tb = r1.tiebreak.as_ref().unwrap();
        assert_eq!(tb.tied, names(&["B", "C"]));
        // At level 2 the A ballots put 3.0 behind B, leaving C the unique
        // minimum.
        assert_eq!(tb.stage, TiebreakStage::RawPreference { level: 2 });
        assert_eq!(r1.eliminated, Some("C".to_string()));
        assert_eq!(r1.elected, names(&["A", "B"]));
        assert_eq!(res.winners, names(&["A", "B"]));
    }

    #[test]
    fn configuration_errors_are_fatal() {
        let candidates = names(&["A", "B"]);
        let ballots = vec![b(&[Some(1), Some(2)])];
        // As many seats as candidates.
        assert!(matches!(
            run_election(&ballots, &candidates, &rules(2)),
            Err(ElectionError::Configuration(_))
        ));
        // Unknown excluded candidate.
        let r = ElectionRules {
            seats: 1,
            excluded: vec!["Z".to_string()],
            total_tie_policy: TotalTiePolicy::Fail,
        };
        assert!(matches!(
            run_election(&ballots, &candidates, &r),
            Err(ElectionError::Configuration(_))
        ));
    }

    #[test]
    fn tallies_are_idempotent_across_runs() {
        let candidates = names(&["A", "B", "C"]);
        let ballots = vec![
            b(&[Some(1), Some(2), Some(3)]),
            b(&[Some(2), Some(1), Some(3)]),
            b(&[Some(3), Some(2), Some(1)]),
            b(&[Some(1), Some(3), Some(2)]),
            b(&[Some(2), Some(3), Some(1)]),
        ];
        let res1 = run_election(&ballots, &candidates, &rules(1)).unwrap();
        let res2 = run_election(&ballots, &candidates, &rules(1)).unwrap();
        assert_eq!(res1, res2);
    }

    #[test]
    fn remaining_value_never_increases_between_rounds() {
        let candidates = names(&["A", "B", "C", "D"]);
        let mut ballots: Vec<Ballot> = Vec::new();
        for _ in 0..8 {
            ballots.push(b(&[Some(1), Some(3), Some(2), None]));
        }
        for _ in 0..4 {
            ballots.push(b(&[None, Some(1), None, Some(2)]));
        }
        for _ in 0..3 {
            ballots.push(b(&[None, None, Some(1), None]));
        }
        ballots.push(b(&[None, None, None, Some(1)]));
        let res = run_election(&ballots, &candidates, &rules(2)).unwrap();
        let sums: Vec<f64> = res
            .round_stats
            .iter()
            .map(|rs| rs.tally.iter().map(|(_, v)| v).sum())
            .collect();
        for w in sums.windows(2) {
            assert!(
                w[1] <= w[0] + 1e-9,
                "totals grew between rounds: {:?}",
                sums
            );
        }
        assert!(res.winners.len() <= 2);
        assert!(res.round_stats.len() <= candidates.len());
    }
}
