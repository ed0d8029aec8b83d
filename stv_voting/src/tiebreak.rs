//! Two-stage deterministic tiebreak for elimination, with an optional seeded
//! random fallback.

use log::debug;

use std::collections::HashSet;

use crate::config::{ElectionError, TiebreakStage, TotalTiePolicy};
use crate::{BallotInternal, CandidateId, RoundId, VoteValue};

/// Everything the resolver needs: the ballots as they stand, the full
/// candidate list (raw preference levels are computed against it), the set
/// still remaining, and the recorded round history.
pub(crate) struct TiebreakContext<'a> {
    pub ballots: &'a [BallotInternal],
    pub all_candidates: &'a [(String, CandidateId)],
    pub active: &'a HashSet<CandidateId>,
    pub history: &'a [Vec<(CandidateId, VoteValue)>],
    pub round: RoundId,
    pub policy: TotalTiePolicy,
}

/// All candidates sharing the minimum total, in the order they appear in the
/// tally. Totals derived from the same arithmetic compare bit-identical, so
/// exact equality is the tie criterion.
pub(crate) fn lowest_candidates(tally: &[(CandidateId, VoteValue)]) -> Vec<CandidateId> {
    let min = tally
        .iter()
        .map(|(_, vv)| vv.0)
        .fold(f64::INFINITY, f64::min);
    tally
        .iter()
        .filter(|(_, vv)| vv.0 == min)
        .map(|(cid, _)| *cid)
        .collect()
}

/// Picks exactly one of the tied candidates for elimination.
///
/// The backward stage always runs first; the raw preference scan only runs
/// if no recorded round separates the tied set.
pub(crate) fn resolve(
    tied: &[CandidateId],
    ctx: &TiebreakContext,
) -> Result<(CandidateId, TiebreakStage), ElectionError> {
    if let Some((loser, round)) = backward_stage(tied, ctx.history) {
        debug!("resolve: history separates the tie at round {}", round);
        return Ok((loser, TiebreakStage::PriorRound { round }));
    }
    if let Some((loser, level)) = preference_stage(tied, ctx) {
        debug!(
            "resolve: raw preferences separate the tie at level {}",
            level
        );
        return Ok((loser, TiebreakStage::RawPreference { level }));
    }
    match ctx.policy {
        TotalTiePolicy::RandomDraw { seed } => {
            let loser = seeded_draw(tied, ctx, seed)?;
            Ok((loser, TiebreakStage::RandomDraw))
        }
        TotalTiePolicy::Fail => {
            let mut names: Vec<String> = Vec::new();
            for cid in tied.iter() {
                names.push(name_of(ctx, *cid)?);
            }
            Err(ElectionError::UnresolvedTie {
                round: ctx.round,
                tied: names,
            })
        }
    }
}

// Scan the recorded history from the most recent round back to round 1. A
// round settles the tie iff exactly one of the tied candidates held the
// strict minimum of the totals recorded there.
fn backward_stage(
    tied: &[CandidateId],
    history: &[Vec<(CandidateId, VoteValue)>],
) -> Option<(CandidateId, RoundId)> {
    for (idx, tally) in history.iter().enumerate().rev() {
        let restricted: Vec<(CandidateId, VoteValue)> = tally
            .iter()
            .filter(|(cid, _)| tied.contains(cid))
            .cloned()
            .collect();
        let lowest = lowest_candidates(&restricted);
        if lowest.len() == 1 {
            return Some((lowest[0], (idx + 1) as RoundId));
        }
    }
    None
}

// Compare the tied candidates on raw (untransferred) preference levels,
// computed against the full candidate list rather than the narrowed
// remaining set. Only the ballots currently sitting on a tied candidate
// take part.
fn preference_stage(tied: &[CandidateId], ctx: &TiebreakContext) -> Option<(CandidateId, u32)> {
    let full_set: HashSet<CandidateId> = ctx.all_candidates.iter().map(|(_, cid)| *cid).collect();
    let active_tied: Vec<&BallotInternal> = ctx
        .ballots
        .iter()
        .filter(|b| {
            b.top_choice(ctx.active)
                .map(|cid| tied.contains(&cid))
                .unwrap_or(false)
        })
        .collect();

    for level in 1..(ctx.all_candidates.len() as u32) {
        let mut totals: Vec<(CandidateId, VoteValue)> =
            tied.iter().map(|cid| (*cid, VoteValue::ZERO)).collect();
        for b in active_tied.iter() {
            if let Some(cid) = b.preferred_candidate(&full_set, level as usize) {
                if let Some(entry) = totals.iter_mut().find(|(c, _)| *c == cid) {
                    entry.1 += b.value();
                }
            }
        }
        debug!("preference_stage: level {}: {:?}", level, totals);
        let lowest = lowest_candidates(&totals);
        if lowest.len() == 1 {
            return Some((lowest[0], level));
        }
    }
    None
}

// A draw that is deterministic per (seed, round) but hard to predict before
// the seed is published: order the tied candidates by the digest of
// seed/round/name and take the first.
fn seeded_draw(
    tied: &[CandidateId],
    ctx: &TiebreakContext,
    seed: u32,
) -> Result<CandidateId, ElectionError> {
    let mut data: Vec<(CandidateId, String)> = Vec::new();
    for cid in tied.iter() {
        let name = name_of(ctx, *cid)?;
        let digest = sha256::digest(format!("{:08}{:08}{}", seed, ctx.round, name));
        data.push((*cid, digest));
    }
    data.sort_by(|a, b| a.1.cmp(&b.1));
    data.first().map(|(cid, _)| *cid).ok_or_else(|| {
        ElectionError::InvariantViolation("random draw invoked with an empty tied set".to_string())
    })
}

fn name_of(ctx: &TiebreakContext, cid: CandidateId) -> Result<String, ElectionError> {
    ctx.all_candidates
        .iter()
        .find(|(_, c)| *c == cid)
        .map(|(n, _)| n.clone())
        .ok_or_else(|| {
            ElectionError::InvariantViolation(format!("unknown candidate id {:?}", cid))
        })
}
