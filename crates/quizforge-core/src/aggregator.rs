//! Selection-round ranking and per-candidate consensus.
//!
//! Everything here is a pure function of `(candidates, votes)`. Ranking is
//! always an explicit sort with a total-order tie-break, so the result never
//! depends on map iteration order.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{Candidate, EvaluatorVotes, Verdict, VoteMap};

/// Mean score at or above which a unanimous candidate is approved.
const APPROVE_THRESHOLD: f64 = 8.0;
/// Mean score at or above which a candidate needs revision rather than rejection.
const REVISE_THRESHOLD: f64 = 6.0;
/// How many distinct issues a consensus summary keeps.
const CONSENSUS_ISSUE_LIMIT: usize = 2;

/// Score statistics for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub question_id: String,
    /// Sum of evaluator points, missing points counted as zero.
    pub total_points: f64,
    /// Arithmetic mean of evaluator scores, zero without votes.
    pub mean_score: f64,
    pub vote_count: usize,
}

/// Compute the statistics for one candidate's votes.
pub fn score_candidate(question_id: &str, votes: &EvaluatorVotes) -> CandidateScore {
    // An empty f64 `sum` is -0.0, which `total_cmp` orders below 0.0.
    let total_points = votes
        .values()
        .fold(0.0, |total, v| total + v.points.unwrap_or(0.0));
    let mean_score = if votes.is_empty() {
        0.0
    } else {
        votes.values().map(|v| v.score).sum::<f64>() / votes.len() as f64
    };

    CandidateScore {
        question_id: question_id.to_string(),
        total_points,
        mean_score,
        vote_count: votes.len(),
    }
}

/// Ranking order: points descending, mean score descending, id ascending.
pub fn ranking_order(a: &CandidateScore, b: &CandidateScore) -> Ordering {
    b.total_points
        .total_cmp(&a.total_points)
        .then_with(|| b.mean_score.total_cmp(&a.mean_score))
        .then_with(|| a.question_id.cmp(&b.question_id))
}

/// Rank every candidate that appears in `votes`.
pub fn rank(votes: &VoteMap) -> Vec<CandidateScore> {
    let mut scores: Vec<CandidateScore> = votes
        .iter()
        .map(|(id, evaluator_votes)| score_candidate(id, evaluator_votes))
        .collect();
    scores.sort_by(ranking_order);
    scores
}

/// The top-ranked candidate with at least one vote, or `None` when no
/// candidate has any.
pub fn select_winner(votes: &VoteMap) -> Option<String> {
    rank(votes)
        .into_iter()
        .find(|s| s.vote_count > 0)
        .map(|s| s.question_id)
}

/// Consensus of all evaluators about one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    /// Mean score rounded to one decimal place.
    pub mean_score: f64,
    /// Whether every evaluator returned the same verdict.
    pub solver_agreement: bool,
    pub final_verdict: Verdict,
    /// Distinct issues, first ones only.
    pub combined_issues: Vec<String>,
    pub proposed_fix_hint: Option<String>,
}

/// Summarise one candidate's votes. `None` when nobody voted.
pub fn consensus(votes: &EvaluatorVotes) -> Option<Consensus> {
    if votes.is_empty() {
        return None;
    }

    let mean = votes.values().map(|v| v.score).sum::<f64>() / votes.len() as f64;
    let verdicts: BTreeSet<&str> = votes.values().map(|v| v.verdict.as_str()).collect();
    let solver_agreement = verdicts.len() <= 1;

    let final_verdict = if mean >= APPROVE_THRESHOLD && solver_agreement {
        Verdict::Approve
    } else if mean >= REVISE_THRESHOLD {
        Verdict::NeedsRevision
    } else {
        Verdict::Reject
    };

    let mut combined_issues: Vec<String> = Vec::new();
    for issue in votes.values().flat_map(|v| v.issues.iter()) {
        if combined_issues.len() == CONSENSUS_ISSUE_LIMIT {
            break;
        }
        if !combined_issues.contains(issue) {
            combined_issues.push(issue.clone());
        }
    }

    let proposed_fix_hint = if final_verdict == Verdict::NeedsRevision && !combined_issues.is_empty()
    {
        Some(format!("Consider addressing: {}", combined_issues.join(", ")))
    } else {
        None
    };

    Some(Consensus {
        mean_score: (mean * 10.0).round() / 10.0,
        solver_agreement,
        final_verdict,
        combined_issues,
        proposed_fix_hint,
    })
}

/// One row of a ranked round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    /// 1-based position in the ranking.
    pub position: usize,
    /// Generating engine, unknown for vote keys that are not candidates.
    pub engine: Option<String>,
    pub score: CandidateScore,
    pub consensus: Option<Consensus>,
}

/// Ranked outcome of a selection round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub standings: Vec<Standing>,
    pub winner_id: Option<String>,
    /// Every issue from every vote, not deduplicated.
    pub combined_issues: Vec<String>,
}

impl RoundOutcome {
    pub fn winner(&self) -> Option<&Standing> {
        let winner = self.winner_id.as_deref()?;
        self.standings
            .iter()
            .find(|s| s.score.question_id == winner)
    }
}

/// Question ids in round order: candidates first, then vote-only ids ascending.
fn round_ids<'a>(candidates: &'a [Candidate], votes: &'a VoteMap) -> Vec<&'a str> {
    let mut ids: Vec<&str> = Vec::new();
    for candidate in candidates {
        if !ids.contains(&candidate.question_id.as_str()) {
            ids.push(&candidate.question_id);
        }
    }
    for id in votes.keys() {
        if !ids.contains(&id.as_str()) {
            ids.push(id);
        }
    }
    ids
}

/// Issues from every vote: candidate order, then evaluator order.
pub fn combined_issues(candidates: &[Candidate], votes: &VoteMap) -> Vec<String> {
    round_ids(candidates, votes)
        .into_iter()
        .filter_map(|id| votes.get(id))
        .flat_map(|evaluator_votes| evaluator_votes.values())
        .flat_map(|vote| vote.issues.iter().cloned())
        .collect()
}

/// Rank all candidates of a round and pick the winner.
///
/// Candidates without votes are ranked with zero statistics but can never
/// win; the winner is always a key of `votes`.
pub fn aggregate(candidates: &[Candidate], votes: &VoteMap) -> RoundOutcome {
    let empty = EvaluatorVotes::new();

    let mut scored: Vec<(CandidateScore, Option<Consensus>)> = round_ids(candidates, votes)
        .into_iter()
        .map(|id| {
            let evaluator_votes = votes.get(id).unwrap_or(&empty);
            (score_candidate(id, evaluator_votes), consensus(evaluator_votes))
        })
        .collect();
    scored.sort_by(|(a, _), (b, _)| ranking_order(a, b));

    let standings = scored
        .into_iter()
        .enumerate()
        .map(|(idx, (score, consensus))| Standing {
            position: idx + 1,
            engine: candidates
                .iter()
                .find(|c| c.question_id == score.question_id)
                .map(|c| c.engine.clone()),
            score,
            consensus,
        })
        .collect();

    RoundOutcome {
        standings,
        winner_id: select_winner(votes),
        combined_issues: combined_issues(candidates, votes),
    }
}

/// Present an evaluator confidence.
///
/// Values up to 1 are fractions and render as a percentage; larger values
/// are on an evaluator-specific scale and render with one decimal.
pub fn format_confidence(confidence: f64) -> String {
    if confidence <= 1.0 {
        format!("{:.0}%", confidence * 100.0)
    } else {
        format!("{confidence:.1}")
    }
}
