//! Minimizing failing cases by editing their choice sequence
//!
//! Each pass rewrites single choices toward their simplest value and keeps a
//! candidate only when it replays to a valid case, still fails, and its
//! recorded choices sort strictly before the current best.

use apiprop_core::Case;

use super::choice::{Choice, ChoiceSequence};
use super::{CaseStrategy, GeneratedCase};

/// Result of [`minimize`].
#[derive(Debug, Clone)]
pub struct Shrunk {
    pub case: GeneratedCase,
    /// Candidates replayed and checked
    pub attempts: u32,
    /// Candidates accepted
    pub improvements: u32,
}

/// Shrink `failing` while `still_fails` holds, replaying at most `budget`
/// candidates.
pub fn minimize<F>(
    strategy: &CaseStrategy,
    failing: GeneratedCase,
    still_fails: F,
    budget: u32,
) -> Shrunk
where
    F: FnMut(&Case) -> bool,
{
    let mut shrinker = Shrinker {
        strategy,
        still_fails,
        best: failing,
        attempts: 0,
        improvements: 0,
        budget,
    };
    loop {
        let before = shrinker.improvements;
        shrinker.flip_coins();
        shrinker.shorten_lengths();
        shrinker.lower_indices();
        shrinker.shrink_integers();
        shrinker.shrink_floats();
        if shrinker.improvements == before || shrinker.exhausted() {
            break;
        }
    }
    tracing::debug!(
        operation = %strategy.operation().id(),
        attempts = shrinker.attempts,
        improvements = shrinker.improvements,
        "shrink finished"
    );
    Shrunk {
        case: shrinker.best,
        attempts: shrinker.attempts,
        improvements: shrinker.improvements,
    }
}

struct Shrinker<'a, F> {
    strategy: &'a CaseStrategy,
    still_fails: F,
    best: GeneratedCase,
    attempts: u32,
    improvements: u32,
    budget: u32,
}

impl<F> Shrinker<'_, F>
where
    F: FnMut(&Case) -> bool,
{
    fn exhausted(&self) -> bool {
        self.attempts >= self.budget
    }

    fn choice(&self, index: usize) -> Option<Choice> {
        self.best.choices.choices().get(index).copied()
    }

    /// Replay `candidate` and keep it if it is simpler and still fails.
    fn try_candidate(&mut self, candidate: ChoiceSequence) -> bool {
        if self.exhausted() || !candidate.is_simpler_than(&self.best.choices) {
            return false;
        }
        self.attempts += 1;
        let Ok(replayed) = self.strategy.replay_as(self.best.kind, &candidate) else {
            return false;
        };
        if !replayed.choices.is_simpler_than(&self.best.choices) {
            return false;
        }
        if !(self.still_fails)(&replayed.case) {
            return false;
        }
        tracing::trace!(case = %replayed.case, "shrink accepted");
        self.best = replayed;
        self.improvements += 1;
        true
    }

    fn try_at(&mut self, index: usize, choice: Choice) -> bool {
        let candidate = self.best.choices.with(index, choice);
        self.try_candidate(candidate)
    }

    fn flip_coins(&mut self) {
        let mut i = 0;
        while i < self.best.choices.len() && !self.exhausted() {
            if let Some(Choice::Coin { value: true }) = self.choice(i) {
                self.try_at(i, Choice::Coin { value: false });
            }
            i += 1;
        }
    }

    fn shorten_lengths(&mut self) {
        let mut i = 0;
        while i < self.best.choices.len() && !self.exhausted() {
            if let Some(Choice::Length { value, min, max }) = self.choice(i) {
                if value > min {
                    self.search(i, min as i128, value as i128, |v| Choice::Length {
                        value: v as usize,
                        min,
                        max,
                    });
                }
            }
            i += 1;
        }
    }

    fn lower_indices(&mut self) {
        let mut i = 0;
        while i < self.best.choices.len() && !self.exhausted() {
            if let Some(Choice::Index { value, len }) = self.choice(i) {
                if value > 0 {
                    self.search(i, 0, value as i128, |v| Choice::Index {
                        value: v as usize,
                        len,
                    });
                }
            }
            i += 1;
        }
    }

    fn shrink_integers(&mut self) {
        let mut i = 0;
        while i < self.best.choices.len() && !self.exhausted() {
            if let Some(choice @ Choice::Integer { value, min, max }) = self.choice(i) {
                if let Choice::Integer { value: target, .. } = choice.simplest() {
                    if value != target {
                        self.search(i, i128::from(target), i128::from(value), |v| {
                            Choice::Integer {
                                value: v as i64,
                                min,
                                max,
                            }
                        });
                    }
                }
            }
            i += 1;
        }
    }

    fn shrink_floats(&mut self) {
        let mut i = 0;
        while i < self.best.choices.len() && !self.exhausted() {
            if let Some(choice @ Choice::Float { value, min, max }) = self.choice(i) {
                let truncated = value.trunc();
                let accepted = truncated != value
                    && self.try_at(
                        i,
                        Choice::Float {
                            value: truncated,
                            min,
                            max,
                        },
                    );
                if !accepted {
                    self.try_at(i, choice.simplest());
                }
            }
            i += 1;
        }
    }

    /// Binary search between `target` (tried first) and the failing `current`
    /// value. Invariant: `lo` is not accepted, `hi` still fails.
    fn search(&mut self, index: usize, target: i128, current: i128, make: impl Fn(i128) -> Choice) {
        if self.try_at(index, make(target)) {
            return;
        }
        let (mut lo, mut hi) = (target, current);
        while (hi - lo).abs() > 1 && !self.exhausted() {
            let mid = lo + (hi - lo) / 2;
            if self.try_at(index, make(mid)) {
                hi = mid;
            } else {
                lo = mid;
            }
        }
    }
}
