//! Recorded random choices
//!
//! Every random decision made while building a case goes through a
//! [`ChoiceStream`]. The stream records each decision together with the bounds
//! it was drawn under, so a case can be rebuilt from its [`ChoiceSequence`] and
//! shrunk by editing that sequence.

use std::cmp::Ordering;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// One recorded decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Choice {
    Integer { value: i64, min: i64, max: i64 },
    Float { value: f64, min: f64, max: f64 },
    /// Collection or string length
    Length { value: usize, min: usize, max: usize },
    /// Position in a list of alternatives (enum member, variant, character)
    Index { value: usize, len: usize },
    Coin { value: bool },
}

impl Choice {
    /// Simplest value under the same bounds.
    #[must_use]
    pub fn simplest(&self) -> Self {
        match *self {
            Self::Integer { min, max, .. } => Self::Integer {
                value: simplest_integer(min, max),
                min,
                max,
            },
            Self::Float { min, max, .. } => Self::Float {
                value: simplest_float(min, max),
                min,
                max,
            },
            Self::Length { min, max, .. } => Self::Length {
                value: min,
                min,
                max,
            },
            Self::Index { len, .. } => Self::Index { value: 0, len },
            Self::Coin { .. } => Self::Coin { value: false },
        }
    }

    /// Distance from the simplest value; smaller is simpler.
    #[must_use]
    pub fn magnitude(&self) -> u64 {
        match *self {
            Self::Integer { value, min, max } => {
                let target = i128::from(simplest_integer(min, max));
                u64::try_from((i128::from(value) - target).unsigned_abs()).unwrap_or(u64::MAX)
            }
            Self::Float { value, min, max } => {
                if value.is_nan() {
                    return u64::MAX;
                }
                // Bit patterns of non-negative floats order like the floats.
                (value - simplest_float(min, max)).abs().to_bits()
            }
            Self::Length { value, min, .. } => value.saturating_sub(min) as u64,
            Self::Index { value, .. } => value as u64,
            Self::Coin { value } => u64::from(value),
        }
    }

    fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

fn simplest_integer(min: i64, max: i64) -> i64 {
    0_i64.clamp(min, max.max(min))
}

fn simplest_float(min: f64, max: f64) -> f64 {
    if min > max { min } else { 0.0_f64.clamp(min, max) }
}

/// Ordered record of the choices that produced one case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoiceSequence(Vec<Choice>);

impl ChoiceSequence {
    #[must_use]
    pub fn new(choices: Vec<Choice>) -> Self {
        Self(choices)
    }

    #[must_use]
    pub fn choices(&self) -> &[Choice] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy with the choice at `index` replaced.
    #[must_use]
    pub fn with(&self, index: usize, choice: Choice) -> Self {
        let mut choices = self.0.clone();
        if let Some(slot) = choices.get_mut(index) {
            *slot = choice;
        }
        Self(choices)
    }

    /// Shortlex order: fewer choices first, then per-choice magnitudes.
    #[must_use]
    pub fn shortlex_cmp(&self, other: &Self) -> Ordering {
        self.0.len().cmp(&other.0.len()).then_with(|| {
            self.0
                .iter()
                .map(Choice::magnitude)
                .cmp(other.0.iter().map(Choice::magnitude))
        })
    }

    #[must_use]
    pub fn is_simpler_than(&self, other: &Self) -> bool {
        self.shortlex_cmp(other) == Ordering::Less
    }
}

/// Largest float magnitude handed out; keeps `max - min` finite.
pub const FLOAT_LIMIT: f64 = f64::MAX / 4.0;

enum Source {
    Random(SmallRng),
    /// Recorded choices first, then random ones when `rest` is set, else the
    /// simplest value
    Replay {
        prefix: Vec<Choice>,
        position: usize,
        rest: Option<SmallRng>,
    },
}

/// Source of decisions for one case, recording everything it hands out.
pub struct ChoiceStream {
    source: Source,
    recorded: Vec<Choice>,
}

impl ChoiceStream {
    #[must_use]
    pub fn random(seed: u64) -> Self {
        Self {
            source: Source::Random(SmallRng::seed_from_u64(seed)),
            recorded: Vec::new(),
        }
    }

    /// Replay `sequence`. Values are clamped into the bounds requested at each
    /// position; a missing or mismatched position yields the simplest value.
    #[must_use]
    pub fn replay(sequence: &ChoiceSequence) -> Self {
        Self {
            source: Source::Replay {
                prefix: sequence.0.clone(),
                position: 0,
                rest: None,
            },
            recorded: Vec::new(),
        }
    }

    /// Replay `prefix`, then continue with random draws from `seed`.
    #[must_use]
    pub fn prefixed(prefix: &ChoiceSequence, seed: u64) -> Self {
        Self {
            source: Source::Replay {
                prefix: prefix.0.clone(),
                position: 0,
                rest: Some(SmallRng::seed_from_u64(seed)),
            },
            recorded: Vec::new(),
        }
    }

    /// Next choice of the kind and bounds in `requested`, drawn by `random`
    /// when the source is random. Callers record the value they hand out.
    fn next(&mut self, requested: Choice, random: impl FnOnce(&mut SmallRng) -> Choice) -> Choice {
        match &mut self.source {
            Source::Random(rng) => random(rng),
            Source::Replay {
                prefix,
                position,
                rest,
            } => match rest {
                Some(rng) if *position >= prefix.len() => random(rng),
                _ => take(prefix, position, &requested),
            },
        }
    }

    /// Integer in `[min, max]`.
    pub fn integer(&mut self, min: i64, max: i64) -> i64 {
        let max = max.max(min);
        let requested = Choice::Integer { value: 0, min, max };
        let choice = self.next(requested, |rng| {
            // One draw in five lands on an edge of the range.
            let value = if rng.gen_bool(0.2) {
                let edges = [
                    min,
                    max,
                    simplest_integer(min, max),
                    1_i64.clamp(min, max),
                    (-1_i64).clamp(min, max),
                ];
                edges[rng.gen_range(0..edges.len())]
            } else {
                rng.gen_range(min..=max)
            };
            Choice::Integer { value, min, max }
        });
        let value = match choice {
            Choice::Integer { value, .. } => value.clamp(min, max),
            _ => simplest_integer(min, max),
        };
        self.recorded.push(Choice::Integer { value, min, max });
        value
    }

    /// Finite float in `[min, max]`, both bounds clamped to
    /// `±FLOAT_LIMIT`.
    pub fn float(&mut self, min: f64, max: f64) -> f64 {
        let min = if min.is_nan() { 0.0 } else { min.clamp(-FLOAT_LIMIT, FLOAT_LIMIT) };
        let max = if max.is_nan() { min } else { max.clamp(-FLOAT_LIMIT, FLOAT_LIMIT) };
        let max = if max < min { min } else { max };
        let requested = Choice::Float {
            value: 0.0,
            min,
            max,
        };
        let choice = self.next(requested, |rng| {
            let value = if min < max { rng.gen_range(min..=max) } else { min };
            Choice::Float { value, min, max }
        });
        let value = match choice {
            Choice::Float { value, .. } if value.is_finite() => value.clamp(min, max),
            _ => simplest_float(min, max),
        };
        self.recorded.push(Choice::Float { value, min, max });
        value
    }

    /// Length in `[min, max]`.
    pub fn length(&mut self, min: usize, max: usize) -> usize {
        let max = max.max(min);
        let requested = Choice::Length {
            value: min,
            min,
            max,
        };
        let choice = self.next(requested, |rng| Choice::Length {
            value: rng.gen_range(min..=max),
            min,
            max,
        });
        let value = match choice {
            Choice::Length { value, .. } => value.clamp(min, max),
            _ => min,
        };
        self.recorded.push(Choice::Length { value, min, max });
        value
    }

    /// Index in `0..len`; a zero `len` is treated as one.
    pub fn index(&mut self, len: usize) -> usize {
        let len = len.max(1);
        let requested = Choice::Index { value: 0, len };
        let choice = self.next(requested, |rng| Choice::Index {
            value: rng.gen_range(0..len),
            len,
        });
        let value = match choice {
            Choice::Index { value, .. } => value.min(len - 1),
            _ => 0,
        };
        self.recorded.push(Choice::Index { value, len });
        value
    }

    /// `true` with probability `p`.
    pub fn coin(&mut self, p: f64) -> bool {
        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        let choice = self.next(Choice::Coin { value: false }, |rng| Choice::Coin {
            value: rng.gen_bool(p),
        });
        let value = matches!(choice, Choice::Coin { value: true });
        self.recorded.push(Choice::Coin { value });
        value
    }

    /// Choices handed out so far.
    #[must_use]
    pub fn finish(self) -> ChoiceSequence {
        ChoiceSequence(self.recorded)
    }
}

/// Next replayed choice, or the simplest form of `requested` when the prefix is
/// exhausted or holds a different kind at this position.
fn take(prefix: &[Choice], position: &mut usize, requested: &Choice) -> Choice {
    let found = prefix.get(*position).copied();
    *position += 1;
    match found {
        Some(choice) if choice.same_kind(requested) => choice,
        _ => requested.simplest(),
    }
}
