//! Per-operation case generation
//!
//! A [`CaseStrategy`] turns an [`Operation`] into an endless, deterministic
//! stream of [`Case`]s. Every random decision is recorded so any case can be
//! replayed from its [`ChoiceSequence`] and minimized by [`shrink::minimize`].

pub mod choice;
pub mod shrink;
pub mod values;

use std::sync::Arc;

use apiprop_core::case::{encode_component, param_string};
use apiprop_core::catalog::{Location, Operation, OperationId, Parameter};
use apiprop_core::config::GenerationSettings;
use apiprop_core::plan::has_explicit_example;
use apiprop_core::Case;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use choice::{Choice, ChoiceSequence, ChoiceStream};

/// Consecutive rejected draws before an operation is declared unsatisfiable.
pub const MAX_DRAW_ATTEMPTS: u32 = 100;

/// Probability of including an optional parameter.
const OPTIONAL_PARAM_PROBABILITY: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("{operation}: no valid case after {attempts} attempts ({reason})")]
    UnsatisfiableConstraint {
        operation: OperationId,
        attempts: u32,
        reason: String,
    },
    #[error("{operation}: replayed choices do not form a valid case ({reason})")]
    InvalidReplay {
        operation: OperationId,
        reason: String,
    },
}

/// How a case's parameter values relate to their schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    /// Every value conforms
    Valid,
    /// The parameter at this index is just outside its schema
    Boundary(usize),
}

/// A generated case together with the choices that produced it.
#[derive(Debug, Clone)]
pub struct GeneratedCase {
    pub case: Case,
    pub choices: ChoiceSequence,
    pub kind: CaseKind,
}

/// A draw the case builder refused.
#[derive(Debug)]
struct Rejected(String);

pub struct CaseStrategy {
    operation: Arc<Operation>,
}

impl CaseStrategy {
    #[must_use]
    pub fn new(operation: Arc<Operation>) -> Self {
        Self { operation }
    }

    #[must_use]
    pub fn operation(&self) -> &Arc<Operation> {
        &self.operation
    }

    /// Endless cases from `seed`. Same seed, same operation: same cases.
    #[must_use]
    pub fn cases(&self, seed: u64) -> Cases<'_> {
        Cases {
            strategy: self,
            rng: SmallRng::seed_from_u64(seed),
            exhausted: false,
        }
    }

    /// Rebuild a valid case from recorded choices.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::InvalidReplay`] if the replayed values are
    /// rejected (for example an empty path segment).
    pub fn replay(&self, choices: &ChoiceSequence) -> Result<GeneratedCase, GenerationError> {
        self.replay_as(CaseKind::Valid, choices)
    }

    /// Rebuild a case of `kind` from recorded choices.
    ///
    /// # Errors
    ///
    /// See [`CaseStrategy::replay`].
    pub fn replay_as(
        &self,
        kind: CaseKind,
        choices: &ChoiceSequence,
    ) -> Result<GeneratedCase, GenerationError> {
        let mut stream = ChoiceStream::replay(choices);
        match self.build(&mut stream, kind) {
            Ok(case) => Ok(GeneratedCase {
                case,
                choices: stream.finish(),
                kind,
            }),
            Err(Rejected(reason)) => Err(GenerationError::InvalidReplay {
                operation: self.operation.id().clone(),
                reason,
            }),
        }
    }

    /// Case built from declared examples, when some parameter has one and
    /// every required parameter does.
    #[must_use]
    pub fn explicit(&self) -> Option<Case> {
        if !has_explicit_example(&self.operation) {
            return None;
        }
        let mut case = Case::new(self.operation.clone());
        for param in &self.operation.parameters {
            let Some(example) = &param.example else {
                continue;
            };
            if let Err(Rejected(reason)) = place(&mut case, param, example.clone()) {
                tracing::debug!(operation = %self.operation.id(), %reason, "example rejected");
                return None;
            }
        }
        Some(case)
    }

    /// Cases with one parameter just outside its schema and the others drawn
    /// normally, one per parameter and crossing. Cases that cannot be built,
    /// such as an empty path segment, are skipped.
    #[must_use]
    pub fn boundary_cases(&self, seed: u64) -> Vec<GeneratedCase> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut cases = Vec::new();
        for (index, param) in self.operation.parameters.iter().enumerate() {
            let count = values::boundary_count(&param.schema);
            for pick in 0..count {
                let prefix = ChoiceSequence::new(vec![Choice::Index {
                    value: pick,
                    len: count,
                }]);
                let mut stream = ChoiceStream::prefixed(&prefix, rng.r#gen());
                let kind = CaseKind::Boundary(index);
                match self.build(&mut stream, kind) {
                    Ok(case) => cases.push(GeneratedCase {
                        case,
                        choices: stream.finish(),
                        kind,
                    }),
                    Err(Rejected(reason)) => tracing::debug!(
                        operation = %self.operation.id(),
                        %reason,
                        "boundary case skipped"
                    ),
                }
            }
        }
        cases
    }

    /// Number of cases [`CaseStrategy::boundary_cases`] tries.
    #[must_use]
    pub fn boundary_count(&self) -> usize {
        self.operation
            .parameters
            .iter()
            .map(|p| values::boundary_count(&p.schema))
            .sum()
    }

    fn build(&self, stream: &mut ChoiceStream, kind: CaseKind) -> Result<Case, Rejected> {
        // The crossing is the first choice so a boundary case can be seeded
        // with it.
        let crossing = match kind {
            CaseKind::Valid => None,
            CaseKind::Boundary(index) => {
                let param = self.operation.parameters.get(index).ok_or_else(|| {
                    Rejected(format!("operation has no parameter at index {index}"))
                })?;
                Some((index, stream.index(values::boundary_count(&param.schema))))
            }
        };

        let mut case = Case::new(self.operation.clone());
        for (i, param) in self.operation.parameters.iter().enumerate() {
            let value = match crossing {
                Some((index, pick)) if index == i => {
                    values::draw_boundary(&param.schema, pick, stream)
                }
                _ => {
                    if !param.required && !stream.coin(OPTIONAL_PARAM_PROBABILITY) {
                        continue;
                    }
                    values::draw(&param.schema, stream)
                }
            }
            .map_err(|e| Rejected(format!("{}: {e}", param.name)))?;
            place(&mut case, param, value)?;
        }
        Ok(case)
    }
}

/// Put one parameter value into its slot of `case`.
fn place(case: &mut Case, param: &Parameter, value: Value) -> Result<(), Rejected> {
    match param.location {
        Location::Path => {
            let raw = param_string(&value);
            if raw.is_empty() || raw.contains('/') || raw == "." || raw == ".." {
                return Err(Rejected(format!(
                    "{raw:?} is not a valid value for path parameter {}",
                    param.name
                )));
            }
            case.path = case
                .path
                .replace(&format!("{{{}}}", param.name), &encode_component(&raw));
            case.path_parameters.push((param.name.clone(), raw));
        }
        Location::Query => match value {
            Value::Array(items) => {
                for item in items {
                    case.query.push((param.name.clone(), param_string(&item)));
                }
            }
            Value::Null => {}
            other => case.query.push((param.name.clone(), param_string(&other))),
        },
        Location::Header => case.headers.push((param.name.clone(), param_string(&value))),
        Location::Cookie => case.cookies.push((param.name.clone(), param_string(&value))),
        Location::Body => case.body = Some(value),
    }
    Ok(())
}

/// Iterator returned by [`CaseStrategy::cases`].
///
/// Yields at most one [`GenerationError::UnsatisfiableConstraint`], after
/// which it ends.
pub struct Cases<'a> {
    strategy: &'a CaseStrategy,
    rng: SmallRng,
    exhausted: bool,
}

impl Iterator for Cases<'_> {
    type Item = Result<GeneratedCase, GenerationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let mut last_reason = String::new();
        for _ in 0..MAX_DRAW_ATTEMPTS {
            let mut stream = ChoiceStream::random(self.rng.r#gen());
            match self.strategy.build(&mut stream, CaseKind::Valid) {
                Ok(case) => {
                    return Some(Ok(GeneratedCase {
                        case,
                        choices: stream.finish(),
                        kind: CaseKind::Valid,
                    }));
                }
                Err(Rejected(reason)) => last_reason = reason,
            }
        }
        self.exhausted = true;
        Some(Err(GenerationError::UnsatisfiableConstraint {
            operation: self.strategy.operation.id().clone(),
            attempts: MAX_DRAW_ATTEMPTS,
            reason: last_reason,
        }))
    }
}

/// Where per-operation seeds come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedConfig {
    /// One run seed, mixed with each operation's identity
    Seeded(u64),
    /// Seed derived from the operation identity alone
    Derandomized,
}

impl SeedConfig {
    /// Explicit seed, then derandomize, then a fresh random seed (logged so
    /// the run can be replayed).
    #[must_use]
    pub fn from_settings(settings: &GenerationSettings) -> Self {
        if let Some(seed) = settings.seed {
            Self::Seeded(seed)
        } else if settings.derandomize {
            Self::Derandomized
        } else {
            let seed = rand::random();
            tracing::info!(seed, "using random seed");
            Self::Seeded(seed)
        }
    }

    /// The run-wide seed, if there is one.
    #[must_use]
    pub fn run_seed(&self) -> Option<u64> {
        match self {
            Self::Seeded(seed) => Some(*seed),
            Self::Derandomized => None,
        }
    }

    #[must_use]
    pub fn seed_for(&self, operation: &OperationId) -> u64 {
        let identity = fnv1a(operation.as_str().as_bytes());
        match self {
            Self::Seeded(seed) => seed ^ identity,
            Self::Derandomized => identity,
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}
