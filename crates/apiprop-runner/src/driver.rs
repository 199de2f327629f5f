//! Driving a user-supplied test body with generated cases
//!
//! For callers that want generation and shrinking without the HTTP runner:
//! the body decides what a failure is.

use apiprop_core::config::{GenerationSettings, Phase};
use apiprop_core::Case;

use crate::strategy::shrink;
use crate::strategy::{CaseStrategy, GenerationError, SeedConfig};

/// Number of times a test body was invoked. Owned by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounter(u64);

impl CallCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self) {
        self.0 += 1;
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// First failure of a test body, after shrinking.
#[derive(Debug, Clone)]
pub struct BodyFailure {
    /// Message from the original failure
    pub message: String,
    /// Minimal case that still fails
    pub case: Case,
    /// Body invocations so far, shrinking included
    pub calls: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("test body failed on {}: {}", .0.case, .0.message)]
    Failed(BodyFailure),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Call `body` with up to `max_examples` generated cases.
///
/// # Errors
///
/// - [`DriveError::Failed`] on the first `Err` from `body`, with the case
///   minimized when the shrink phase is enabled
/// - [`DriveError::Generation`] if the operation admits no valid case
pub fn drive<F>(
    strategy: &CaseStrategy,
    settings: &GenerationSettings,
    counter: &mut CallCounter,
    mut body: F,
) -> Result<(), DriveError>
where
    F: FnMut(&Case) -> Result<(), String>,
{
    let seed = SeedConfig::from_settings(settings).seed_for(strategy.operation().id());
    let max_examples = usize::try_from(settings.max_examples).unwrap_or(usize::MAX);

    for generated in strategy.cases(seed).take(max_examples) {
        let generated = generated?;
        counter.increment();
        let Err(message) = body(&generated.case) else {
            continue;
        };

        let case = if settings.has_phase(Phase::Shrink) {
            let still_fails = |candidate: &Case| {
                counter.increment();
                body(candidate).is_err()
            };
            shrink::minimize(strategy, generated, still_fails, settings.max_shrinks)
                .case
                .case
        } else {
            generated.case
        };
        return Err(DriveError::Failed(BodyFailure {
            message,
            case,
            calls: counter.get(),
        }));
    }
    Ok(())
}
