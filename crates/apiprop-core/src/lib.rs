//! apiprop-core: operation catalog, filters and run bookkeeping
//!
//! Everything here is pure: no network access and no randomness. The runner
//! crate builds on these types to generate, send and check requests.

pub mod case;
pub mod catalog;
pub mod config;
pub mod filter;
pub mod plan;
pub mod report;
pub mod stats;
pub mod verdict;

pub use case::{Case, CaseSnapshot};
pub use catalog::{
    Catalog, CatalogError, Location, Method, Operation, OperationId, Parameter, ResponseSpec,
    SpecVersion, StatusKey,
};
pub use config::{
    AuthConfig, AuthType, Config, ConfigError, GenerationSettings, Phase, Verbosity,
};
pub use filter::{EffectiveFilter, EndpointPattern, FilterError, PartialFilter, Setting, resolve};
pub use plan::{RunPlan, Validation, ValidationStatus};
pub use report::{RunReport, to_http_file};
pub use stats::{FailureSample, OperationStats, Outcome, RunStats, StatsSnapshot};
pub use verdict::{Verdict, VerdictStatus};
