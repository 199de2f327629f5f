//! apiprop-runner: case generation, shrinking and HTTP execution

pub mod checks;
pub mod driver;
pub mod loader;
pub mod runner;
pub mod strategy;
pub mod transport;

pub use checks::{Check, CheckFailure, CheckSet, Response, UnknownCheck};
pub use driver::{BodyFailure, CallCounter, DriveError, drive};
pub use loader::{LoadError, SchemaSource, load, load_document};
pub use runner::{CancelToken, RunState, Runner, RunnerConfig, plan};
pub use strategy::{CaseKind, CaseStrategy, GeneratedCase, GenerationError, SeedConfig};
pub use transport::{HttpTransport, Request, Transport, TransportError};
