//! Run loop: generate, dispatch, check, shrink, record
//!
//! Strictly sequential. One operation runs to completion before the next, and
//! one case is dispatched, checked and recorded before the next is generated.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use apiprop_core::catalog::{Catalog, Operation};
use apiprop_core::config::{Config, GenerationSettings, Phase};
use apiprop_core::filter::EffectiveFilter;
use apiprop_core::plan::RunPlan;
use apiprop_core::stats::{Outcome, RunStats};
use apiprop_core::Case;

use crate::checks::{CheckFailure, CheckSet, Response};
use crate::strategy::shrink;
use crate::strategy::{CaseStrategy, GeneratedCase, SeedConfig};
use crate::transport::{Request, Transport, TransportError};

/// Where and how cases are sent.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub base_url: String,
    /// Sent with every request, before generated header parameters
    pub headers: BTreeMap<String, String>,
    pub generation: GenerationSettings,
}

impl RunnerConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: BTreeMap::new(),
            generation: GenerationSettings::default(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: config.headers.clone(),
            generation: config.generation.clone(),
        }
    }
}

/// Where the run loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Generating,
    Dispatching,
    Checking,
    Recording,
    Done,
}

/// Cooperative stop signal, checked between cases.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Dry run plan for `operations`, counting the boundary cases each would get.
#[must_use]
pub fn plan(operations: &[Arc<Operation>], settings: &GenerationSettings) -> RunPlan {
    RunPlan::build(operations, settings, |op| {
        u32::try_from(CaseStrategy::new(op.clone()).boundary_count()).unwrap_or(u32::MAX)
    })
}

enum Evaluation {
    Pass,
    Fail(CheckFailure),
    Error(String),
}

pub struct Runner<T> {
    config: RunnerConfig,
    transport: T,
    seeds: SeedConfig,
    cancel: CancelToken,
    state: RunState,
}

impl<T: Transport> Runner<T> {
    #[must_use]
    pub fn new(config: RunnerConfig, transport: T) -> Self {
        let seeds = SeedConfig::from_settings(&config.generation);
        Self {
            config,
            transport,
            seeds,
            cancel: CancelToken::new(),
            state: RunState::Idle,
        }
    }

    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run-wide seed; `None` when seeds are derived per operation.
    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seeds.run_seed()
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// What [`Runner::execute`] would do, without sending anything.
    #[must_use]
    pub fn plan(&self, catalog: &Catalog, filter: &EffectiveFilter) -> RunPlan {
        plan(&filter.select(catalog), &self.config.generation)
    }

    /// Test every operation `filter` selects, in catalog order.
    pub fn execute(
        &mut self,
        catalog: &Catalog,
        filter: &EffectiveFilter,
        checks: &CheckSet,
    ) -> RunStats {
        let operations = filter.select(catalog);
        let mut stats = RunStats::new();
        for op in &operations {
            stats.register(op.id());
        }
        tracing::info!(
            operations = operations.len(),
            base_url = %self.config.base_url,
            "starting run"
        );

        for op in &operations {
            if self.cancel.is_cancelled() {
                tracing::info!("run cancelled");
                break;
            }
            self.run_operation(op, checks, &mut stats);
            if let Some(s) = stats.get(op.id()) {
                tracing::info!(
                    operation = %op.id(),
                    total = s.total,
                    passes = s.passes,
                    failures = s.failures,
                    errors = s.errors,
                    "operation finished"
                );
            }
        }

        self.transition(RunState::Done);
        stats
    }

    fn run_operation(&mut self, op: &Arc<Operation>, checks: &CheckSet, stats: &mut RunStats) {
        let strategy = CaseStrategy::new(op.clone());
        let settings = self.config.generation.clone();
        let seed = self.seeds.seed_for(op.id());

        if settings.has_phase(Phase::Explicit) {
            if let Some(case) = strategy.explicit() {
                self.transition(RunState::Generating);
                let outcome = match self.evaluate(&case, checks) {
                    Evaluation::Pass => Outcome::Pass,
                    Evaluation::Error(message) => Outcome::Error { message },
                    Evaluation::Fail(failure) => Outcome::Fail {
                        check: failure.check.to_string(),
                        message: failure.message,
                        case,
                    },
                };
                self.transition(RunState::Recording);
                stats.record(op.id(), outcome);
            }
        }

        if settings.has_phase(Phase::Boundary) {
            self.transition(RunState::Generating);
            for generated in strategy.boundary_cases(seed) {
                if self.cancel.is_cancelled() {
                    return;
                }
                self.run_case(&strategy, generated, checks, stats);
            }
        }

        if !settings.has_phase(Phase::Generate) {
            return;
        }

        let max_examples = usize::try_from(settings.max_examples).unwrap_or(usize::MAX);
        for generated in strategy.cases(seed).take(max_examples) {
            if self.cancel.is_cancelled() {
                return;
            }
            self.transition(RunState::Generating);
            let generated = match generated {
                Ok(g) => g,
                Err(e) => {
                    tracing::warn!(operation = %op.id(), error = %e, "generation failed");
                    stats.record(
                        op.id(),
                        Outcome::Error {
                            message: e.to_string(),
                        },
                    );
                    return;
                }
            };
            self.run_case(&strategy, generated, checks, stats);
        }
    }

    /// Dispatch, check and record one generated case. Only the operation's
    /// first failure is shrunk; later failures are recorded as found.
    fn run_case(
        &mut self,
        strategy: &CaseStrategy,
        generated: GeneratedCase,
        checks: &CheckSet,
        stats: &mut RunStats,
    ) {
        let id = strategy.operation().id();
        let outcome = match self.evaluate(&generated.case, checks) {
            Evaluation::Pass => Outcome::Pass,
            Evaluation::Error(message) => Outcome::Error { message },
            Evaluation::Fail(failure) => {
                let first = stats.get(id).is_some_and(|s| s.sample.is_none());
                let case = if first && self.config.generation.has_phase(Phase::Shrink) {
                    self.shrink(strategy, generated, failure.check, checks)
                } else {
                    generated.case
                };
                Outcome::Fail {
                    check: failure.check.to_string(),
                    message: failure.message,
                    case,
                }
            }
        };
        self.transition(RunState::Recording);
        stats.record(id, outcome);
    }

    fn evaluate(&mut self, case: &Case, checks: &CheckSet) -> Evaluation {
        self.transition(RunState::Dispatching);
        tracing::debug!(case = %case, "dispatching");
        let response = match self.dispatch(case) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(operation = %case.id(), error = %e, "request failed");
                return Evaluation::Error(e.to_string());
            }
        };
        self.transition(RunState::Checking);
        match checks.run(case, &response) {
            Ok(()) => Evaluation::Pass,
            Err(failure) => {
                tracing::debug!(
                    operation = %case.id(),
                    check = failure.check,
                    status = response.status,
                    "check failed"
                );
                Evaluation::Fail(failure)
            }
        }
    }

    fn dispatch(&self, case: &Case) -> Result<Response, TransportError> {
        let request = Request::from_case(case, &self.config.base_url, &self.config.headers);
        self.transport.send(&request)
    }

    /// Minimize `failing` against the check that rejected it. Shrink
    /// dispatches are not recorded.
    fn shrink(
        &self,
        strategy: &CaseStrategy,
        failing: GeneratedCase,
        check_name: &str,
        checks: &CheckSet,
    ) -> Case {
        let Some(check) = checks.get(check_name) else {
            return failing.case;
        };
        let still_fails = |candidate: &Case| match self.dispatch(candidate) {
            Ok(response) => check.check(candidate, &response).is_err(),
            Err(_) => false,
        };
        let shrunk = shrink::minimize(
            strategy,
            failing,
            still_fails,
            self.config.generation.max_shrinks,
        );
        shrunk.case.case
    }

    fn transition(&mut self, next: RunState) {
        tracing::trace!(from = ?self.state, to = ?next, "state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpTransport;
    use apiprop_core::catalog::Method;
    use apiprop_core::filter::{PartialFilter, resolve};
    use serde_json::{Value, json};
    use std::cell::RefCell;
    use std::time::Duration;

    /// Answers by method and path with a fixed status, or 500 when
    /// `fail_when` matches.
    struct Scripted {
        routes: Vec<(Method, &'static str, u16)>,
        calls: RefCell<Vec<Request>>,
        cancel_after: Option<(usize, CancelToken)>,
        fail_when: Option<fn(&Request) -> bool>,
    }

    impl Scripted {
        fn new(routes: Vec<(Method, &'static str, u16)>) -> Self {
            Self {
                routes,
                calls: RefCell::new(Vec::new()),
                cancel_after: None,
                fail_when: None,
            }
        }
    }

    impl Transport for Scripted {
        fn send(&self, request: &Request) -> Result<Response, TransportError> {
            self.calls.borrow_mut().push(request.clone());
            if let Some((n, token)) = &self.cancel_after {
                if self.calls.borrow().len() >= *n {
                    token.cancel();
                }
            }
            let path = request
                .url
                .trim_start_matches("http://test")
                .split('?')
                .next()
                .unwrap_or("");
            let status = if self.fail_when.is_some_and(|fails| fails(request)) {
                500
            } else {
                self.routes
                    .iter()
                    .find(|(m, p, _)| *m == request.method && *p == path)
                    .map_or(404, |(_, _, s)| *s)
            };
            Ok(Response {
                status,
                headers: Vec::new(),
                body: String::new(),
                elapsed: Duration::ZERO,
            })
        }
    }

    struct Unreachable;

    impl Transport for Unreachable {
        fn send(&self, _request: &Request) -> Result<Response, TransportError> {
            Err(TransportError::Connection("connection refused".into()))
        }
    }

    fn catalog(doc: Value) -> Catalog {
        Catalog::from_document(&doc).unwrap()
    }

    fn foo_bar() -> Catalog {
        catalog(json!({
            "openapi": "3.0.0",
            "paths": {
                "/foo": {"get": {"responses": {"200": {"description": "ok"}}}},
                "/bar": {"post": {
                    "requestBody": {
                        "required": true,
                        "content": {"application/json": {"schema": {
                            "type": "object",
                            "properties": {"n": {"type": "integer"}},
                            "required": ["n"]
                        }}}
                    },
                    "responses": {"200": {"description": "ok"}}
                }}
            }
        }))
    }

    fn config(max_examples: u32) -> RunnerConfig {
        let mut config = RunnerConfig::new("http://test");
        config.generation.max_examples = max_examples;
        config.generation.seed = Some(1);
        config
    }

    #[test]
    fn failing_operation_is_shrunk_and_others_pass() {
        let transport = Scripted::new(vec![(Method::Get, "/foo", 200), (Method::Post, "/bar", 500)]);
        let mut runner = Runner::new(config(5), &transport);
        let stats = runner
            .execute(&foo_bar(), &EffectiveFilter::all(), &CheckSet::all())
            .snapshot();

        let foo = &stats["GET /foo"];
        assert_eq!((foo.total, foo.passes), (5, 5));

        let bar = &stats["POST /bar"];
        assert_eq!((bar.total, bar.failures), (5, 5));
        let sample = bar.sample.as_ref().unwrap();
        assert_eq!(sample.check, "not_a_server_error");
        assert_eq!(sample.case.body, Some(json!({"n": 0})));

        // Shrink replays are sent but not counted.
        assert!(transport.calls.borrow().len() > 10);
        assert_eq!(runner.state(), RunState::Done);
        assert_eq!(runner.seed(), Some(1));
    }

    #[test]
    fn failing_body_shrinks_to_smallest_failure() {
        let mut transport = Scripted::new(vec![(Method::Get, "/foo", 200), (Method::Post, "/bar", 200)]);
        transport.fail_when = Some(|request| {
            request
                .body
                .as_ref()
                .and_then(|body| body["n"].as_i64())
                .is_some_and(|n| n > 10)
        });
        let mut runner = Runner::new(config(50), &transport);
        let stats = runner
            .execute(&foo_bar(), &EffectiveFilter::all(), &CheckSet::all())
            .snapshot();

        let bar = &stats["POST /bar"];
        assert!(bar.failures > 0 && bar.passes > 0);
        let sample = bar.sample.as_ref().unwrap();
        assert_eq!(sample.check, "not_a_server_error");
        assert_eq!(sample.case.body, Some(json!({"n": 11})));
    }

    #[test]
    fn only_the_first_failure_is_shrunk() {
        let calls = |max_examples| {
            let transport = Scripted::new(vec![(Method::Post, "/bar", 500)]);
            let filter = resolve(&[PartialFilter::new().with_methods(["POST"]).unwrap()]);
            let mut runner = Runner::new(config(max_examples), &transport);
            let stats = runner.execute(&foo_bar(), &filter, &CheckSet::all()).snapshot();
            assert_eq!(stats["POST /bar"].failures, u64::from(max_examples));
            drop(runner);
            transport.calls.into_inner().len()
        };
        // Same seed, same first case and shrink; each later failure costs one call.
        assert_eq!(calls(5), calls(1) + 4);
    }

    #[test]
    fn boundary_phase_sends_out_of_range_values() {
        let cat = catalog(json!({
            "openapi": "3.0.0",
            "paths": {"/items": {"get": {
                "parameters": [{"name": "n", "in": "query", "required": true,
                                "schema": {"type": "integer", "minimum": 1, "maximum": 10}}],
                "responses": {"200": {"description": "ok"}}
            }}}
        }));
        let mut transport = Scripted::new(vec![(Method::Get, "/items", 200)]);
        transport.fail_when = Some(|request| request.url.ends_with("?n=11"));
        let mut cfg = config(5);
        cfg.generation.phases = vec![Phase::Boundary, Phase::Shrink];

        let mut runner = Runner::new(cfg, &transport);
        assert_eq!(runner.plan(&cat, &EffectiveFilter::all()).total_cases, 2);
        let stats = runner
            .execute(&cat, &EffectiveFilter::all(), &CheckSet::all())
            .snapshot();

        let items = &stats["GET /items"];
        assert_eq!((items.total, items.passes, items.failures), (2, 1, 1));
        let sample = items.sample.as_ref().unwrap();
        assert_eq!(sample.case.query, vec![("n".to_string(), "11".to_string())]);

        let calls = transport.calls.borrow();
        assert_eq!(calls[0].url, "http://test/items?n=0");
        assert_eq!(calls[1].url, "http://test/items?n=11");
    }

    #[test]
    fn shrink_phase_can_be_disabled() {
        let transport = Scripted::new(vec![(Method::Post, "/bar", 500)]);
        let mut cfg = config(3);
        cfg.generation.phases = vec![Phase::Generate];
        let mut runner = Runner::new(cfg, &transport);
        runner.execute(&foo_bar(), &EffectiveFilter::all(), &CheckSet::all());
        // 3 for /foo, 3 for /bar, no replays
        assert_eq!(transport.calls.borrow().len(), 6);
    }

    #[test]
    fn filter_limits_operations() {
        let transport = Scripted::new(vec![(Method::Get, "/foo", 200)]);
        let filter = resolve(&[PartialFilter::new().with_methods(["GET"]).unwrap()]);
        let mut runner = Runner::new(config(4), &transport);
        let stats = runner
            .execute(&foo_bar(), &filter, &CheckSet::all())
            .snapshot();
        assert_eq!(stats.operations.len(), 1);
        assert_eq!(stats["GET /foo"].passes, 4);
    }

    #[test]
    fn transport_errors_are_recorded() {
        let mut runner = Runner::new(config(3), Unreachable);
        let stats = runner
            .execute(&foo_bar(), &EffectiveFilter::all(), &CheckSet::all())
            .snapshot();
        let foo = &stats["GET /foo"];
        assert_eq!((foo.total, foo.errors), (3, 3));
        assert_eq!(foo.error_messages.len(), 1);
        assert!(foo.error_messages[0].contains("connection refused"));
    }

    #[test]
    fn unsatisfiable_operation_records_one_error_and_moves_on() {
        let cat = catalog(json!({
            "openapi": "3.0.0",
            "paths": {
                "/items/{id}": {"get": {
                    "parameters": [{"name": "id", "in": "path", "required": true,
                                    "schema": {"type": "string", "enum": [""]}}],
                    "responses": {"200": {"description": "ok"}}
                }},
                "/foo": {"get": {"responses": {"200": {"description": "ok"}}}}
            }
        }));
        let transport = Scripted::new(vec![(Method::Get, "/foo", 200)]);
        let mut cfg = config(5);
        cfg.generation.phases = vec![Phase::Generate];
        let mut runner = Runner::new(cfg, &transport);
        let stats = runner
            .execute(&cat, &EffectiveFilter::all(), &CheckSet::all())
            .snapshot();
        let items = &stats["GET /items/{id}"];
        assert_eq!((items.total, items.errors), (1, 1));
        assert!(items.error_messages[0].contains("no valid case"));
        assert_eq!(stats["GET /foo"].passes, 5);
    }

    #[test]
    fn cancelled_before_start_runs_nothing() {
        let transport = Scripted::new(Vec::new());
        let mut runner = Runner::new(config(5), &transport);
        runner.cancel_token().cancel();
        let stats = runner
            .execute(&foo_bar(), &EffectiveFilter::all(), &CheckSet::all())
            .snapshot();
        assert_eq!(stats.operations.len(), 2);
        assert_eq!(stats.totals().total, 0);
        assert!(transport.calls.borrow().is_empty());
    }

    #[test]
    fn cancellation_is_checked_between_cases() {
        let token = CancelToken::new();
        let mut transport = Scripted::new(vec![(Method::Get, "/foo", 200)]);
        transport.cancel_after = Some((2, token.clone()));
        let mut runner = Runner::new(config(10), &transport).with_cancel_token(token);
        let stats = runner
            .execute(&foo_bar(), &EffectiveFilter::all(), &CheckSet::all())
            .snapshot();
        // The in-flight case still completes and is recorded.
        assert_eq!(stats.totals().total, 2);
    }

    #[test]
    fn explicit_phase_uses_examples() {
        let cat = catalog(json!({
            "openapi": "3.0.0",
            "paths": {"/items/{id}": {"get": {
                "parameters": [{"name": "id", "in": "path", "required": true,
                                "example": 42, "schema": {"type": "integer"}}],
                "responses": {"200": {"description": "ok"}}
            }}}
        }));
        let transport = Scripted::new(Vec::new());
        let mut cfg = config(5);
        cfg.generation.phases = vec![Phase::Explicit];
        let mut runner = Runner::new(cfg, &transport);
        runner.execute(&cat, &EffectiveFilter::all(), &CheckSet::all());
        let calls = transport.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "http://test/items/42");
    }

    #[test]
    fn same_seed_same_requests() {
        let run = || {
            let transport = Scripted::new(vec![(Method::Post, "/bar", 200)]);
            let mut runner = Runner::new(config(10), &transport);
            runner.execute(&foo_bar(), &EffectiveFilter::all(), &CheckSet::all());
            drop(runner);
            transport.calls.into_inner()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn plan_counts_without_sending() {
        let transport = Scripted::new(Vec::new());
        let runner = Runner::new(config(7), &transport);
        let plan = runner.plan(&foo_bar(), &EffectiveFilter::all());
        assert_eq!(plan.total_cases, 14);
        assert_eq!(plan.operations[1].body_properties, vec!["n"]);
        assert!(transport.calls.borrow().is_empty());
    }

    #[test]
    fn http_round_trip() {
        let mut server = mockito::Server::new();
        let ping = server
            .mock("GET", "/ping")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": true}"#)
            .expect(3)
            .create();

        let cat = catalog(json!({
            "openapi": "3.0.0",
            "paths": {"/ping": {"get": {"responses": {"200": {
                "description": "ok",
                "content": {"application/json": {"schema": {
                    "type": "object",
                    "properties": {"ok": {"type": "boolean"}},
                    "required": ["ok"]
                }}}
            }}}}}
        }));
        let mut cfg = RunnerConfig::new(server.url());
        cfg.generation.max_examples = 3;
        cfg.generation.derandomize = true;
        let transport = HttpTransport::new(Duration::from_secs(5), None).unwrap();
        let mut runner = Runner::new(cfg, transport);
        let stats = runner
            .execute(&cat, &EffectiveFilter::all(), &CheckSet::all())
            .snapshot();

        ping.assert();
        assert_eq!(stats["GET /ping"].passes, 3);
        assert_eq!(runner.seed(), None);
    }
}
