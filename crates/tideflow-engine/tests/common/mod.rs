use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tideflow_engine::{
    EntryState, EntryStates, HandlerError, HandlerRegistry, StepContext, StepHandler,
    replace_guard,
};

/// Shared, ordered log of handler invocations: (method, entry_id)
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<(String, String)>>>);

impl CallLog {
    fn push(&self, method: &str, entry_id: &str) {
        self.0
            .lock()
            .unwrap()
            .push((method.to_string(), entry_id.to_string()));
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    #[allow(dead_code)]
    pub fn position(&self, method: &str, entry_id: &str) -> Option<usize> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .position(|(m, id)| m == method && id == entry_id)
    }
}

/// Handler that records every call and fails on demand
///
/// - `equals` compares the `identity` parameter
/// - `preview` reports a change whenever the parameters differ
/// - `create` returns `{"id", "params", "upstream", "force"}` where `upstream`
///   lists the dependency ids whose result was visible through the context
pub struct RecordingHandler {
    log: CallLog,
    failures: HashSet<(&'static str, String)>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl RecordingHandler {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            failures: HashSet::new(),
            delay: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[allow(dead_code)]
    pub fn failing(mut self, method: &'static str, entry_id: &str) -> Self {
        self.failures.insert((method, entry_id.to_string()));
        self
    }

    #[allow(dead_code)]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[allow(dead_code)]
    pub fn max_in_flight(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.max_in_flight)
    }

    async fn enter(&self, method: &'static str, entry_id: &str) -> Result<(), HandlerError> {
        self.log.push(method, entry_id);

        if let Some(delay) = self.delay {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        if self.failures.contains(&(method, entry_id.to_string())) {
            return Err(HandlerError::ApiError(format!("{method} {entry_id} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl StepHandler for RecordingHandler {
    fn equals(&self, candidate: &EntryState, current: &EntryState) -> bool {
        candidate.parameters.get("identity") == current.parameters.get("identity")
    }

    async fn create(
        &self,
        candidate: &EntryState,
        context: &StepContext,
    ) -> Result<Value, HandlerError> {
        self.enter("create", &candidate.entry_id).await?;
        let upstream: Vec<&str> = context
            .dependencies(None)
            .into_iter()
            .filter(|d| d.result.is_some())
            .map(|d| d.entry_id.as_str())
            .collect();
        Ok(json!({
            "id": format!("res-{}", candidate.entry_id),
            "params": candidate.parameters,
            "upstream": upstream,
            "force": context.force(),
        }))
    }

    async fn replace(
        &self,
        candidate: &EntryState,
        current: &EntryState,
        context: &StepContext,
    ) -> Result<Value, HandlerError> {
        replace_guard("recording", candidate, current)?;
        self.enter("replace", &candidate.entry_id).await?;
        self.create(candidate, context).await
    }

    async fn preview(
        &self,
        candidate: &EntryState,
        current: &EntryState,
        _context: &StepContext,
    ) -> Result<Option<Value>, HandlerError> {
        self.enter("preview", &candidate.entry_id).await?;
        if candidate.parameters == current.parameters {
            Ok(None)
        } else {
            Ok(Some(json!({ "params": candidate.parameters })))
        }
    }

    async fn update(
        &self,
        candidate: &EntryState,
        _current: &EntryState,
        _context: &StepContext,
    ) -> Result<Option<Value>, HandlerError> {
        self.enter("update", &candidate.entry_id).await?;
        Ok(Some(json!({ "params": candidate.parameters })))
    }

    async fn delete(
        &self,
        candidate: &EntryState,
        _context: &StepContext,
    ) -> Result<(), HandlerError> {
        self.enter("delete", &candidate.entry_id).await
    }
}

/// Registry with one recording handler shared by every listed type
pub fn registry(handler: RecordingHandler, types: &[&str]) -> HandlerRegistry {
    let handler: Arc<dyn StepHandler> = Arc::new(handler);
    let mut registry = HandlerRegistry::new();
    for entry_type in types {
        registry.register(*entry_type, Arc::clone(&handler));
    }
    registry
}

pub fn entry(id: &str, deps: &[&str]) -> EntryState {
    EntryState::new(id, "resource", json!({ "identity": id }))
        .with_dependencies(deps.iter().copied())
}

/// D <- B <- C(B, D) <- A(C)
pub fn chain() -> EntryStates {
    [
        entry("D", &[]),
        entry("B", &["D"]),
        entry("C", &["B", "D"]),
        entry("A", &["C"]),
    ]
    .into_iter()
    .collect()
}
