//! `MockDispatcher`: a test double for `ActionDispatcher`.
//!
//! Records every call it receives and answers with a programmer-specified
//! behaviour, optionally per action type.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::{ActionDispatcher, ActionType, EffectError};

/// Behaviour injected into `MockDispatcher` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Succeed with a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
    /// Fail with a `Retryable` error this many times, then succeed.
    FlakyThenOk { failures: u32, value: Value },
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub action: ActionType,
    pub params: Map<String, Value>,
}

pub struct MockDispatcher {
    default: MockBehaviour,
    overrides: HashMap<ActionType, MockBehaviour>,
    /// Remaining scripted failures, per action type, for `FlakyThenOk`.
    flaky_left: Mutex<HashMap<ActionType, u32>>,
    /// All calls seen by this dispatcher (in call order).
    pub calls: Arc<Mutex<VecDeque<RecordedCall>>>,
}

impl MockDispatcher {
    /// A dispatcher where every action succeeds with `{"ok": true}`.
    pub fn succeeding() -> Self {
        Self::with_default(MockBehaviour::ReturnValue(json!({ "ok": true })))
    }

    pub fn with_default(default: MockBehaviour) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
            flaky_left: Mutex::new(HashMap::new()),
            calls: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Use `behaviour` for one action type only.
    pub fn on(mut self, action: ActionType, behaviour: MockBehaviour) -> Self {
        if let MockBehaviour::FlakyThenOk { failures, .. } = &behaviour {
            self.flaky_left.lock().unwrap().insert(action, *failures);
        }
        self.overrides.insert(action, behaviour);
        self
    }

    /// Number of times the dispatcher has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().iter().cloned().collect()
    }
}

#[async_trait]
impl ActionDispatcher for MockDispatcher {
    async fn invoke(
        &self,
        action: ActionType,
        params: &Map<String, Value>,
    ) -> Result<Value, EffectError> {
        self.calls.lock().unwrap().push_back(RecordedCall {
            action,
            params: params.clone(),
        });

        match self.overrides.get(&action).unwrap_or(&self.default) {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::FailRetryable(msg) => Err(EffectError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(EffectError::Fatal(msg.clone())),
            MockBehaviour::FlakyThenOk { failures, value } => {
                let mut left = self.flaky_left.lock().unwrap();
                let remaining = left.entry(action).or_insert(*failures);
                if *remaining > 0 {
                    *remaining -= 1;
                    Err(EffectError::Retryable(format!("{action} temporarily unavailable")))
                } else {
                    Ok(value.clone())
                }
            }
        }
    }
}
