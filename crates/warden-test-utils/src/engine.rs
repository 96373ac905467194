//! Scripted rule engine.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use warden_audit::evaluator::{RuleEngine, RuleResult, RuleStatus};
use warden_audit::report::Severity;
use warden_core::{Error, Resource, Result};

/// Rule engine returning a fixed result list and counting invocations.
#[derive(Debug)]
pub struct ScriptedRuleEngine {
    results: Mutex<Vec<RuleResult>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    seen_modules: Mutex<Vec<BTreeMap<String, String>>>,
}

impl Default for ScriptedRuleEngine {
    fn default() -> Self {
        Self::new(vec![
            rule("KSV001", Severity::Medium, RuleStatus::Failed),
            rule("KSV012", Severity::High, RuleStatus::Passed),
        ])
    }
}

impl ScriptedRuleEngine {
    /// Creates an engine returning `results` for every object.
    #[must_use]
    pub fn new(results: Vec<RuleResult>) -> Self {
        Self {
            results: Mutex::new(results),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            seen_modules: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the scripted results.
    pub fn set_results(&self, results: Vec<RuleResult>) {
        *self.results.lock().expect("lock") = results;
    }

    /// Makes every subsequent call fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Number of evaluations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Module sets passed to each evaluation, in call order.
    pub fn seen_modules(&self) -> Vec<BTreeMap<String, String>> {
        self.seen_modules.lock().expect("lock").clone()
    }
}

/// Builds a rule result.
pub fn rule(id: &str, severity: Severity, status: RuleStatus) -> RuleResult {
    RuleResult {
        id: id.to_string(),
        title: format!("{id} title"),
        description: format!("{id} description"),
        severity,
        status,
        messages: if status == RuleStatus::Failed {
            vec![format!("{id} violated")]
        } else {
            Vec::new()
        },
    }
}

#[async_trait]
impl RuleEngine for ScriptedRuleEngine {
    async fn evaluate(
        &self,
        modules: &BTreeMap<String, String>,
        _use_builtin_policies: bool,
        _resource: &Resource,
    ) -> Result<Vec<RuleResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_modules
            .lock()
            .expect("lock")
            .push(modules.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Internal {
                message: "scripted rule engine failure".to_string(),
            });
        }
        Ok(self.results.lock().expect("lock").clone())
    }
}
