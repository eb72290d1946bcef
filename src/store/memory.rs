use serde_json::Value;

use crate::types::Record;

use super::{GraphStore, Parameters, StoreError};

/// One acknowledged statement execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreCall {
    pub statement: String,
    pub parameters: Parameters,
}

impl StoreCall {
    /// Records bound to the list parameter `name`, or nothing when it is absent.
    pub fn rows(&self, name: &str) -> Vec<Record> {
        match self.parameters.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_object().cloned())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// In-memory store that records every acknowledged call.
///
/// Failures can be injected by call number or by statement text; a failed call is counted as
/// an attempt but not recorded.
#[derive(Debug, Default, Clone)]
pub struct RecordingStore {
    calls: Vec<StoreCall>,
    attempts: usize,
    fail_on_call: Option<usize>,
    fail_on_statement: Option<String>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`-th call (1-based).
    pub fn fail_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    /// Fail every call whose statement contains `fragment`.
    pub fn fail_on_statement(mut self, fragment: impl Into<String>) -> Self {
        self.fail_on_statement = Some(fragment.into());
        self
    }

    /// Acknowledged calls, in execution order.
    pub fn calls(&self) -> &[StoreCall] {
        &self.calls
    }

    /// Every call made, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Statements of the acknowledged calls.
    pub fn statements(&self) -> Vec<&str> {
        self.calls.iter().map(|c| c.statement.as_str()).collect()
    }
}

impl GraphStore for RecordingStore {
    fn execute(&mut self, statement: &str, parameters: &Parameters) -> Result<(), StoreError> {
        self.attempts += 1;
        let injected = self.fail_on_call == Some(self.attempts)
            || self
                .fail_on_statement
                .as_deref()
                .is_some_and(|fragment| statement.contains(fragment));
        if injected {
            return Err(StoreError::Statement {
                code: "Test.InjectedFailure".to_string(),
                message: format!("injected failure on call {}", self.attempts),
            });
        }
        self.calls.push(StoreCall {
            statement: statement.to_string(),
            parameters: parameters.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::RecordingStore;
    use crate::store::{GraphStore, Parameters, StoreError};

    fn params(rows: serde_json::Value) -> Parameters {
        let mut p = Parameters::new();
        p.insert("rows".to_string(), rows);
        p
    }

    #[test]
    fn records_calls_in_order() {
        let mut store = RecordingStore::new();
        store.execute("A", &Parameters::new()).unwrap();
        store.execute("B", &params(json!([{"x": 1}]))).unwrap();
        assert_eq!(store.statements(), vec!["A", "B"]);
        assert_eq!(store.calls()[1].rows("rows").len(), 1);
        assert!(store.calls()[0].rows("rows").is_empty());
    }

    #[test]
    fn injected_failures_are_not_recorded() {
        let mut store = RecordingStore::new().fail_on_call(2);
        store.execute("A", &Parameters::new()).unwrap();
        let err = store.execute("B", &Parameters::new()).unwrap_err();
        assert!(matches!(err, StoreError::Statement { .. }));
        store.execute("C", &Parameters::new()).unwrap();
        assert_eq!(store.statements(), vec!["A", "C"]);
        assert_eq!(store.attempts(), 3);
    }

    #[test]
    fn fails_by_statement_fragment() {
        let mut store = RecordingStore::new().fail_on_statement("DROP");
        assert!(store.execute("DROP INDEX x", &Parameters::new()).is_err());
        assert!(store.execute("CREATE INDEX x", &Parameters::new()).is_ok());
    }
}
