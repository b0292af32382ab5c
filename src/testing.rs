//! Testing utilities and mock implementations.
//!
//! These types are provided for use in tests. They may appear unused in
//! the library itself but are consumed by unit tests.

#![allow(dead_code)]
#![allow(clippy::needless_pass_by_ref_mut)] // &mut self for ergonomics with RefCell

use crate::error::{Error, Result};
use crate::traits::{CommandOutput, CommandRunner, StateKey, StateStore};
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

/// What a mocked command call produces.
#[derive(Debug, Clone)]
enum MockOutcome {
    Output(CommandOutput),
    Timeout,
}

/// A mock command runner for testing.
///
/// Records expected commands and their outputs, then verifies they were called.
#[derive(Debug, Default)]
pub struct MockCommandRunner {
    expectations: RefCell<Vec<(String, Vec<String>, MockOutcome)>>,
    seen_timeouts: RefCell<Vec<Option<Duration>>>,
    call_index: RefCell<usize>,
}

impl MockCommandRunner {
    /// Create a new mock command runner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expected command and its output.
    pub fn expect(&mut self, program: &str, args: &[&str], output: CommandOutput) {
        self.push(program, args, MockOutcome::Output(output));
    }

    /// Add an expected command that runs past its timeout.
    pub fn expect_timeout(&mut self, program: &str, args: &[&str]) {
        self.push(program, args, MockOutcome::Timeout);
    }

    fn push(&self, program: &str, args: &[&str], outcome: MockOutcome) {
        self.expectations.borrow_mut().push((
            program.to_string(),
            args.iter().map(|s| (*s).to_string()).collect(),
            outcome,
        ));
    }

    /// Timeouts passed to each call, in call order.
    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        self.seen_timeouts.borrow().clone()
    }

    /// Verify all expected commands were called.
    ///
    /// # Panics
    ///
    /// Panics if not all expected commands were called.
    pub fn verify(&self) {
        let index = *self.call_index.borrow();
        let expected = self.expectations.borrow().len();
        assert_eq!(
            index, expected,
            "Expected {expected} command calls, but only {index} were made"
        );
    }
}

impl CommandRunner for MockCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput> {
        let mut index = self.call_index.borrow_mut();
        let expectations = self.expectations.borrow();

        assert!(
            *index < expectations.len(),
            "Unexpected command call: {program} {args:?} (no more expectations)"
        );

        let (exp_program, exp_args, outcome) = &expectations[*index];
        let args_vec: Vec<String> = args.iter().map(|s| (*s).to_string()).collect();

        assert!(
            !(program != exp_program || &args_vec != exp_args),
            "Command mismatch at index {}:\n  Expected: {} {:?}\n  Got: {} {:?}",
            *index,
            exp_program,
            exp_args,
            program,
            args
        );

        *index += 1;
        self.seen_timeouts.borrow_mut().push(timeout);
        match outcome {
            MockOutcome::Output(output) => Ok(output.clone()),
            MockOutcome::Timeout => Err(Error::CommandTimeout {
                command: args_vec.join(" "),
                timeout_secs: timeout.map_or(0, |t| t.as_secs()),
            }),
        }
    }
}

/// A command runner that always fails, for testing error paths.
#[derive(Debug, Default)]
pub struct FailingCommandRunner {
    error_message: String,
}

impl FailingCommandRunner {
    /// Create a new failing command runner with the specified error message.
    #[must_use]
    pub fn new(error_message: impl Into<String>) -> Self {
        Self { error_message: error_message.into() }
    }
}

impl CommandRunner for FailingCommandRunner {
    fn run(
        &self,
        _program: &str,
        _args: &[&str],
        _timeout: Option<Duration>,
    ) -> Result<CommandOutput> {
        Err(std::io::Error::other(self.error_message.clone()).into())
    }
}

/// An in-memory state store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: RefCell<HashMap<StateKey, String>>,
}

impl MemoryStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record with raw contents.
    pub fn insert(&self, key: StateKey, contents: &str) {
        self.records.borrow_mut().insert(key, contents.to_string());
    }

    /// Get the raw contents of a record.
    pub fn get(&self, key: StateKey) -> Option<String> {
        self.records.borrow().get(&key).cloned()
    }

    /// Check whether a record exists.
    pub fn contains(&self, key: StateKey) -> bool {
        self.records.borrow().contains_key(&key)
    }
}

impl StateStore for MemoryStateStore {
    fn read(&self, key: StateKey) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    fn write(&self, key: StateKey, contents: &str) -> Result<()> {
        self.insert(key, contents);
        Ok(())
    }

    fn remove(&self, key: StateKey) -> Result<()> {
        self.records.borrow_mut().remove(&key);
        Ok(())
    }
}

/// A state store whose every operation fails, for testing fail-open paths.
#[derive(Debug, Default)]
pub struct FailingStateStore;

impl StateStore for FailingStateStore {
    fn read(&self, _key: StateKey) -> Result<Option<String>> {
        Err(std::io::Error::other("state unavailable").into())
    }

    fn write(&self, _key: StateKey, _contents: &str) -> Result<()> {
        Err(std::io::Error::other("state unavailable").into())
    }

    fn remove(&self, _key: StateKey) -> Result<()> {
        Err(std::io::Error::other("state unavailable").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_command_runner() {
        let mut runner = MockCommandRunner::new();
        runner.expect(
            "echo",
            &["hello"],
            CommandOutput { exit_code: 0, stdout: "hello\n".to_string(), stderr: String::new() },
        );

        let output = runner.run("echo", &["hello"], Some(Duration::from_secs(1))).unwrap();
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(runner.timeouts(), vec![Some(Duration::from_secs(1))]);
        runner.verify();
    }

    #[test]
    fn test_mock_command_runner_timeout() {
        let mut runner = MockCommandRunner::new();
        runner.expect_timeout("sh", &["-c", "npm test"]);

        let result = runner.run("sh", &["-c", "npm test"], Some(Duration::from_secs(60)));
        match result {
            Err(Error::CommandTimeout { timeout_secs, .. }) => assert_eq!(timeout_secs, 60),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "Command mismatch")]
    fn test_mock_command_runner_wrong_command() {
        let mut runner = MockCommandRunner::new();
        runner.expect("echo", &["hello"], CommandOutput::default());

        let _ = runner.run("echo", &["world"], None);
    }

    #[test]
    #[should_panic(expected = "no more expectations")]
    fn test_mock_command_runner_too_many_calls() {
        let runner = MockCommandRunner::new();
        // No expectations set, so any call should panic
        let _ = runner.run("echo", &["hello"], None);
    }

    #[test]
    #[should_panic(expected = "Expected 1 command calls")]
    fn test_mock_command_runner_verify_fails() {
        let mut runner = MockCommandRunner::new();
        runner.expect("echo", &["hello"], CommandOutput::default());
        // Don't make the call, so verify should fail
        runner.verify();
    }

    #[test]
    fn test_failing_command_runner() {
        let runner = FailingCommandRunner::new("test error");
        let result = runner.run("any", &["args"], None);
        assert!(result.is_err());
    }

    #[test]
    fn test_memory_state_store() {
        let store = MemoryStateStore::new();
        assert!(store.read(StateKey::Pipeline).unwrap().is_none());

        store.write(StateKey::Pipeline, "{}").unwrap();
        assert!(store.contains(StateKey::Pipeline));
        assert_eq!(store.read(StateKey::Pipeline).unwrap().as_deref(), Some("{}"));

        store.remove(StateKey::Pipeline).unwrap();
        assert!(!store.contains(StateKey::Pipeline));
    }

    #[test]
    fn test_failing_state_store() {
        let store = FailingStateStore;
        assert!(store.read(StateKey::Continuation).is_err());
        assert!(store.write(StateKey::Continuation, "{}").is_err());
        assert!(store.remove(StateKey::Continuation).is_err());
    }
}
