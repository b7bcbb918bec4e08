//! Minimal runner for `harness = false` test binaries.
//!
//! Rust's built-in harness has no process-level setup hook, so database test
//! binaries provide their own `main`, build a [`Harness`] and pass it to
//! [`crate::run_tests`].

pub mod outcome;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::config::flags::HarnessArgs;
use crate::runner::{TestRunner, EXIT_FAILURE, EXIT_SUCCESS};
use crate::suite::{Suite, TestCase};
use outcome::{panic_message, Outcome, Reporter};

/// A named test case.
#[derive(Debug)]
pub struct Trial {
    name: String,
    case: TestCase,
}

impl Trial {
    pub fn new(name: impl Into<String>, case: TestCase) -> Self {
        Self {
            name: name.into(),
            case,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Tally of one harness run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub passed: usize,
    pub failed: Vec<String>,
    pub skipped: usize,
    pub filtered_out: usize,
}

impl Report {
    pub fn exit_code(&self) -> i32 {
        if self.failed.is_empty() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }

    fn record(&mut self, name: String, outcome: &Outcome) {
        match outcome {
            Outcome::Passed => self.passed += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed(_) => self.failed.push(name),
        }
    }
}

type Registrar = Box<dyn FnOnce(&Suite) -> Vec<Trial> + Send + Sync>;

pub struct Harness {
    args: HarnessArgs,
    registrar: Option<Registrar>,
}

impl Harness {
    pub fn new(args: HarnessArgs) -> Self {
        Self {
            args,
            registrar: None,
        }
    }

    /// Use the flags this process was started with.
    pub fn from_env() -> Self {
        Self::new(HarnessArgs::current().clone())
    }

    /// Register the tests; `f` is called once with the run's [`Suite`].
    pub fn with_tests<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Suite) -> Vec<Trial> + Send + Sync + 'static,
    {
        self.registrar = Some(Box::new(f));
        self
    }

    pub fn args(&self) -> &HarnessArgs {
        &self.args
    }

    /// Run the trials that match the filter, at most `--test-threads` at once.
    ///
    /// Trials are never marked ignored, so `--ignored` selects none of them.
    pub async fn execute(&self, trials: Vec<Trial>) -> Report {
        let total = trials.len();
        let only_ignored = self.args.runs_only_ignored();
        let selected: Vec<Trial> = trials
            .into_iter()
            .filter(|trial| !only_ignored && self.args.matches(&trial.name))
            .collect();
        let mut report = Report {
            filtered_out: total - selected.len(),
            ..Report::default()
        };

        if self.args.list {
            for trial in &selected {
                println!("{}: test", trial.name);
            }
            return report;
        }

        println!("\nrunning {} tests", selected.len());
        let quiet = self.args.quiet;
        let results: Vec<(String, Outcome)> = stream::iter(selected)
            .map(|trial| run_trial(trial, quiet))
            .buffer_unordered(self.args.threads())
            .collect()
            .await;

        let mut failures = Vec::new();
        for (name, outcome) in results {
            if let Outcome::Failed(message) = &outcome {
                failures.push((name.clone(), message.clone()));
            }
            report.record(name, &outcome);
        }
        failures.sort();
        report.failed.sort();

        if !failures.is_empty() {
            println!("\nfailures:");
            for (name, message) in &failures {
                println!("\n---- {name} ----\n{message}");
            }
        }
        println!(
            "\ntest result: {}. {} passed; {} failed; {} ignored; {} filtered out\n",
            if report.failed.is_empty() { "ok" } else { "FAILED" },
            report.passed,
            report.failed.len(),
            report.skipped,
            report.filtered_out,
        );
        report
    }
}

#[async_trait]
impl TestRunner for Harness {
    async fn run(&mut self, suite: &Suite) -> i32 {
        let trials = self
            .registrar
            .take()
            .map(|register| register(suite))
            .unwrap_or_default();
        debug!(count = trials.len(), skipped = suite.is_skipped(), "running trials");
        self.execute(trials).await.exit_code()
    }
}

/// Each trial runs in its own task so a panic fails only that trial.
async fn run_trial(trial: Trial, quiet: bool) -> (String, Outcome) {
    let Trial { name, case } = trial;
    let reporter = Reporter::new(name.as_str());

    let outcome = match tokio::spawn(case.run(reporter)).await {
        Ok(outcome) => outcome,
        Err(join_err) if join_err.is_panic() => {
            Outcome::Failed(panic_message(&*join_err.into_panic()))
        }
        Err(_) => Outcome::failed("test task was aborted before completion"),
    };

    if !quiet {
        let status = match &outcome {
            Outcome::Passed => "ok",
            Outcome::Failed(_) => "FAILED",
            Outcome::Skipped => "ignored",
        };
        println!("test {name} ... {status}");
    }
    (name, outcome)
}
