use async_trait::async_trait;

use crate::suite::Suite;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

/// Anything that can run the tests of a binary and report an exit code.
///
/// [`crate::run_tests`] hands the runner the [`Suite`] it built; the runner
/// turns test bodies into cases with [`Suite::inject`].
#[async_trait]
pub trait TestRunner: Send {
    async fn run(&mut self, suite: &Suite) -> i32;
}
