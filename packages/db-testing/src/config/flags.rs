use std::ffi::OsString;
use std::sync::OnceLock;

use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::Parser;
use tracing::warn;

/// Environment switch equivalent to `--short`.
pub const SHORT_ENV_VAR: &str = "DBTESTING_SHORT";

/// Command-line flags of a `harness = false` test binary.
///
/// Mirrors the libtest flags cargo forwards, so `cargo test -- …` keeps
/// working. A flag this parser does not know is dropped on its own; every
/// other flag on the command line still applies.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "db-testing", disable_version_flag = true)]
pub struct HarnessArgs {
    /// Only run tests whose name contains one of these strings
    pub filters: Vec<String>,

    /// Skip tests whose name contains this string (repeatable)
    #[arg(long, value_name = "FILTER")]
    pub skip: Vec<String>,

    /// Match filters exactly instead of as substrings
    #[arg(long)]
    pub exact: bool,

    /// List tests instead of running them
    #[arg(long)]
    pub list: bool,

    /// Skip database-backed tests entirely
    #[arg(long)]
    pub short: bool,

    /// Maximum number of tests running at once
    #[arg(long, value_name = "N")]
    pub test_threads: Option<usize>,

    /// Run only ignored tests. No trial of this harness is ever ignored,
    /// so nothing runs.
    #[arg(long)]
    pub ignored: bool,

    /// Run ignored and non-ignored tests
    #[arg(long)]
    pub include_ignored: bool,

    #[arg(long, hide = true)]
    pub nocapture: bool,

    #[arg(long, hide = true)]
    pub show_output: bool,

    #[arg(short, long, hide = true)]
    pub quiet: bool,

    #[arg(long, hide = true)]
    pub color: Option<String>,

    #[arg(long, hide = true)]
    pub format: Option<String>,

    #[arg(long, hide = true)]
    pub logfile: Option<String>,

    #[arg(long, hide = true)]
    pub shuffle_seed: Option<u64>,

    #[arg(short = 'Z', hide = true)]
    pub unstable: Vec<String>,
}

static CURRENT: OnceLock<HarnessArgs> = OnceLock::new();

impl HarnessArgs {
    /// Flags of this process, parsed from `std::env::args` on first use.
    pub fn current() -> &'static HarnessArgs {
        CURRENT.get_or_init(|| Self::parse_lenient(std::env::args_os()))
    }

    /// Parse `args`, dropping unknown flags one at a time instead of failing.
    pub fn parse_lenient<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();

        loop {
            let e = match Self::try_parse_from(args.iter().cloned()) {
                Ok(parsed) => return parsed,
                Err(e) => e,
            };

            let unknown = match (e.kind(), e.get(ContextKind::InvalidArg)) {
                (ErrorKind::UnknownArgument, Some(ContextValue::String(flag))) => flag.clone(),
                (kind, _) => {
                    warn!(kind = ?kind, "unusable harness flags, keeping only --short and --list");
                    return Self::fallback(&args);
                }
            };

            let before = args.len();
            args.retain(|arg| !is_flag_token(arg, &unknown));
            if args.len() == before {
                warn!(flag = %unknown, "cannot drop harness flag, keeping only --short and --list");
                return Self::fallback(&args);
            }
            warn!(flag = %unknown, "ignoring unrecognized harness flag");
        }
    }

    /// Last resort when the command line cannot be parsed at all: the flags
    /// that decide whether anything runs are still honored.
    fn fallback(args: &[OsString]) -> Self {
        let has = |flag: &str| args.iter().any(|arg| arg == flag);
        Self {
            short: has("--short"),
            list: has("--list"),
            ..Self::default()
        }
    }

    /// `--short`, or [`SHORT_ENV_VAR`] set to 1/true/yes.
    pub fn short_mode(&self) -> bool {
        self.short
            || std::env::var(SHORT_ENV_VAR)
                .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
    }

    /// `--ignored` without `--include-ignored`.
    pub fn runs_only_ignored(&self) -> bool {
        self.ignored && !self.include_ignored
    }

    /// Selected by a filter (or no filter given) and not excluded by `--skip`.
    pub fn matches(&self, name: &str) -> bool {
        let hit = |pattern: &String| {
            if self.exact {
                name == pattern
            } else {
                name.contains(pattern.as_str())
            }
        };

        if self.skip.iter().any(|pattern| hit(pattern)) {
            return false;
        }
        self.filters.is_empty() || self.filters.iter().any(|pattern| hit(pattern))
    }

    pub fn threads(&self) -> usize {
        self.test_threads
            .filter(|n| *n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
    }
}

/// `--flag` itself or `--flag=value`.
fn is_flag_token(arg: &OsString, flag: &str) -> bool {
    arg.to_str()
        .map(|arg| arg == flag || arg.strip_prefix(flag).is_some_and(|rest| rest.starts_with('=')))
        .unwrap_or(false)
}
