// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts, OutputWriter, Styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use deqp_expect_metadata::{DeqpExpectExitCode, RunSummary};
use deqp_expectations::{
    aggregator::RunAggregator,
    autotest::AutotestLog,
    config::{ConfigLocation, DeqpExpectConfig},
    expectations::{ExpectationBaseline, ExpectationKey, ExpectationStore, FsExpectationStore},
    log_parser::{LogParser, read_log},
    merge::{FlakyPolicy, MergeEngine, MergeSummary},
    outcome::{Outcome, TestCaseId},
    plan::{plan_cases, read_caselist},
};
use itertools::Itertools;
use owo_colors::OwoColorize;
use std::io::Write;
use tracing::{info, warn};

/// Maintain per-GPU dEQP expectation baselines.
///
/// Parses dEQP logs, folds their results into the expectation baseline of
/// each (GPU family, test filter) pair, and detects flaky test cases across
/// runs.
#[derive(Debug, Parser)]
#[command(
    version,
    bin_name = "deqp-expect",
    styles = crate::output::clap_styles::style(),
    max_term_width = 100,
)]
pub struct DeqpExpectApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(subcommand)]
    command: Command,
}

impl DeqpExpectApp {
    /// Initializes logging and returns the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let cwd = current_dir()?;
        let mut config = self.config_opts.make_config(&cwd)?;
        if let Command::Merge(MergeOpts {
            flaky_detection: Some(policy),
            ..
        }) = &self.command
        {
            config.set_flaky_detection(*policy);
        }
        let store = FsExpectationStore::new(config.expectations_dir());
        let styles = output.stdout_styles();

        match self.command {
            Command::Merge(opts) => opts.exec(
                &config,
                &store,
                &styles,
                &output.stderr_styles(),
                output_writer,
            ),
            Command::Parse(opts) => opts.exec(&styles, output_writer),
            Command::Show { key, message_format } => {
                let key = key.to_key()?;
                let baseline = store.load(&key)?;
                if baseline.is_empty() {
                    info!("no baseline recorded for {key} under `{}`", store.root());
                }
                let mut writer = output_writer.stdout_writer();
                match message_format {
                    MessageFormat::Human => write_baseline(&baseline, &styles, &mut writer)?,
                    MessageFormat::Json => writer.write_all(baseline.to_json()?.as_bytes())?,
                }
                writer.flush()?;
                Ok(DeqpExpectExitCode::OK)
            }
            Command::Reset { key } => {
                let key = key.to_key()?;
                if store.reset(&key)? {
                    info!("removed baseline for {key}");
                } else {
                    info!("no baseline recorded for {key}");
                }
                Ok(DeqpExpectExitCode::OK)
            }
            Command::Plan {
                key,
                subset,
                caselist,
            } => {
                let key = key.to_key()?;
                let caselist = caselist.as_deref().map(read_caselist).transpose()?;
                let cases = plan_cases(&store, &key, &subset, caselist.as_deref())?;
                let mut writer = output_writer.stdout_writer();
                for case_id in &cases {
                    writeln!(writer, "{case_id}")?;
                }
                writer.flush()?;
                Ok(DeqpExpectExitCode::OK)
            }
        }
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().map_err(|error| ExpectedError::CurrentDirInvalid { error })?;
    Utf8PathBuf::try_from(cwd)
        .map_err(|error| ExpectedError::CurrentDirNotUtf8 {
            path: error.into_path_buf(),
        })
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: .config/deqp-expect.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Directory holding the baselines, one subdirectory per GPU family
    #[arg(long, global = true, value_name = "DIR", env = "DEQP_EXPECT_DIR")]
    expectations_dir: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, cwd: &Utf8Path) -> Result<DeqpExpectConfig> {
        let location = match &self.config_file {
            Some(path) => ConfigLocation::Explicit(path),
            None => ConfigLocation::Default,
        };
        let mut config = DeqpExpectConfig::load(location, cwd)?;
        if let Some(dir) = &self.expectations_dir {
            config.set_expectations_dir(cwd.join(dir));
        }
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge logs into their baselines
    ///
    /// Autotest INFO logs name their baseline themselves. Raw dEQP logs need
    /// --gpu and --filter.
    Merge(MergeOpts),

    /// Parse a log and print its results without touching any baseline
    Parse(ParseOpts),

    /// Print a baseline
    Show {
        #[clap(flatten)]
        key: KeyOpts,

        /// Output format
        #[arg(long, value_enum, default_value_t, value_name = "FMT")]
        message_format: MessageFormat,
    },

    /// Remove a baseline and its plain-text lists
    Reset {
        #[clap(flatten)]
        key: KeyOpts,
    },

    /// Print the test cases to run next
    ///
    /// Prints the cases recorded under the subset, one per line. Without a
    /// recorded Pass list, the cases are bootstrapped from a dEQP caselist
    /// minus every case known not to pass.
    Plan {
        #[clap(flatten)]
        key: KeyOpts,

        /// Outcome kind to select
        #[arg(long, default_value = "Pass", value_name = "KIND")]
        subset: Outcome,

        /// dEQP caselist (`TEST: <case>` lines) to bootstrap from
        #[arg(long, value_name = "PATH")]
        caselist: Option<Utf8PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum MessageFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Args)]
struct KeyOpts {
    /// GPU family of the baseline
    #[arg(long, value_name = "GPU")]
    gpu: String,

    /// Test filter of the baseline, for example dEQP-GLES2.info
    #[arg(long, value_name = "FILTER")]
    filter: String,
}

impl KeyOpts {
    fn to_key(&self) -> Result<ExpectationKey> {
        Ok(ExpectationKey::new(&self.gpu, &self.filter)?)
    }
}

#[derive(Debug, Args)]
struct LogOpts {
    /// GPU family, required for raw dEQP logs
    #[arg(long, value_name = "GPU", requires = "filter")]
    gpu: Option<String>,

    /// Test filter, required for raw dEQP logs
    #[arg(long, value_name = "FILTER", requires = "gpu")]
    filter: Option<String>,

    /// Cases submitted to a batch run, one per line, in submission order
    #[arg(long, value_name = "PATH")]
    caselist: Option<Utf8PathBuf>,
}

/// One log, parsed.
struct LoadedLog {
    key: Option<ExpectationKey>,
    results: Vec<(TestCaseId, Outcome)>,
    completed: bool,
}

impl LogOpts {
    fn explicit_key(&self) -> Result<Option<ExpectationKey>> {
        match (&self.gpu, &self.filter) {
            (Some(gpu), Some(filter)) => Ok(Some(ExpectationKey::new(gpu, filter)?)),
            _ => Ok(None),
        }
    }

    fn load(&self, path: &Utf8Path) -> Result<LoadedLog> {
        let text = read_log(path)?;
        let explicit_key = self.explicit_key()?;

        if AutotestLog::is_autotest_log(&text) {
            let log = AutotestLog::parse(&text);
            let key = match explicit_key {
                Some(key) => key,
                None => log.key(path)?,
            };
            return Ok(LoadedLog {
                key: Some(key),
                results: log.results,
                completed: log.completed,
            });
        }

        let results = match &self.caselist {
            Some(caselist_path) => {
                let caselist = std::fs::read_to_string(caselist_path).map_err(|err| {
                    ExpectedError::CaselistRead {
                        path: caselist_path.clone(),
                        err,
                    }
                })?;
                let cases = caselist
                    .lines()
                    .filter_map(|line| TestCaseId::new(line).ok())
                    .collect_vec();
                LogParser::with_caselist(&text, cases).collect()
            }
            None => LogParser::new(&text).collect(),
        };
        Ok(LoadedLog {
            key: explicit_key,
            results,
            completed: true,
        })
    }
}

#[derive(Debug, Args)]
struct MergeOpts {
    /// Logs to merge, each as one complete run
    #[arg(value_name = "LOG", required = true)]
    logs: Vec<Utf8PathBuf>,

    #[clap(flatten)]
    log_opts: LogOpts,

    /// Which outcome changes mark a case as flaky [default: from config]
    ///
    /// Overrides the flaky-detection config key.
    #[arg(long, value_name = "POLICY")]
    flaky_detection: Option<FlakyPolicy>,
}

impl MergeOpts {
    fn exec(
        self,
        config: &DeqpExpectConfig,
        store: &FsExpectationStore,
        styles: &Styles,
        stderr_styles: &Styles,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let engine = MergeEngine::with_policy(store, config.flaky_detection());

        let mut failed = 0;
        let mut first_exit_code = None;
        for log in &self.logs {
            match self.merge_one(log, config, &engine) {
                Ok(Some((key, summary))) => {
                    let mut writer = output_writer.stdout_writer();
                    write_merge_summary(&key, &summary, styles, &mut writer)?;
                    writer.flush()?;
                }
                Ok(None) => {}
                Err(error) => {
                    error.display_to_stderr(stderr_styles);
                    failed += 1;
                    first_exit_code.get_or_insert(error.process_exit_code());
                }
            }
        }

        match first_exit_code {
            Some(exit_code) => Err(ExpectedError::SomeLogsFailed {
                failed,
                total: self.logs.len(),
                exit_code,
            }),
            None => Ok(DeqpExpectExitCode::OK),
        }
    }

    fn merge_one(
        &self,
        path: &Utf8Path,
        config: &DeqpExpectConfig,
        engine: &MergeEngine<'_, FsExpectationStore>,
    ) -> Result<Option<(ExpectationKey, MergeSummary)>> {
        let log = self.log_opts.load(path)?;
        let key = log.key.ok_or_else(|| ExpectedError::MissingKeyArgs {
            log: path.to_owned(),
        })?;

        if !log.completed {
            if config.require_complete() {
                return Err(ExpectedError::IncompleteRun {
                    log: path.to_owned(),
                });
            }
            warn!("`{path}` does not record a completed run, merging its results anyway");
        }

        let run: RunAggregator = log.results.into_iter().collect();
        if run.is_empty() {
            warn!("no test results in `{path}`, baseline for {key} left unchanged");
            return Ok(None);
        }
        let summary = engine
            .merge(&key, run)
            .map_err(|err| ExpectedError::merge(&key, err))?;
        Ok(Some((key, summary)))
    }
}

#[derive(Debug, Args)]
struct ParseOpts {
    /// Log to parse
    #[arg(value_name = "LOG")]
    log: Utf8PathBuf,

    #[clap(flatten)]
    log_opts: LogOpts,

    /// Output format
    #[arg(long, value_enum, default_value_t, value_name = "FMT")]
    message_format: MessageFormat,
}

impl ParseOpts {
    fn exec(self, styles: &Styles, output_writer: &mut OutputWriter) -> Result<i32> {
        let log = self.log_opts.load(&self.log)?;
        let run: RunAggregator = log.results.into_iter().collect();

        let mut writer = output_writer.stdout_writer();
        match self.message_format {
            MessageFormat::Human => write_run(&run, styles, &mut writer)?,
            MessageFormat::Json => {
                let summary: RunSummary = run.summary(true);
                serde_json::to_writer_pretty(&mut writer, &summary)?;
                writeln!(writer)?;
            }
        }
        writer.flush()?;

        if run.is_empty() {
            Err(ExpectedError::NoTestsRun { log: self.log })
        } else if run.failure_count() > 0 {
            Err(ExpectedError::TestRunFailed {
                failures: run.failure_count(),
                total: run.total(),
            })
        } else {
            Ok(DeqpExpectExitCode::OK)
        }
    }
}

fn outcome_style(outcome: &Outcome, styles: &Styles) -> owo_colors::Style {
    if *outcome == Outcome::Flaky {
        styles.flaky
    } else if outcome.is_healthy() {
        styles.healthy
    } else {
        styles.unhealthy
    }
}

fn write_run(run: &RunAggregator, styles: &Styles, writer: &mut dyn Write) -> std::io::Result<()> {
    let width = run
        .counts()
        .keys()
        .map(|outcome| outcome.as_str().len())
        .max()
        .unwrap_or(0);
    for (case_id, outcome) in run.pairs() {
        writeln!(
            writer,
            "{:>width$} {case_id}",
            outcome.style(outcome_style(outcome, styles)),
        )?;
    }

    let conflicts = run.conflicts();
    if !conflicts.is_empty() {
        writeln!(writer, "\n{}", "conflicting outcomes:".style(styles.bold))?;
        for (case_id, outcomes) in &conflicts {
            writeln!(writer, "  {case_id}: {}", outcomes.iter().join(", "))?;
        }
    }

    writeln!(
        writer,
        "\n{} {} results, {} failures",
        "summary:".style(styles.bold),
        run.total(),
        run.failure_count(),
    )?;
    for (outcome, count) in run.counts() {
        writeln!(
            writer,
            "  {}: {count}",
            outcome.style(outcome_style(outcome, styles))
        )?;
    }
    Ok(())
}

fn write_baseline(
    baseline: &ExpectationBaseline,
    styles: &Styles,
    writer: &mut dyn Write,
) -> std::io::Result<()> {
    for (kind, cases) in baseline {
        writeln!(
            writer,
            "{} ({}):",
            kind.style(outcome_style(kind, styles)),
            cases.len()
        )?;
        for case_id in cases {
            writeln!(writer, "  {case_id}")?;
        }
    }
    Ok(())
}

fn write_merge_summary(
    key: &ExpectationKey,
    summary: &MergeSummary,
    styles: &Styles,
    writer: &mut dyn Write,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "{}: {} cases ({} new, {} newly flaky)",
        key.style(styles.bold),
        summary.baseline.case_count(),
        summary.new_cases.len(),
        summary.newly_flaky.len(),
    )?;
    for (kind, cases) in &summary.baseline {
        writeln!(
            writer,
            "  {}: {}",
            kind.style(outcome_style(kind, styles)),
            cases.len()
        )?;
    }
    for case_id in &summary.newly_flaky {
        writeln!(writer, "  {} {case_id}", "newly flaky:".style(styles.flaky))?;
    }
    Ok(())
}
