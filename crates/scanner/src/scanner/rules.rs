use super::Scanner;
use crate::error::{ErrorKind, Result};
use crate::{Finding, RuleFinding, RuleOptions, ScanContext};
use async_trait::async_trait;
use derive_more::Display;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const RULE_EXTENSIONS: [&str; 2] = ["yar", "yara"];

/// Why the rule capability is off for this run.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum RulesDisabled {
    #[display("disabled by configuration")]
    Config,
    #[display("rule engine unavailable")]
    EngineUnavailable,
    #[display("no rule files found")]
    NoRules,
    #[display("no rule file compiled")]
    NoneCompiled,
}

enum Evaluation {
    Matched(Vec<String>),
    NoMatch,
    Failed(String),
}

/// Evaluates YARA rule files against an object by invoking the external
/// rule engine once per rule file.
///
/// The engine is called as `<command> <rule-file> <object-path>`. Exit code
/// 0 means success with one `RULE_ID [tags] PATH` line per match on stdout,
/// 1 means no match, and anything else is an error for that rule file.
/// Every invocation is bounded by a timeout; the child is killed when it
/// expires.
#[derive(Clone, Debug)]
pub struct RuleScanner {
    command: PathBuf,
    rule_files: Vec<PathBuf>,
    timeout: Duration,
    disabled: Option<RulesDisabled>,
}
impl RuleScanner {
    pub const NAME: &'static str = "rules";

    /// Discover the engine and rule files, and keep only the rule files the
    /// engine accepts: each is run once against an empty file and must exit
    /// with status 0.
    ///
    /// Never fails: every problem becomes a permanent [`RulesDisabled`]
    /// reason for this run.
    pub async fn new(options: &RuleOptions) -> Self {
        let mut scanner = Self {
            command: PathBuf::from(&options.command),
            rule_files: Vec::new(),
            timeout: Duration::from_secs(options.timeout_secs),
            disabled: None,
        };
        if let Err(reason) = scanner.prepare(options).await {
            tracing::warn!(scanner = Self::NAME, %reason, "Pattern rules disabled");
            scanner.disabled = Some(reason);
        }
        scanner
    }

    async fn prepare(&mut self, options: &RuleOptions) -> std::result::Result<(), RulesDisabled> {
        if !options.enabled {
            return Err(RulesDisabled::Config);
        }
        self.command = which::which(&options.command).map_err(|e| {
            tracing::debug!(command = %options.command, error = %e, "Rule engine not found");
            RulesDisabled::EngineUnavailable
        })?;
        let candidates = discover(&options.path).await;
        if candidates.is_empty() {
            return Err(RulesDisabled::NoRules);
        }
        let empty = tempfile::NamedTempFile::new().map_err(|e| {
            tracing::error!(error = %e, "Cannot create an empty file to check rules against");
            RulesDisabled::NoneCompiled
        })?;
        // A clean run against an empty file exits 0; the engine reports a
        // compile error with a non-zero exit, 1 included.
        for rule in candidates {
            match self.evaluate(&rule, empty.path()).await {
                Evaluation::Matched(_) => self.rule_files.push(rule),
                Evaluation::NoMatch => {
                    tracing::error!(rule = %rule.display(), "Rule file failed to compile; skipping");
                },
                Evaluation::Failed(reason) => {
                    tracing::error!(rule = %rule.display(), %reason, "Rule file failed to compile; skipping");
                },
            }
        }
        if self.rule_files.is_empty() {
            return Err(RulesDisabled::NoneCompiled);
        }
        tracing::info!(
            scanner = Self::NAME,
            engine = %self.command.display(),
            rules = self.rule_files.len(),
            "Loaded pattern rules"
        );
        Ok(())
    }

    pub fn disabled_reason(&self) -> Option<RulesDisabled> {
        self.disabled
    }

    /// Rule files that compiled, in evaluation order.
    pub fn rule_files(&self) -> &[PathBuf] {
        &self.rule_files
    }

    async fn evaluate(&self, rule: &Path, target: &Path) -> Evaluation {
        let child = Command::new(&self.command)
            .arg(rule)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => return Evaluation::Failed(format!("cannot start rule engine: {e}")),
        };
        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Evaluation::Failed(format!("rule engine I/O error: {e}")),
            Err(_) => return Evaluation::Failed(format!("timed out after {}s", self.timeout.as_secs())),
        };
        match output.status.code() {
            Some(0) => Evaluation::Matched(parse_matches(&String::from_utf8_lossy(&output.stdout))),
            Some(1) => Evaluation::NoMatch,
            code => Evaluation::Failed(format!(
                "exit status {}: {}",
                code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                String::from_utf8_lossy(&output.stderr).trim()
            )),
        }
    }
}

/// Rule files directly inside `dir`, sorted by path.
async fn discover(dir: &Path) -> Vec<PathBuf> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(path = %dir.display(), error = %e, "Rule directory unreadable");
            return Vec::new();
        },
    };
    let mut rules = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_rule = path.extension().and_then(|e| e.to_str()).is_some_and(|e| RULE_EXTENSIONS.contains(&e));
        if is_rule && entry.file_type().await.is_ok_and(|t| t.is_file()) {
            rules.push(path);
        }
    }
    rules.sort();
    rules
}

/// Rule identifiers from the engine's stdout: the first token of every
/// non-empty line.
fn parse_matches(stdout: &str) -> Vec<String> {
    stdout.lines().filter_map(|line| line.split_whitespace().next()).map(str::to_string).collect()
}

#[async_trait]
impl Scanner for RuleScanner {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn enabled(&self) -> bool {
        self.disabled.is_none()
    }

    #[tracing::instrument(name = "rules", skip_all, fields(key = %ctx.key))]
    async fn scan(&self, ctx: &mut ScanContext) -> Result<Finding> {
        let mut rules = BTreeSet::new();
        let mut failures = 0;
        for rule in &self.rule_files {
            match self.evaluate(rule, &ctx.local_path).await {
                Evaluation::Matched(ids) => rules.extend(ids),
                Evaluation::NoMatch => {},
                Evaluation::Failed(reason) => {
                    failures += 1;
                    tracing::error!(rule = %rule.display(), %reason, "Rule evaluation failed");
                },
            }
        }
        if failures > 0 && failures == self.rule_files.len() {
            exn::bail!(ErrorKind::RuleEngine(failures));
        }
        let rule_files = self
            .rule_files
            .iter()
            .map(|p| p.file_name().unwrap_or(p.as_os_str()).to_string_lossy().into_owned())
            .collect();
        Ok(Finding::Rules(RuleFinding { matched: !rules.is_empty(), rules: rules.into_iter().collect(), rule_files }))
    }
}
