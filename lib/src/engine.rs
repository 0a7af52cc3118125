use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use futures::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::action::ExecRequest;
use crate::action::RunnerFactory;
use crate::db::ExecEntry;
use crate::error::Error;
use crate::error::Result;
use crate::inventory::Node;
use crate::resolve::Resolver;
use crate::resolve::Selector;
use crate::resolve::Target;
use crate::sink::Report;
use crate::sink::ResultSink;
use crate::util::id::IdGenerator;
use crate::util::id::IdGeneratorImpl;
use crate::util::id::JobId;
use crate::util::tokio::spawn_bounded;
use crate::util::tokio::AbortOnDrop;
use crate::util::tokio::Interrupted;

pub const DEFAULT_CONCURRENCY: usize = 50;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves selectors and dispatches them to every target.
#[derive(Builder)]
pub struct Engine {
    #[builder(default = IdGeneratorImpl::from_hostname_or_uuid())]
    id_generator: IdGeneratorImpl,
    resolver: Resolver,
    dispatcher: Dispatcher,
}

impl Engine {
    /// Generates a fresh ID for a job about to be run.
    pub fn job_id(&self) -> JobId {
        self.id_generator.id_now()
    }

    /// Validates and resolves the selector, then runs its command on every
    /// target.
    ///
    /// # Errors
    ///
    /// - If the selector is invalid
    /// - If the inventory does not know a named group or node
    /// - If no targets were resolved
    pub async fn exec<S>(&self, selector: &Selector, sink: &mut S) -> Result<Summary>
    where
        S: ResultSink + Send,
    {
        let targets = self.resolver.resolve(selector)?;
        let template = CommandTemplate::from(selector);
        info!(targets = targets.len(), command = %template.command, "dispatching");
        self.dispatcher.run(targets, &template, sink).await
    }
}

/// Command and identity shared by every target in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub exec_user: String,
    pub command: String,
}

impl CommandTemplate {
    #[must_use]
    pub fn request_for(&self, node: &Node) -> ExecRequest {
        ExecRequest {
            target_host: node.host.clone(),
            exec_user: self.exec_user.clone(),
            command: self.command.clone(),
        }
    }
}

impl From<&Selector> for CommandTemplate {
    fn from(selector: &Selector) -> Self {
        Self {
            exec_user: selector.run_as().to_owned(),
            command: selector.command.clone(),
        }
    }
}

/// Tally of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    /// Ran and exited zero.
    pub succeeded: usize,
    /// Ran and exited non-zero, or without an exit status.
    pub nonzero: usize,
    /// Never produced output.
    pub failed: usize,
}

impl Summary {
    fn record(&mut self, report: &Report) {
        self.total += 1;
        match &report.outcome {
            Ok(output) if output.is_success() => self.succeeded += 1,
            Ok(_) => self.nonzero += 1,
            Err(_) => self.failed += 1,
        }
    }

    /// Targets that did not both run and exit zero.
    #[must_use]
    pub fn unsuccessful(&self) -> usize {
        self.nonzero + self.failed
    }
}

impl<'a> FromIterator<&'a ExecEntry> for Summary {
    fn from_iter<I: IntoIterator<Item = &'a ExecEntry>>(iter: I) -> Self {
        let mut summary = Self::default();
        for entry in iter {
            summary.total += 1;
            if entry.error.is_some() {
                summary.failed += 1;
            } else if entry.is_success() {
                summary.succeeded += 1;
            } else {
                summary.nonzero += 1;
            }
        }
        summary
    }
}

/// Runs one command across many targets with bounded concurrency.
///
/// Every target gets exactly one [`Report`], delivered to the sink in target
/// order. Per-target failures never stop the others.
#[derive(Builder)]
pub struct Dispatcher {
    runner_factory: Arc<dyn RunnerFactory + Send + Sync>,

    #[builder(default = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Bound on each target's session, from dial to channel close.
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,

    /// Bound on the whole run. Once reached, in-flight sessions are aborted
    /// and unstarted targets are not dialed.
    deadline: Option<Duration>,

    /// External cancellation, e.g. on Ctrl-C.
    #[builder(default)]
    cancel: CancellationToken,
}

impl Dispatcher {
    /// # Errors
    ///
    /// Only [`Error::NoTargets`]. Failures of individual targets and of the
    /// sink are reported or logged instead.
    pub async fn run<S>(
        &self,
        targets: Vec<Target>,
        template: &CommandTemplate,
        sink: &mut S,
    ) -> Result<Summary>
    where
        S: ResultSink + Send,
    {
        if targets.is_empty() {
            return Err(Error::NoTargets);
        }

        let token = self.cancel.child_token();
        let deadline_at = self.deadline.map(|x| Instant::now() + x);
        let _deadline_timer = deadline_at.map(|at| {
            let token = token.clone();
            AbortOnDrop(tokio::spawn(async move {
                tokio::time::sleep_until(at).await;
                warn!("deadline reached, cancelling remaining targets");
                token.cancel();
            }))
        });

        let mut finished = futures::stream::iter(targets.into_iter().enumerate())
            .map(|(index, target)| self.dispatch_one(index, target, template, &token, deadline_at))
            .buffer_unordered(self.concurrency.max(1));

        // reports that finished ahead of an earlier target, keyed by index
        let mut waiting = BTreeMap::new();
        let mut next = 0;
        let mut summary = Summary::default();
        while let Some(report) = finished.next().await {
            waiting.insert(report.index, report);
            while let Some(report) = waiting.remove(&next) {
                next += 1;
                summary.record(&report);
                if let Err(error) = sink.accept(&report).await {
                    warn!(?error, node = %report.node.name, "result sink failed");
                }
            }
        }

        debug!(?summary, "run finished");
        Ok(summary)
    }

    async fn dispatch_one(
        &self,
        index: usize,
        target: Target,
        template: &CommandTemplate,
        token: &CancellationToken,
        deadline_at: Option<Instant>,
    ) -> Report {
        let Target { group, node } = target;
        let host = node.address();

        let outcome = if token.is_cancelled() {
            debug!(%host, "not dialing, run was cancelled");
            Err(interrupted(host, deadline_at))
        } else {
            let request = template.request_for(&node);
            let mut runner = self.runner_factory.runner(node.clone());
            let session = async move { runner.exec(&request).await };

            match spawn_bounded(self.timeout, token.clone(), session).await {
                Ok(outcome) => outcome,
                Err(Interrupted::TimedOut) => Err(Error::Timeout {
                    host,
                    after: self.timeout,
                }),
                Err(Interrupted::Cancelled) => Err(interrupted(host, deadline_at)),
                Err(Interrupted::Failed(message)) => Err(Error::Task { host, message }),
            }
        };

        if let Err(error) = &outcome {
            debug!(%error, node = %node.name, "target failed");
        }
        Report {
            index,
            group,
            node,
            outcome,
        }
    }
}

fn interrupted(host: String, deadline_at: Option<Instant>) -> Error {
    if deadline_at.is_some_and(|at| Instant::now() >= at) {
        Error::DeadlineExceeded { host }
    } else {
        Error::Cancelled { host }
    }
}
