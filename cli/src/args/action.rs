use std::sync::Arc;

use clap::Args;
use melanite::action::ssh::SshRunnerFactory;
use melanite::action::transport::TcpTransport;
use melanite::engine::Dispatcher;
use melanite::engine::DEFAULT_CONCURRENCY;
use tokio_util::sync::CancellationToken;

const HEADING: Option<&str> = Some("Action Options");

/// Arguments for action execution.
#[derive(Debug, Args, Clone)]
pub struct ActionArgs {
    /// Number of targets to run on at once
    #[clap(long, default_value_t = DEFAULT_CONCURRENCY, help_heading = HEADING)]
    pub concurrency: usize,

    /// Time to allow each target to complete, including connecting
    #[clap(long, default_value = "30s", help_heading = HEADING)]
    pub timeout: humantime::Duration,

    /// Time to allow the whole run to complete. Unfinished targets are
    /// reported as timed out
    #[clap(long, help_heading = HEADING)]
    pub deadline: Option<humantime::Duration>,

    /// Time to allow each TCP connection to be established
    #[clap(long, default_value = "5s", help_heading = HEADING)]
    pub connect_timeout: humantime::Duration,
}

impl ActionArgs {
    pub fn dispatcher(&self, cancel: CancellationToken) -> Dispatcher {
        let transport = TcpTransport::new(self.connect_timeout.into());
        let runner_factory =
            SshRunnerFactory::new(transport).with_inactivity_timeout(Some(self.timeout.into()));

        Dispatcher::builder()
            .runner_factory(Arc::new(runner_factory))
            .concurrency(self.concurrency)
            .timeout(self.timeout.into())
            .maybe_deadline(self.deadline.map(Into::into))
            .cancel(cancel)
            .build()
    }
}
