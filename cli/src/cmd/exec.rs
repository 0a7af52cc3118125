use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use melanite::db::DbImpl;
use melanite::engine::Engine;
use melanite::resolve::Resolver;
use melanite::resolve::Selector;
use melanite::resolve::DEFAULT_RUN_AS;
use melanite::sink::DbSink;
use melanite::util::tokio::AbortOnDrop;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::args::ActionArgs;
use crate::args::InventoryArgs;
use crate::cmd::Run;
use crate::output::Format;
use crate::output::PrintSink;
use crate::output::Printer;

const HEADING: Option<&str> = Some("Selection Options");

/// Run a command on every node of a group, or on a single node
#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Group whose nodes to run on
    #[clap(short = 'g', long, help_heading = HEADING)]
    group: Option<String>,

    /// Node to run on, in addition to any group members
    #[clap(short = 'n', long, help_heading = HEADING)]
    node: Option<String>,

    /// Remote user to run the command as
    #[clap(short = 'u', long, default_value = DEFAULT_RUN_AS, help_heading = HEADING)]
    user: String,

    /// Command to run
    #[clap(short = 'c', long = "cmd", conflicts_with = "command")]
    cmd: Option<String>,

    /// Command to run, if -c/--cmd is not given
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,

    /// Output format
    #[clap(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[clap(flatten)]
    inventory_args: InventoryArgs,

    #[clap(flatten)]
    action_args: ActionArgs,
}

impl ExecArgs {
    fn selector(&self) -> Selector {
        let command = match &self.cmd {
            Some(cmd) => cmd.clone(),
            None => self.command.join(" "),
        };
        Selector::builder()
            .maybe_group(self.group.clone())
            .maybe_node(self.node.clone())
            .command(command)
            .run_as(self.user.clone())
            .build()
    }
}

impl Run for ExecArgs {
    async fn run(&self, db: DbImpl) -> Result<()> {
        let selector = self.selector();
        selector.validate()?;

        let inventory = self.inventory_args.load().await?;

        let cancel = CancellationToken::new();
        let _ctrl_c = AbortOnDrop(tokio::spawn(cancel_on_ctrl_c(cancel.clone())));

        let engine = Engine::builder()
            .resolver(Resolver::new(Arc::new(inventory)))
            .dispatcher(self.action_args.dispatcher(cancel))
            .build();

        let job_id = engine.job_id();
        info!(%job_id, "starting job");

        let printer = Printer::new(self.format);
        let mut sink = (
            PrintSink::new(printer, job_id, &selector.command),
            DbSink::new(db, job_id, &selector.command),
        );
        let summary = engine.exec(&selector, &mut sink).await?;

        printer.summary(&job_id.to_string(), &summary)
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("interrupted, cancelling remaining targets");
            cancel.cancel();
        }
        Err(error) => warn!(?error, "unable to listen for ctrl-c"),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use rstest::rstest;

    use super::*;

    #[derive(Debug, Parser)]
    struct Harness {
        #[clap(flatten)]
        args: ExecArgs,
    }

    fn parse(argv: &[&str]) -> ExecArgs {
        Harness::parse_from(std::iter::once("exec").chain(argv.iter().copied())).args
    }

    #[rstest]
    #[case(&["-g", "web", "-c", "uptime"], "uptime")]
    #[case(&["-g", "web", "--", "echo", "hi"], "echo hi")]
    #[case(&["-n", "db1", "ls", "-la"], "ls -la")]
    fn command_sources(#[case] argv: &[&str], #[case] should: &str) {
        let selector = parse(argv).selector();
        assert_eq!(selector.command, should);
        assert!(selector.validate().is_ok());
    }

    #[test]
    fn run_as_defaults_to_root() {
        let selector = parse(&["-g", "web", "-c", "id"]).selector();
        assert_eq!(selector.run_as(), "root");
    }

    #[test]
    fn missing_selector_is_rejected() {
        let selector = parse(&["-c", "id"]).selector();
        assert!(selector.validate().is_err());
    }

    #[test]
    fn missing_command_is_rejected() {
        let selector = parse(&["-g", "web"]).selector();
        assert!(selector.validate().is_err());
    }
}
