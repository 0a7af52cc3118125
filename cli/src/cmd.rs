mod exec;
mod inventory;
mod output;

use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use enum_dispatch::enum_dispatch;
use melanite::db::DbImpl;

use crate::args::GlobalArgs;

/// Run one shell command across a fleet of SSH nodes
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    #[clap(flatten)]
    global_args: GlobalArgs,
}

/// Subcommands must implement [`Run`] to be executed at runtime.
#[enum_dispatch]
pub trait Run {
    async fn run(&self, db: DbImpl) -> Result<()>;
}

#[enum_dispatch(Run)]
#[derive(Debug, Subcommand)]
enum Command {
    Exec(exec::ExecArgs),
    Output(output::OutputArgs),
    Inventory(inventory::InventoryListArgs),
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let _guard = cli.global_args.init_tracing()?;

    let db = cli.global_args.get_db().await?;

    cli.command.run(db).await
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }
}
