mod args;
mod cmd;
mod output;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cmd::run().await
}
