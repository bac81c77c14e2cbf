use clap::Parser;
use dispensekit::cli::{self, Cli};
use dispensekit::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli::load_settings(&cli)?;

    init_logging(&settings.config().logging)?;
    tracing::debug!(
        "dispensekit {} built {}",
        dispensekit::VERSION,
        dispensekit::BUILD_DATE
    );

    cli::run(cli, settings).await
}
