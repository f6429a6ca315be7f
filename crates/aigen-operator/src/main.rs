use aigen_operator::app::ApplicationBuilder;
use aigen_operator::config::Cli;
use aigen_operator::config::Commands;
use aigen_operator::config::ControllerArgs;
use aigen_operator::crd::AIGen;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use kube::CustomResourceExt;
use utils::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_controller(*args).await,
        Commands::Crd => print_crd(),
    }
}

async fn run_controller(args: ControllerArgs) -> Result<()> {
    logging::init();

    tracing::info!("Starting aigen-operator {}", &**version::VERSION);

    let app = ApplicationBuilder::new(args).build().await?;

    app.run().await?;
    app.shutdown().await?;

    Ok(())
}

fn print_crd() -> Result<()> {
    let manifest = serde_yaml::to_string(&AIGen::crd()).context("serialize AIGen CRD failed")?;
    print!("{manifest}");
    Ok(())
}
