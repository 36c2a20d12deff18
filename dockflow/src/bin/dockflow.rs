use clap::Parser;
use dockflow::docking::{cli::Args, run_pipeline, PipelineConfig};
use dockflow_sdk::WorkflowDefinition;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Launchers ask for the schema without the required inputs
    if std::env::args().any(|a| a == "--workflow-metadata") {
        Args::print_metadata();
        return Ok(());
    }

    let args = Args::parse();
    let report = run_pipeline(PipelineConfig::from(args)).await?;
    report.print();
    Ok(())
}
