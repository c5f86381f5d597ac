//! Status command handler.

use anyhow::Result;

use libris_core::pipeline::StatusReport;
use libris_core::store::PipelineStore;

pub async fn run_status_command(store: PipelineStore) -> Result<()> {
    let report = StatusReport::gather(&store).await?;
    print!("{}", report.render());
    Ok(())
}
