//! CLI command handlers.

mod enrich;
mod extract;
mod finalize;
mod process;
mod review;
mod status;

pub use enrich::run_enrich_command;
pub use extract::run_extract_command;
pub use finalize::run_finalize_command;
pub use process::run_process_command;
pub use review::{
    run_auto_review_command, run_review_enrichments_command, run_review_extractions_command,
};
pub use status::run_status_command;
