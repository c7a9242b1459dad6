// src/core/mod.rs

// The collection engine: target parsing, the per-probe invocation contract,
// the probes themselves and the orchestrator that ties them together.

/// Drives a run: DNS, then the independent probes, then TLS.
pub mod collector;

/// Overall and per-probe time budgets.
pub mod deadline;

pub mod error;

/// The report and every field group a probe can fill in.
pub mod models;

/// Runs one probe under a budget, in its own task.
pub mod probe;

/// One module per probe, behind the `Probes` trait.
pub mod scanner;

pub mod target;

pub use collector::Collector;
pub use error::CollectError;
pub use models::{Options, Report};
pub use target::Target;

/// Collects a report for `input` (IP, domain or URL) using the network probes.
pub async fn collect(input: &str, options: &Options) -> Result<Report, CollectError> {
    let target = Target::parse(input)?;
    Collector::network().collect(&target, options).await
}
