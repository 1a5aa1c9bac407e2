pub mod diagnostics;
pub mod executor;

pub use diagnostics::{Artifact, DiagnosticsSink, DirectorySink, MemorySink};
pub use executor::{ActionError, ActionExecutor};
