pub mod detector;
pub mod state;

pub use detector::CompletionDetector;
pub use state::{CompletionError, CompletionOutcome, CompletionState};
