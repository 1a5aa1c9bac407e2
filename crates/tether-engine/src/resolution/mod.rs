pub mod budget;
pub mod engine;
pub mod result;

pub use budget::strategy_budget;
pub use engine::ResolutionEngine;
pub use result::{
    ResolutionError, ResolutionExhausted, ResolutionOutcome, ResolveOptions, Resolved,
    StrategyFailure,
};
