use std::time::Duration;

/// Wait window for each of `strategies` expressions sharing `total`.
///
/// An even share of the total, capped at `ceiling`, never below `floor`
/// (nor above `total` itself).
pub fn strategy_budget(
    total: Duration,
    strategies: usize,
    ceiling: Duration,
    floor: Duration,
) -> Duration {
    if strategies == 0 {
        return Duration::ZERO;
    }
    let share = total / u32::try_from(strategies).unwrap_or(u32::MAX);
    share.min(ceiling).max(floor.min(total))
}
