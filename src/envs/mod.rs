pub mod counter;
pub mod random_walk;

use std::time::Duration;

pub use counter::CounterEnv;
pub use random_walk::RandomWalkEnv;

use crate::core::BoxedEnv;
use crate::registry::{KwArgs, Registry, kwarg_or};

/// Registry of the environments shipped with the crate.
///
/// - `Counter`: kwargs `size` (default 10), `sleep_ms` (default 0)
/// - `RandomWalk`: kwargs `bound` (default 5)
pub fn builtin() -> Registry<BoxedEnv<i64, i64>> {
    Registry::new()
        .with("Counter", |k: &KwArgs| {
            let size = kwarg_or(k, "size", 10i64)?;
            let sleep = Duration::from_millis(kwarg_or(k, "sleep_ms", 0u64)?);
            Ok(Box::new(CounterEnv::new(size).with_sleep(sleep)) as BoxedEnv<i64, i64>)
        })
        .with("RandomWalk", |k: &KwArgs| {
            let bound = kwarg_or(k, "bound", 5i64)?;
            Ok(Box::new(RandomWalkEnv::new(bound)) as BoxedEnv<i64, i64>)
        })
}
