//! Minimal driver showing the engine-side contract: build a tree, enqueue
//! it, then call `step` once per tick until the executor runs dry.
//!
//! Run with `RUST_LOG=debug` to see named-scope logging.

use std::time::Duration;

use coroutines::{Executor, named_scope, nodes, race, repeat, scope, sequence, wait};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut exec = Executor::new();
    let tree = race(nodes![
        scope(
            |status| println!("patrol ended: {status}"),
            named_scope(
                "patrol",
                repeat(sequence(nodes![wait(0.5), || println!("patrol tick")])),
            ),
        ),
        wait(3.0),
    ]);
    exec.enqueue(&tree);

    while exec.has_remaining_work() {
        exec.step(0.1);
        std::thread::sleep(Duration::from_millis(100));
    }
}
