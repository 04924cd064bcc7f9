use anyhow::Result;
use async_keeper::prelude::*;
use std::time::Duration;
use tokio::time::sleep;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // a builder for `FmtSubscriber`.
    FmtSubscriber::builder()
        // all spans/events with a level higher than TRACE (e.g, debug, info, warn, etc.)
        // will be written to stdout.
        .with_max_level(Level::DEBUG)
        // completes the builder.
        .init();

    // Built inside `#[tokio::main]`, so tasks land on this runtime.
    let executor = AsyncExecutorBuilder::default().build();
    let ctx = context_with_log_data(&Context::background(), vec![("service", "demo")]);

    for i in 0..5u64 {
        executor.run_async(&ctx, format!("print-{}", i), move |_ctx| async move {
            sleep(Duration::from_millis(100 * i)).await;
            println!("task {} done", i);
            Ok(())
        });
    }

    // Shows up as an `error` line.
    executor.run_async(&ctx, "flaky-upstream", |_ctx| async move {
        sleep(Duration::from_millis(50)).await;
        Err::<(), _>(anyhow!("upstream returned 503"))
    });

    // Shows up as a `panic` line, the process carries on.
    executor.run_async(&ctx, "buggy", buggy);

    executor.wait_async().await;
    println!("all background work drained");
    Ok(())
}

async fn buggy(_ctx: Context) -> AnyResult<()> {
    let slots: Vec<u8> = Vec::new();
    let index = std::env::args().count();
    println!("{}", slots[index]);
    Ok(())
}
