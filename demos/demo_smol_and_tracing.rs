use anyhow::Result;
use async_keeper::prelude::*;
use smol::Timer;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    FmtSubscriber::builder().with_max_level(Level::TRACE).init();

    let executor = AsyncExecutorBuilder::default()
        .smol_runtime_by_default()
        .build();

    for i in 0..100u64 {
        executor.run_async(&Context::background(), format!("tick-{}", i), move |_ctx| async move {
            Timer::after(Duration::from_millis(i)).await;
            Ok(())
        });
    }

    executor.run_blocking(&Context::background(), "checksum", |_ctx| {
        let sum: u64 = (0..1_000_000u64).sum();
        println!("checksum {}", sum);
        Ok(())
    });

    println!("in flight: {}", executor.in_flight());
    executor.wait();
    println!("in flight: {}", executor.in_flight());
    Ok(())
}
