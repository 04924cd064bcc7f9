//! An HTTP-ish request spawns an audit write and then gets aborted by the client.
//! The audit task runs under a detached context, so it still finishes and still
//! logs with the request's fields.

use anyhow::Result;
use async_keeper::prelude::*;
use std::time::Duration;

#[derive(Debug)]
struct RequestId(u64);

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .init();

    let executor = AsyncExecutor::new(vec![with_uninterrupted_context()]);

    let request = context_with_log_data(
        &Context::background().with_value(RequestId(42)),
        vec![("path", "/orders"), ("user", "alice")],
    );
    let (request, abort) = request.with_timeout(Duration::from_secs(5));

    executor.run_async(&request, "audit", |ctx| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;

        let request_id = ctx.value::<RequestId>().map(|id| id.0).unwrap_or_default();
        Err::<(), _>(anyhow!(
            "audit store rejected request {} (request done: {})",
            request_id,
            ctx.is_done()
        ))
    });

    // The client hangs up right away.
    abort.cancel();
    add_log_data(&request, "status", Some(499))?;
    println!("request finished: {:?}", request.err());

    executor.wait();
    Ok(())
}
