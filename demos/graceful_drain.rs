//! # Example: Graceful drain before a reload
//!
//! Run with: `cargo run --example graceful_drain --features logging`

use std::sync::Arc;
use std::time::Duration;

use floodgate::{
    ControllerConfig, JobFn, LogWriter, QueueOptions, RequestController, RunResult, Subscribe,
    WorkError,
};

fn make_job(name: &'static str, work_ms: u64) -> Arc<dyn floodgate::Job> {
    JobFn::arc(name, move || async move {
        println!("[{name}] start (work {work_ms}ms)");
        tokio::time::sleep(Duration::from_millis(work_ms)).await;
        println!("[{name}] done");
        Ok::<(), WorkError>(())
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let controller = RequestController::builder(ControllerConfig::default())
        .with_subscriber(Arc::new(LogWriter) as Arc<dyn Subscribe>)
        .build();
    let point = controller.control_point("shop", "http");

    // A couple of in-flight requests via the synchronous bracket.
    assert_eq!(point.begin_request(), RunResult::Accepted);
    assert_eq!(point.begin_request(), RunResult::Accepted);
    println!("[main] {} requests in flight", controller.active_requests());

    // Begin the suspend; the callback fires from whichever completion drains last.
    let controller_bg = Arc::clone(&controller);
    let waiter = tokio::spawn(async move {
        controller_bg.suspend_and_wait().await;
        println!("[main] drained, safe to reload");
    });
    tokio::task::yield_now().await; // let the suspend register

    // New work queues instead of running while paused.
    point
        .queue_task(make_job("deferred-report", 100), QueueOptions::new())
        .unwrap();

    // Finish the in-flight requests. The freed capacity claims the queued
    // report even while paused; once it completes, the drain callback fires.
    point.request_complete();
    point.request_complete();
    let _ = waiter.await;

    controller.resume();

    controller.shutdown();
    println!("[main] finished");
}
