//! # Example: Admission ceilings and timeout eviction
//!
//! Run with: `cargo run --example backpressure`

use std::time::Duration;

use floodgate::{
    ControllerConfig, JobFn, QueueOptions, RequestController, RunResult, WorkError,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let controller = RequestController::builder(ControllerConfig {
        max_requests: 2,
        ..ControllerConfig::default()
    })
    .build();
    let point = controller.control_point("api", "http");

    // Fill the gate.
    assert_eq!(point.begin_request(), RunResult::Accepted);
    assert_eq!(point.begin_request(), RunResult::Accepted);
    assert_eq!(point.begin_request(), RunResult::Rejected);
    println!("[main] gate full: third request rejected");

    // Deferred work parks behind the full gate, with an eviction timeout.
    let job = JobFn::arc("thumbnail", || async {
        println!("[thumbnail] running");
        Ok::<(), WorkError>(())
    });
    let on_timeout = JobFn::arc("thumbnail-503", || async {
        println!("[thumbnail] evicted — responding 503");
        Ok::<(), WorkError>(())
    });
    point
        .queue_task(
            job,
            QueueOptions::new()
                .with_timeout(Duration::from_millis(200))
                .with_on_timeout(on_timeout),
        )
        .unwrap();
    println!("[main] queue depth: {}", point.queue_depth());

    // Freeing capacity lets a completion claim the queue head...
    point.request_complete();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // ...so the timer loses the claim race and the 503 path never runs.
    tokio::time::sleep(Duration::from_millis(300)).await;

    point.request_complete();
    controller.shutdown();
    println!("[main] finished");
}
