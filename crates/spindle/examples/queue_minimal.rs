// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

//! Minimal task-queue usage: post work, repeat work, shut down cleanly.

use std::sync::mpsc;
use std::time::Duration;

use spindle::{RepeatingTaskHandle, Task, TaskQueue, ThreadedTaskQueue};

fn main() -> Result<(), spindle::Error> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::TRACE).init();

    let queue = ThreadedTaskQueue::builder("example").spawn()?;

    queue.post(Task::new(|| println!("Hello from the queue!")));

    let handle = RepeatingTaskHandle::builder(&queue).start(|| {
        println!("tick");
        Duration::from_millis(200)
    });

    std::thread::sleep(Duration::from_secs(1));

    // Stop must happen on the queue; wait for it so the drop below finds it stopped.
    let (done_tx, done_rx) = mpsc::channel();
    queue.post(Task::new(move || {
        let mut handle = handle;
        handle.stop();
        done_tx.send(()).expect("main is waiting");
    }));
    done_rx.recv().expect("queue is alive");

    Ok(())
}
