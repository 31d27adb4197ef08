// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

//! Shows how controlled time lets a test jump forward without sleeping.
//!
//! Run with `cargo run --example clock_control --features test-util`.

use std::time::Duration;

use chime::ClockControl;

fn main() {
    let control = ClockControl::new();
    let clock = control.to_clock();

    let start = clock.now();
    println!("start: {start:?}");

    // An hour passes instantly.
    control.advance(Duration::from_secs(3600));

    let elapsed = clock.now().saturating_duration_since(start);
    println!("elapsed: {elapsed:?}");
    assert_eq!(elapsed, Duration::from_secs(3600));
}
