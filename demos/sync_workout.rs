//! Workout sync example
//!
//! Scans for a treadmill advertising the workout service, reads the last
//! workout summary and logs the health records it would write.
//!
//! Run with: cargo run --example sync_workout
//!
//! To scan for longer than the default 20 seconds:
//!   cargo run --example sync_workout -- --timeout 45

use std::sync::Arc;
use std::time::Duration;
use treadmill_workout_ble::{
    btle, AlwaysGranted, LogSink, Result, SyncConfig, SyncOutcome, WorkoutSync,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("warn,treadmill_workout_ble=debug")
        .init();

    println!("Treadmill Workout Sync");
    println!("======================\n");

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let timeout = args
        .iter()
        .position(|arg| arg == "--timeout")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(SyncConfig::DEFAULT_SCAN_TIMEOUT);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let (scanner, connector) = btle::open(tx).await?;

    let mut sync = WorkoutSync::new(
        scanner,
        connector,
        LogSink,
        Arc::new(AlwaysGranted),
        SyncConfig::default().with_scan_timeout(timeout),
    );

    let mut status = sync.subscribe();
    tokio::spawn(async move {
        while let Ok(s) = status.recv().await {
            println!("  > {}", s);
        }
    });

    println!("Looking for a treadmill ({}s timeout)...\n", timeout.as_secs());

    match sync.run(&mut rx).await? {
        SyncOutcome::Saved(workout) => {
            println!("\n=== {} ===", workout.title);
            println!("  Duration:   {} min {} s", workout.elapsed_s / 60, workout.elapsed_s % 60);
            println!("  Distance:   {:.0} m", workout.distance_m);
            println!("  Calories:   {:.0} kcal", workout.calories_kcal);
            println!("  Heart rate: {:.0} bpm", workout.avg_hr);
        }
        SyncOutcome::Incomplete { missing } => {
            println!("\nWorkout incomplete, missing: {}", missing.join(", "));
        }
        other => println!("\nSync did not complete: {:?}", other),
    }

    Ok(())
}
