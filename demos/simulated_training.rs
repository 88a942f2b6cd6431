// Toy training loop that reports system metrics through GpuLoggingCallback
//
// Run with: cargo run --example simulated_training
// Then point TensorBoard at runs/simulated_training.

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use trainscope::config::TelemetryConfig;
use trainscope::metrics::{find_event_files, read_event_file};
use trainscope::training::{
    CallbackHandler, GpuLoggingCallback, TrainerControl, TrainerState, TrainingArgs,
};

const STEPS: u64 = 5;

fn main() -> Result<()> {
    trainscope::logging::init_logging("info")?;

    // One subdirectory per run
    let run_name = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let log_dir = PathBuf::from("runs/simulated_training").join(run_name);

    let args = TrainingArgs {
        per_device_train_batch_size: 32,
    };
    let config = TelemetryConfig::new(log_dir, args.per_device_train_batch_size);

    let mut handler = CallbackHandler::new();
    handler.add_callback(GpuLoggingCallback::from_config(&config)?);

    let mut state = TrainerState {
        max_steps: STEPS,
        ..Default::default()
    };
    let mut control = TrainerControl::default();

    handler.on_train_begin(&args, &state, &mut control)?;
    for _ in 0..STEPS {
        handler.on_step_begin(&args, &state, &mut control)?;
        // Stand-in for forward/backward/optimizer
        std::thread::sleep(Duration::from_millis(50));
        state.global_step += 1;
        state.epoch = state.global_step as f64 / STEPS as f64;
        handler.on_step_end(&args, &state, &mut control)?;
    }
    handler.on_train_end(&args, &state, &mut control)?;

    println!("Log directory: {}", config.log_dir.display());
    for path in find_event_files(&config.log_dir)? {
        for record in read_event_file(&path)? {
            println!("{:>4}  {:<36} {:>12.4}", record.step, record.tag, record.value);
        }
    }

    Ok(())
}
