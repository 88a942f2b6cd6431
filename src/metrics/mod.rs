// Metrics module
// Scalar records and the sinks that persist them

mod event_file;
mod proto;
mod sink;
pub mod tfrecord;
mod types;

pub use event_file::{find_event_files, read_event_file, EventFileWriter};
pub use sink::{open_sink, read_jsonl, JsonlSink, MemorySink, ScalarSink};
pub use types::{
    wall_time_now, ScalarRecord, TAG_ELAPSED_TRAINING_TIME, TAG_GPU_ALLOCATED,
    TAG_GPU_MAX_ALLOCATED, TAG_GPU_RESERVED, TAG_SAMPLES_PER_SEC, TAG_STEP_TIME,
    TAG_TOTAL_TRAINING_TIME,
};
