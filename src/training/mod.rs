// Training module - metrics logger and trainer lifecycle callbacks

pub mod callback;
pub mod clock;
pub mod gpu_callback;
pub mod system_logger;

pub use callback::{CallbackHandler, TrainerCallback, TrainerControl, TrainerState, TrainingArgs};
pub use clock::{Clock, ManualClock, SystemClock};
pub use gpu_callback::GpuLoggingCallback;
pub use system_logger::SystemMetricsLogger;
