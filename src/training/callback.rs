// Trainer lifecycle callbacks
//
// A host training loop owns a CallbackHandler, registers observers with
// add_callback, and fires one dispatch method per lifecycle point.

use anyhow::{Context, Result};
use std::collections::HashMap;

/// Run configuration passed to every hook
#[derive(Debug, Clone)]
pub struct TrainingArgs {
    /// Samples per device per step
    pub per_device_train_batch_size: usize,
}

impl Default for TrainingArgs {
    fn default() -> Self {
        Self {
            per_device_train_batch_size: 8,
        }
    }
}

/// Progress of the run, owned by the host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainerState {
    /// Optimizer steps completed so far
    pub global_step: u64,
    /// Fractional epoch
    pub epoch: f64,
    pub max_steps: u64,
}

/// Flags a callback may set to steer the host loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainerControl {
    pub should_training_stop: bool,
    pub should_epoch_stop: bool,
    pub should_save: bool,
    pub should_evaluate: bool,
    pub should_log: bool,
}

/// Observer of a training run. Every hook defaults to doing nothing.
pub trait TrainerCallback: Send {
    /// Name used in error context and logs
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn on_train_begin(
        &mut self,
        _args: &TrainingArgs,
        _state: &TrainerState,
        _control: &mut TrainerControl,
    ) -> Result<()> {
        Ok(())
    }

    fn on_train_end(
        &mut self,
        _args: &TrainingArgs,
        _state: &TrainerState,
        _control: &mut TrainerControl,
    ) -> Result<()> {
        Ok(())
    }

    fn on_epoch_begin(
        &mut self,
        _args: &TrainingArgs,
        _state: &TrainerState,
        _control: &mut TrainerControl,
    ) -> Result<()> {
        Ok(())
    }

    fn on_epoch_end(
        &mut self,
        _args: &TrainingArgs,
        _state: &TrainerState,
        _control: &mut TrainerControl,
    ) -> Result<()> {
        Ok(())
    }

    fn on_step_begin(
        &mut self,
        _args: &TrainingArgs,
        _state: &TrainerState,
        _control: &mut TrainerControl,
    ) -> Result<()> {
        Ok(())
    }

    fn on_step_end(
        &mut self,
        _args: &TrainingArgs,
        _state: &TrainerState,
        _control: &mut TrainerControl,
    ) -> Result<()> {
        Ok(())
    }

    fn on_log(
        &mut self,
        _args: &TrainingArgs,
        _state: &TrainerState,
        _control: &mut TrainerControl,
        _logs: &HashMap<String, f64>,
    ) -> Result<()> {
        Ok(())
    }

    fn on_save(
        &mut self,
        _args: &TrainingArgs,
        _state: &TrainerState,
        _control: &mut TrainerControl,
    ) -> Result<()> {
        Ok(())
    }
}

/// Registered callbacks, fired in registration order
#[derive(Default)]
pub struct CallbackHandler {
    callbacks: Vec<Box<dyn TrainerCallback>>,
}

impl CallbackHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&mut self, callback: impl TrainerCallback + 'static) {
        self.add_boxed(Box::new(callback));
    }

    pub fn add_boxed(&mut self, callback: Box<dyn TrainerCallback>) {
        tracing::debug!(callback = callback.name(), "Registered trainer callback");
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn callback_names(&self) -> Vec<&str> {
        self.callbacks.iter().map(|cb| cb.name()).collect()
    }

    pub fn on_train_begin(
        &mut self,
        args: &TrainingArgs,
        state: &TrainerState,
        control: &mut TrainerControl,
    ) -> Result<()> {
        self.dispatch("on_train_begin", |cb| cb.on_train_begin(args, state, control))
    }

    pub fn on_train_end(
        &mut self,
        args: &TrainingArgs,
        state: &TrainerState,
        control: &mut TrainerControl,
    ) -> Result<()> {
        self.dispatch("on_train_end", |cb| cb.on_train_end(args, state, control))
    }

    pub fn on_epoch_begin(
        &mut self,
        args: &TrainingArgs,
        state: &TrainerState,
        control: &mut TrainerControl,
    ) -> Result<()> {
        control.should_epoch_stop = false;
        self.dispatch("on_epoch_begin", |cb| cb.on_epoch_begin(args, state, control))
    }

    pub fn on_epoch_end(
        &mut self,
        args: &TrainingArgs,
        state: &TrainerState,
        control: &mut TrainerControl,
    ) -> Result<()> {
        self.dispatch("on_epoch_end", |cb| cb.on_epoch_end(args, state, control))
    }

    pub fn on_step_begin(
        &mut self,
        args: &TrainingArgs,
        state: &TrainerState,
        control: &mut TrainerControl,
    ) -> Result<()> {
        control.should_log = false;
        control.should_save = false;
        control.should_evaluate = false;
        self.dispatch("on_step_begin", |cb| cb.on_step_begin(args, state, control))
    }

    pub fn on_step_end(
        &mut self,
        args: &TrainingArgs,
        state: &TrainerState,
        control: &mut TrainerControl,
    ) -> Result<()> {
        self.dispatch("on_step_end", |cb| cb.on_step_end(args, state, control))
    }

    pub fn on_log(
        &mut self,
        args: &TrainingArgs,
        state: &TrainerState,
        control: &mut TrainerControl,
        logs: &HashMap<String, f64>,
    ) -> Result<()> {
        control.should_log = false;
        self.dispatch("on_log", |cb| cb.on_log(args, state, control, logs))
    }

    pub fn on_save(
        &mut self,
        args: &TrainingArgs,
        state: &TrainerState,
        control: &mut TrainerControl,
    ) -> Result<()> {
        control.should_save = false;
        self.dispatch("on_save", |cb| cb.on_save(args, state, control))
    }

    /// Stops at the first failing callback
    fn dispatch(
        &mut self,
        event: &str,
        mut hook: impl FnMut(&mut dyn TrainerCallback) -> Result<()>,
    ) -> Result<()> {
        for callback in self.callbacks.iter_mut() {
            hook(callback.as_mut())
                .with_context(|| format!("{} failed in {}", callback.name(), event))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;
    impl TrainerCallback for Silent {}

    #[test]
    fn test_default_name_is_type_name() {
        assert_eq!(Silent.name(), "Silent");
    }

    #[test]
    fn test_default_hooks_leave_control_untouched() {
        let mut handler = CallbackHandler::new();
        handler.add_callback(Silent);

        let args = TrainingArgs::default();
        let state = TrainerState::default();
        let mut control = TrainerControl::default();
        handler.on_train_begin(&args, &state, &mut control).unwrap();
        handler.on_step_end(&args, &state, &mut control).unwrap();

        assert_eq!(control, TrainerControl::default());
    }

    #[test]
    fn test_step_begin_clears_per_step_flags() {
        let mut handler = CallbackHandler::new();
        let mut control = TrainerControl {
            should_log: true,
            should_save: true,
            should_training_stop: true,
            ..Default::default()
        };

        handler
            .on_step_begin(&TrainingArgs::default(), &TrainerState::default(), &mut control)
            .unwrap();

        assert!(!control.should_log);
        assert!(!control.should_save);
        // Stopping is sticky across steps
        assert!(control.should_training_stop);
    }
}
