//! Pipeline module runtime
//!
//! A module pulls synchronized input packets from its queues, processes them
//! and hands the result to registered callbacks. In parallel mode [`PipelineModule::spin`]
//! loops on its own thread until shutdown; in step mode each call runs one tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Receives every output packet of a module
pub type OutputCallback<O> = Box<dyn Fn(Arc<O>) + Send + Sync>;

/// Runtime flags and callbacks shared by every module
pub struct ModuleState<O> {
    name: String,
    parallel_run: bool,
    shutdown: Arc<AtomicBool>,
    working: Arc<AtomicBool>,
    callbacks: Vec<OutputCallback<O>>,
}

impl<O> ModuleState<O> {
    pub fn new(name: impl Into<String>, parallel_run: bool) -> Self {
        Self {
            name: name.into(),
            parallel_run,
            shutdown: Arc::new(AtomicBool::new(false)),
            working: Arc::new(AtomicBool::new(false)),
            callbacks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parallel_run(&self) -> bool {
        self.parallel_run
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn set_shutdown(&self, value: bool) {
        self.shutdown.store(value, Ordering::SeqCst);
    }

    pub fn is_working(&self) -> bool {
        self.working.load(Ordering::SeqCst)
    }

    fn set_working(&self, value: bool) {
        self.working.store(value, Ordering::SeqCst);
    }

    pub fn register_callback(&mut self, callback: OutputCallback<O>) {
        self.callbacks.push(callback);
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Flags shared with a [`ModuleHandle`]
    pub fn flags(&self) -> (Arc<AtomicBool>, Arc<AtomicBool>) {
        (Arc::clone(&self.shutdown), Arc::clone(&self.working))
    }
}

/// Controls a module from another thread, typically while it spins
#[derive(Clone)]
pub struct ModuleHandle {
    name: String,
    shutdown: Arc<AtomicBool>,
    working: Arc<AtomicBool>,
    shutdown_queues: Arc<dyn Fn() + Send + Sync>,
}

impl ModuleHandle {
    pub fn new<O>(state: &ModuleState<O>, shutdown_queues: impl Fn() + Send + Sync + 'static) -> Self {
        let (shutdown, working) = state.flags();
        Self {
            name: state.name().to_string(),
            shutdown,
            working,
            shutdown_queues: Arc::new(shutdown_queues),
        }
    }

    /// Stop the module and unblock any pending pop
    pub fn shutdown(&self) {
        info!(module = %self.name, "Shutting down module");
        self.shutdown.store(true, Ordering::SeqCst);
        (self.shutdown_queues)();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn is_working(&self) -> bool {
        self.working.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.name)
            .field("shutdown", &self.is_shutdown())
            .field("working", &self.is_working())
            .finish()
    }
}

/// A processing stage fed by queues
pub trait PipelineModule {
    type Input;
    type Output;

    fn state(&self) -> &ModuleState<Self::Output>;

    /// Pop and synchronize the next input, or `None` if there is nothing to
    /// process this tick. A shut down input queue also shuts the module down.
    fn get_input_packet(&mut self) -> Option<Self::Input>;

    /// Process one input packet
    fn spin_once(&mut self, input: Self::Input) -> Option<Self::Output>;

    /// Whether an input packet could be produced right now
    fn has_work(&self) -> bool;

    /// Shut down every input queue
    fn shutdown_queues(&self);

    /// Resume every input queue
    fn resume_queues(&self);

    /// Handle usable from other threads to stop this module
    fn shutdown_handle(&self) -> ModuleHandle;

    fn name(&self) -> &str {
        self.state().name()
    }

    fn parallel_run(&self) -> bool {
        self.state().parallel_run()
    }

    fn is_working(&self) -> bool {
        self.state().is_working()
    }

    /// Run the module.
    ///
    /// In parallel mode this loops until shutdown and returns `false`. In
    /// step mode it runs a single tick and returns `true` unless the module
    /// is shut down, before or during the tick.
    fn spin(&mut self) -> bool {
        if self.parallel_run() {
            info!(module = %self.name(), "Spinning module");
        }
        while !self.state().is_shutdown() {
            match self.get_input_packet() {
                Some(input) => {
                    self.state().set_working(true);
                    if let Some(output) = self.spin_once(input) {
                        self.push_output_packet(output);
                    }
                    self.state().set_working(false);
                }
                None => {
                    debug!(module = %self.name(), "No input packet this tick");
                }
            }
            if !self.parallel_run() {
                return !self.state().is_shutdown();
            }
        }
        info!(module = %self.name(), "Module shut down");
        false
    }

    /// Hand `output` to every registered callback
    fn push_output_packet(&self, output: Self::Output) {
        let state = self.state();
        if state.callbacks.is_empty() {
            debug!(module = %state.name(), "No output callback registered");
            return;
        }
        let output = Arc::new(output);
        for callback in &state.callbacks {
            callback(Arc::clone(&output));
        }
    }

    /// Stop the module and its queues
    fn shutdown(&self) {
        info!(module = %self.name(), "Shutting down module");
        self.state().set_shutdown(true);
        self.shutdown_queues();
    }

    /// Resume a module that was shut down
    fn restart(&self) {
        info!(module = %self.name(), "Restarting module");
        self.state().set_shutdown(false);
        self.resume_queues();
    }
}
