//! Mesher pipeline stage
//!
//! The backend queue drives the stage: each backend packet is paired with
//! the frontend packet carrying the same timestamp. Frontend packets older
//! than the backend packet are discarded for good.

use crate::module::{ModuleHandle, ModuleState, PipelineModule};
use crate::queue::{PopError, ThreadsafeQueue};
use landmesh_mesher::{BackendOutput, FrontendOutput, Mesher, MesherInput, MesherOutput};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub type FrontendQueue = ThreadsafeQueue<Arc<FrontendOutput>>;
pub type BackendQueue = ThreadsafeQueue<Arc<BackendOutput>>;

/// Synchronizes frontend and backend packets and runs the mesher on them
pub struct MesherModule {
    state: ModuleState<MesherOutput>,
    frontend_queue: FrontendQueue,
    backend_queue: BackendQueue,
    mesher: Mesher,
}

impl MesherModule {
    pub const NAME: &'static str = "Mesher";

    pub fn new(parallel_run: bool, mesher: Mesher) -> Self {
        Self {
            state: ModuleState::new(Self::NAME, parallel_run),
            frontend_queue: ThreadsafeQueue::unbounded("mesher_frontend"),
            backend_queue: ThreadsafeQueue::unbounded("mesher_backend"),
            mesher,
        }
    }

    pub fn fill_frontend_queue(&self, packet: Arc<FrontendOutput>) -> bool {
        self.frontend_queue.push(packet)
    }

    pub fn fill_backend_queue(&self, packet: Arc<BackendOutput>) -> bool {
        self.backend_queue.push(packet)
    }

    /// Producer side of the frontend queue
    pub fn frontend_queue(&self) -> FrontendQueue {
        self.frontend_queue.clone()
    }

    /// Producer side of the backend queue
    pub fn backend_queue(&self) -> BackendQueue {
        self.backend_queue.clone()
    }

    pub fn register_output_callback(&mut self, callback: impl Fn(Arc<MesherOutput>) + Send + Sync + 'static) {
        self.state.register_callback(Box::new(callback));
    }

    pub fn mesher(&self) -> &Mesher {
        &self.mesher
    }

    pub fn mesher_mut(&mut self) -> &mut Mesher {
        &mut self.mesher
    }
}

impl PipelineModule for MesherModule {
    type Input = MesherInput;
    type Output = MesherOutput;

    fn state(&self) -> &ModuleState<MesherOutput> {
        &self.state
    }

    fn get_input_packet(&mut self) -> Option<MesherInput> {
        let popped = if self.parallel_run() {
            self.backend_queue.pop_blocking()
        } else {
            self.backend_queue.pop()
        };
        let backend = match popped {
            Ok(packet) => packet,
            Err(PopError::Shutdown) => {
                warn!(module = Self::NAME, "Backend queue shut down, no more input");
                self.state.set_shutdown(true);
                return None;
            }
            Err(e) => {
                debug!(module = Self::NAME, reason = %e, "No backend packet");
                return None;
            }
        };

        let timestamp = backend.timestamp;
        let frontend = loop {
            match self.frontend_queue.pop() {
                Ok(packet) if packet.timestamp == timestamp => break packet,
                Ok(packet) => {
                    debug!(
                        module = Self::NAME,
                        discarded = packet.timestamp,
                        expected = timestamp,
                        "Discarding frontend packet"
                    );
                }
                Err(PopError::Shutdown) => {
                    warn!(module = Self::NAME, timestamp, "Frontend queue shut down, no more input");
                    self.state.set_shutdown(true);
                    return None;
                }
                Err(e) => {
                    error!(
                        module = Self::NAME,
                        timestamp,
                        reason = %e,
                        "No frontend packet for backend timestamp"
                    );
                    return None;
                }
            }
        };

        match MesherInput::new(timestamp, frontend, backend) {
            Ok(input) => Some(input),
            Err(e) => {
                error!(module = Self::NAME, error = %e, "Failed to build mesher input");
                None
            }
        }
    }

    fn spin_once(&mut self, input: MesherInput) -> Option<MesherOutput> {
        Some(self.mesher.spin_once(&input))
    }

    fn has_work(&self) -> bool {
        !self.backend_queue.is_empty()
    }

    fn shutdown_queues(&self) {
        self.frontend_queue.shutdown();
        self.backend_queue.shutdown();
    }

    fn resume_queues(&self) {
        self.frontend_queue.resume();
        self.backend_queue.resume();
    }

    fn shutdown_handle(&self) -> ModuleHandle {
        let frontend = self.frontend_queue.clone();
        let backend = self.backend_queue.clone();
        ModuleHandle::new(&self.state, move || {
            frontend.shutdown();
            backend.shutdown();
        })
    }
}
