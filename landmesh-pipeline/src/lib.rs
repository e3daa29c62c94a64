//! Pipeline runtime for landmesh
//!
//! Thread-safe queues, the generic module spin loop, and the mesher stage
//! that pairs frontend and backend packets by timestamp.

pub mod mesher_module;
pub mod module;
pub mod queue;

pub use mesher_module::*;
pub use module::*;
pub use queue::*;

pub use landmesh_mesher::{BackendOutput, FrontendOutput, MesherInput, MesherOutput};
