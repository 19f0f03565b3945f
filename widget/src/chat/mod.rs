//! Chat: bounded display log, pending queue, and the signaling seam.
//!
//! DESIGN
//! ======
//! Remote messages land in the pending queue and reach the display log only
//! through the drain scheduler, which the scroll-pause controller can hold
//! back while the reader is scrolled into history. Local messages skip the
//! queue and are appended immediately.

pub mod message;
pub mod queue;
pub mod scheduler;
pub mod scroll;
pub mod session;
pub mod transport;

pub use message::{ChatMessage, MessageIds};
pub use queue::{ChatLimits, ChatQueueState, ChatQueueStore};
pub use scheduler::DrainScheduler;
pub use scroll::{ScrollMetrics, ScrollPauseController, ScrollSurface};
pub use session::ChatSession;
pub use transport::{ChatTransport, JoinedChannel, LoopbackHub, LoopbackTransport, TransportError, TransportEvent};
