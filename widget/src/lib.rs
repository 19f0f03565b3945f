//! Widget core: chat queue, host control channel, and join choreography for
//! the embeddable live video + chat widget.
//!
//! ARCHITECTURE
//! ============
//! Leaf-first: `chat` owns the bounded message log, its drain scheduler, the
//! scroll-pause controller, and the signaling transport seam. `control` owns
//! the cross-frame channel to the host page. `media` abstracts the streaming
//! backend. `state` holds the visibility mode and per-subsystem connection
//! lifecycle, `emoji` the picker and its timers, `config` the environment
//! settings. `session` composes everything into one explicitly constructed
//! widget session; nothing in this crate is a process-wide singleton.

pub mod chat;
pub mod config;
pub mod control;
pub mod emoji;
pub mod media;
pub mod session;
pub mod state;

pub use config::WidgetConfig;
pub use session::WidgetSession;
