//! Tournament lifecycle events
//!
//! Lanes, the round coordinator and the controller publish what they do to
//! a broadcast [`EventBus`]. Nothing in the engine subscribes: the bus feeds
//! logs, tests and anyone embedding the engine.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Lane runners │────▶│  Event Bus   │────▶│  Subscribers │
//! │ Coordinator  │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::TournamentEvent;
