//! Server-authoritative snake arena.
//!
//! Each room runs a fixed-rate [`Simulation`] and streams snapshots and
//! deltas to its clients through a [`sync::Synchronizer`].

pub mod collision;
pub mod command;
pub mod config;
pub mod entity;
pub mod error;
pub mod pool;
pub mod registry;
pub mod results;
pub mod room;
pub mod server;
pub mod simulation;
pub mod spatial;
pub mod spawner;
pub mod store;
pub mod sync;
pub mod world;

// Re-export commonly used types
pub use config::Config;
pub use error::{ArenaError, ConfigError, ProtocolViolation};
pub use registry::Registry;
pub use results::{GameResult, ResultSink, SessionEnding};
pub use room::{Room, RoomHandle, RoomPhase, run_room};
pub use server::run;
pub use simulation::{Death, Simulation, TickReport};
