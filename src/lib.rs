//! # GTP Tournament
//!
//! A crate for running unattended rating tournaments between board-game engines speaking the Go
//! Text Protocol (GTP) over their standard streams.
//!
//! It provides:
//! - A process transport matching every response to its request despite asynchronous I/O
//!   ([`transport`])
//! - A typed, capability-checked engine client ([`EngineClient`](crate::engine::EngineClient))
//! - Elo-style ratings with decaying adaptation rates ([`rating`])
//! - A match scheduler pairing engines by rating, resuming saved games and judging every move
//!   with an independent engine ([`MatchScheduler`](crate::scheduler::MatchScheduler))
//!
//! Every engine runs as a separate OS process. The scheduler only calls typed client methods,
//! the client only talks to its transport, and the transport is the only part touching the
//! child's pipes.
//!
//! # Documentation Overview
//!
//! - For the game loop, the pairing rule and result tags, see the [`scheduler`] module.
//! - For configuring a run and describing engines, see
//!   [`Configuration`](crate::configuration::Configuration) and the [`configuration`] module.
//! - For driving a single engine, see the [`engine`] module.
//!
//! # Usage Example
//!
//! ```no_run
//! use gtp_tournament::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let engines = vec![
//!         EngineDescriptor::new("judge", "gnugo --mode gtp").with_role(EngineRole::Judge),
//!         EngineDescriptor::new("gnugo-1", "gnugo --mode gtp --level 1")
//!             .with_role(EngineRole::Fixed)
//!             .with_elo(1000.0),
//!         EngineDescriptor::new("gnugo-10", "gnugo --mode gtp --level 10"),
//!     ];
//!
//!     let config = Configuration::new()
//!         .with_board_size(9)
//!         .with_komi(7.0)
//!         .with_results_path("results.json");
//!
//!     let mut scheduler = MatchScheduler::from_descriptors(engines, config)?;
//!     let results = scheduler.run(Some(20))?;
//!     scheduler.shutdown();
//!
//!     for engine in results.ranked() {
//!         println!("{}: {:.0}", engine.name, engine.rating);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Talking to one engine
//!
//! ```no_run
//! use gtp_tournament::prelude::*;
//!
//! fn main() -> Result<(), GtpError> {
//!     let mut engine = EngineClient::launch("gnugo --mode gtp", EngineOptions::player())?;
//!     engine.boardsize(9)?;
//!     engine.clear_board()?;
//!     engine.play(Color::Black, "E5".parse()?)?;
//!     let reply = engine.genmove(Color::White)?;
//!     println!("{} answers {reply}", engine.name()?);
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub use anyhow;
pub mod configuration;
pub mod engine;
mod engine_entry;
pub mod error;
mod logger;
pub mod query;
pub mod rating;
pub mod results;
pub mod scheduler;
pub mod sgf;
pub mod transport;
pub mod turn;
pub mod vertex;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use gtp_tournament::prelude::*;
/// ```
///
/// Includes:
/// - [`Configuration`](crate::configuration::Configuration) and engine descriptors
/// - [`EngineClient`](crate::engine::EngineClient) and its options
/// - [`MatchScheduler`](crate::scheduler::MatchScheduler)
/// - the value types [`Color`](crate::vertex::Color), [`Vertex`](crate::vertex::Vertex) and
///   [`Rating`](crate::rating::Rating)
pub mod prelude {
    pub use crate::configuration::{load_descriptors, Configuration, EngineDescriptor, EngineRole};
    pub use crate::engine::{EngineClient, EngineOptions, Lifecycle, Role};
    pub use crate::error::GtpError;
    pub use crate::rating::{Rating, RatingDecay};
    pub use crate::results::ResultsTable;
    pub use crate::scheduler::{GameOutcome, MatchScheduler};
    pub use crate::sgf::GameRecord;
    pub use crate::vertex::{Color, Vertex};
}
