pub mod boundary;
pub mod candidate;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hasher;
pub mod interior;
pub mod orchestrator;
pub mod piece_store;

pub use candidate::Candidate;
pub use catalog::{CandidateSource, InMemoryCatalog, SqliteCatalog};
pub use config::MatcherConfig;
pub use error::{Error, Result};
pub use hasher::{PieceHasher, Segment};
pub use orchestrator::{Matcher, SlotResult};
pub use piece_store::{PieceHashStore, SharedPieceHashStore};
