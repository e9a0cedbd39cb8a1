//! Extension recommender - cross-extension install recommendations
//!
//! Independently installed extensions register "install X because you have
//! Y" recommendations into a model shared through a machine-local directory.
//! The recommender shows each due target once per host session, merges
//! repeat registrations, and remembers when the user said "never".

pub mod config;
pub mod host;
pub mod recommend;
pub mod storage;

pub use config::Config;
pub use host::{Environment, Host, Interaction, TelemetrySink};
pub use recommend::{DisplayOutcome, RecommendError, RecommendationService};
pub use storage::{Recommendation, RecommendationModel, Store, StoreError, UserChoice};
