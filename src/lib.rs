//! Incremental collapsed Gibbs sampling for Dirichlet process mixture models.
//!
//! Given `N` items and a marginal likelihood over subsets of those items, the
//! sampler explores partitions of the items into an unknown number of blocks
//! with single-item Gibbs moves under a Chinese restaurant process prior.
//!
//! ```no_run
//! use crp_gibbs::{GibbsConfig, PartitionGibbs};
//! use rand::SeedableRng;
//!
//! let data = vec![-3.1, -2.9, 3.0, 3.2];
//! // Any pure function of a set of values works as a marginal likelihood.
//! let flat = |_xs: &[&f64]| 0.0;
//!
//! let mut rng = rand::rngs::SmallRng::seed_from_u64(0x1234);
//! let mut sampler = PartitionGibbs::new(data, flat, GibbsConfig::default()).unwrap();
//! sampler.initialize(&mut rng).unwrap();
//! let history = sampler.run(1_000, &mut rng).unwrap();
//! ```
pub mod config;
pub mod data;
pub mod error;
pub mod mcmc;
pub mod models;
pub mod rvs;

pub(crate) mod utils;

pub use config::GibbsConfig;
pub use data::partition::{Block, BlockId, PartitionStore};
pub use error::{Error, Result};
pub use mcmc::history::{HistoryRecord, HistorySink};
pub use mcmc::samplers::partition::gibbs::PartitionGibbs;
pub use mcmc::Sampler;
pub use models::likelihood::MarginalLikelihood;
pub use models::Model;
