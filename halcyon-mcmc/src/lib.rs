//! Proposal engine for MCMC over time-calibrated binary trees.
//!
//! `halcyon-mcmc` supplies everything between "here is the current
//! state" and "here is a candidate state with its log Hastings ratio":
//!
//! - **Tree model** — Arena-backed [`TimeTree`] with per-node heights
//! - **Kernels** — Bimodal Bactrian and self-tuning mirror perturbation draws
//! - **Topology operators** — Subtree-slide, NNI, SPR, guided reattachment
//! - **Parameter operators** — Scale, random-walk, interval, bit-flip,
//!   tip-date walk, sample-from-prior
//! - **Adaptive sampling** — A meta-operator that learns which moves work
//! - **Scheduling** — Weighted operator selection with kernel upgrades
//!
//! Posterior evaluation and the chain driver loop live with the caller;
//! operators only mutate state and report ratios, and the driver rolls
//! back rejected proposals itself.

pub mod adaptive;
pub mod attach;
pub mod bitflip;
pub mod constraint;
pub mod distance;
pub mod kernel;
pub mod nni;
pub mod operator;
pub mod parameter;
pub mod prior;
pub mod sample_prior;
pub mod scale;
pub mod schedule;
pub mod slide;
pub mod spr;
pub mod state;
pub mod stats;
pub mod tree;
pub mod walk;

pub use adaptive::{AdaptiveOperatorSampler, AdaptiveStateRecord, Tracked};
pub use attach::AttachOperator;
pub use bitflip::BitFlipOperator;
pub use constraint::CladeGroups;
pub use distance::{DistanceProvider, TraitDistance, UniformDistance};
pub use kernel::{Bactrian, Kernel, Mirror};
pub use nni::NearestNeighbourInterchange;
pub use operator::{Operator, Tuning, TARGET_ACCEPTANCE};
pub use parameter::{BoolParameter, RealParameter};
pub use prior::{Exponential, Gamma, Normal, Prior, Uniform};
pub use sample_prior::SampleFromPrior;
pub use scale::{ScaleOperator, ScaleTarget};
pub use schedule::OperatorSchedule;
pub use slide::SubtreeSlide;
pub use spr::SubtreePruneRegraft;
pub use state::{ChainState, FlagId, ParamId};
pub use stats::Welford;
pub use tree::{NodeId, TimeNode, TimeTree};
pub use walk::{IntervalOperator, RandomWalkOperator, TipDateRandomWalk};
