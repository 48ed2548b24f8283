//! Reinforcement learning for ad selection: reward statistics per segment
//! derived from the ad event log, and an epsilon-greedy arm selector.

pub mod bandit_state;
pub mod epsilon_greedy;

pub use bandit_state::{ArmStats, BanditState};
pub use epsilon_greedy::{EpsilonGreedySelector, Selection, SelectionMode, SelectionResult};
