//! Data models for Terminus entities

mod boost;
mod player;
mod premium;
mod purchase;
mod referral;
mod standings;
mod task;

pub use boost::*;
pub use player::*;
pub use premium::*;
pub use purchase::*;
pub use referral::*;
pub use standings::*;
pub use task::*;
