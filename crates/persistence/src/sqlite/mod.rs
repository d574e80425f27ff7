//! SQLite database management

mod connection;
mod boosts;
mod players;
mod premium;
mod purchases;
mod referrals;
mod standings;
mod tasks;

pub use connection::Database;
pub use boosts::*;
pub use players::*;
pub use premium::*;
pub use purchases::*;
pub use referrals::*;
pub use standings::*;
pub use tasks::*;
