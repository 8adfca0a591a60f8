pub mod betting;
pub mod expander;
pub mod session_clock;
pub mod settlement;
pub mod status;
pub mod types;

pub use betting::{BetReceipt, BettingService};
pub use expander::{expand, Selector};
pub use session_clock::SessionClock;
pub use settlement::{SettlementEngine, SettlementReport};
pub use status::GameStatusController;
pub use types::*;
