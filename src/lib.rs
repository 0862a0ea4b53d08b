//! Exchange lifecycle and ownership-transfer engine for trading exclusive
//! access to video assets. Offering one's own video is the payment for
//! gaining access to another's.

pub mod error;
pub mod exchange;
pub mod ledger;
pub mod notify;
pub mod rating;
pub mod service;
pub mod types;
pub mod utils;
