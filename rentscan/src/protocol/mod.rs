// rentscan/src/protocol/mod.rs
//! Application payloads exchanged with the peripheral and advertisement matching.

pub mod advert;
pub mod message;
pub mod parser;

pub use advert::TargetMatcher;
pub use message::{Command, MESSAGE_LEN, RentalMessage, RentalStatus};
