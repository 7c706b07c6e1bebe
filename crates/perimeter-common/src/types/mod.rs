//! Core data types for Perimeter

pub mod account;
pub mod amount;
pub mod ids;
pub mod time;
