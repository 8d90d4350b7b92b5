//! Request handlers, one module per audience.

pub mod account;
pub mod admin;
pub mod bookings;
pub mod catalog;
pub mod owner;
