//! Route handlers module.

pub mod buses;
pub mod health;
