//! Outer adapters: CSV event scripts in, CSV state reports out.

pub mod csv;
pub mod simulator;
