//! `invgate` library crate.
//!
//! Configuration, input loading and report rendering for the `invgate`
//! binary, exposed for integration testing. The entrypoint lives in
//! `main.rs`.

pub mod config;
pub mod load;
pub mod report;
pub mod run;
