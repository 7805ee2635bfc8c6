//! Focus timer for the browser. Runs as a host process next to a browser extension: during
//! focus sessions it blocks distracting sites, during breaks it records which sites were visited,
//! and it keeps a ledger of sessions and of the time spent on each task.
//!

pub mod browser;
pub mod cli;
pub mod daemon;
pub mod enforcer;
pub mod store;
pub mod timer;
pub mod tracker;
pub mod utils;
