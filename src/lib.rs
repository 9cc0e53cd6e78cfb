pub mod agent;
pub mod config;
pub mod errors;
pub mod extract;
pub mod logging;
pub mod messages;
pub mod notifier;
pub mod platform;
pub mod repo;
pub mod review;
pub mod util;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
