pub mod baseline;
pub mod baseline_store;
pub mod buffer;
pub mod config;
pub mod errors;
pub mod failure_tracker;
pub mod ids;
pub mod local_observer;
pub mod model;
pub mod names;
pub mod planner;
pub mod quickxor;
pub mod remote_observer;
pub mod transport;
