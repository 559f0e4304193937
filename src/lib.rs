pub mod command;
pub mod config;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod identity;
pub mod output;
pub mod planner;
pub mod provision;
pub mod resources;
pub mod state;
