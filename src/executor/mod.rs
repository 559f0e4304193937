pub mod engine;
pub mod process;
pub mod retry;
pub mod transport;
