pub mod config;
pub mod instance;
pub mod ipc;
pub mod remote;
pub mod supervisor;
pub mod utils;
pub mod versions;
