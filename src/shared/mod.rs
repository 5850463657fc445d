pub mod errors;
pub mod fs_atomic;
pub mod ids;
pub mod logging;
pub mod state_paths;
pub mod time;
