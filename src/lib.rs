// Library surface for the binary, headless integration tests and reuse.
pub mod app;
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod countdown;
pub mod format;
pub mod history;
pub mod identity;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod solve_timer;
pub mod ui;
pub mod util;
