pub mod client;
pub mod command;
pub mod error;
pub mod event_log;
pub mod fake;
pub mod session;
pub mod tmux;
mod util;

pub use client::*;
pub use command::*;
pub use error::*;
pub use event_log::*;
pub use fake::*;
pub use session::*;
pub use tmux::*;
