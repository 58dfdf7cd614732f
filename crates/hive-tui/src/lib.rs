pub mod action;
pub mod app;
pub mod cmd;
pub mod error;
pub mod event;
pub mod model;
pub mod ops;
pub mod router;
pub mod runner;
pub mod ui;
mod ui_format;

pub use action::*;
pub use app::*;
pub use cmd::*;
pub use error::*;
pub use event::*;
pub use model::*;
pub use router::*;
pub use runner::*;
pub use ui::*;
