pub mod config;
pub mod events;
pub mod lifecycle;
pub mod protocol;
pub mod state;
pub mod transcript;
pub mod types;
pub mod validation;
pub mod workspace;
pub mod wrap;

pub use config::*;
pub use events::*;
pub use lifecycle::*;
pub use protocol::*;
pub use state::*;
pub use transcript::*;
pub use types::*;
pub use validation::*;
pub use workspace::*;
pub use wrap::*;
