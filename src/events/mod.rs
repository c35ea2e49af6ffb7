pub mod board;
pub mod guild;

pub use board::SignupBoard;
pub use guild::{handle_component, handle_guild_create};
