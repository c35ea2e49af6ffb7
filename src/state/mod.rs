pub mod guild_record;
pub mod guild_store;

pub use guild_record::{GuildRecord, GLOBAL_GUILD_ID};
pub use guild_store::{create_shared_guild_store, GuildStore, SharedGuildStore};
