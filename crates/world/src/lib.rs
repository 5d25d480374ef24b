mod active_blocks;
mod block;
mod content;
mod drop_item;
mod entity;
mod error;
mod lifecycle;
mod mob;
mod outbox;
mod persist;
mod registry;
mod species;
mod static_object;
mod storage;
mod time;

pub use active_blocks::*;
pub use block::*;
pub use content::*;
pub use drop_item::*;
pub use entity::*;
pub use error::*;
pub use lifecycle::*;
pub use mob::*;
pub use outbox::*;
pub use persist::*;
pub use registry::*;
pub use species::*;
pub use static_object::*;
pub use storage::*;
pub use time::*;
