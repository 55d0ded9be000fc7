pub mod item;
pub mod memory;
pub mod sqlite;
pub mod writer;
