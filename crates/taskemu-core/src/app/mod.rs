//! Administrative layer: the emulator registry and its builder.

pub mod builder;
pub mod registry;
mod tombstone;

pub use self::builder::{BuildError, EmulatorBuilder};
pub use self::registry::Emulator;
