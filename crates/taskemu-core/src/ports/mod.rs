//! Ports: the seams between the engine and the outside world.

pub mod clock;
pub mod dispatch;
pub mod id_generator;

pub use self::clock::{Clock, SystemClock, TokioClock};
pub use self::dispatch::Dispatcher;
pub use self::id_generator::{RandomIdGenerator, SequentialIdGenerator, TaskIdGenerator};
