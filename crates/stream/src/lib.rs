pub mod backoff;
pub mod checkpoint;
pub mod events;
pub mod handler;
pub mod poll_loop;
pub mod redis_stream;
pub mod source;

pub use backoff::*;
pub use checkpoint::*;
pub use events::*;
pub use handler::*;
pub use poll_loop::*;
pub use redis_stream::*;
pub use source::*;
