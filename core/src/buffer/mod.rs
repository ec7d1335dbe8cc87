mod ring_buffer;

pub use ring_buffer::{RingBuffer, DEFAULT_BUFFER_CAPACITY};
