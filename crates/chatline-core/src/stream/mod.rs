pub mod decoder;
pub mod event;
pub mod transport;

pub use decoder::{EventStream, FrameDecoder, decode_stream};
pub use event::StreamEvent;
pub use transport::{
    BoxFuture, ByteStream, StreamRequest, StreamTransport, TransportError, with_idle_timeout,
};
