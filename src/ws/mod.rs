mod event;
mod inner;
mod recv_loop;
mod websocket;

pub use event::Event;
pub(crate) use inner::ConnInner;
pub use websocket::WebSocket;
