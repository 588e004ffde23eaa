//! An embeddable, length-prefixed TCP server framework.
//!
//! A single-threaded, edge-triggered reactor assembles length-prefixed
//! frames off the wire and hands each complete one to a worker pool built
//! from a user-supplied [`RequestHandler`]. Workers may finish out of
//! order; responses are still written back to each connection in the order
//! their requests arrived.
//!
//! ```no_run
//! use framed::{DefaultHandler, Server};
//!
//! let server = Server::new(DefaultHandler);
//! std::process::exit(server.start(9000, framed::NoEvents));
//! ```

mod error;
mod frame;
mod queues;
mod reactor;
mod recv;
mod request;
mod server;
mod worker;

pub use error::{FrameError, ServerError};
pub use frame::DEFAULT_MAX_FRAME_LEN;
pub use request::{ConnectionId, DefaultHandler, Request, RequestBytes, RequestHandler};
pub use server::{NoEvents, Server, ServerEvents};
