pub mod driver;
pub mod session;
pub mod transport;


pub use driver::StreamDriver;
pub use session::StreamSession;
pub use transport::{ClassifyTransport, ResponseStream};
