//! Protocol level types shared by the transport bridge.
//!
//! - [`message`]: payload items flowing between emitters, bodies and encoders
//! - [`header`]: native header containers and their translation to `http::HeaderMap`
//! - [`body`]: push/pull body adapters
//! - [`response`]: response head and status text
//! - [`error`]: error types

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod response;
pub use response::ResponseHead;
pub use response::StatusText;

mod error;
pub use error::BodyError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
pub mod header;
