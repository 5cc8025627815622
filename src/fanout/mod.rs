pub mod hub;
pub mod types;

pub use hub::{Fanout, Subscription, DEFAULT_CAPACITY};
pub use types::{ChannelKey, Envelope, FanoutError};
