pub mod bitfield;
pub mod message;
pub mod request;
