//! # Transact
//!
//! A strict, contract-driven transaction format over Parcel.
//!
//! ## Architecture
//!
//! This library bridges dynamic `Value`s and the structural rigor of `parcel`.
//! A method call becomes a request buffer (descriptor token followed by the
//! arguments in declaration order); the outcome becomes a reply buffer
//! (descriptor echo followed by either the value or a failure). Nothing here
//! knows how buffers travel; that belongs to the transport.

pub mod codec;
pub mod contract;
pub mod error;
pub mod frame;
pub mod value;


pub use codec::Codec;
pub use codec::decode_val;
pub use codec::decode_vals;
pub use codec::encode_val;
pub use codec::encode_vals;
pub use contract::InterfaceContract;
pub use contract::InterfaceDescriptor;
pub use contract::MethodContract;
pub use contract::TransactionId;
pub use error::Error;
pub use error::Failure;
pub use error::Result;
pub use frame::RequestDecoder;
pub use frame::RequestEncoder;
pub use frame::decode_outcome;
pub use frame::decode_reply;
pub use frame::encode_describe_reply;
pub use frame::encode_outcome;
pub use frame::encode_reply;
pub use frame::map_handles;
pub use value::HandleId;
pub use value::Value;
pub use value::ValueType;
