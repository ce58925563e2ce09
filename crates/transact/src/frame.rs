//! # Transaction Frames
//!
//! Layout of request and reply buffers.
//!
//! ```text
//! request := String(descriptor) List(args...)
//! reply   := String(descriptor) outcome
//! outcome := ResultOk(value) | ResultErr(Variant(tag, payload))
//! ```
//!
//! ## Invariants
//! - **Descriptor Echo**: A reply must start with the caller's descriptor.
//! - **Panic Safety**: Every decoding path returns `Result`.
//! - **Closed Discriminants**: An outcome that is neither `ResultOk` nor
//!   `ResultErr`, or an unknown failure tag, is a `ProtocolError`.
//! - **Fixed-Width Tokens**: Handle tokens are always 8 bytes, so a buffer
//!   can be retargeted to another token table in place.

use parcel::Decoder;
use parcel::Encoder;
use parcel::Tag;

use crate::codec::Codec;
use crate::contract::InterfaceDescriptor;
use crate::contract::TransactionId;
use crate::error::Error;
use crate::error::Failure;
use crate::error::Result;
use crate::value::HandleId;
use crate::value::Value;
use crate::value::ValueType;

/// Encodes an outbound request.
pub struct RequestEncoder<'a> {
    pub descriptor: &'a InterfaceDescriptor,
    pub args: &'a [Value],
}

impl<'a> RequestEncoder<'a> {
    pub fn new(descriptor: &'a InterfaceDescriptor, args: &'a [Value]) -> Self {
        Self { descriptor, args }
    }

    /// Encode this request into the encoder.
    pub fn encode(&self, enc: &mut Encoder, codec: &Codec) -> Result<()> {
        enc.str(self.descriptor.as_str())?;
        codec.encode_vals(enc, self.args)
    }

    /// Encode this request into a fresh buffer.
    pub fn into_bytes(self, codec: &Codec) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        self.encode(&mut enc, codec)?;
        Ok(enc.into_bytes()?)
    }
}

/// Decodes an inbound request header.
///
/// **Invariant**: `args` points at the List container holding the arguments.
pub struct RequestDecoder<'a> {
    pub descriptor: &'a str,
    /// Use `Codec::decode_vals` with this decoder and the method's parameters.
    pub args: Decoder<'a>,
}

impl<'a> RequestDecoder<'a> {
    pub fn decode(bytes: &'a [u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let descriptor = dec.str()?;
        Ok(Self { descriptor, args: dec })
    }
}

/// Encodes a complete reply buffer for `outcome`.
pub fn encode_reply(
    descriptor: &InterfaceDescriptor,
    outcome: &Result<Value>,
    codec: &Codec,
) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    enc.str(descriptor.as_str())?;
    encode_outcome(&mut enc, outcome, codec)?;
    Ok(enc.into_bytes()?)
}

/// Encodes a reply buffer announcing `descriptor`, used to answer
/// `TransactionId::DESCRIBE_SELF`.
pub fn encode_describe_reply(descriptor: &InterfaceDescriptor) -> Result<Vec<u8>> {
    encode_reply(descriptor, &Ok(Value::String(descriptor.to_string())), &Codec::default())
}

/// Encodes the outcome discriminant followed by the value or the failure.
pub fn encode_outcome(enc: &mut Encoder, outcome: &Result<Value>, codec: &Codec) -> Result<()> {
    match outcome {
        Ok(value) => {
            enc.result_ok_begin()?;
            codec.encode_val(enc, value)?;
            enc.result_ok_end()?;
        }
        Err(error) => {
            enc.result_err_begin()?;
            enc.variant_begin(error.as_tag())?;
            encode_error_payload(enc, error)?;
            enc.variant_end()?;
            enc.result_err_end()?;
        }
    }
    Ok(())
}

fn encode_error_payload(enc: &mut Encoder, error: &Error) -> Result<()> {
    match error {
        Error::Application(failure) => {
            enc.list_begin()?;
            enc.str(&failure.kind)?;
            enc.str(&failure.message)?;
            enc.list_end()?;
        }
        Error::DescriptorMismatch { expected, found } => {
            enc.list_begin()?;
            enc.str(expected)?;
            enc.str(found)?;
            enc.list_end()?;
        }
        Error::UnknownTransaction { descriptor, id } => {
            enc.list_begin()?;
            enc.str(descriptor)?;
            enc.u32(id.0)?;
            enc.list_end()?;
        }
        Error::UnknownReference(token) => enc.handle(*token)?,
        Error::MalformedTransaction(msg)
        | Error::ProtocolError(msg)
        | Error::TransportClosed(msg) => enc.str(msg)?,
    }
    Ok(())
}

/// Decodes a complete reply buffer, checking the descriptor echo.
///
/// An empty buffer means the transport completed without a reply and is
/// reported as `TransportClosed`.
pub fn decode_reply(
    bytes: &[u8],
    expected: &InterfaceDescriptor,
    returns: &ValueType,
    codec: &Codec,
) -> Result<Value> {
    if bytes.is_empty() {
        return Err(Error::TransportClosed("transaction completed without a reply".into()));
    }

    let mut dec = Decoder::new(bytes);
    let found = dec.str()?;
    if expected != found {
        return Err(Error::DescriptorMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        });
    }

    let value = decode_outcome(&mut dec, returns, codec)?;
    if !dec.is_empty() {
        return Err(Error::MalformedTransaction(format!(
            "{} trailing bytes after outcome", dec.remaining()
        )));
    }
    Ok(value)
}

/// Decodes an outcome, re-raising a remote failure as a local `Err`.
pub fn decode_outcome(dec: &mut Decoder, returns: &ValueType, codec: &Codec) -> Result<Value> {
    match dec.peek_tag() {
        Ok(Tag::ResultOk) | Ok(Tag::ResultErr) => {}
        Ok(tag) => {
            return Err(Error::ProtocolError(format!("unrecognized reply discriminant {:?}", tag)));
        }
        Err(parcel::Error::InvalidTag(b)) => {
            return Err(Error::ProtocolError(format!("unrecognized reply discriminant {:#04x}", b)));
        }
        Err(e) => return Err(e.into()),
    }

    match dec.result()? {
        Ok(mut body) => {
            let value = codec.decode_val(&mut body, returns)?;
            if !body.is_empty() {
                return Err(Error::MalformedTransaction("trailing bytes in reply value".into()));
            }
            Ok(value)
        }
        Err(mut body) => Err(decode_error(&mut body)?),
    }
}

fn decode_error(body: &mut Decoder) -> Result<Error> {
    let (tag, mut payload) = body.variant()?;

    let error = match tag {
        "Application" => {
            let [kind, message] = read_str_pair(&mut payload)?;
            Error::Application(Failure::new(kind, message))
        }
        "DescriptorMismatch" => {
            let [expected, found] = read_str_pair(&mut payload)?;
            Error::DescriptorMismatch { expected, found }
        }
        "UnknownTransaction" => {
            let mut items = payload.list()?;
            let descriptor = next_item(&mut items)?.str()?.to_string();
            let id = next_item(&mut items)?.u32()?;
            Error::UnknownTransaction { descriptor, id: TransactionId(id) }
        }
        "UnknownReference" => Error::UnknownReference(payload.handle()?),
        "MalformedTransaction" => Error::MalformedTransaction(payload.str()?.to_string()),
        "ProtocolError" => Error::ProtocolError(payload.str()?.to_string()),
        "TransportClosed" => Error::TransportClosed(payload.str()?.to_string()),
        other => return Err(Error::ProtocolError(format!("unknown failure tag '{}'", other))),
    };

    Ok(error)
}

fn next_item<'a>(items: &mut parcel::ListIter<'a>) -> Result<Decoder<'a>> {
    items.next()?.ok_or_else(|| Error::MalformedTransaction("failure payload too short".into()))
}

fn read_str_pair(payload: &mut Decoder) -> Result<[String; 2]> {
    let mut items = payload.list()?;
    let first = next_item(&mut items)?.str()?.to_string();
    let second = next_item(&mut items)?.str()?.to_string();
    Ok([first, second])
}

/// Rewrites every handle token of a request or reply buffer in place.
///
/// Failure replies are left untouched: the only token they can carry is the
/// one an `UnknownReference` failed to find.
pub fn map_handles(buf: &mut [u8], mut f: impl FnMut(HandleId) -> Result<HandleId>) -> Result<()> {
    if is_failure_reply(buf) {
        return Ok(());
    }

    for at in parcel::handle_offsets(buf)? {
        let slot = buf
            .get_mut(at..at + 8)
            .ok_or_else(|| Error::MalformedTransaction("handle token out of bounds".into()))?;
        let mut token = [0u8; 8];
        token.copy_from_slice(slot);
        let mapped = f(HandleId(u64::from_le_bytes(token)))?;
        slot.copy_from_slice(&mapped.0.to_le_bytes());
    }
    Ok(())
}

fn is_failure_reply(buf: &[u8]) -> bool {
    let mut dec = Decoder::new(buf);
    dec.str().is_ok() && matches!(dec.peek_tag(), Ok(Tag::ResultErr))
}
