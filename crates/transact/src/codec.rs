//! # Codec
//!
//! The translation layer between `Value` and the parcel wire format.
//!
//! ## Invariants
//! - **Declaration Order**: Argument lists are encoded and decoded strictly in
//!   the order of the method's parameter list. This is the wire contract.
//! - **Recursion Safety**: Nesting is bounded by `Codec::max_depth`.
//! - **Type Strictness**: Decoding verifies wire tags against the declared
//!   `ValueType`; any disagreement is a `MalformedTransaction`.

use parcel::Decoder;
use parcel::Encoder;

use crate::error::Error;
use crate::error::Result;
use crate::value::Value;
use crate::value::ValueType;

/// Default maximum nesting depth for values.
pub const MAX_DEPTH: usize = 64;

/// Value marshalling with a configurable nesting bound.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Codec {
    max_depth: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self { max_depth: MAX_DEPTH }
    }
}

impl Codec {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Encodes a single value.
    pub fn encode_val(&self, enc: &mut Encoder, val: &Value) -> Result<()> {
        self.encode_impl(enc, val, 0)
    }

    /// Encodes an argument list as one List container.
    pub fn encode_vals(&self, enc: &mut Encoder, vals: &[Value]) -> Result<()> {
        enc.list_begin()?;
        for val in vals {
            self.encode_impl(enc, val, 1)?;
        }
        enc.list_end()?;
        Ok(())
    }

    fn encode_impl(&self, enc: &mut Encoder, val: &Value, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(depth_exceeded(self.max_depth));
        }

        match val {
            Value::Void => enc.unit()?,
            Value::Bool(b) => enc.bool(*b)?,
            Value::I32(v) => enc.s32(*v)?,
            Value::I64(v) => enc.s64(*v)?,
            Value::String(s) => enc.str(s)?,
            Value::Handle(id) => enc.handle(id.0)?,
            Value::List(items) => {
                enc.list_begin()?;
                for item in items {
                    self.encode_impl(enc, item, depth + 1)?;
                }
                enc.list_end()?;
            }
        }
        Ok(())
    }

    /// Decodes a single value of the declared type.
    pub fn decode_val(&self, dec: &mut Decoder, ty: &ValueType) -> Result<Value> {
        self.decode_impl(dec, ty, 0)
    }

    /// Decodes an argument list, one value per declared type.
    pub fn decode_vals(&self, dec: &mut Decoder, types: &[ValueType]) -> Result<Vec<Value>> {
        let mut items = dec.list()?;
        let mut vals = Vec::with_capacity(types.len());

        for ty in types {
            let Some(mut item) = items.next()? else {
                return Err(Error::MalformedTransaction(format!(
                    "fewer args than types: expected {}, got {}", types.len(), vals.len()
                )));
            };
            vals.push(self.decode_impl(&mut item, ty, 1)?);
        }

        if items.next()?.is_some() {
            return Err(Error::MalformedTransaction(format!(
                "more args than types: expected {}", types.len()
            )));
        }

        Ok(vals)
    }

    fn decode_impl(&self, dec: &mut Decoder, ty: &ValueType, depth: usize) -> Result<Value> {
        if depth > self.max_depth {
            return Err(depth_exceeded(self.max_depth));
        }

        match ty {
            ValueType::Void => { dec.unit()?; Ok(Value::Void) }
            ValueType::Bool => Ok(Value::Bool(dec.bool()?)),
            ValueType::I32 => Ok(Value::I32(dec.s32()?)),
            ValueType::I64 => Ok(Value::I64(dec.s64()?)),
            ValueType::String => Ok(Value::String(dec.str()?.to_string())),
            ValueType::Handle => Ok(Value::Handle(crate::value::HandleId(dec.handle()?))),
            ValueType::List(inner) => {
                let mut items = dec.list()?;
                let mut list = Vec::new();
                while let Some(mut item) = items.next()? {
                    list.push(self.decode_impl(&mut item, inner, depth + 1)?);
                }
                Ok(Value::List(list))
            }
        }
    }

    /// Checks an argument list against the declared parameter types before
    /// anything is encoded.
    pub fn check_args(&self, types: &[ValueType], vals: &[Value]) -> Result<()> {
        if types.len() != vals.len() {
            return Err(Error::MalformedTransaction(format!(
                "argument count mismatch: expected {}, got {}", types.len(), vals.len()
            )));
        }

        for (idx, (ty, val)) in types.iter().zip(vals).enumerate() {
            if !val.matches(ty) {
                return Err(Error::MalformedTransaction(format!(
                    "argument {} has type {}, expected {}", idx, val.kind(), ty
                )));
            }
        }

        Ok(())
    }
}

fn depth_exceeded(max: usize) -> Error {
    Error::MalformedTransaction(format!("value nesting exceeds {} levels", max))
}

/// Encodes a value with the default codec.
pub fn encode_val(enc: &mut Encoder, val: &Value) -> Result<()> {
    Codec::default().encode_val(enc, val)
}

/// Encodes an argument list with the default codec.
pub fn encode_vals(enc: &mut Encoder, vals: &[Value]) -> Result<()> {
    Codec::default().encode_vals(enc, vals)
}

/// Decodes a value with the default codec.
pub fn decode_val(dec: &mut Decoder, ty: &ValueType) -> Result<Value> {
    Codec::default().decode_val(dec, ty)
}

/// Decodes an argument list with the default codec.
pub fn decode_vals(dec: &mut Decoder, types: &[ValueType]) -> Result<Vec<Value>> {
    Codec::default().decode_vals(dec, types)
}
