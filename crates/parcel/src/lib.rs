//! # Parcel
//!
//! A small, bounded TLV codec for transaction buffers.
//!
//! ## Philosophy
//!
//! - **Explicit State**: The encoder tracks open scopes and refuses structurally
//!   invalid writes. No hidden buffers.
//! - **TLV Architecture**: `[Tag][Length?][Value]` lets a reader skip any item
//!   without knowing its schema.
//! - **Bounded Reads**: Decoders are zero-copy views; every read is bounds
//!   checked and a truncated buffer is an error, never a panic.
//!
//! ## Format
//!
//! - **Scalars**: `[Tag: 1b][Data: N]`
//! - **Strings**: `[Tag: 1b][Len: 4b][UTF-8: Len]`
//! - **Containers**: `[Tag: 1b][Len: 4b][Body: Len]`
//!
//! All integers are Little-Endian.


/// Parcel encoding and decoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Byte does not correspond to a valid `Tag`.
    InvalidTag(u8),
    /// A valid tag was found where a different one was expected.
    UnexpectedTag { expected: Tag, found: Tag },
    /// String data is not valid UTF-8.
    InvalidUtf8,
    /// Closing a scope that does not match the innermost open scope.
    ScopeMismatch { expected: Scope, actual: Scope },
    /// Attempted to close a scope when only the Root remains.
    ScopeUnderflow,
    /// Attempted to finalize the buffer with open scopes.
    ScopeStillOpen,
    /// Buffer exhausted while reading.
    UnexpectedEnd,
    /// String or container length exceeds `u32::MAX`.
    TooLarge(usize),
    /// Attempted to write a second item into a single-item scope.
    TooManyItems(Scope),
    /// Attempted to close a single-item scope without writing its item.
    EmptyScope(Scope),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidTag(b) => write!(f, "invalid tag byte: {:#04x}", b),
            Error::UnexpectedTag { expected, found } => {
                write!(f, "unexpected tag: expected {:?}, found {:?}", expected, found)
            }
            Error::InvalidUtf8 => write!(f, "string is not valid utf-8"),
            Error::ScopeMismatch { expected, actual } => {
                write!(f, "scope mismatch: expected {:?}, found {:?}", expected, actual)
            }
            Error::ScopeUnderflow => write!(f, "no open scope to close"),
            Error::ScopeStillOpen => write!(f, "buffer finalized with open scopes"),
            Error::UnexpectedEnd => write!(f, "unexpected end of buffer"),
            Error::TooLarge(len) => write!(f, "length {} exceeds u32::MAX", len),
            Error::TooManyItems(s) => write!(f, "too many items in scope {:?}; expected exactly 1", s),
            Error::EmptyScope(s) => write!(f, "empty scope {:?}; expected exactly 1 item", s),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for parcel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Identifies the type of the encoded item.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    // Fixed-width scalars
    BoolTrue = 0x01,
    BoolFalse = 0x02,
    S32 = 0x03,
    S64 = 0x04,
    U32 = 0x05,
    U64 = 0x06,
    /// Opaque object reference token (u64).
    Handle = 0x07,

    // Unit / Void
    Unit = 0x0E,

    // Blobs (Tag + u32 Len + Bytes)
    String = 0x10,

    // Containers (Tag + u32 Len + Body)
    List = 0x20,

    // Outcomes and named payloads (Tag + u32 Len + Body)
    ResultOk = 0x31,
    ResultErr = 0x32,
    Variant = 0x33,
}

impl Tag {
    /// Returns the Tag for a given byte, or `None` if invalid.
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Tag::BoolTrue),
            0x02 => Some(Tag::BoolFalse),
            0x03 => Some(Tag::S32),
            0x04 => Some(Tag::S64),
            0x05 => Some(Tag::U32),
            0x06 => Some(Tag::U64),
            0x07 => Some(Tag::Handle),
            0x0E => Some(Tag::Unit),
            0x10 => Some(Tag::String),
            0x20 => Some(Tag::List),
            0x31 => Some(Tag::ResultOk),
            0x32 => Some(Tag::ResultErr),
            0x33 => Some(Tag::Variant),
            _ => None,
        }
    }

    /// Number of fixed data bytes following the tag, or `None` for
    /// length-prefixed items.
    fn fixed_width(self) -> Option<usize> {
        match self {
            Tag::BoolTrue | Tag::BoolFalse | Tag::Unit => Some(0),
            Tag::S32 | Tag::U32 => Some(4),
            Tag::S64 | Tag::U64 | Tag::Handle => Some(8),
            Tag::String | Tag::List | Tag::ResultOk | Tag::ResultErr | Tag::Variant => None,
        }
    }
}

/// Kinds of open scope on the `Encoder` stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The virtual root; allows any number of items.
    Root,
    /// Ordered sequence; allows any number of items.
    List,
    /// Outcome container; allows exactly one item.
    Result,
    /// Named payload; allows exactly one item after the name.
    Variant,
}

impl Scope {
    fn single_item(self) -> bool {
        matches!(self, Scope::Result | Scope::Variant)
    }
}

struct Frame {
    start: usize,
    scope: Scope,
    count: usize,
}

/// A state-machine driven encoder that back-patches container lengths.
///
/// # Structural Invariants
///
/// 1. `Result` and `Variant` scopes hold exactly one item.
/// 2. Every opened scope must be closed by its matching `*_end` call.
/// 3. The encoder must be back at the root to produce bytes.
pub struct Encoder {
    buf: Vec<u8>,
    /// Bottom is always `Scope::Root`.
    stack: Vec<Frame>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    /// Creates a new encoder with a small default capacity.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Creates a new encoder with the given buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut stack = Vec::with_capacity(4);
        stack.push(Frame { start: 0, scope: Scope::Root, count: 0 });
        Self { buf: Vec::with_capacity(capacity), stack }
    }

    /// Number of bytes written so far, including unfinished scopes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the encoder and returns the final byte vector.
    ///
    /// # Errors
    /// Returns `Error::ScopeStillOpen` if any scope is still open.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        if self.stack.len() > 1 {
            return Err(Error::ScopeStillOpen);
        }
        Ok(self.buf)
    }

    fn top(&mut self) -> &mut Frame {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn check_write(&mut self) -> Result<()> {
        let frame = self.top();
        if frame.scope.single_item() && frame.count >= 1 {
            return Err(Error::TooManyItems(frame.scope));
        }
        Ok(())
    }

    fn item_written(&mut self) {
        self.top().count += 1;
    }

    fn scalar(&mut self, tag: Tag, data: &[u8]) -> Result<()> {
        self.check_write()?;
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(data);
        self.item_written();
        Ok(())
    }

    fn begin_scope(&mut self, tag: Tag, scope: Scope) -> Result<()> {
        self.check_write()?;
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(&[0, 0, 0, 0]);
        self.stack.push(Frame { start: self.buf.len(), scope, count: 0 });
        Ok(())
    }

    fn end_scope(&mut self, expected: Scope) -> Result<()> {
        if self.stack.len() <= 1 {
            return Err(Error::ScopeUnderflow);
        }

        let frame = self.top();
        if frame.scope != expected {
            return Err(Error::ScopeMismatch { expected, actual: frame.scope });
        }
        if frame.scope.single_item() && frame.count == 0 {
            return Err(Error::EmptyScope(frame.scope));
        }

        let start = frame.start;
        let body_len = self.buf.len() - start;
        let len = u32::try_from(body_len).map_err(|_| Error::TooLarge(body_len))?;
        self.buf[start - 4..start].copy_from_slice(&len.to_le_bytes());

        self.stack.pop();
        self.item_written();
        Ok(())
    }

    /// Encodes a boolean.
    pub fn bool(&mut self, v: bool) -> Result<()> {
        self.scalar(if v { Tag::BoolTrue } else { Tag::BoolFalse }, &[])
    }

    /// Encodes a signed 32-bit integer.
    pub fn s32(&mut self, v: i32) -> Result<()> { self.scalar(Tag::S32, &v.to_le_bytes()) }
    /// Encodes a signed 64-bit integer.
    pub fn s64(&mut self, v: i64) -> Result<()> { self.scalar(Tag::S64, &v.to_le_bytes()) }
    /// Encodes an unsigned 32-bit integer.
    pub fn u32(&mut self, v: u32) -> Result<()> { self.scalar(Tag::U32, &v.to_le_bytes()) }
    /// Encodes an unsigned 64-bit integer.
    pub fn u64(&mut self, v: u64) -> Result<()> { self.scalar(Tag::U64, &v.to_le_bytes()) }

    /// Encodes an object reference token.
    pub fn handle(&mut self, token: u64) -> Result<()> { self.scalar(Tag::Handle, &token.to_le_bytes()) }

    /// Encodes Unit `()`.
    pub fn unit(&mut self) -> Result<()> { self.scalar(Tag::Unit, &[]) }

    /// Encodes a length-prefixed UTF-8 string.
    pub fn str(&mut self, v: &str) -> Result<()> {
        let len = u32::try_from(v.len()).map_err(|_| Error::TooLarge(v.len()))?;
        self.check_write()?;
        self.buf.push(Tag::String as u8);
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(v.as_bytes());
        self.item_written();
        Ok(())
    }

    /// Begins a List. Any number of items may follow.
    pub fn list_begin(&mut self) -> Result<()> { self.begin_scope(Tag::List, Scope::List) }
    /// Ends a List.
    pub fn list_end(&mut self) -> Result<()> { self.end_scope(Scope::List) }

    /// Begins a successful outcome. Exactly one item must follow.
    pub fn result_ok_begin(&mut self) -> Result<()> { self.begin_scope(Tag::ResultOk, Scope::Result) }
    /// Ends a successful outcome.
    pub fn result_ok_end(&mut self) -> Result<()> { self.end_scope(Scope::Result) }

    /// Begins a failed outcome. Exactly one item must follow.
    pub fn result_err_begin(&mut self) -> Result<()> { self.begin_scope(Tag::ResultErr, Scope::Result) }
    /// Ends a failed outcome.
    pub fn result_err_end(&mut self) -> Result<()> { self.end_scope(Scope::Result) }

    /// Begins a named payload. The name is written immediately and is not
    /// counted; exactly one payload item must follow.
    pub fn variant_begin(&mut self, name: &str) -> Result<()> {
        self.begin_scope(Tag::Variant, Scope::Variant)?;
        self.str(name)?;
        self.top().count = 0;
        Ok(())
    }
    /// Ends a named payload.
    pub fn variant_end(&mut self) -> Result<()> { self.end_scope(Scope::Variant) }
}

/// A zero-copy, bounds-checked cursor over a byte slice.
///
/// Reading advances the cursor. Container reads return new decoders
/// restricted to the container's body.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over the slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Peeks the next Tag without advancing.
    pub fn peek_tag(&self) -> Result<Tag> {
        let b = *self.buf.first().ok_or(Error::UnexpectedEnd)?;
        Tag::from_u8(b).ok_or(Error::InvalidTag(b))
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.buf.len() {
            return Err(Error::UnexpectedEnd);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn read_len(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.read_array()?) as usize)
    }

    fn expect_tag(&mut self, expected: Tag) -> Result<()> {
        let found = self.peek_tag()?;
        if found != expected {
            return Err(Error::UnexpectedTag { expected, found });
        }
        self.buf = &self.buf[1..];
        Ok(())
    }

    fn enter(&mut self, expected: Tag) -> Result<Decoder<'a>> {
        self.expect_tag(expected)?;
        let len = self.read_len()?;
        Ok(Decoder::new(self.read_bytes(len)?))
    }

    /// Skips the next item and everything nested inside it.
    pub fn skip(&mut self) -> Result<()> {
        let tag = self.peek_tag()?;
        self.buf = &self.buf[1..];
        match tag.fixed_width() {
            Some(width) => { self.read_bytes(width)?; }
            None => {
                let len = self.read_len()?;
                self.read_bytes(len)?;
            }
        }
        Ok(())
    }

    /// Decodes a bool.
    pub fn bool(&mut self) -> Result<bool> {
        match self.peek_tag()? {
            Tag::BoolTrue => { self.buf = &self.buf[1..]; Ok(true) }
            Tag::BoolFalse => { self.buf = &self.buf[1..]; Ok(false) }
            found => Err(Error::UnexpectedTag { expected: Tag::BoolTrue, found }),
        }
    }

    /// Decodes a signed 32-bit integer.
    pub fn s32(&mut self) -> Result<i32> { self.expect_tag(Tag::S32)?; Ok(i32::from_le_bytes(self.read_array()?)) }
    /// Decodes a signed 64-bit integer.
    pub fn s64(&mut self) -> Result<i64> { self.expect_tag(Tag::S64)?; Ok(i64::from_le_bytes(self.read_array()?)) }
    /// Decodes an unsigned 32-bit integer.
    pub fn u32(&mut self) -> Result<u32> { self.expect_tag(Tag::U32)?; Ok(u32::from_le_bytes(self.read_array()?)) }
    /// Decodes an unsigned 64-bit integer.
    pub fn u64(&mut self) -> Result<u64> { self.expect_tag(Tag::U64)?; Ok(u64::from_le_bytes(self.read_array()?)) }

    /// Decodes an object reference token.
    pub fn handle(&mut self) -> Result<u64> { self.expect_tag(Tag::Handle)?; Ok(u64::from_le_bytes(self.read_array()?)) }

    /// Decodes Unit `()`.
    pub fn unit(&mut self) -> Result<()> { self.expect_tag(Tag::Unit) }

    /// Decodes a string slice.
    pub fn str(&mut self) -> Result<&'a str> {
        self.expect_tag(Tag::String)?;
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    /// Decodes a List into an item iterator.
    pub fn list(&mut self) -> Result<ListIter<'a>> {
        Ok(ListIter { dec: self.enter(Tag::List)? })
    }

    /// Decodes an outcome container.
    ///
    /// Returns `Ok(Decoder)` or `Err(Decoder)` over the respective payload.
    pub fn result(&mut self) -> Result<std::result::Result<Decoder<'a>, Decoder<'a>>> {
        match self.peek_tag()? {
            Tag::ResultOk => Ok(Ok(self.enter(Tag::ResultOk)?)),
            Tag::ResultErr => Ok(Err(self.enter(Tag::ResultErr)?)),
            found => Err(Error::UnexpectedTag { expected: Tag::ResultOk, found }),
        }
    }

    /// Decodes a named payload.
    ///
    /// Returns `(name, payload decoder)`.
    pub fn variant(&mut self) -> Result<(&'a str, Decoder<'a>)> {
        let mut inner = self.enter(Tag::Variant)?;
        let name = inner.str()?;
        Ok((name, inner))
    }
}

/// Iterator over the items of a List.
#[derive(Debug)]
pub struct ListIter<'a> {
    dec: Decoder<'a>,
}

impl<'a> ListIter<'a> {
    /// Returns a decoder bounded to the next item, or `None` at the end.
    ///
    /// # Errors
    /// Returns an error if the next item is truncated or carries an invalid tag.
    pub fn next(&mut self) -> Result<Option<Decoder<'a>>> {
        if self.dec.is_empty() {
            return Ok(None);
        }
        let mut probe = self.dec.clone();
        probe.skip()?;
        let len = self.dec.remaining() - probe.remaining();
        Ok(Some(Decoder::new(self.dec.read_bytes(len)?)))
    }
}

/// Finds every handle token in `buf`, nested ones included.
///
/// Offsets point at the 8 token bytes following each `Handle` tag and come
/// back in buffer order.
pub fn handle_offsets(buf: &[u8]) -> Result<Vec<usize>> {
    let mut offsets = Vec::new();
    let mut pending = vec![(0usize, buf.len())];

    while let Some((start, end)) = pending.pop() {
        let mut dec = Decoder::new(&buf[start..end]);
        while !dec.is_empty() {
            let at = end - dec.remaining();
            let tag = dec.peek_tag()?;
            dec.skip()?;
            match tag {
                Tag::Handle => offsets.push(at + 1),
                Tag::List | Tag::ResultOk | Tag::ResultErr | Tag::Variant => {
                    // Body starts after the tag and the u32 length.
                    pending.push((at + 5, end - dec.remaining()));
                }
                _ => {}
            }
        }
    }

    offsets.sort_unstable();
    Ok(offsets)
}
