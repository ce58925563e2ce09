//! # Interface contracts
//!
//! The contract is the source of truth for what an interface can do. It maps
//! each transaction id to the schema needed to marshal that call.
//!
//! ## Philosophy
//!
//! - **Definition-Time Safety**: Tables are validated once, when they are built.
//! - **Append-Only Evolution**: Ids follow declaration order from the
//!   contract's base, `TransactionId::FIRST_CALL` unless the transport numbers
//!   from elsewhere. A newer contract may add methods at the end
//!   but must never renumber or reshape existing ones.

use std::collections::HashMap;
use std::sync::Arc;

use crate::value::ValueType;

/// Contract definition errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Two methods share a name.
    DuplicateMethod(String),
    /// A method id falls outside the user call range.
    IdOutOfRange { method: String, id: TransactionId },
    /// A method present in the older contract is missing or changed.
    Incompatible { method: String, details: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DuplicateMethod(name) => write!(f, "method '{}' is declared twice", name),
            Error::IdOutOfRange { method, id } => {
                write!(f, "method '{}' has id {} outside the call range", method, id)
            }
            Error::Incompatible { method, details } => {
                write!(f, "method '{}' is not wire compatible: {}", method, details)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Immutable string key naming an interface contract.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InterfaceDescriptor(Arc<str>);

impl InterfaceDescriptor {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InterfaceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for InterfaceDescriptor {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl From<&str> for InterfaceDescriptor {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identifies one method within an interface.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransactionId(pub u32);

impl TransactionId {
    /// Default id of an interface's first method.
    pub const FIRST_CALL: TransactionId = TransactionId(0x0000_0001);
    /// Last id available to user methods.
    pub const LAST_CALL: TransactionId = TransactionId(0x00ff_ffff);
    /// Reserved id asking a receiver to reply with its own descriptor.
    pub const DESCRIBE_SELF: TransactionId = TransactionId(0x5f4e_5446);

    /// Id of the method declared at `ordinal` (0-based) on the default base.
    pub const fn ordinal(ordinal: u32) -> Self {
        TransactionId(Self::FIRST_CALL.0 + ordinal)
    }

    /// Any id from 0 through `LAST_CALL` may name a method. `DESCRIBE_SELF`
    /// lies above the range.
    pub fn is_call(self) -> bool {
        self <= Self::LAST_CALL
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Schema of a single method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodContract {
    pub name: String,
    pub id: TransactionId,
    pub params: Vec<ValueType>,
    pub returns: ValueType,
    /// Failure kinds the method declares it may raise.
    pub failures: Vec<String>,
}

/// The method table of one interface.
#[derive(Clone, Debug)]
pub struct InterfaceContract {
    descriptor: InterfaceDescriptor,
    methods: Vec<MethodContract>,
    by_id: HashMap<TransactionId, usize>,
}

impl InterfaceContract {
    pub fn builder(descriptor: impl Into<InterfaceDescriptor>) -> ContractBuilder {
        ContractBuilder {
            descriptor: descriptor.into(),
            base: TransactionId::FIRST_CALL,
            methods: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> &InterfaceDescriptor {
        &self.descriptor
    }

    /// Looks up a method by transaction id.
    pub fn method(&self, id: TransactionId) -> Option<&MethodContract> {
        self.by_id.get(&id).map(|&idx| &self.methods[idx])
    }

    /// Looks up a method by name.
    pub fn method_named(&self, name: &str) -> Option<&MethodContract> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Methods in declaration order.
    pub fn methods(&self) -> &[MethodContract] {
        &self.methods
    }
}

/// Builds an `InterfaceContract`, assigning ids in declaration order.
pub struct ContractBuilder {
    descriptor: InterfaceDescriptor,
    base: TransactionId,
    methods: Vec<MethodContract>,
}

impl ContractBuilder {
    /// Overrides the id of the first method. Must be set before any method.
    pub fn base(mut self, base: TransactionId) -> Self {
        self.base = base;
        self
    }

    /// Appends a method that declares no failure kinds.
    pub fn method(self, name: &str, params: Vec<ValueType>, returns: ValueType) -> Self {
        self.method_with_failures(name, params, returns, &[])
    }

    /// Appends a method with its declared failure kinds.
    pub fn method_with_failures(
        mut self,
        name: &str,
        params: Vec<ValueType>,
        returns: ValueType,
        failures: &[&str],
    ) -> Self {
        let ordinal = self.methods.len() as u32;
        self.methods.push(MethodContract {
            name: name.to_string(),
            id: TransactionId(self.base.0.saturating_add(ordinal)),
            params,
            returns,
            failures: failures.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    /// Validates and freezes the table.
    pub fn build(self) -> Result<InterfaceContract> {
        let mut by_id = HashMap::with_capacity(self.methods.len());

        for (idx, method) in self.methods.iter().enumerate() {
            if !method.id.is_call() {
                return Err(Error::IdOutOfRange { method: method.name.clone(), id: method.id });
            }
            if self.methods[..idx].iter().any(|m| m.name == method.name) {
                return Err(Error::DuplicateMethod(method.name.clone()));
            }
            by_id.insert(method.id, idx);
        }

        Ok(InterfaceContract { descriptor: self.descriptor, methods: self.methods, by_id })
    }
}

/// Validates that `newer` is an append-only evolution of `older`.
///
/// Checks that:
/// - Both contracts name the same interface
/// - Every method of `older` exists in `newer` under the same id
/// - Parameter and return types are unchanged
pub fn validate_evolution(older: &InterfaceContract, newer: &InterfaceContract) -> Result<()> {
    if older.descriptor != newer.descriptor {
        return Err(Error::Incompatible {
            method: "*".to_string(),
            details: format!("descriptor changed from '{}' to '{}'", older.descriptor, newer.descriptor),
        });
    }

    for old in older.methods() {
        let new = newer.method_named(&old.name).ok_or_else(|| Error::Incompatible {
            method: old.name.clone(),
            details: "method removed".to_string(),
        })?;

        if new.id != old.id {
            return Err(Error::Incompatible {
                method: old.name.clone(),
                details: format!("renumbered from {} to {}", old.id, new.id),
            });
        }

        if new.params != old.params {
            return Err(Error::Incompatible {
                method: old.name.clone(),
                details: "parameter list changed".to_string(),
            });
        }

        if new.returns != old.returns {
            return Err(Error::Incompatible {
                method: old.name.clone(),
                details: format!("return type changed from {} to {}", old.returns, new.returns),
            });
        }
    }

    Ok(())
}
