//! Capability surface of the opaque host application.
//!
//! The engine never sees the host's real reflection or patching machinery.
//! It asks three questions through traits:
//! - [`TypeRegistry`]: which types and members are loaded right now,
//! - [`Patcher`]: attach a wrapper before or after a member runs,
//! - [`SceneGraph`]: which text widgets are alive and what they show.
//!
//! A concrete adapter implements these against the real runtime. The
//! [`memory`] module provides an in-process implementation used by tests and
//! the rehearsal binary.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::HostError;
use crate::util::{contains_ignore_case, eq_ignore_case};

/// Type of a parameter or return value as the host describes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Void,
    /// The host's native string type.
    String,
    /// A 32-bit integer.
    Int,
    /// A real array of the inner type.
    Array(Box<TypeRef>),
    /// Any other type, by full name.
    Named(String),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn array_of(inner: TypeRef) -> Self {
        TypeRef::Array(Box::new(inner))
    }

    pub fn name(&self) -> String {
        match self {
            TypeRef::Void => "Void".to_string(),
            TypeRef::String => "String".to_string(),
            TypeRef::Int => "Int32".to_string(),
            TypeRef::Array(inner) => format!("{}[]", inner.name()),
            TypeRef::Named(name) => name.clone(),
        }
    }

    /// Exact native string type.
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, TypeRef::String)
    }

    /// An array of strings, either a real array or a host wrapper type
    /// named like `...StringArray`.
    pub fn is_string_array(&self) -> bool {
        match self {
            TypeRef::Array(inner) => inner.is_string_like(),
            TypeRef::Named(name) => contains_ignore_case(name, "StringArray"),
            _ => false,
        }
    }

    /// Native strings and host string wrappers; never arrays.
    pub fn is_string_like(&self) -> bool {
        match self {
            TypeRef::String => true,
            TypeRef::Named(name) => {
                contains_ignore_case(name, "String") && !contains_ignore_case(name, "StringArray")
            }
            _ => false,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// How a member is exposed by its owning type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Method,
    Getter { property: String },
    Setter { property: String },
}

/// One member of a host type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberInfo {
    /// Host-assigned handle, unique within the owning type.
    pub token: u64,
    pub name: String,
    pub kind: MemberKind,
    pub params: SmallVec<[TypeRef; 4]>,
    pub returns: TypeRef,
}

impl MemberInfo {
    pub fn method(token: u64, name: &str, params: &[TypeRef], returns: TypeRef) -> Self {
        Self {
            token,
            name: name.to_string(),
            kind: MemberKind::Method,
            params: params.iter().cloned().collect(),
            returns,
        }
    }

    /// Property getter named `get_<property>`.
    pub fn getter(token: u64, property: &str, returns: TypeRef) -> Self {
        Self {
            token,
            name: format!("get_{}", property),
            kind: MemberKind::Getter {
                property: property.to_string(),
            },
            params: SmallVec::new(),
            returns,
        }
    }

    /// Property setter named `set_<property>`.
    pub fn setter(token: u64, property: &str, value: TypeRef) -> Self {
        Self {
            token,
            name: format!("set_{}", property),
            kind: MemberKind::Setter {
                property: property.to_string(),
            },
            params: SmallVec::from_iter([value]),
            returns: TypeRef::Void,
        }
    }

    #[inline]
    pub fn is_named(&self, name: &str) -> bool {
        eq_ignore_case(&self.name, name)
    }

    #[inline]
    pub fn first_param(&self) -> Option<&TypeRef> {
        self.params.first()
    }

    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(TypeRef::name).collect();
        format!("{}({}) -> {}", self.name, params.join(", "), self.returns)
    }
}

/// A host type with its members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub full_name: String,
    pub members: Vec<MemberInfo>,
}

/// What a wrapper must do with a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    /// Post-execution: replace the returned string.
    SingleString,
    /// Post-execution: replace each element of the returned string array.
    StringArray,
    /// Pre-execution: replace the first argument.
    RawCallback,
}

/// A discovered text-producing location in the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateCallSite {
    pub owner: String,
    pub member: MemberInfo,
    pub shape: CallShape,
}

impl CandidateCallSite {
    pub fn new(owner: impl Into<String>, member: MemberInfo, shape: CallShape) -> Self {
        Self {
            owner: owner.into(),
            member,
            shape,
        }
    }

    /// Identity used to keep at most one binding per site.
    pub fn key(&self) -> CallSiteKey {
        CallSiteKey {
            owner: self.owner.clone(),
            token: self.member.token,
        }
    }
}

impl fmt::Display for CandidateCallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.member.signature())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSiteKey {
    pub owner: String,
    pub token: u64,
}

/// A value crossing a hooked call boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostValue {
    Null,
    Int(i64),
    Str(String),
    /// Elements may be null.
    StrArray(Vec<Option<String>>),
    /// A host object, e.g. a wrapped string, with its text rendering if any.
    Object {
        type_name: String,
        text: Option<String>,
    },
}

impl HostValue {
    /// Reads the value as text, coercing wrapped objects through their text
    /// rendering.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            HostValue::Object { text: Some(t), .. } => Some(t),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            HostValue::Null => "null",
            HostValue::Int(_) => "Int32",
            HostValue::Str(_) => "String",
            HostValue::StrArray(_) => "String[]",
            HostValue::Object { type_name, .. } => type_name,
        }
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(s.to_string())
    }
}

/// Runs after the original member; may rewrite the return value.
pub type PostfixFn = Arc<dyn Fn(&mut HostValue) + Send + Sync>;
/// Runs before the original member; may rewrite the arguments.
pub type PrefixFn = Arc<dyn Fn(&mut [HostValue]) + Send + Sync>;

/// Wrapper installed on a call site.
#[derive(Clone)]
pub enum Hook {
    Postfix(PostfixFn),
    Prefix(PrefixFn),
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Postfix(_) => f.write_str("Hook::Postfix"),
            Hook::Prefix(_) => f.write_str("Hook::Prefix"),
        }
    }
}

/// Live type registry of the host. Called from discovery workers.
pub trait TypeRegistry: Send + Sync {
    /// Looks a type up by full name. `Ok(None)` means not materialized yet.
    fn find_type(&self, name: &str) -> Result<Option<TypeInfo>, HostError>;

    /// Names of currently loaded assemblies.
    fn assemblies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Looks a type up inside one assembly without enumerating its types.
    fn find_type_in(&self, _assembly: &str, _name: &str) -> Result<Option<TypeInfo>, HostError> {
        Ok(None)
    }
}

/// Installs wrappers around host members. Called from discovery workers.
pub trait Patcher: Send + Sync {
    fn install(&self, site: &CandidateCallSite, hook: Hook) -> Result<(), HostError>;
}

/// A live object in the host's scene.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub id: u64,
    pub type_name: String,
}

/// Live objects of the host. Called on the frame thread only.
pub trait SceneGraph {
    fn live_objects(&self) -> Result<Vec<ObjectHandle>, HostError>;

    /// Current text of the object's `text` property. `Ok(None)` when the
    /// object has no such property or it is null.
    fn read_text(&self, object: &ObjectHandle) -> Result<Option<String>, HostError>;

    fn write_text(&self, object: &ObjectHandle, text: &str) -> Result<(), HostError>;
}

/// Everything the engine needs from the host.
pub trait Host: TypeRegistry + Patcher + SceneGraph + Send + Sync + 'static {}

impl<T> Host for T where T: TypeRegistry + Patcher + SceneGraph + Send + Sync + 'static {}
