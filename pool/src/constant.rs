use version::Version;

use crate::format::Format;
use crate::locator::Locator;

/// Handle to a constant owned by a [`ConstantPool`](crate::ConstantPool).
///
/// Handles are only meaningful for the pool that issued them. Two handles
/// to interned constants are equal exactly when the constants are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstId(pub(crate) u32);

impl ConstId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A pool-held value.
///
/// Child constants are referenced by [`ConstId`], so a `Constant` is only
/// interpretable together with the pool that owns its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Int64(i64),
    UInt8(u8),
    Float32(u32),
    Float64(u64),
    Char(char),
    String(String),
    Version(Version),
    Array(Vec<ConstId>),

    Module(String),
    Package { parent: ConstId, name: String },
    Class { parent: ConstId, name: String },
    Typedef { parent: ConstId, name: String },
    Property { parent: ConstId, name: String },
    MultiMethod { parent: ConstId, name: String },
    Method {
        parent: ConstId,
        name: String,
        params: Vec<ConstId>,
        returns: Vec<ConstId>,
    },

    Annotation { class: ConstId, params: Vec<ConstId> },

    UnresolvedName(String),

    TerminalType(ConstId),
    AnnotatedType { annotation: ConstId, ty: ConstId },

    ConditionNot(ConstId),
    ConditionAll(Vec<ConstId>),
    ConditionAny(Vec<ConstId>),
    ConditionNamed(String),
    ConditionPresent(ConstId),
    ConditionVersionMatches { module: ConstId, version: ConstId },
    ConditionVersioned(ConstId),
}

impl Constant {
    pub fn float32(value: f32) -> Self {
        Constant::Float32(value.to_bits())
    }

    pub fn float64(value: f64) -> Self {
        Constant::Float64(value.to_bits())
    }

    pub fn format(&self) -> Format {
        match self {
            Constant::Int64(_) => Format::Int64,
            Constant::UInt8(_) => Format::UInt8,
            Constant::Float32(_) => Format::Float32,
            Constant::Float64(_) => Format::Float64,
            Constant::Char(_) => Format::Char,
            Constant::String(_) => Format::String,
            Constant::Version(_) => Format::Version,
            Constant::Array(_) => Format::Array,
            Constant::Module(_) => Format::Module,
            Constant::Package { .. } => Format::Package,
            Constant::Class { .. } => Format::Class,
            Constant::Typedef { .. } => Format::Typedef,
            Constant::Property { .. } => Format::Property,
            Constant::MultiMethod { .. } => Format::MultiMethod,
            Constant::Method { .. } => Format::Method,
            Constant::Annotation { .. } => Format::Annotation,
            Constant::UnresolvedName(_) => Format::UnresolvedName,
            Constant::TerminalType(_) => Format::TerminalType,
            Constant::AnnotatedType { .. } => Format::AnnotatedType,
            Constant::ConditionNot(_) => Format::ConditionNot,
            Constant::ConditionAll(_) => Format::ConditionAll,
            Constant::ConditionAny(_) => Format::ConditionAny,
            Constant::ConditionNamed(_) => Format::ConditionNamed,
            Constant::ConditionPresent(_) => Format::ConditionPresent,
            Constant::ConditionVersionMatches { .. } => Format::ConditionVersionMatches,
            Constant::ConditionVersioned(_) => Format::ConditionVersioned,
        }
    }

    pub fn locator(&self) -> Option<Locator> {
        Some(match self {
            Constant::Int64(v) => Locator::Int(*v),
            Constant::UInt8(v) => Locator::Int(*v as i64),
            Constant::Float32(bits) => Locator::Bits(*bits as u64),
            Constant::Float64(bits) => Locator::Bits(*bits),
            Constant::Char(ch) => Locator::Char(*ch),
            Constant::String(s) | Constant::Module(s) | Constant::ConditionNamed(s) => {
                Locator::Str(s.clone())
            }
            Constant::Version(ver) => Locator::Version(ver.clone()),
            Constant::TerminalType(id)
            | Constant::ConditionNot(id)
            | Constant::ConditionPresent(id)
            | Constant::ConditionVersioned(id) => Locator::Id(*id),
            _ => return None,
        })
    }

    /// The simple name of an identity constant.
    pub fn name(&self) -> Option<&str> {
        match self {
            Constant::Module(name)
            | Constant::Package { name, .. }
            | Constant::Class { name, .. }
            | Constant::Typedef { name, .. }
            | Constant::Property { name, .. }
            | Constant::MultiMethod { name, .. }
            | Constant::Method { name, .. }
            | Constant::UnresolvedName(name) => Some(name),
            _ => None,
        }
    }

    /// The enclosing identity of a nested identity constant.
    pub fn parent(&self) -> Option<ConstId> {
        match self {
            Constant::Package { parent, .. }
            | Constant::Class { parent, .. }
            | Constant::Typedef { parent, .. }
            | Constant::Property { parent, .. }
            | Constant::MultiMethod { parent, .. }
            | Constant::Method { parent, .. } => Some(*parent),
            _ => None,
        }
    }

    /// Directly referenced constants, in serialization order.
    pub fn children(&self) -> Vec<ConstId> {
        match self {
            Constant::Int64(_)
            | Constant::UInt8(_)
            | Constant::Float32(_)
            | Constant::Float64(_)
            | Constant::Char(_)
            | Constant::String(_)
            | Constant::Version(_)
            | Constant::Module(_)
            | Constant::UnresolvedName(_)
            | Constant::ConditionNamed(_) => Vec::new(),
            Constant::Array(ids) | Constant::ConditionAll(ids) | Constant::ConditionAny(ids) => {
                ids.clone()
            }
            Constant::Package { parent, .. }
            | Constant::Class { parent, .. }
            | Constant::Typedef { parent, .. }
            | Constant::Property { parent, .. }
            | Constant::MultiMethod { parent, .. } => vec![*parent],
            Constant::Method {
                parent,
                params,
                returns,
                ..
            } => {
                let mut ids = vec![*parent];
                ids.extend(params);
                ids.extend(returns);
                ids
            }
            Constant::Annotation { class, params } => {
                let mut ids = vec![*class];
                ids.extend(params);
                ids
            }
            Constant::TerminalType(id)
            | Constant::ConditionNot(id)
            | Constant::ConditionPresent(id)
            | Constant::ConditionVersioned(id) => vec![*id],
            Constant::AnnotatedType { annotation, ty } => vec![*annotation, *ty],
            Constant::ConditionVersionMatches { module, version } => vec![*module, *version],
        }
    }

    /// A copy of this constant with every child handle passed through `f`.
    pub fn map_children(&self, mut f: impl FnMut(ConstId) -> ConstId) -> Constant {
        let mut map_all = |ids: &[ConstId]| ids.iter().map(|&id| f(id)).collect::<Vec<_>>();
        match self {
            Constant::Array(ids) => Constant::Array(map_all(ids)),
            Constant::ConditionAll(ids) => Constant::ConditionAll(map_all(ids)),
            Constant::ConditionAny(ids) => Constant::ConditionAny(map_all(ids)),
            Constant::Package { parent, name } => Constant::Package {
                parent: map_all(&[*parent])[0],
                name: name.clone(),
            },
            Constant::Class { parent, name } => Constant::Class {
                parent: map_all(&[*parent])[0],
                name: name.clone(),
            },
            Constant::Typedef { parent, name } => Constant::Typedef {
                parent: map_all(&[*parent])[0],
                name: name.clone(),
            },
            Constant::Property { parent, name } => Constant::Property {
                parent: map_all(&[*parent])[0],
                name: name.clone(),
            },
            Constant::MultiMethod { parent, name } => Constant::MultiMethod {
                parent: map_all(&[*parent])[0],
                name: name.clone(),
            },
            Constant::Method {
                parent,
                name,
                params,
                returns,
            } => Constant::Method {
                parent: map_all(&[*parent])[0],
                name: name.clone(),
                params: map_all(params),
                returns: map_all(returns),
            },
            Constant::Annotation { class, params } => Constant::Annotation {
                class: map_all(&[*class])[0],
                params: map_all(params),
            },
            Constant::TerminalType(id) => Constant::TerminalType(map_all(&[*id])[0]),
            Constant::ConditionNot(id) => Constant::ConditionNot(map_all(&[*id])[0]),
            Constant::ConditionPresent(id) => Constant::ConditionPresent(map_all(&[*id])[0]),
            Constant::ConditionVersioned(id) => Constant::ConditionVersioned(map_all(&[*id])[0]),
            Constant::AnnotatedType { annotation, ty } => {
                let ids = map_all(&[*annotation, *ty]);
                Constant::AnnotatedType {
                    annotation: ids[0],
                    ty: ids[1],
                }
            }
            Constant::ConditionVersionMatches { module, version } => {
                let ids = map_all(&[*module, *version]);
                Constant::ConditionVersionMatches {
                    module: ids[0],
                    version: ids[1],
                }
            }
            leaf => leaf.clone(),
        }
    }
}
