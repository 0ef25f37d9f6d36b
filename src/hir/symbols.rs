//! The symbol model.
//!
//! A single [`Symbol`] struct covers namespaces, types, members, parameters,
//! locals, synthesized instances and the error sentinels. What a symbol *is*
//! comes from its [`SymbolKind`]; how it came to exist comes from its
//! [`Origin`] and [`Shape`]. Capability facets (members, parameters, type
//! parameters, overloads, derived-type caches) are plain fields that stay
//! empty for kinds that do not use them.

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::ids::{AssemblyId, DeclId, SymbolId};
use super::metadata::{ForeignMemberHandle, ForeignTypeHandle};

// ============================================================================
// KINDS
// ============================================================================

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SymbolKind {
    Namespace,
    Class,
    Struct,
    Interface,
    Enum,
    Delegate,
    TypeParameter,
    Field,
    ConstantField,
    EnumMember,
    Property,
    Indexer,
    Event,
    MethodGroup,
    Method,
    Constructor,
    Parameter,
    Local,
    /// A value of some type produced by an expression.
    Instance,
    Error,
}

impl SymbolKind {
    pub fn is_type(self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Struct
                | SymbolKind::Interface
                | SymbolKind::Enum
                | SymbolKind::Delegate
                | SymbolKind::TypeParameter
        )
    }

    pub fn is_method(self) -> bool {
        matches!(self, SymbolKind::Method | SymbolKind::Constructor)
    }

    /// Kinds whose value can be the receiver of a member access.
    pub fn is_value(self) -> bool {
        matches!(
            self,
            SymbolKind::Field
                | SymbolKind::ConstantField
                | SymbolKind::EnumMember
                | SymbolKind::Property
                | SymbolKind::Indexer
                | SymbolKind::Event
                | SymbolKind::Method
                | SymbolKind::Constructor
                | SymbolKind::Parameter
                | SymbolKind::Local
                | SymbolKind::Instance
        )
    }

    pub fn display(self) -> &'static str {
        match self {
            SymbolKind::Namespace => "namespace",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Interface => "interface",
            SymbolKind::Enum => "enum",
            SymbolKind::Delegate => "delegate",
            SymbolKind::TypeParameter => "type parameter",
            SymbolKind::Field => "field",
            SymbolKind::ConstantField => "constant",
            SymbolKind::EnumMember => "enum member",
            SymbolKind::Property => "property",
            SymbolKind::Indexer => "indexer",
            SymbolKind::Event => "event",
            SymbolKind::MethodGroup => "method group",
            SymbolKind::Method => "method",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Parameter => "parameter",
            SymbolKind::Local => "local variable",
            SymbolKind::Instance => "value",
            SymbolKind::Error => "error",
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum Accessibility {
    #[default]
    Public,
    ProtectedInternal,
    Internal,
    Protected,
    Private,
}

impl Accessibility {
    pub fn mask(self) -> AccessMask {
        match self {
            Accessibility::Public => AccessMask::PUBLIC,
            Accessibility::ProtectedInternal => AccessMask::PROTECTED_INTERNAL,
            Accessibility::Internal => AccessMask::INTERNAL,
            Accessibility::Protected => AccessMask::PROTECTED,
            Accessibility::Private => AccessMask::PRIVATE,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Accessibility::Public => "public",
            Accessibility::ProtectedInternal => "protected internal",
            Accessibility::Internal => "internal",
            Accessibility::Protected => "protected",
            Accessibility::Private => "private",
        }
    }
}

bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct Modifiers: u32 {
        const STATIC = 1 << 0;
        const ABSTRACT = 1 << 1;
        const SEALED = 1 << 2;
        const VIRTUAL = 1 << 3;
        const OVERRIDE = 1 << 4;
        const READONLY = 1 << 5;
        const CONST = 1 << 6;
        const NEW = 1 << 7;
        const PARTIAL = 1 << 8;
        const EXTERN = 1 << 9;
        /// Trailing `params` array parameter.
        const PARAMS = 1 << 10;
        const REF = 1 << 11;
        const OUT = 1 << 12;
        /// First parameter of an extension method.
        const THIS = 1 << 13;
        /// Parameter with a default value.
        const OPTIONAL = 1 << 14;
    }
}

impl Modifiers {
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "static" => Modifiers::STATIC,
            "abstract" => Modifiers::ABSTRACT,
            "sealed" => Modifiers::SEALED,
            "virtual" => Modifiers::VIRTUAL,
            "override" => Modifiers::OVERRIDE,
            "readonly" => Modifiers::READONLY,
            "const" => Modifiers::CONST,
            "new" => Modifiers::NEW,
            "partial" => Modifiers::PARTIAL,
            "extern" => Modifiers::EXTERN,
            "params" => Modifiers::PARAMS,
            "ref" => Modifiers::REF,
            "out" => Modifiers::OUT,
            "this" => Modifiers::THIS,
            _ => Modifiers::empty(),
        }
    }
}

bitflags! {
    /// Which access levels a member query accepts.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct AccessMask: u8 {
        const PUBLIC = 1 << 0;
        const PROTECTED_INTERNAL = 1 << 1;
        const INTERNAL = 1 << 2;
        const PROTECTED = 1 << 3;
        const PRIVATE = 1 << 4;
    }
}

bitflags! {
    /// Static/instance filter for member queries.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct BindingFlags: u8 {
        const STATIC = 1 << 0;
        const INSTANCE = 1 << 1;
    }
}

/// Distinguished results standing in for failed resolutions.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Sentinel {
    Unknown,
    UnknownType,
    UnresolvedMethod,
    AmbiguousMethod,
    ThisInStaticMember,
    BaseInStaticMember,
}

impl Sentinel {
    pub const ALL: [Sentinel; 6] = [
        Sentinel::Unknown,
        Sentinel::UnknownType,
        Sentinel::UnresolvedMethod,
        Sentinel::AmbiguousMethod,
        Sentinel::ThisInStaticMember,
        Sentinel::BaseInStaticMember,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Sentinel::Unknown => "<unknown>",
            Sentinel::UnknownType => "<unknown type>",
            Sentinel::UnresolvedMethod => "<unresolved method>",
            Sentinel::AmbiguousMethod => "<ambiguous method>",
            Sentinel::ThisInStaticMember => "<this in static member>",
            Sentinel::BaseInStaticMember => "<base in static member>",
        }
    }

    pub(crate) fn kind(self) -> SymbolKind {
        match self {
            Sentinel::UnknownType => SymbolKind::Class,
            Sentinel::UnresolvedMethod | Sentinel::AmbiguousMethod => SymbolKind::Method,
            _ => SymbolKind::Error,
        }
    }
}

// ============================================================================
// ORIGIN AND SHAPE
// ============================================================================

/// Where a symbol's facts come from.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Origin {
    /// Declarations in source trees.
    Source,
    ForeignType {
        assembly: AssemblyId,
        handle: ForeignTypeHandle,
    },
    ForeignMember {
        assembly: AssemblyId,
        handle: ForeignMemberHandle,
    },
    ForeignParameter {
        assembly: AssemblyId,
        member: ForeignMemberHandle,
        index: u32,
    },
    /// Built by the engine itself (namespaces of binaries, constructed
    /// types, arrays, instances, sentinels).
    Synthetic,
}

impl Origin {
    pub fn is_foreign(self) -> bool {
        matches!(
            self,
            Origin::ForeignType { .. } | Origin::ForeignMember { .. } | Origin::ForeignParameter { .. }
        )
    }
}

/// Structural relationship of a symbol to the symbols it was derived from.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Shape {
    Definition,
    /// A generic type or method bound to type arguments.
    Constructed {
        generic: SymbolId,
        args: Box<[SymbolId]>,
    },
    /// A member of a constructed type, shadowing the generic member.
    Member {
        owner: SymbolId,
        generic: SymbolId,
    },
    Array {
        element: SymbolId,
        rank: u32,
    },
    Nullable {
        underlying: SymbolId,
    },
    TypeParameter {
        position: u32,
    },
    Instance {
        ty: SymbolId,
    },
    /// The implicit `value` parameter of a setter or event accessor.
    ImplicitValue {
        owner: SymbolId,
    },
    /// `Invoke` of a source delegate type.
    DelegateInvoke {
        delegate: SymbolId,
    },
}

// ============================================================================
// MEMOIZATION
// ============================================================================

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum ResolveState {
    #[default]
    NotStarted,
    InProgress,
    Done,
}

/// A lazily computed symbol value stamped with the resolver version.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct Memo {
    pub(crate) state: ResolveState,
    pub(crate) version: u64,
    pub(crate) value: Option<SymbolId>,
}

pub(crate) enum MemoProbe {
    Hit(SymbolId),
    Cycle,
    Miss,
}

impl Memo {
    pub(crate) fn probe(&self, version: u64) -> MemoProbe {
        match self.state {
            ResolveState::Done if self.version == version => match self.value {
                Some(v) => MemoProbe::Hit(v),
                None => MemoProbe::Miss,
            },
            ResolveState::InProgress => MemoProbe::Cycle,
            _ => MemoProbe::Miss,
        }
    }

    pub(crate) fn begin(&mut self) {
        self.state = ResolveState::InProgress;
    }

    pub(crate) fn finish(&mut self, version: u64, value: SymbolId) {
        self.state = ResolveState::Done;
        self.version = version;
        self.value = Some(value);
    }
}

/// Caches of types derived from a symbol, plus per-owner constructed members.
#[derive(Clone, Debug, Default)]
pub(crate) struct DerivedTypes {
    pub(crate) arrays: FxHashMap<u32, SymbolId>,
    pub(crate) nullable: Option<SymbolId>,
    pub(crate) instance: Option<SymbolId>,
    /// Constructed instances of a generic definition, keyed by argument signature.
    pub(crate) constructed: FxHashMap<SmolStr, SymbolId>,
    /// Constructed members of a constructed owner, keyed by generic member.
    pub(crate) members: FxHashMap<SymbolId, SymbolId>,
    pub(crate) invoke: Option<SymbolId>,
    pub(crate) value_parameter: Option<SymbolId>,
}

/// Which member passes of a foreign type already ran.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct ImportState {
    pub(crate) public: bool,
    pub(crate) non_public: bool,
}

// ============================================================================
// SYMBOL
// ============================================================================

#[derive(Clone, Debug)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: SmolStr,
    pub parent: Option<SymbolId>,
    pub modifiers: Modifiers,
    pub access: Accessibility,
    pub assembly: Option<AssemblyId>,
    pub origin: Origin,
    pub shape: Shape,
    pub sentinel: Option<Sentinel>,
    pub(crate) declarations: Vec<DeclId>,
    pub(crate) members: FxHashMap<SmolStr, SymbolId>,
    pub(crate) type_parameters: Vec<SymbolId>,
    pub(crate) parameters: Vec<SymbolId>,
    pub(crate) overloads: Vec<SymbolId>,
    pub(crate) derived: DerivedTypes,
    pub(crate) type_memo: Memo,
    pub(crate) base_memo: Memo,
    pub(crate) interfaces_memo: Option<(u64, Vec<SymbolId>)>,
    pub(crate) import_state: ImportState,
    pub(crate) removed: bool,
}

impl Symbol {
    pub fn new(kind: SymbolKind, name: impl Into<SmolStr>) -> Self {
        Self {
            kind,
            name: name.into(),
            parent: None,
            modifiers: Modifiers::empty(),
            access: Accessibility::Public,
            assembly: None,
            origin: Origin::Synthetic,
            shape: Shape::Definition,
            sentinel: None,
            declarations: Vec::new(),
            members: FxHashMap::default(),
            type_parameters: Vec::new(),
            parameters: Vec::new(),
            overloads: Vec::new(),
            derived: DerivedTypes::default(),
            type_memo: Memo::default(),
            base_memo: Memo::default(),
            interfaces_memo: None,
            import_state: ImportState::default(),
            removed: false,
        }
    }

    pub fn with_parent(mut self, parent: SymbolId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_access(mut self, access: Accessibility) -> Self {
        self.access = access;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_assembly(mut self, assembly: Option<AssemblyId>) -> Self {
        self.assembly = assembly;
        self
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC) || self.kind == SymbolKind::ConstantField
    }

    pub fn is_sentinel(&self) -> bool {
        self.sentinel.is_some()
    }

    pub fn declarations(&self) -> &[DeclId] {
        &self.declarations
    }

    pub fn type_parameters(&self) -> &[SymbolId] {
        &self.type_parameters
    }

    pub fn parameters(&self) -> &[SymbolId] {
        &self.parameters
    }

    pub fn overloads(&self) -> &[SymbolId] {
        &self.overloads
    }

    /// Member keys in sorted order.
    pub fn member_keys(&self) -> Vec<SmolStr> {
        let mut keys: Vec<_> = self.members.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn member(&self, key: &str) -> Option<SymbolId> {
        self.members.get(key).copied()
    }

    /// The generic definition this symbol was constructed from, if any.
    pub fn generic_definition(&self) -> Option<SymbolId> {
        match &self.shape {
            Shape::Constructed { generic, .. } | Shape::Member { generic, .. } => Some(*generic),
            _ => None,
        }
    }

    pub fn type_arguments(&self) -> &[SymbolId] {
        match &self.shape {
            Shape::Constructed { args, .. } => args,
            _ => &[],
        }
    }

    /// Key of this symbol in its owner's member table.
    pub fn member_key(&self) -> SmolStr {
        if self.kind.is_method() || self.kind == SymbolKind::MethodGroup {
            return self.name.clone();
        }
        member_key(&self.name, self.type_parameters.len())
    }
}

/// Member-table key: the decoded name plus an arity suffix for generics,
/// e.g. ``Pair`2``.
pub fn member_key(name: &str, arity: usize) -> SmolStr {
    if arity == 0 {
        SmolStr::new(name)
    } else {
        SmolStr::new(format!("{name}`{arity}"))
    }
}

/// Splits a metadata name like ``List`1`` into `("List", 1)`.
pub fn split_arity(name: &str) -> (&str, usize) {
    match name.rsplit_once('`') {
        Some((base, digits)) => match digits.parse() {
            Ok(arity) => (base, arity),
            Err(_) => (name, 0),
        },
        None => (name, 0),
    }
}
