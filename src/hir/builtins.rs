//! Built-in types.
//!
//! The core library is an in-memory metadata assembly registered with every
//! session, so predefined keywords (`int`, `string`, ...) resolve to foreign
//! types exactly like types of any other referenced binary. The tables below
//! drive keyword mapping, literal typing and numeric conversions.

use crate::syntax::{Token, TokenKind};

use super::metadata::{
    ForeignMemberInfo, ForeignTypeInfo, ForeignTypeKind, ForeignTypeRef, MetadataAssembly, MetadataBuilder,
};
use super::ids::SymbolId;
use super::model::SemanticModel;
use super::symbols::{Sentinel, Shape, SymbolKind, member_key, split_arity};

pub const CORE_LIBRARY: &str = "mscorlib";

/// Predefined type keywords and the metadata types they stand for.
pub const PREDEFINED_TYPES: &[(&str, &str)] = &[
    ("object", "System.Object"),
    ("string", "System.String"),
    ("bool", "System.Boolean"),
    ("byte", "System.Byte"),
    ("sbyte", "System.SByte"),
    ("char", "System.Char"),
    ("short", "System.Int16"),
    ("ushort", "System.UInt16"),
    ("int", "System.Int32"),
    ("uint", "System.UInt32"),
    ("long", "System.Int64"),
    ("ulong", "System.UInt64"),
    ("float", "System.Single"),
    ("double", "System.Double"),
    ("decimal", "System.Decimal"),
    ("void", "System.Void"),
];

/// Implicit numeric conversions, source keyword to targets.
const NUMERIC_WIDENING: &[(&str, &[&str])] = &[
    ("sbyte", &["short", "int", "long", "float", "double", "decimal"]),
    ("byte", &["short", "ushort", "int", "uint", "long", "ulong", "float", "double", "decimal"]),
    ("short", &["int", "long", "float", "double", "decimal"]),
    ("ushort", &["int", "uint", "long", "ulong", "float", "double", "decimal"]),
    ("int", &["long", "float", "double", "decimal"]),
    ("uint", &["long", "ulong", "float", "double", "decimal"]),
    ("long", &["float", "double", "decimal"]),
    ("ulong", &["float", "double", "decimal"]),
    ("char", &["ushort", "int", "uint", "long", "ulong", "float", "double", "decimal"]),
    ("float", &["double"]),
];

pub fn keyword_full_name(keyword: &str) -> Option<&'static str> {
    PREDEFINED_TYPES
        .iter()
        .find(|(k, _)| *k == keyword)
        .map(|&(_, full)| full)
}

pub fn is_numeric(keyword: &str) -> bool {
    NUMERIC_WIDENING.iter().any(|(k, _)| *k == keyword) || keyword == "double" || keyword == "decimal"
}

pub fn is_numeric_widening(from: &str, to: &str) -> bool {
    NUMERIC_WIDENING
        .iter()
        .find(|(k, _)| *k == from)
        .is_some_and(|(_, targets)| targets.contains(&to))
}

/// Result type of an arithmetic operator on two numeric operands.
pub fn binary_numeric_promotion(left: &str, right: &str) -> Option<&'static str> {
    if !is_numeric(left) || !is_numeric(right) {
        return None;
    }
    let either = |k: &str| left == k || right == k;
    let signed = |k: &str| matches!(k, "sbyte" | "short" | "int" | "long");
    Some(if either("decimal") {
        if either("float") || either("double") {
            return None;
        }
        "decimal"
    } else if either("double") {
        "double"
    } else if either("float") {
        "float"
    } else if either("ulong") {
        if signed(left) || signed(right) {
            return None;
        }
        "ulong"
    } else if either("long") {
        "long"
    } else if either("uint") {
        if signed(left) || signed(right) { "long" } else { "uint" }
    } else {
        "int"
    })
}

/// Keyword of the built-in type a literal token has.
pub fn literal_keyword(token: &Token) -> Option<&'static str> {
    let text = token.text.to_ascii_lowercase();
    Some(match token.kind {
        TokenKind::IntegerLiteral => {
            if text.ends_with("ul") || text.ends_with("lu") {
                "ulong"
            } else if text.ends_with('u') {
                "uint"
            } else if text.ends_with('l') {
                "long"
            } else {
                "int"
            }
        }
        TokenKind::RealLiteral => {
            if text.ends_with('f') {
                "float"
            } else if text.ends_with('m') {
                "decimal"
            } else {
                "double"
            }
        }
        TokenKind::StringLiteral => "string",
        TokenKind::CharLiteral => "char",
        TokenKind::Keyword if token.is("true") || token.is("false") => "bool",
        _ => return None,
    })
}

// ============================================================================
// CORE LIBRARY
// ============================================================================

fn core(full_name: &str) -> ForeignTypeRef {
    ForeignTypeRef::external(CORE_LIBRARY, full_name)
}

fn system(name: &str) -> ForeignTypeRef {
    core(&format!("System.{name}"))
}

fn enumerable_of(element: ForeignTypeRef) -> ForeignTypeRef {
    ForeignTypeRef::generic(core("System.Collections.Generic.IEnumerable`1"), vec![element])
}

fn add(builder: &mut MetadataBuilder, owner: super::metadata::ForeignTypeHandle, members: Vec<ForeignMemberInfo>) {
    for member in members {
        builder.add_member(owner, member);
    }
}

/// Builds the core library binary.
pub fn core_library() -> MetadataAssembly {
    use ForeignTypeRef::{GenericParam as T, MethodGenericParam as M};

    let mut b = MetadataBuilder::new(CORE_LIBRARY);
    let void = system("Void");
    let object = system("Object");
    let string = system("String");
    let int = system("Int32");
    let boolean = system("Boolean");
    let double = system("Double");

    let h = b.add_type(ForeignTypeInfo::class("System", "Object"));
    add(
        &mut b,
        h,
        vec![
            ForeignMemberInfo::constructor(void.clone()),
            ForeignMemberInfo::method("ToString", string.clone()).with_virtual(),
            ForeignMemberInfo::method("Equals", boolean.clone())
                .with_virtual()
                .with_param("obj", object.clone()),
            ForeignMemberInfo::method("GetHashCode", int.clone()).with_virtual(),
            ForeignMemberInfo::method("GetType", system("Type")),
        ],
    );
    b.add_type(ForeignTypeInfo::class("System", "ValueType").with_abstract().with_base(object.clone()));
    b.add_type(ForeignTypeInfo::class("System", "Enum").with_abstract().with_base(system("ValueType")));
    let h = b.add_type(
        ForeignTypeInfo::class("System", "Array")
            .with_abstract()
            .with_base(object.clone())
            .with_interface(core("System.Collections.IEnumerable")),
    );
    add(&mut b, h, vec![ForeignMemberInfo::property("Length", int.clone())]);
    b.add_type(ForeignTypeInfo::class("System", "Delegate").with_abstract().with_base(object.clone()));
    b.add_type(ForeignTypeInfo::class("System", "MulticastDelegate").with_abstract().with_base(system("Delegate")));
    b.add_type(ForeignTypeInfo::class("System", "Attribute").with_abstract().with_base(object.clone()));
    let h = b.add_type(ForeignTypeInfo::class("System", "Type").with_abstract().with_base(object.clone()));
    add(&mut b, h, vec![ForeignMemberInfo::property("Name", string.clone())]);
    let h = b.add_type(ForeignTypeInfo::class("System", "Exception").with_base(object.clone()));
    add(
        &mut b,
        h,
        vec![
            ForeignMemberInfo::constructor(void.clone()),
            ForeignMemberInfo::constructor(void.clone()).with_param("message", string.clone()),
            ForeignMemberInfo::property("Message", string.clone()).with_virtual(),
        ],
    );

    for &(keyword, full) in PREDEFINED_TYPES {
        let name = full.trim_start_matches("System.");
        if matches!(keyword, "object" | "string") {
            continue;
        }
        let h = b.add_type(ForeignTypeInfo::new(ForeignTypeKind::Struct, "System", name).with_base(system("ValueType")));
        if keyword == "void" {
            continue;
        }
        let this = system(name);
        let mut members = vec![ForeignMemberInfo::method("ToString", string.clone()).with_override()];
        if is_numeric(keyword) {
            members.push(ForeignMemberInfo::field("MaxValue", this.clone()).static_member());
            members.push(ForeignMemberInfo::field("MinValue", this.clone()).static_member());
            members.push(
                ForeignMemberInfo::method("Parse", this.clone())
                    .static_member()
                    .with_param("s", string.clone()),
            );
        }
        add(&mut b, h, members);
    }

    let h = b.add_type(
        ForeignTypeInfo::class("System", "String")
            .with_sealed()
            .with_base(object.clone())
            .with_interface(enumerable_of(system("Char"))),
    );
    add(
        &mut b,
        h,
        vec![
            ForeignMemberInfo::constructor(void.clone())
                .with_param("c", system("Char"))
                .with_param("count", int.clone()),
            ForeignMemberInfo::field("Empty", string.clone()).static_member(),
            ForeignMemberInfo::property("Length", int.clone()),
            ForeignMemberInfo::property("Item", system("Char")).with_param("index", int.clone()),
            ForeignMemberInfo::method("Substring", string.clone()).with_param("startIndex", int.clone()),
            ForeignMemberInfo::method("Substring", string.clone())
                .with_param("startIndex", int.clone())
                .with_param("length", int.clone()),
            ForeignMemberInfo::method("IndexOf", int.clone()).with_param("value", system("Char")),
            ForeignMemberInfo::method("IndexOf", int.clone()).with_param("value", string.clone()),
            ForeignMemberInfo::method("Contains", boolean.clone()).with_param("value", string.clone()),
            ForeignMemberInfo::method("ToUpper", string.clone()),
            ForeignMemberInfo::method("ToString", string.clone()).with_override(),
            ForeignMemberInfo::method("Concat", string.clone())
                .static_member()
                .with_param("arg0", object.clone())
                .with_param("arg1", object.clone()),
            ForeignMemberInfo::method("Concat", string.clone())
                .static_member()
                .with_param("str0", string.clone())
                .with_param("str1", string.clone()),
            ForeignMemberInfo::method("Format", string.clone())
                .static_member()
                .with_param("format", string.clone())
                .with_params_array("args", object.clone()),
            ForeignMemberInfo::method("IsNullOrEmpty", boolean.clone())
                .static_member()
                .with_param("value", string.clone()),
        ],
    );

    let h = b.add_type(
        ForeignTypeInfo::new(ForeignTypeKind::Struct, "System", "Nullable")
            .with_generic_params(&["T"])
            .with_base(system("ValueType")),
    );
    add(
        &mut b,
        h,
        vec![
            ForeignMemberInfo::constructor(void.clone()).with_param("value", T(0)),
            ForeignMemberInfo::property("HasValue", boolean.clone()),
            ForeignMemberInfo::property("Value", T(0)),
            ForeignMemberInfo::method("GetValueOrDefault", T(0)),
        ],
    );

    let h = b.add_type(
        ForeignTypeInfo::class("System", "ObsoleteAttribute")
            .with_sealed()
            .with_base(system("Attribute")),
    );
    add(
        &mut b,
        h,
        vec![
            ForeignMemberInfo::constructor(void.clone()),
            ForeignMemberInfo::constructor(void.clone()).with_param("message", string.clone()),
            ForeignMemberInfo::property("Message", string.clone()),
        ],
    );

    let delegate = |b: &mut MetadataBuilder, name: &str, params: &[&str], invoke: ForeignMemberInfo| {
        let h = b.add_type(
            ForeignTypeInfo::new(ForeignTypeKind::Delegate, "System", name)
                .with_generic_params(params)
                .with_base(system("MulticastDelegate")),
        );
        b.add_member(h, invoke);
    };
    delegate(&mut b, "Action", &[], ForeignMemberInfo::method("Invoke", void.clone()).with_virtual());
    delegate(
        &mut b,
        "Action",
        &["T"],
        ForeignMemberInfo::method("Invoke", void.clone()).with_virtual().with_param("obj", T(0)),
    );
    delegate(&mut b, "Func", &["TResult"], ForeignMemberInfo::method("Invoke", T(0)).with_virtual());
    delegate(
        &mut b,
        "Func",
        &["T", "TResult"],
        ForeignMemberInfo::method("Invoke", T(1)).with_virtual().with_param("arg", T(0)),
    );
    delegate(
        &mut b,
        "Func",
        &["T1", "T2", "TResult"],
        ForeignMemberInfo::method("Invoke", T(2))
            .with_virtual()
            .with_param("arg1", T(0))
            .with_param("arg2", T(1)),
    );

    let h = b.add_type(
        ForeignTypeInfo::class("System", "Console")
            .with_abstract()
            .with_sealed()
            .with_base(object.clone()),
    );
    add(
        &mut b,
        h,
        vec![
            ForeignMemberInfo::method("WriteLine", void.clone()).static_member(),
            ForeignMemberInfo::method("WriteLine", void.clone())
                .static_member()
                .with_param("value", string.clone()),
            ForeignMemberInfo::method("WriteLine", void.clone())
                .static_member()
                .with_param("value", int.clone()),
            ForeignMemberInfo::method("WriteLine", void.clone())
                .static_member()
                .with_param("value", object.clone()),
            ForeignMemberInfo::method("WriteLine", void.clone())
                .static_member()
                .with_param("format", string.clone())
                .with_params_array("arg", object.clone()),
            ForeignMemberInfo::method("ReadLine", string.clone()).static_member(),
        ],
    );

    let h = b.add_type(
        ForeignTypeInfo::class("System", "Math")
            .with_abstract()
            .with_sealed()
            .with_base(object.clone()),
    );
    add(
        &mut b,
        h,
        vec![
            ForeignMemberInfo::field("PI", double.clone()).static_member(),
            ForeignMemberInfo::method("Abs", int.clone()).static_member().with_param("value", int.clone()),
            ForeignMemberInfo::method("Abs", double.clone())
                .static_member()
                .with_param("value", double.clone()),
            ForeignMemberInfo::method("Max", int.clone())
                .static_member()
                .with_param("val1", int.clone())
                .with_param("val2", int.clone()),
            ForeignMemberInfo::method("Max", double.clone())
                .static_member()
                .with_param("val1", double.clone())
                .with_param("val2", double.clone()),
        ],
    );

    // System.Collections and System.Collections.Generic
    b.add_type(ForeignTypeInfo::new(ForeignTypeKind::Interface, "System.Collections", "IEnumerable"));
    b.add_type(
        ForeignTypeInfo::new(ForeignTypeKind::Interface, "System.Collections.Generic", "IEnumerable")
            .with_generic_params(&["T"])
            .with_interface(core("System.Collections.IEnumerable")),
    );
    let h = b.add_type(
        ForeignTypeInfo::new(ForeignTypeKind::Interface, "System.Collections.Generic", "ICollection")
            .with_generic_params(&["T"])
            .with_interface(enumerable_of(T(0))),
    );
    add(
        &mut b,
        h,
        vec![
            ForeignMemberInfo::property("Count", int.clone()),
            ForeignMemberInfo::method("Add", void.clone()).with_param("item", T(0)),
        ],
    );
    let h = b.add_type(
        ForeignTypeInfo::class("System.Collections.Generic", "List")
            .with_generic_params(&["T"])
            .with_base(object.clone())
            .with_interface(ForeignTypeRef::generic(
                core("System.Collections.Generic.ICollection`1"),
                vec![T(0)],
            ))
            .with_interface(enumerable_of(T(0))),
    );
    add(
        &mut b,
        h,
        vec![
            ForeignMemberInfo::constructor(void.clone()),
            ForeignMemberInfo::constructor(void.clone()).with_param("capacity", int.clone()),
            ForeignMemberInfo::constructor(void.clone()).with_param("collection", enumerable_of(T(0))),
            ForeignMemberInfo::property("Count", int.clone()),
            ForeignMemberInfo::property("Item", T(0)).with_param("index", int.clone()),
            ForeignMemberInfo::method("Add", void.clone()).with_param("item", T(0)),
            ForeignMemberInfo::method("Remove", boolean.clone()).with_param("item", T(0)),
            ForeignMemberInfo::method("Contains", boolean.clone()).with_param("item", T(0)),
            ForeignMemberInfo::method("ToArray", ForeignTypeRef::array_of(T(0))),
        ],
    );
    let h = b.add_type(
        ForeignTypeInfo::class("System.Collections.Generic", "Dictionary")
            .with_generic_params(&["TKey", "TValue"])
            .with_base(object.clone()),
    );
    add(
        &mut b,
        h,
        vec![
            ForeignMemberInfo::constructor(void.clone()),
            ForeignMemberInfo::property("Count", int.clone()),
            ForeignMemberInfo::property("Item", T(1)).with_param("key", T(0)),
            ForeignMemberInfo::method("Add", void.clone())
                .with_param("key", T(0))
                .with_param("value", T(1)),
            ForeignMemberInfo::method("ContainsKey", boolean.clone()).with_param("key", T(0)),
        ],
    );

    // System.Linq
    let source = || enumerable_of(M(0));
    let h = b.add_type(
        ForeignTypeInfo::class("System.Linq", "Enumerable")
            .with_abstract()
            .with_sealed()
            .with_base(object.clone()),
    );
    add(
        &mut b,
        h,
        vec![
            ForeignMemberInfo::method("Select", enumerable_of(M(1)))
                .with_extension()
                .with_generic_params(&["TSource", "TResult"])
                .with_param("source", source())
                .with_param("selector", ForeignTypeRef::generic(system("Func`2"), vec![M(0), M(1)])),
            ForeignMemberInfo::method("Where", source())
                .with_extension()
                .with_generic_params(&["TSource"])
                .with_param("source", source())
                .with_param("predicate", ForeignTypeRef::generic(system("Func`2"), vec![M(0), boolean.clone()])),
            ForeignMemberInfo::method("First", M(0))
                .with_extension()
                .with_generic_params(&["TSource"])
                .with_param("source", source()),
            ForeignMemberInfo::method("Count", int.clone())
                .with_extension()
                .with_generic_params(&["TSource"])
                .with_param("source", source()),
            ForeignMemberInfo::method(
                "ToList",
                ForeignTypeRef::generic(core("System.Collections.Generic.List`1"), vec![M(0)]),
            )
            .with_extension()
            .with_generic_params(&["TSource"])
            .with_param("source", source()),
            ForeignMemberInfo::method("ToArray", ForeignTypeRef::array_of(M(0)))
                .with_extension()
                .with_generic_params(&["TSource"])
                .with_param("source", source()),
        ],
    );

    b.finish()
}

// ============================================================================
// MODEL ACCESS
// ============================================================================

impl SemanticModel {
    /// Type symbol for a predefined keyword; `UnknownType` if the core
    /// library does not define it.
    pub fn builtin_type(&mut self, keyword: &str) -> SymbolId {
        if let Some(&id) = self.builtins.get(keyword) {
            return id;
        }
        let Some((keyword, full)) = PREDEFINED_TYPES.iter().find(|(k, _)| *k == keyword).copied() else {
            return self.sentinel(Sentinel::UnknownType);
        };
        match self.type_by_full_name(full) {
            Some(ty) => {
                self.builtins.insert(keyword, ty);
                ty
            }
            None => self.sentinel(Sentinel::UnknownType),
        }
    }

    /// Keyword naming `ty`, for predefined types.
    pub fn builtin_keyword(&mut self, ty: SymbolId) -> Option<&'static str> {
        if self.symbol(ty).kind == SymbolKind::Instance || !self.symbol(ty).kind.is_type() {
            return None;
        }
        if !matches!(self.symbol(ty).shape, Shape::Definition) {
            return None;
        }
        PREDEFINED_TYPES
            .iter()
            .map(|&(k, _)| k)
            .find(|k| self.builtin_type(k) == ty)
    }

    /// Looks a type up by metadata full name, e.g.
    /// ``System.Collections.Generic.List`1`` or `Outer+Inner`.
    pub fn type_by_full_name(&mut self, full_name: &str) -> Option<SymbolId> {
        let (path, nested) = match full_name.split_once('+') {
            Some((outer, rest)) => (outer, Some(rest)),
            None => (full_name, None),
        };
        let (namespace, type_name) = match path.rsplit_once('.') {
            Some((ns, name)) => (Some(ns), name),
            None => (None, path),
        };
        let mut owner = self.global_namespace();
        for segment in namespace.into_iter().flat_map(|ns| ns.split('.')) {
            owner = self.namespace_member(owner, segment)?;
        }
        let mut ty = self.namespace_member(owner, type_name)?;
        for inner in nested.into_iter().flat_map(|n| n.split('+')) {
            let (name, arity) = split_arity(inner);
            ty = self.find_own_member(ty, name, arity)?;
        }
        self.symbol(ty).kind.is_type().then_some(ty)
    }

    pub(crate) fn object_type(&mut self) -> SymbolId {
        self.builtin_type("object")
    }

    /// Type of a literal token.
    pub fn literal_type(&mut self, token: &Token) -> SymbolId {
        if token.is("null") {
            return self.null_type;
        }
        match literal_keyword(token) {
            Some(keyword) => self.builtin_type(keyword),
            None => self.sentinel(Sentinel::UnknownType),
        }
    }

    pub(crate) fn generic_type_by_name(&mut self, namespace: &str, name: &str, arity: usize) -> Option<SymbolId> {
        self.type_by_full_name(&format!("{namespace}.{}", member_key(name, arity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::TextRange;
    use crate::hir::metadata::MetadataProvider;

    #[test]
    fn test_numeric_tables() {
        assert!(is_numeric_widening("int", "long"));
        assert!(is_numeric_widening("char", "int"));
        assert!(!is_numeric_widening("long", "int"));
        assert!(!is_numeric_widening("double", "float"));
        assert_eq!(binary_numeric_promotion("int", "double"), Some("double"));
        assert_eq!(binary_numeric_promotion("byte", "short"), Some("int"));
        assert_eq!(binary_numeric_promotion("uint", "int"), Some("long"));
        assert_eq!(binary_numeric_promotion("decimal", "double"), None);
        assert_eq!(binary_numeric_promotion("string", "int"), None);
    }

    #[test]
    fn test_literal_keywords() {
        let tok = |kind, text: &str| Token::new(kind, text, TextRange::default());
        assert_eq!(literal_keyword(&tok(TokenKind::IntegerLiteral, "42")), Some("int"));
        assert_eq!(literal_keyword(&tok(TokenKind::IntegerLiteral, "42UL")), Some("ulong"));
        assert_eq!(literal_keyword(&tok(TokenKind::IntegerLiteral, "0xFFL")), Some("long"));
        assert_eq!(literal_keyword(&tok(TokenKind::RealLiteral, "1.5f")), Some("float"));
        assert_eq!(literal_keyword(&tok(TokenKind::RealLiteral, "1e5")), Some("double"));
        assert_eq!(literal_keyword(&tok(TokenKind::RealLiteral, "2m")), Some("decimal"));
        assert_eq!(literal_keyword(&tok(TokenKind::Keyword, "true")), Some("bool"));
        assert_eq!(literal_keyword(&tok(TokenKind::Keyword, "null")), None);
    }

    #[test]
    fn test_core_library_contents() {
        let core = core_library();
        assert!(core.find_type("System.Object").is_some());
        assert!(core.find_type("System.Collections.Generic.List`1").is_some());
        assert!(core.find_type("System.Func`2").is_some());
        assert!(core.find_type("System.Linq.Enumerable").is_some());
    }

    #[test]
    fn test_builtin_types_resolve() {
        let mut model = SemanticModel::default();
        let int = model.builtin_type("int");
        assert_eq!(model.symbol(int).name, "Int32");
        assert_eq!(model.symbol(int).kind, SymbolKind::Struct);
        assert_eq!(model.builtin_keyword(int), Some("int"));
        assert_eq!(model.builtin_type("int"), int);
        let unknown = model.builtin_type("var");
        assert_eq!(model.symbol(unknown).sentinel, Some(Sentinel::UnknownType));
    }
}
