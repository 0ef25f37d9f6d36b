//! Interface to precompiled binaries.
//!
//! The engine never reads binary formats itself. A referenced binary is
//! anything implementing [`MetadataProvider`]: it exposes type and member
//! records addressed by opaque handles, with signatures expressed as
//! [`ForeignTypeRef`] trees. [`MetadataAssembly`] is an in-memory provider,
//! filled through [`MetadataBuilder`]; the bundled core library uses it.

use smol_str::SmolStr;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Ord, PartialOrd)]
pub struct ForeignTypeHandle(pub u32);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Ord, PartialOrd)]
pub struct ForeignMemberHandle(pub u32);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum ForeignVisibility {
    #[default]
    Public,
    Assembly,
    FamilyOrAssembly,
    Family,
    FamilyAndAssembly,
    Private,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ForeignTypeKind {
    Class,
    Struct,
    Interface,
    Enum,
    Delegate,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ForeignMemberKind {
    Field,
    Constant,
    /// A property; with parameters it is an indexer.
    Property,
    Event,
    Method,
    Constructor,
}

/// A type as it appears in a metadata signature.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum ForeignTypeRef {
    /// A type defined in the same binary.
    Type(ForeignTypeHandle),
    /// A type defined in another binary, by metadata full name
    /// (``System.Collections.Generic.List`1``, nested types joined by `+`).
    External { assembly: SmolStr, full_name: SmolStr },
    /// Type parameter of the declaring type, by position.
    GenericParam(u32),
    /// Type parameter of the declaring method, by position.
    MethodGenericParam(u32),
    Array(Box<ForeignTypeRef>, u32),
    /// A generic type applied to arguments.
    Generic(Box<ForeignTypeRef>, Vec<ForeignTypeRef>),
}

impl ForeignTypeRef {
    pub fn external(assembly: &str, full_name: &str) -> Self {
        ForeignTypeRef::External {
            assembly: assembly.into(),
            full_name: full_name.into(),
        }
    }

    pub fn array_of(element: ForeignTypeRef) -> Self {
        ForeignTypeRef::Array(Box::new(element), 1)
    }

    pub fn generic(definition: ForeignTypeRef, args: Vec<ForeignTypeRef>) -> Self {
        ForeignTypeRef::Generic(Box::new(definition), args)
    }
}

#[derive(Clone, Debug)]
pub struct ForeignTypeInfo {
    pub namespace: SmolStr,
    /// Name without the arity suffix.
    pub name: SmolStr,
    pub kind: ForeignTypeKind,
    pub visibility: ForeignVisibility,
    pub is_abstract: bool,
    pub is_sealed: bool,
    pub generic_params: Vec<SmolStr>,
    pub base: Option<ForeignTypeRef>,
    pub interfaces: Vec<ForeignTypeRef>,
    pub declaring_type: Option<ForeignTypeHandle>,
    pub members: Vec<ForeignMemberHandle>,
    pub nested: Vec<ForeignTypeHandle>,
}

impl ForeignTypeInfo {
    pub fn new(kind: ForeignTypeKind, namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            kind,
            visibility: ForeignVisibility::Public,
            is_abstract: kind == ForeignTypeKind::Interface,
            is_sealed: matches!(
                kind,
                ForeignTypeKind::Struct | ForeignTypeKind::Enum | ForeignTypeKind::Delegate
            ),
            generic_params: Vec::new(),
            base: None,
            interfaces: Vec::new(),
            declaring_type: None,
            members: Vec::new(),
            nested: Vec::new(),
        }
    }

    pub fn class(namespace: &str, name: &str) -> Self {
        Self::new(ForeignTypeKind::Class, namespace, name)
    }

    pub fn with_visibility(mut self, visibility: ForeignVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_generic_params(mut self, params: &[&str]) -> Self {
        self.generic_params = params.iter().map(|p| SmolStr::new(p)).collect();
        self
    }

    pub fn with_base(mut self, base: ForeignTypeRef) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_interface(mut self, interface: ForeignTypeRef) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn with_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_sealed(mut self) -> Self {
        self.is_sealed = true;
        self
    }

    pub fn nested_in(mut self, declaring_type: ForeignTypeHandle) -> Self {
        self.declaring_type = Some(declaring_type);
        self
    }

    /// Name with the arity suffix, as stored in metadata.
    pub fn metadata_name(&self) -> SmolStr {
        super::symbols::member_key(&self.name, self.generic_params.len())
    }
}

#[derive(Clone, Debug)]
pub struct ForeignParameterInfo {
    pub name: SmolStr,
    pub ty: ForeignTypeRef,
    pub is_optional: bool,
    pub is_params: bool,
    pub is_ref: bool,
    pub is_out: bool,
}

#[derive(Clone, Debug)]
pub struct ForeignMemberInfo {
    pub name: SmolStr,
    pub kind: ForeignMemberKind,
    pub visibility: ForeignVisibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_virtual: bool,
    pub is_override: bool,
    pub is_extension: bool,
    pub generic_params: Vec<SmolStr>,
    /// Field, property or event type; method return type.
    pub ty: ForeignTypeRef,
    pub parameters: Vec<ForeignParameterInfo>,
}

impl ForeignMemberInfo {
    pub fn new(kind: ForeignMemberKind, name: &str, ty: ForeignTypeRef) -> Self {
        Self {
            name: name.into(),
            kind,
            visibility: ForeignVisibility::Public,
            is_static: false,
            is_abstract: false,
            is_virtual: false,
            is_override: false,
            is_extension: false,
            generic_params: Vec::new(),
            ty,
            parameters: Vec::new(),
        }
    }

    pub fn method(name: &str, return_type: ForeignTypeRef) -> Self {
        Self::new(ForeignMemberKind::Method, name, return_type)
    }

    pub fn constructor(void: ForeignTypeRef) -> Self {
        Self::new(ForeignMemberKind::Constructor, ".ctor", void)
    }

    pub fn field(name: &str, ty: ForeignTypeRef) -> Self {
        Self::new(ForeignMemberKind::Field, name, ty)
    }

    pub fn property(name: &str, ty: ForeignTypeRef) -> Self {
        Self::new(ForeignMemberKind::Property, name, ty)
    }

    pub fn with_visibility(mut self, visibility: ForeignVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn static_member(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn with_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    pub fn with_override(mut self) -> Self {
        self.is_virtual = true;
        self.is_override = true;
        self
    }

    pub fn with_extension(mut self) -> Self {
        self.is_static = true;
        self.is_extension = true;
        self
    }

    pub fn with_generic_params(mut self, params: &[&str]) -> Self {
        self.generic_params = params.iter().map(|p| SmolStr::new(p)).collect();
        self
    }

    pub fn with_param(mut self, name: &str, ty: ForeignTypeRef) -> Self {
        self.parameters.push(ForeignParameterInfo {
            name: name.into(),
            ty,
            is_optional: false,
            is_params: false,
            is_ref: false,
            is_out: false,
        });
        self
    }

    pub fn with_optional_param(mut self, name: &str, ty: ForeignTypeRef) -> Self {
        self = self.with_param(name, ty);
        if let Some(last) = self.parameters.last_mut() {
            last.is_optional = true;
        }
        self
    }

    pub fn with_params_array(mut self, name: &str, element: ForeignTypeRef) -> Self {
        self = self.with_param(name, ForeignTypeRef::array_of(element));
        if let Some(last) = self.parameters.last_mut() {
            last.is_params = true;
        }
        self
    }
}

/// Access to one precompiled binary.
pub trait MetadataProvider {
    fn assembly_name(&self) -> &str;

    /// Assemblies allowed to see this binary's internal members.
    fn internals_visible_to(&self) -> &[SmolStr] {
        &[]
    }

    fn type_handles(&self) -> Vec<ForeignTypeHandle>;

    fn type_info(&self, handle: ForeignTypeHandle) -> Option<&ForeignTypeInfo>;

    fn member_info(&self, handle: ForeignMemberHandle) -> Option<&ForeignMemberInfo>;

    /// Looks a type up by metadata full name.
    fn find_type(&self, full_name: &str) -> Option<ForeignTypeHandle> {
        self.type_handles()
            .into_iter()
            .find(|&h| self.full_name(h).as_deref() == Some(full_name))
    }

    /// ``Namespace.Outer+Inner`1`` style name of a type.
    fn full_name(&self, handle: ForeignTypeHandle) -> Option<String> {
        let info = self.type_info(handle)?;
        match info.declaring_type {
            Some(outer) => Some(format!("{}+{}", self.full_name(outer)?, info.metadata_name())),
            None if info.namespace.is_empty() => Some(info.metadata_name().to_string()),
            None => Some(format!("{}.{}", info.namespace, info.metadata_name())),
        }
    }
}

/// In-memory metadata for one binary.
#[derive(Clone, Debug, Default)]
pub struct MetadataAssembly {
    name: SmolStr,
    internals_visible_to: Vec<SmolStr>,
    types: Vec<ForeignTypeInfo>,
    members: Vec<ForeignMemberInfo>,
}

impl MetadataProvider for MetadataAssembly {
    fn assembly_name(&self) -> &str {
        &self.name
    }

    fn internals_visible_to(&self) -> &[SmolStr] {
        &self.internals_visible_to
    }

    fn type_handles(&self) -> Vec<ForeignTypeHandle> {
        (0..self.types.len() as u32).map(ForeignTypeHandle).collect()
    }

    fn type_info(&self, handle: ForeignTypeHandle) -> Option<&ForeignTypeInfo> {
        self.types.get(handle.0 as usize)
    }

    fn member_info(&self, handle: ForeignMemberHandle) -> Option<&ForeignMemberInfo> {
        self.members.get(handle.0 as usize)
    }
}

#[derive(Debug)]
pub struct MetadataBuilder {
    assembly: MetadataAssembly,
}

impl MetadataBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            assembly: MetadataAssembly {
                name: name.into(),
                ..MetadataAssembly::default()
            },
        }
    }

    pub fn internals_visible_to(&mut self, assembly: &str) -> &mut Self {
        self.assembly.internals_visible_to.push(assembly.into());
        self
    }

    pub fn add_type(&mut self, info: ForeignTypeInfo) -> ForeignTypeHandle {
        let handle = ForeignTypeHandle(self.assembly.types.len() as u32);
        if let Some(outer_info) = info
            .declaring_type
            .and_then(|outer| self.assembly.types.get_mut(outer.0 as usize))
        {
            outer_info.nested.push(handle);
        }
        self.assembly.types.push(info);
        handle
    }

    /// Adds a member to `owner`. Returns `None` if `owner` is not a type of
    /// this builder.
    pub fn add_member(
        &mut self,
        owner: ForeignTypeHandle,
        info: ForeignMemberInfo,
    ) -> Option<ForeignMemberHandle> {
        let handle = ForeignMemberHandle(self.assembly.members.len() as u32);
        self.assembly.types.get_mut(owner.0 as usize)?.members.push(handle);
        self.assembly.members.push(info);
        Some(handle)
    }

    pub fn finish(self) -> MetadataAssembly {
        self.assembly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_names_and_lookup() {
        let mut b = MetadataBuilder::new("Widgets");
        let outer = b.add_type(
            ForeignTypeInfo::class("Acme.Ui", "Panel").with_generic_params(&["T"]),
        );
        let inner = b.add_type(ForeignTypeInfo::class("", "Slot").nested_in(outer));
        let asm = b.finish();

        assert_eq!(asm.full_name(outer).as_deref(), Some("Acme.Ui.Panel`1"));
        assert_eq!(asm.full_name(inner).as_deref(), Some("Acme.Ui.Panel`1+Slot"));
        assert_eq!(asm.find_type("Acme.Ui.Panel`1"), Some(outer));
        assert_eq!(asm.type_info(outer).unwrap().nested, vec![inner]);
        assert!(asm.find_type("Acme.Ui.Panel").is_none());
    }

    #[test]
    fn test_member_builders() {
        let mut b = MetadataBuilder::new("Widgets");
        let ty = b.add_type(ForeignTypeInfo::class("Acme", "Widget"));
        let int = ForeignTypeRef::external("mscorlib", "System.Int32");
        let m = b
            .add_member(
                ty,
                ForeignMemberInfo::method("Resize", int.clone())
                    .with_param("w", int.clone())
                    .with_optional_param("h", int.clone())
                    .with_params_array("rest", int),
            )
            .unwrap();
        let asm = b.finish();
        let info = asm.member_info(m).unwrap();
        assert_eq!(info.parameters.len(), 3);
        assert!(info.parameters[1].is_optional);
        assert!(info.parameters[2].is_params);
        assert!(matches!(info.parameters[2].ty, ForeignTypeRef::Array(_, 1)));
        assert_eq!(asm.type_info(ty).unwrap().members, vec![m]);
    }
}
