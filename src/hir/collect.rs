//! Indexing pass.
//!
//! Walks a tree once, attaching scopes to the nodes that open them and
//! registering a declaration for every name the tree introduces. Nothing is
//! resolved here; type references stay as nodes until someone asks.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::base::FileId;
use crate::syntax::{NodeId, NodeRef, Rule, SyntaxTree, TokenKind};

use super::declarations::{DeclKind, Declaration};
use super::ids::{AssemblyId, ScopeId, SymbolId};
use super::model::SemanticModel;
use super::scope::{Import, ScopeKind};
use super::symbols::{Accessibility, Modifiers, SymbolKind};

impl SemanticModel {
    pub(crate) fn index_file(&mut self, file: FileId) {
        let Some(source) = self.files.get(file) else {
            return;
        };
        let tree = source.tree.clone();
        let assembly = source.assembly;
        let Some(root) = tree.root() else {
            return;
        };
        let global = self.global;
        let scope = self.add_scope(ScopeKind::Namespace, NodeRef::new(file, root), Some(global), assembly);
        let mut collector = Collector {
            model: self,
            tree,
            file,
            assembly,
        };
        collector.children(root, scope);
        debug!(
            file = file.0,
            declarations = self.file_decls.get(&file).map_or(0, Vec::len),
            "indexed file"
        );
    }

    pub(crate) fn collect_subtree(&mut self, file: FileId, node: NodeId, scope: ScopeId) {
        let Some(source) = self.files.get(file) else {
            return;
        };
        let tree = source.tree.clone();
        let assembly = source.assembly;
        Collector {
            model: self,
            tree,
            file,
            assembly,
        }
        .walk(node, scope);
    }
}

struct Collector<'m> {
    model: &'m mut SemanticModel,
    tree: Rc<SyntaxTree>,
    file: FileId,
    assembly: AssemblyId,
}

impl Collector<'_> {
    fn at(&self, node: NodeId) -> NodeRef {
        NodeRef::new(self.file, node)
    }

    fn scope(&mut self, kind: ScopeKind, node: NodeId, owner: Option<SymbolId>) -> ScopeId {
        let at = self.at(node);
        self.model.add_scope(kind, at, owner, self.assembly)
    }

    fn declare(&mut self, decl: Declaration) -> Option<SymbolId> {
        match self.model.add_declaration(decl) {
            Ok((_, sym)) => Some(sym),
            Err(err) => {
                warn!(%err, "declaration skipped");
                None
            }
        }
    }

    fn text(&self, leaf: NodeId) -> String {
        self.tree.token(leaf).map(|t| t.text.to_string()).unwrap_or_default()
    }

    fn children(&mut self, node: NodeId, scope: ScopeId) {
        let tree = self.tree.clone();
        for &child in tree.children(node) {
            self.walk(child, scope);
        }
    }

    /// Walks the children not already handled by a declaration.
    fn remaining_children(&mut self, node: NodeId, scope: ScopeId) {
        let tree = self.tree.clone();
        for &child in tree.children(node) {
            match tree.rule(child) {
                Some(
                    Rule::Modifiers
                    | Rule::AttributeSection
                    | Rule::TypeParameterList
                    | Rule::FormalParameterList
                    | Rule::TypeReference
                    | Rule::AccessorList,
                ) => {}
                _ => self.walk(child, scope),
            }
        }
    }

    fn walk(&mut self, node: NodeId, scope: ScopeId) {
        let Some(rule) = self.tree.rule(node) else {
            return;
        };
        match rule {
            Rule::UsingDirective => self.using_directive(node, scope),
            Rule::UsingAlias => self.using_alias(node, scope),
            Rule::NamespaceDeclaration => self.namespace(node, scope),
            r if r.is_type_declaration() => self.type_declaration(node, rule, scope),
            Rule::FieldDeclaration => self.field(node, scope),
            Rule::PropertyDeclaration => self.property(node, scope),
            Rule::IndexerDeclaration => self.indexer(node, scope),
            Rule::EventDeclaration => self.event(node, scope),
            Rule::MethodDeclaration | Rule::ConstructorDeclaration => self.method(node, rule, scope),
            Rule::Block => {
                let block = self.scope(ScopeKind::LocalBlock, node, None);
                self.children(node, block);
            }
            Rule::LocalVariableDeclaration => self.local_declaration(node, scope),
            Rule::ForeachStatement => self.foreach(node),
            Rule::LambdaExpression => self.lambda(node),
            Rule::QueryExpression => self.query(node),
            Rule::AttributeSection => self.attribute_section(node),
            _ => self.children(node, scope),
        }
    }

    // ------------------------------------------------------------------------
    // Directives and namespaces
    // ------------------------------------------------------------------------

    fn using_directive(&mut self, node: NodeId, scope: ScopeId) {
        let Some(target) = self.tree.find_child(node, Rule::QualifiedName) else {
            return;
        };
        let Some(range) = self.tree.range(node) else {
            return;
        };
        let import = Import {
            target: self.at(target),
            position: range.end(),
        };
        if let Some(s) = self.model.scope_mut(scope) {
            s.imports.push(import);
        }
    }

    fn using_alias(&mut self, node: NodeId, scope: ScopeId) {
        let (Some(name), Some(target)) = (
            self.tree.find_identifier(node),
            self.tree.find_child(node, Rule::TypeReference),
        ) else {
            return;
        };
        let name = self.text(name);
        let target = self.at(target);
        if let Some(s) = self.model.scope_mut(scope) {
            s.aliases.push((name.into(), target));
        }
    }

    fn namespace(&mut self, node: NodeId, scope: ScopeId) {
        let Some(name) = self.tree.find_child(node, Rule::QualifiedName) else {
            return;
        };
        let global = self.model.global_namespace();
        let mut owner = self.model.scope_namespace(scope).unwrap_or(global);
        let tree = self.tree.clone();
        for &segment in tree.children(name) {
            if tree.token(segment).is_none_or(|t| t.kind != TokenKind::Identifier) {
                continue;
            }
            let decl = Declaration::new(DeclKind::Namespace, &self.text(segment), self.at(node), self.at(segment), scope)
                .with_owner(owner);
            match self.declare(decl) {
                Some(ns) => owner = ns,
                None => return,
            }
        }
        if let Some(body) = tree.find_child(node, Rule::NamespaceBody) {
            let body_scope = self.scope(ScopeKind::Namespace, body, Some(owner));
            self.children(body, body_scope);
        }
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    fn modifiers(&self, node: NodeId) -> Modifiers {
        let Some(mods) = self.tree.find_child(node, Rule::Modifiers) else {
            return Modifiers::empty();
        };
        self.tree
            .children(mods)
            .iter()
            .filter_map(|&leaf| self.tree.token(leaf))
            .fold(Modifiers::empty(), |acc, t| acc | Modifiers::from_keyword(&t.text))
    }

    fn accessibility(&self, node: NodeId, scope: ScopeId) -> Accessibility {
        let keywords: Vec<&str> = self
            .tree
            .find_child(node, Rule::Modifiers)
            .map(|mods| {
                self.tree
                    .children(mods)
                    .iter()
                    .filter_map(|&leaf| self.tree.token(leaf).map(|t| t.text.as_str()))
                    .collect()
            })
            .unwrap_or_default();
        let has = |k: &str| keywords.contains(&k);
        match (has("public"), has("protected"), has("internal"), has("private")) {
            (true, ..) => Accessibility::Public,
            (_, true, true, _) => Accessibility::ProtectedInternal,
            (_, true, false, _) => Accessibility::Protected,
            (_, false, true, _) => Accessibility::Internal,
            (_, false, false, true) => Accessibility::Private,
            _ => self.default_accessibility(scope),
        }
    }

    fn default_accessibility(&self, scope: ScopeId) -> Accessibility {
        let Some(scope) = self.model.scope(scope) else {
            return Accessibility::Private;
        };
        match (scope.kind, scope.owner) {
            (ScopeKind::Namespace, _) => Accessibility::Internal,
            (_, Some(owner)) => match self.model.symbol(owner).kind {
                SymbolKind::Interface | SymbolKind::Enum => Accessibility::Public,
                _ => Accessibility::Private,
            },
            _ => Accessibility::Private,
        }
    }

    fn type_parameter_count(&self, node: NodeId) -> usize {
        self.tree
            .find_child(node, Rule::TypeParameterList)
            .map_or(0, |list| self.tree.find_children(list, Rule::TypeParameter).count())
    }

    fn type_declaration(&mut self, node: NodeId, rule: Rule, scope: ScopeId) {
        let kind = match rule {
            Rule::StructDeclaration => DeclKind::Struct,
            Rule::InterfaceDeclaration => DeclKind::Interface,
            Rule::EnumDeclaration => DeclKind::Enum,
            Rule::DelegateDeclaration => DeclKind::Delegate,
            _ => DeclKind::Class,
        };
        let Some(name) = self.tree.find_identifier(node) else {
            return;
        };
        let decl = Declaration::new(kind, &self.text(name), self.at(node), self.at(name), scope)
            .with_type_parameter_count(self.type_parameter_count(node))
            .with_modifiers(self.modifiers(node))
            .with_access(self.accessibility(node, scope));
        let Some(ty) = self.declare(decl) else {
            return;
        };
        self.attributes(node);
        if let Some(list) = self.tree.find_child(node, Rule::TypeParameterList) {
            self.type_parameters(list, scope, ty);
        }
        if let Some(bases) = self.tree.find_child(node, Rule::BaseList) {
            self.scope(ScopeKind::BaseList, bases, Some(ty));
        }

        match kind {
            DeclKind::Enum => {
                let Some(body) = self.tree.find_child(node, Rule::EnumBody) else {
                    return;
                };
                let body_scope = self.scope(ScopeKind::TypeBody, body, Some(ty));
                let tree = self.tree.clone();
                for member in tree.find_children(body, Rule::EnumMember) {
                    let Some(name) = tree.find_identifier(member) else {
                        continue;
                    };
                    let decl = Declaration::new(
                        DeclKind::EnumMember,
                        &self.text(name),
                        self.at(member),
                        self.at(name),
                        body_scope,
                    )
                    .with_modifiers(Modifiers::STATIC);
                    self.declare(decl);
                    self.children(member, body_scope);
                }
            }
            DeclKind::Delegate => {
                let body_scope = self.scope(ScopeKind::TypeBody, node, Some(ty));
                if let Some(list) = self.tree.find_child(node, Rule::FormalParameterList) {
                    self.parameters(list, body_scope);
                }
            }
            _ => {
                if let Some(body) = self.tree.find_child(node, Rule::ClassBody) {
                    let body_scope = self.scope(ScopeKind::TypeBody, body, Some(ty));
                    self.children(body, body_scope);
                }
            }
        }
    }

    fn type_parameters(&mut self, list: NodeId, scope: ScopeId, owner: SymbolId) {
        let tree = self.tree.clone();
        for param in tree.find_children(list, Rule::TypeParameter) {
            let Some(name) = tree.find_identifier(param) else {
                continue;
            };
            let decl = Declaration::new(DeclKind::TypeParameter, &self.text(name), self.at(param), self.at(name), scope)
                .with_owner(owner);
            self.declare(decl);
        }
    }

    fn attributes(&mut self, node: NodeId) {
        let tree = self.tree.clone();
        for section in tree.find_children(node, Rule::AttributeSection) {
            self.attribute_section(section);
        }
    }

    fn attribute_section(&mut self, section: NodeId) {
        let tree = self.tree.clone();
        for attribute in tree.find_children(section, Rule::Attribute) {
            let scope = self.scope(ScopeKind::Attribute, attribute, None);
            if let Some(args) = tree.find_child(attribute, Rule::ArgumentList) {
                self.children(args, scope);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------------

    fn parameters(&mut self, list: NodeId, scope: ScopeId) {
        let tree = self.tree.clone();
        for param in tree.find_children(list, Rule::FormalParameter) {
            let Some(name) = tree.find_identifier(param) else {
                continue;
            };
            let mut modifiers = self.modifiers(param);
            if tree.find_token(param, "=").is_some() {
                modifiers |= Modifiers::OPTIONAL;
            }
            let decl = Declaration::new(DeclKind::Parameter, &self.text(name), self.at(param), self.at(name), scope)
                .with_modifiers(modifiers);
            self.declare(decl);
        }
    }

    fn field(&mut self, node: NodeId, scope: ScopeId) {
        let modifiers = self.modifiers(node);
        let access = self.accessibility(node, scope);
        let kind = if modifiers.contains(Modifiers::CONST) {
            DeclKind::Constant
        } else {
            DeclKind::Field
        };
        self.attributes(node);
        let tree = self.tree.clone();
        for declarator in tree.find_children(node, Rule::VariableDeclarator) {
            let Some(name) = tree.find_identifier(declarator) else {
                continue;
            };
            let decl = Declaration::new(kind, &self.text(name), self.at(declarator), self.at(name), scope)
                .with_modifiers(modifiers)
                .with_access(access);
            self.declare(decl);
            self.children(declarator, scope);
        }
    }

    fn property(&mut self, node: NodeId, scope: ScopeId) {
        let Some(name) = self.tree.find_identifier(node) else {
            return;
        };
        let decl = Declaration::new(DeclKind::Property, &self.text(name), self.at(node), self.at(name), scope)
            .with_modifiers(self.modifiers(node))
            .with_access(self.accessibility(node, scope));
        let Some(property) = self.declare(decl) else {
            return;
        };
        self.attributes(node);
        self.accessors(node, property);
        self.remaining_children(node, scope);
    }

    fn indexer(&mut self, node: NodeId, scope: ScopeId) {
        let Some(this) = self.tree.find_token(node, "this") else {
            return;
        };
        let decl = Declaration::new(DeclKind::Indexer, "Item", self.at(node), self.at(this), scope)
            .with_modifiers(self.modifiers(node))
            .with_access(self.accessibility(node, scope));
        let Some(indexer) = self.declare(decl) else {
            return;
        };
        self.attributes(node);
        let body_scope = self.scope(ScopeKind::MethodBody, node, Some(indexer));
        if let Some(list) = self.tree.find_child(node, Rule::FormalParameterList) {
            self.parameters(list, body_scope);
        }
        self.accessors(node, indexer);
    }

    fn event(&mut self, node: NodeId, scope: ScopeId) {
        let Some(name) = self.tree.find_identifier(node) else {
            return;
        };
        let decl = Declaration::new(DeclKind::Event, &self.text(name), self.at(node), self.at(name), scope)
            .with_modifiers(self.modifiers(node))
            .with_access(self.accessibility(node, scope));
        let Some(event) = self.declare(decl) else {
            return;
        };
        self.attributes(node);
        self.accessors(node, event);
    }

    fn accessors(&mut self, node: NodeId, owner: SymbolId) {
        let Some(list) = self.tree.find_child(node, Rule::AccessorList) else {
            return;
        };
        let tree = self.tree.clone();
        for accessor in tree.find_children(list, Rule::Accessor) {
            let is_getter = tree.find_token(accessor, "get").is_some();
            let scope = self.scope(ScopeKind::AccessorBody { is_getter }, accessor, Some(owner));
            if let Some(body) = tree.find_child(accessor, Rule::Block) {
                self.walk(body, scope);
            }
        }
    }

    fn method(&mut self, node: NodeId, rule: Rule, scope: ScopeId) {
        let Some(name) = self.tree.find_identifier(node) else {
            return;
        };
        let (kind, text) = if rule == Rule::ConstructorDeclaration {
            (DeclKind::Constructor, ".ctor".to_string())
        } else {
            (DeclKind::Method, self.text(name))
        };
        let decl = Declaration::new(kind, &text, self.at(node), self.at(name), scope)
            .with_type_parameter_count(self.type_parameter_count(node))
            .with_modifiers(self.modifiers(node))
            .with_access(self.accessibility(node, scope));
        let Some(method) = self.declare(decl) else {
            return;
        };
        self.attributes(node);
        let body_scope = self.scope(ScopeKind::MethodBody, node, Some(method));
        if let Some(list) = self.tree.find_child(node, Rule::TypeParameterList) {
            self.type_parameters(list, body_scope, method);
        }
        if let Some(list) = self.tree.find_child(node, Rule::FormalParameterList) {
            self.parameters(list, body_scope);
        }
        self.remaining_children(node, body_scope);
    }

    // ------------------------------------------------------------------------
    // Statements and expressions
    // ------------------------------------------------------------------------

    fn local_declaration(&mut self, node: NodeId, scope: ScopeId) {
        let modifiers = self.modifiers(node);
        let tree = self.tree.clone();
        for declarator in tree.find_children(node, Rule::VariableDeclarator) {
            let Some(name) = tree.find_identifier(declarator) else {
                continue;
            };
            let decl = Declaration::new(DeclKind::Local, &self.text(name), self.at(declarator), self.at(name), scope)
                .with_modifiers(modifiers);
            self.declare(decl);
            self.children(declarator, scope);
        }
    }

    fn foreach(&mut self, node: NodeId) {
        let body_scope = self.scope(ScopeKind::LocalBlock, node, None);
        if let Some(name) = self.tree.find_identifier(node) {
            let decl = Declaration::new(DeclKind::Local, &self.text(name), self.at(node), self.at(name), body_scope);
            self.declare(decl);
        }
        self.remaining_children(node, body_scope);
    }

    fn lambda(&mut self, node: NodeId) {
        let body_scope = self.scope(ScopeKind::LocalBlock, node, None);
        let tree = self.tree.clone();
        for param in tree.find_children(node, Rule::LambdaParameter) {
            let Some(name) = tree.find_identifier(param) else {
                continue;
            };
            let decl = Declaration::new(DeclKind::Parameter, &self.text(name), self.at(param), self.at(name), body_scope);
            self.declare(decl);
        }
        for &child in tree.children(node) {
            if tree.rule(child) != Some(Rule::LambdaParameter) {
                self.walk(child, body_scope);
            }
        }
    }

    fn query(&mut self, node: NodeId) {
        let body_scope = self.scope(ScopeKind::LocalBlock, node, None);
        let tree = self.tree.clone();
        for &clause in tree.children(node) {
            if matches!(tree.rule(clause), Some(Rule::FromClause | Rule::LetClause)) {
                // The clause keyword is itself an identifier token.
                let name = tree
                    .children(clause)
                    .iter()
                    .copied()
                    .filter(|&c| tree.token(c).is_some_and(|t| t.kind == TokenKind::Identifier))
                    .nth(1);
                if let Some(name) = name {
                    let decl = Declaration::new(DeclKind::Local, &self.text(name), self.at(clause), self.at(name), body_scope);
                    self.declare(decl);
                }
            }
            self.remaining_children(clause, body_scope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_segments_nest() {
        let mut model = SemanticModel::default();
        model.add_file("a.cs", "namespace A.B { class C {} }");
        let global = model.global_namespace();
        let a = model.symbol(global).member("A").unwrap();
        let b = model.symbol(a).member("B").unwrap();
        let c = model.symbol(b).member("C").unwrap();
        assert_eq!(model.symbol(c).kind, SymbolKind::Class);
        assert_eq!(model.symbol(c).access, Accessibility::Internal);
        assert_eq!(model.symbol(b).parent, Some(a));
    }

    #[test]
    fn test_members_and_parameters_are_registered() {
        let mut model = SemanticModel::default();
        model.add_file(
            "a.cs",
            "public class C<T> { public const int K = 1; int f; public T P { get; set; } \
             public C(int a) {} public void M<U>(U u, params int[] rest) {} public int this[int i] { get { return i; } } }",
        );
        let c = model.symbol(model.global_namespace()).member("C`1").unwrap();
        let symbol = model.symbol(c);
        assert_eq!(symbol.type_parameters().len(), 1);
        assert_eq!(model.symbol(symbol.member("K").unwrap()).kind, SymbolKind::ConstantField);
        assert_eq!(model.symbol(symbol.member("f").unwrap()).access, Accessibility::Private);
        assert_eq!(model.symbol(symbol.member(".ctor").unwrap()).kind, SymbolKind::Constructor);
        assert_eq!(model.symbol(symbol.member("Item").unwrap()).kind, SymbolKind::Indexer);

        let m = symbol.member("M").unwrap();
        let m = model.symbol(m);
        assert_eq!(m.type_parameters().len(), 1);
        assert_eq!(m.parameters().len(), 2);
        assert!(model.symbol(m.parameters()[1]).modifiers.contains(Modifiers::PARAMS));
    }

    #[test]
    fn test_using_directives_are_recorded() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "using System; using L = System.Collections.Generic.List<int>; class C {}");
        let tree = model.tree(file).unwrap();
        let root = model.enclosing_scope(NodeRef::new(file, tree.root().unwrap())).unwrap();
        let scope = model.scope(root).unwrap();
        assert_eq!(scope.imports().len(), 1);
        assert_eq!(scope.aliases.len(), 1);
        assert_eq!(scope.aliases[0].0, "L");
    }
}
