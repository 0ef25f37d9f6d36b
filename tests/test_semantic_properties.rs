//! End-to-end resolution properties
//!
//! Each test feeds source text through the bundled parser into a fresh
//! `SemanticModel` and checks what identifiers resolve to.

use std::rc::Rc;

use pretty_assertions::assert_eq;
use symgraph::base::FileId;
use symgraph::hir::metadata::{ForeignMemberInfo, ForeignTypeInfo, ForeignTypeRef};
use symgraph::hir::{MetadataBuilder, SemanticModel, Sentinel, SymbolId, SymbolKind};
use symgraph::syntax::{NodeRef, Rule};

fn nth_leaf(model: &SemanticModel, file: FileId, text: &str, nth: usize) -> NodeRef {
    let tree = model.tree(file).unwrap();
    let node = tree
        .descendants(tree.root().unwrap())
        .into_iter()
        .filter(|&n| tree.token(n).is_some_and(|t| t.is(text)))
        .nth(nth)
        .unwrap_or_else(|| panic!("no leaf `{text}` #{nth}"));
    NodeRef::new(file, node)
}

fn nth_node(model: &SemanticModel, file: FileId, rule: Rule, nth: usize) -> NodeRef {
    let tree = model.tree(file).unwrap();
    let node = tree
        .descendants(tree.root().unwrap())
        .into_iter()
        .filter(|&n| tree.rule(n) == Some(rule))
        .nth(nth)
        .unwrap_or_else(|| panic!("no {rule:?} #{nth}"));
    NodeRef::new(file, node)
}

fn global_type(model: &mut SemanticModel, name: &str, arity: usize) -> SymbolId {
    let global = model.global_namespace();
    model
        .find_name(global, name, arity, true)
        .unwrap_or_else(|| panic!("no type {name}"))
}

fn field_type(model: &mut SemanticModel, owner: SymbolId, field: &str) -> SymbolId {
    let field = model
        .find_name(owner, field, 0, false)
        .unwrap_or_else(|| panic!("no field {field}"));
    model.type_of(field)
}

#[test]
fn test_detached_declarations_are_pruned() {
    let mut model = SemanticModel::default();
    let file = model.add_file("a.cs", "class Keep {} class Drop {}");
    let drop = global_type(&mut model, "Drop", 0);
    assert!(model.is_valid(drop));

    let class = nth_node(&model, file, Rule::ClassDeclaration, 1);
    assert!(model.edit_tree(file, |tree| tree.detach(class.node)).unwrap());

    assert!(!model.is_valid(drop));
    let global = model.global_namespace();
    assert_eq!(model.find_name(global, "Drop", 0, true), None);
    assert!(model.find_name(global, "Keep", 0, true).is_some());
}

#[test]
fn test_constructed_types_follow_their_definition() {
    let mut model = SemanticModel::default();
    let file = model.add_file("a.cs", "class G<T> { public T item; }\nclass U { G<int> a; G<int>[] b; }");
    let g = global_type(&mut model, "G", 1);
    let u = global_type(&mut model, "U", 0);
    let constructed = field_type(&mut model, u, "a");
    let array = field_type(&mut model, u, "b");
    let item = model.find_name(constructed, "item", 0, false).unwrap();
    assert!(model.is_valid(constructed));
    assert!(model.is_valid(array));
    assert!(model.is_valid(item));

    let class = nth_node(&model, file, Rule::ClassDeclaration, 0);
    assert!(model.edit_tree(file, |tree| tree.detach(class.node)).unwrap());

    assert!(!model.is_valid(g));
    assert!(!model.is_valid(constructed));
    assert!(!model.is_valid(array));
    assert!(!model.is_valid(item));
    let int = model.builtin_type("int");
    let ints = model.array_of(int, 1);
    assert!(model.is_valid(ints));
}

#[test]
fn test_constructed_types_are_shared() {
    let mut model = SemanticModel::default();
    model.add_file("a.cs", "class G<T> {} class U { G<int> a; G<int> b; G<string> c; }");
    let u = global_type(&mut model, "U", 0);
    let a = field_type(&mut model, u, "a");
    let b = field_type(&mut model, u, "b");
    let c = field_type(&mut model, u, "c");
    assert_eq!(a, b);
    assert_ne!(a, c);

    let g = model.definition_root(a);
    let int = model.builtin_type("int");
    assert_eq!(model.construct_type(g, &[int]), a);
    assert_eq!(model.display_type(a), "G<int>");
}

#[test]
fn test_this_and_base_in_static_member() {
    let mut model = SemanticModel::default();
    let file = model.add_file(
        "a.cs",
        "class C { int n; static void M() { this.n = 1; base.ToString(); } void I() { this.n = 2; } }",
    );
    let this_static = model.resolve_node(nth_node(&model, file, Rule::ThisAccess, 0));
    assert_eq!(model.symbol(this_static).sentinel, Some(Sentinel::ThisInStaticMember));
    let base_static = model.resolve_node(nth_node(&model, file, Rule::BaseAccess, 0));
    assert_eq!(model.symbol(base_static).sentinel, Some(Sentinel::BaseInStaticMember));

    let this_instance = model.resolve_node(nth_node(&model, file, Rule::ThisAccess, 1));
    let c = global_type(&mut model, "C", 0);
    assert_eq!(model.type_of(this_instance), c);
}

#[test]
fn test_using_applies_from_its_position() {
    let mut model = SemanticModel::default();
    model.add_file("n.cs", "namespace N { public class X {} }");
    model.add_file("a.cs", "class Before { X x; }\nusing N;\nclass After { X x; }");

    let before = global_type(&mut model, "Before", 0);
    let ty = field_type(&mut model, before, "x");
    assert!(model.symbol(ty).is_sentinel());

    let after = global_type(&mut model, "After", 0);
    let ty = field_type(&mut model, after, "x");
    assert_eq!(model.full_name(ty), "N.X");
}

#[test]
fn test_foreign_generic_import_identity() {
    let int = ForeignTypeRef::external("mscorlib", "System.Int32");
    let mut b = MetadataBuilder::new("Boxes");
    let boxed = b.add_type(ForeignTypeInfo::class("Acme", "Box").with_generic_params(&["T"]));
    b.add_member(boxed, ForeignMemberInfo::method("Get", ForeignTypeRef::GenericParam(0)));
    let factory = b.add_type(ForeignTypeInfo::class("Acme", "Factory"));
    let box_of_int = ForeignTypeRef::generic(ForeignTypeRef::Type(boxed), vec![int]);
    b.add_member(factory, ForeignMemberInfo::field("first", box_of_int.clone()));
    b.add_member(factory, ForeignMemberInfo::field("second", box_of_int));

    let mut model = SemanticModel::default();
    model.add_foreign_assembly(Rc::new(b.finish())).unwrap();
    let file = model.add_file(
        "a.cs",
        "using Acme;\nclass U { Box<int> mine; void M() { var got = mine.Get(); } }",
    );

    let box_def = model.type_by_full_name("Acme.Box`1").unwrap();
    let int = model.builtin_type("int");
    let expected = model.construct_type(box_def, &[int]);

    let factory = model.type_by_full_name("Acme.Factory").unwrap();
    assert_eq!(field_type(&mut model, factory, "first"), expected);
    assert_eq!(field_type(&mut model, factory, "second"), expected);
    let u = global_type(&mut model, "U", 0);
    assert_eq!(field_type(&mut model, u, "mine"), expected);

    let got = model.resolve_node(nth_leaf(&model, file, "got", 0));
    assert_eq!(model.type_of(got), int);
}

#[test]
fn test_generic_method_parameter_end_to_end() {
    let mut model = SemanticModel::default();
    let file = model.add_file(
        "a.cs",
        "class C<T> { public T M(T x) { return x; } }\nclass U { void Run() { var r = new C<int>().M(5); } }",
    );

    let x = model.resolve_node(nth_leaf(&model, file, "x", 1));
    assert_eq!(model.symbol(x).kind, SymbolKind::Parameter);
    let x_type = model.type_of(x);
    assert_eq!(model.symbol(x_type).kind, SymbolKind::TypeParameter);
    assert_eq!(model.symbol(x_type).name, "T");

    let call = model.resolve_node(nth_node(&model, file, Rule::InvocationExpression, 0));
    let int = model.builtin_type("int");
    assert_eq!(model.type_of(call), int);
    let r = model.resolve_node(nth_leaf(&model, file, "r", 0));
    assert_eq!(model.type_of(r), int);
}

#[test]
fn test_implicitly_typed_array() {
    let mut model = SemanticModel::default();
    let file = model.add_file("a.cs", "class C { void M() { var items = new[] { 1, 2, 3 }; } }");
    let items = model.resolve_node(nth_leaf(&model, file, "items", 0));
    let ty = model.type_of(items);
    let int = model.builtin_type("int");
    assert_eq!(ty, model.array_of(int, 1));
    assert_eq!(model.display_type(ty), "int[]");
}

#[test]
fn test_derives_from_ref_rewrites_generic_target() {
    let mut model = SemanticModel::default();
    model.add_file("a.cs", "class B<T> {} class D : B<int> {} class E {}");
    let b = global_type(&mut model, "B", 1);
    let d = global_type(&mut model, "D", 0);
    let e = global_type(&mut model, "E", 0);
    let int = model.builtin_type("int");

    let mut target = b;
    assert!(model.derives_from_ref(d, &mut target));
    assert_eq!(target, model.construct_type(b, &[int]));

    let mut target = b;
    assert!(!model.derives_from_ref(e, &mut target));
    assert_eq!(target, b);

    let list = model.type_by_full_name("System.Collections.Generic.List`1").unwrap();
    let ints = model.construct_type(list, &[int]);
    let enumerable = model
        .type_by_full_name("System.Collections.Generic.IEnumerable`1")
        .unwrap();
    let mut target = enumerable;
    assert!(model.derives_from_ref(ints, &mut target));
    assert_eq!(model.display_type(target), "IEnumerable<int>");
}

#[test]
fn test_attribute_suffix_is_retried() {
    let mut model = SemanticModel::default();
    let file = model.add_file(
        "a.cs",
        "class MarkerAttribute : System.Attribute {}\n[Marker] class A {}\n[System.Obsolete] class B {}",
    );
    let marker = model.resolve_node(nth_node(&model, file, Rule::Attribute, 0));
    assert_eq!(model.symbol(marker).name, "MarkerAttribute");

    let obsolete = model.resolve_node(nth_node(&model, file, Rule::Attribute, 1));
    assert_eq!(model.full_name(obsolete), "System.ObsoleteAttribute");
}

#[test]
fn test_internal_types_across_assemblies() {
    let mut model = SemanticModel::default();
    let friendly = model.add_source_assembly("Friendly", &["Main"]).unwrap();
    let guarded = model.add_source_assembly("Guarded", &[]).unwrap();
    model
        .add_file_to(friendly, "f.cs", "namespace F { internal class Hidden {} }")
        .unwrap();
    model
        .add_file_to(guarded, "g.cs", "namespace G { internal class Secret {} public class Open {} }")
        .unwrap();
    model.add_file("main.cs", "using F; using G;\nclass U { Hidden h; Secret s; Open o; }");

    let u = global_type(&mut model, "U", 0);
    let hidden = field_type(&mut model, u, "h");
    assert_eq!(model.full_name(hidden), "F.Hidden");
    let secret = field_type(&mut model, u, "s");
    assert!(model.symbol(secret).is_sentinel());
    let open = field_type(&mut model, u, "o");
    assert_eq!(model.full_name(open), "G.Open");
}
