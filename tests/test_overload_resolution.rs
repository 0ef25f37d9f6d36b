//! Overload selection at call sites
//!
//! The same four-overload family is called with different argument lists;
//! the chosen overload is identified by its parameter list.

use rstest::rstest;
use symgraph::base::FileId;
use symgraph::hir::{CallArgument, Modifiers, SemanticModel, Sentinel, SymbolId};
use symgraph::syntax::{NodeRef, Rule};

const FAMILY: &str = "void F() {} void F(int a) {} void F(int a, int b = 0) {} void F(params int[] a) {}";

fn call_site(model: &SemanticModel, file: FileId) -> NodeRef {
    let tree = model.tree(file).unwrap();
    let node = tree
        .descendants(tree.root().unwrap())
        .into_iter()
        .find(|&n| tree.rule(n) == Some(Rule::InvocationExpression))
        .expect("call site");
    NodeRef::new(file, node)
}

fn resolve_call(members: &str, call: &str) -> (SemanticModel, NodeRef, SymbolId) {
    let mut model = SemanticModel::default();
    let text = format!("class C {{ {members} void M() {{ {call}; }} }}");
    let file = model.add_file("a.cs", &text);
    let site = call_site(&model, file);
    let chosen = model.resolve_node(site);
    (model, site, chosen)
}

fn shape_of(model: &SemanticModel, method: SymbolId) -> (usize, bool) {
    let parameters = model.symbol(method).parameters();
    let params = parameters
        .last()
        .is_some_and(|&p| model.symbol(p).modifiers.contains(Modifiers::PARAMS));
    (parameters.len(), params)
}

#[rstest]
#[case::no_arguments("F()", 0, false)]
#[case::one_int("F(1)", 1, false)]
#[case::two_ints_prefer_defaulted_over_params("F(1, 2)", 2, false)]
#[case::three_ints_need_params("F(1, 2, 3)", 1, true)]
#[case::array_passed_to_params("F(new int[] { 1 })", 1, true)]
fn test_overload_family(#[case] call: &str, #[case] parameters: usize, #[case] params: bool) {
    let (model, _, chosen) = resolve_call(FAMILY, call);
    assert!(!model.symbol(chosen).is_sentinel(), "{call} did not resolve");
    assert_eq!(shape_of(&model, chosen), (parameters, params), "{call}");
}

#[test]
fn test_one_int_admits_all_but_parameterless() {
    let mut model = SemanticModel::default();
    model.add_file("a.cs", &format!("class C {{ {FAMILY} }}"));
    let global = model.global_namespace();
    let c = model.find_name(global, "C", 0, true).unwrap();
    let group = model.find_name(c, "F", 0, false).unwrap();
    let int = model.builtin_type("int");

    let mut admitted: Vec<_> = model
        .applicable_overloads(group, &[CallArgument::positional(int)], &[])
        .into_iter()
        .map(|m| shape_of(&model, m))
        .collect();
    admitted.sort();
    assert_eq!(admitted, vec![(1, false), (1, true), (2, false)]);
}

#[rstest]
#[case::positional("F(1, 1)")]
#[case::named_out_of_order("F(b: 1, a: 1)")]
fn test_mirrored_widening_is_ambiguous(#[case] call: &str) {
    let (model, site, chosen) = resolve_call("void F(int a, long b) {} void F(long a, int b) {}", call);
    assert_eq!(model.symbol(chosen).sentinel, Some(Sentinel::AmbiguousMethod));
    assert_eq!(model.ambiguity_candidates(site).len(), 2);
}

#[test]
fn test_better_conversion_target_breaks_tie() {
    let (mut model, _, chosen) = resolve_call("void F(double a) {} void F(long a) {} void F(float a) {}", "F(1)");
    assert_eq!(model.symbol(chosen).sentinel, None);
    let parameter = model.symbol(chosen).parameters()[0];
    let long = model.builtin_type("long");
    assert_eq!(model.type_of(parameter), long);
}

#[rstest]
#[case::too_many("void F(int a) {}", "F(1, 2)")]
#[case::wrong_type("void F(int a) {}", "F(\"s\")")]
#[case::unknown_named("void F(int a) {}", "F(b: 1)")]
fn test_unresolved(#[case] members: &str, #[case] call: &str) {
    let (model, _, chosen) = resolve_call(members, call);
    assert_eq!(model.symbol(chosen).sentinel, Some(Sentinel::UnresolvedMethod));
}

#[test]
fn test_derived_level_wins_over_base() {
    let mut model = SemanticModel::default();
    let file = model.add_file(
        "a.cs",
        "class B { public void F(int a) {} }\nclass D : B { public void F(long a) {} void M() { F(1); } }",
    );
    let site = call_site(&model, file);
    let chosen = model.resolve_node(site);
    let long = model.builtin_type("long");
    let parameter = model.symbol(chosen).parameters()[0];
    assert_eq!(model.type_of(parameter), long);
}

#[test]
fn test_override_is_not_a_candidate() {
    let mut model = SemanticModel::default();
    let file = model.add_file(
        "a.cs",
        "class B { public virtual void F(int a) {} }\n\
         class D : B { public override void F(int a) {} public void F(long a) {} void M() { F(1); } }",
    );
    let site = call_site(&model, file);
    let chosen = model.resolve_node(site);
    let long = model.builtin_type("long");
    let parameter = model.symbol(chosen).parameters()[0];
    assert_eq!(model.type_of(parameter), long);
}

#[test]
fn test_override_only_level_falls_through_to_base() {
    let mut model = SemanticModel::default();
    let file = model.add_file(
        "a.cs",
        "class B { public virtual void F(int a) {} }\nclass D : B { public override void F(int a) {} void M() { F(1); } }",
    );
    let site = call_site(&model, file);
    let chosen = model.resolve_node(site);
    let global = model.global_namespace();
    let b = model.find_name(global, "B", 0, true).unwrap();
    assert_eq!(model.symbol(chosen).parent, Some(b));
}

#[test]
fn test_ambiguity_cleared_once_call_resolves() {
    let (mut model, site, chosen) = resolve_call("void F(int a, long b) {} void F(long a, int b) {}", "F(1, 1)");
    assert_eq!(model.symbol(chosen).sentinel, Some(Sentinel::AmbiguousMethod));
    assert_eq!(model.ambiguity_candidates(site).len(), 2);

    let tree = model.tree(site.file).unwrap();
    let second = tree
        .descendants(tree.root().unwrap())
        .into_iter()
        .filter(|&n| tree.rule(n) == Some(Rule::MethodDeclaration))
        .nth(1)
        .unwrap();
    assert!(model.edit_tree(site.file, |tree| tree.detach(second)).unwrap());

    let chosen = model.resolve_node(site);
    assert_eq!(model.symbol(chosen).sentinel, None);
    assert!(model.ambiguity_candidates(site).is_empty());
}
