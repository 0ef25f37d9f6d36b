//! Property-based resolution tests.
//!
//! Generates type argument lists, unknown names and call arities and checks
//! the invariants that must hold for any of them: constructed types are
//! shared per argument list, unknown names end in sentinels rather than
//! panics, and `params` only wins when no fixed-arity overload applies.
#![cfg(feature = "proptest")]

use proptest::prelude::*;
use symgraph::hir::{Modifiers, SemanticModel};
use symgraph::syntax::{NodeRef, Rule};

const KEYWORDS: &[&str] = &["int", "long", "string", "bool", "double", "object", "char"];

fn generic_model() -> SemanticModel {
    let mut model = SemanticModel::default();
    model.add_file("g.cs", "class G<A> {} class G<A, B> {} class G<A, B, C> {}");
    model
}

fn keyword_list() -> impl Strategy<Value = Vec<&'static str>> {
    prop::collection::vec(prop::sample::select(KEYWORDS), 1..=3)
}

proptest! {
    #[test]
    fn constructed_types_are_interned(args in keyword_list(), other in keyword_list()) {
        let mut model = generic_model();
        let global = model.global_namespace();
        let construct = |model: &mut SemanticModel, args: &[&str]| {
            let generic = model.find_name(global, "G", args.len(), true).unwrap();
            let types: Vec<_> = args.iter().map(|k| model.builtin_type(k)).collect();
            model.construct_type(generic, &types)
        };
        let first = construct(&mut model, &args);
        let again = construct(&mut model, &args);
        prop_assert_eq!(first, again);
        let different = construct(&mut model, &other);
        prop_assert_eq!(first == different, args == other);
    }

    #[test]
    fn unknown_type_names_resolve_to_sentinels(name in "Z[a-z]{0,6}") {
        let mut model = SemanticModel::default();
        let text = format!("class C {{ {name} field; void M() {{ var x = {name}.Member; }} }}");
        model.add_file("a.cs", &text);
        let global = model.global_namespace();
        let c = model.find_name(global, "C", 0, true).unwrap();
        let field = model.find_name(c, "field", 0, false).unwrap();
        let ty = model.type_of(field);
        prop_assert!(model.symbol(ty).is_sentinel());
    }

    #[test]
    fn params_only_when_fixed_arity_fails(count in 0usize..6) {
        let mut model = SemanticModel::default();
        let args = vec!["1"; count].join(", ");
        let text = format!("class C {{ void F(int a) {{}} void F(params int[] a) {{}} void M() {{ F({args}); }} }}");
        let file = model.add_file("a.cs", &text);
        let tree = model.tree(file).unwrap();
        let call = tree
            .descendants(tree.root().unwrap())
            .into_iter()
            .find(|&n| tree.rule(n) == Some(Rule::InvocationExpression))
            .unwrap();
        let chosen = model.resolve_node(NodeRef::new(file, call));
        let parameter = model.symbol(chosen).parameters()[0];
        let is_params = model.symbol(parameter).modifiers.contains(Modifiers::PARAMS);
        prop_assert_eq!(is_params, count != 1);
    }
}
