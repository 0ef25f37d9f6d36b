//! Overload resolution.
//!
//! Candidates are gathered level by level: the non-override methods
//! declared on the receiver's type first, then those of each base type. The
//! first level with an applicable candidate decides. Within a level the
//! best candidate has the most exactly matching arguments; ties prefer the
//! normal form over the expanded `params` form, fewer defaulted optional
//! parameters, non-generic methods, and finally more specific parameter
//! types. Anything still tied is ambiguous.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::trace;

use super::builtins::is_numeric_widening;
use super::ids::SymbolId;
use super::model::SemanticModel;
use super::symbols::{Modifiers, Shape, SymbolKind};

/// One argument of a call: its type and, for `name: value`, the name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallArgument {
    pub name: Option<SmolStr>,
    pub ty: SymbolId,
}

impl CallArgument {
    pub fn positional(ty: SymbolId) -> Self {
        Self { name: None, ty }
    }

    pub fn named(name: &str, ty: SymbolId) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OverloadResolution {
    Resolved(SymbolId),
    /// Tied best candidates.
    Ambiguous(Vec<SymbolId>),
    Unresolved,
}

#[derive(Clone, Debug)]
struct Applicable {
    method: SymbolId,
    exact: usize,
    expanded: bool,
    defaulted: usize,
    generic: bool,
    /// Parameter type matched by each argument.
    parameter_types: Vec<SymbolId>,
}

impl SemanticModel {
    /// Chooses the overload of `target` (a method or method group) that
    /// best fits `args`.
    pub fn resolve_overload(
        &mut self,
        target: SymbolId,
        args: &[CallArgument],
        type_args: &[SymbolId],
    ) -> OverloadResolution {
        for level in self.candidate_levels(target) {
            let applicable = self.applicable_in(&level, args, type_args);
            if applicable.is_empty() {
                continue;
            }
            return self.pick_best(applicable);
        }
        OverloadResolution::Unresolved
    }

    /// Resolution among an explicit candidate set, without walking bases.
    pub(crate) fn resolve_among(
        &mut self,
        candidates: &[SymbolId],
        args: &[CallArgument],
        type_args: &[SymbolId],
    ) -> OverloadResolution {
        let applicable = self.applicable_in(candidates, args, type_args);
        if applicable.is_empty() {
            OverloadResolution::Unresolved
        } else {
            self.pick_best(applicable)
        }
    }

    /// Every applicable candidate of the first level that has one.
    pub fn applicable_overloads(
        &mut self,
        target: SymbolId,
        args: &[CallArgument],
        type_args: &[SymbolId],
    ) -> Vec<SymbolId> {
        for level in self.candidate_levels(target) {
            let applicable = self.applicable_in(&level, args, type_args);
            if !applicable.is_empty() {
                return applicable.into_iter().map(|a| a.method).collect();
            }
        }
        Vec::new()
    }

    pub(crate) fn methods_of(&self, sym: SymbolId) -> Vec<SymbolId> {
        let symbol = self.symbol(sym);
        match symbol.kind {
            SymbolKind::MethodGroup => symbol
                .overloads
                .iter()
                .copied()
                .filter(|&o| self.is_valid(o))
                .collect(),
            SymbolKind::Method | SymbolKind::Constructor => vec![sym],
            _ => Vec::new(),
        }
    }

    fn non_override_methods(&self, sym: SymbolId) -> Vec<SymbolId> {
        self.methods_of(sym)
            .into_iter()
            .filter(|&m| !self.symbol(m).modifiers.contains(Modifiers::OVERRIDE))
            .collect()
    }

    /// Candidate sets, nearest type first, without `override` methods.
    /// Constructors are not inherited.
    fn candidate_levels(&mut self, target: SymbolId) -> Vec<Vec<SymbolId>> {
        let mut levels = Vec::new();
        let own = self.non_override_methods(target);
        if !own.is_empty() {
            levels.push(own);
        }
        let symbol = self.symbol(target);
        let name = symbol.name.clone();
        let Some(owner) = symbol.parent else {
            return levels;
        };
        if name == ".ctor" || !self.symbol(owner).kind.is_type() {
            return levels;
        }
        let mut current = owner;
        for _ in 0..self.config.max_base_depth {
            let Some(base) = self.base_type(current) else {
                break;
            };
            if let Some(found) = self.find_own_member(base, &name, 0) {
                let level = self.non_override_methods(found);
                if !level.is_empty() {
                    levels.push(level);
                }
            }
            current = base;
        }
        levels
    }

    fn applicable_in(&mut self, candidates: &[SymbolId], args: &[CallArgument], type_args: &[SymbolId]) -> Vec<Applicable> {
        let mut applicable = Vec::new();
        for &candidate in candidates {
            let normal = self.try_form(candidate, args, type_args, false);
            let found = match normal {
                Some(found) => Some(found),
                None if self.has_params_array(candidate) => self.try_form(candidate, args, type_args, true),
                None => None,
            };
            if let Some(found) = found {
                applicable.push(found);
            }
        }
        applicable
    }

    fn has_params_array(&self, method: SymbolId) -> bool {
        self.symbol(method)
            .parameters
            .last()
            .is_some_and(|&p| self.symbol(p).modifiers.contains(Modifiers::PARAMS))
    }

    /// Maps each argument to a parameter index.
    fn map_arguments(&self, parameters: &[SymbolId], args: &[CallArgument], expanded: bool) -> Option<Vec<usize>> {
        let count = parameters.len();
        let mut used = vec![false; count];
        let mut mapping = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let index = match &arg.name {
                Some(name) => parameters.iter().position(|&p| self.symbol(p).name == *name)?,
                None if expanded && count > 0 && i >= count - 1 => count - 1,
                None if i < count => i,
                None => return None,
            };
            let repeats_params = expanded && index == count - 1 && arg.name.is_none();
            if used[index] && !repeats_params {
                return None;
            }
            used[index] = true;
            mapping.push(index);
        }
        for (index, &param) in parameters.iter().enumerate() {
            if used[index] {
                continue;
            }
            let optional = self.symbol(param).modifiers.contains(Modifiers::OPTIONAL);
            if !optional && !(expanded && index == count - 1) {
                return None;
            }
        }
        Some(mapping)
    }

    fn try_form(&mut self, candidate: SymbolId, args: &[CallArgument], type_args: &[SymbolId], expanded: bool) -> Option<Applicable> {
        let parameters = self.symbol(candidate).parameters.clone();
        let mapping = self.map_arguments(&parameters, args, expanded)?;
        let type_parameters = self.symbol(candidate).type_parameters.clone();
        let generic = !type_parameters.is_empty();

        let method = if !generic {
            if !type_args.is_empty() {
                return None;
            }
            candidate
        } else if !type_args.is_empty() {
            if type_args.len() != type_parameters.len() {
                return None;
            }
            self.construct_method(candidate, type_args)
        } else {
            let inferred = self.infer_type_arguments(candidate, &type_parameters, &parameters, &mapping, args, expanded);
            self.construct_method(candidate, &inferred)
        };

        let parameters = self.symbol(method).parameters.clone();
        let last = parameters.len().saturating_sub(1);
        let mut exact = 0;
        let mut parameter_types = Vec::with_capacity(args.len());
        for (arg, &index) in args.iter().zip(&mapping) {
            let mut ty = self.type_of(parameters[index]);
            if expanded && index == last {
                ty = self.element_type(ty)?;
            }
            if !self.is_implicitly_convertible(arg.ty, ty) {
                return None;
            }
            if arg.ty == ty {
                exact += 1;
            }
            parameter_types.push(ty);
        }
        let defaulted = (0..parameters.len())
            .filter(|i| !mapping.contains(i) && !(expanded && *i == last))
            .count();
        Some(Applicable {
            method,
            exact,
            expanded,
            defaulted,
            generic,
            parameter_types,
        })
    }

    /// Infers method type arguments from argument types. Parameters that
    /// cannot be inferred stay as themselves.
    fn infer_type_arguments(
        &mut self,
        method: SymbolId,
        type_parameters: &[SymbolId],
        parameters: &[SymbolId],
        mapping: &[usize],
        args: &[CallArgument],
        expanded: bool,
    ) -> Vec<SymbolId> {
        let mut bindings: FxHashMap<SymbolId, SymbolId> = FxHashMap::default();
        let last = parameters.len().saturating_sub(1);
        for (arg, &index) in args.iter().zip(mapping) {
            let mut ty = self.type_of(parameters[index]);
            if expanded && index == last {
                match self.element_type(ty) {
                    Some(element) => ty = element,
                    None => continue,
                }
            }
            self.unify(ty, arg.ty, type_parameters, &mut bindings);
        }
        trace!(method = ?method, bound = bindings.len(), "inferred type arguments");
        type_parameters
            .iter()
            .map(|tp| bindings.get(tp).copied().unwrap_or(*tp))
            .collect()
    }

    fn unify(
        &mut self,
        parameter: SymbolId,
        argument: SymbolId,
        type_parameters: &[SymbolId],
        bindings: &mut FxHashMap<SymbolId, SymbolId>,
    ) {
        let argument = self.strip_instance(argument);
        if self.is_sentinel(argument) || argument == self.null_type {
            return;
        }
        if type_parameters.contains(&parameter) {
            bindings.entry(parameter).or_insert(argument);
            return;
        }
        match self.symbol(parameter).shape.clone() {
            Shape::Constructed { args: parameter_args, .. } => {
                let mut target = self.definition_root(parameter);
                if !self.derives_from_ref(argument, &mut target) {
                    return;
                }
                let argument_args = self.symbol(target).type_arguments().to_vec();
                for (p, a) in parameter_args.iter().zip(argument_args) {
                    self.unify(*p, a, type_parameters, bindings);
                }
            }
            Shape::Array { element, .. } => {
                if let Shape::Array { element: arg_element, .. } = self.symbol(argument).shape {
                    self.unify(element, arg_element, type_parameters, bindings);
                }
            }
            Shape::Nullable { underlying } => {
                let inner = match self.symbol(argument).shape {
                    Shape::Nullable { underlying } => underlying,
                    _ => argument,
                };
                self.unify(underlying, inner, type_parameters, bindings);
            }
            _ => {}
        }
    }

    fn pick_best(&mut self, mut applicable: Vec<Applicable>) -> OverloadResolution {
        let best_exact = applicable.iter().map(|a| a.exact).max().unwrap_or_default();
        applicable.retain(|a| a.exact == best_exact);
        if applicable.iter().any(|a| !a.expanded) {
            applicable.retain(|a| !a.expanded);
        }
        let fewest_defaults = applicable.iter().map(|a| a.defaulted).min().unwrap_or_default();
        applicable.retain(|a| a.defaulted == fewest_defaults);
        if applicable.iter().any(|a| !a.generic) {
            applicable.retain(|a| !a.generic);
        }
        if applicable.len() > 1 {
            let mut dominated = vec![false; applicable.len()];
            for i in 0..applicable.len() {
                for j in 0..applicable.len() {
                    if i != j && !dominated[i] && self.more_specific(&applicable[i], &applicable[j]) {
                        dominated[j] = true;
                    }
                }
            }
            let mut index = 0;
            applicable.retain(|_| {
                let keep = !dominated[index];
                index += 1;
                keep
            });
        }
        match applicable.as_slice() {
            [only] => OverloadResolution::Resolved(only.method),
            [] => OverloadResolution::Unresolved,
            tied => OverloadResolution::Ambiguous(tied.iter().map(|a| a.method).collect()),
        }
    }

    /// Every parameter type of `a` converts to `b`'s, and not the reverse.
    fn more_specific(&mut self, a: &Applicable, b: &Applicable) -> bool {
        if a.parameter_types.len() != b.parameter_types.len() || a.parameter_types == b.parameter_types {
            return false;
        }
        let pairs: Vec<(SymbolId, SymbolId)> = a.parameter_types.iter().copied().zip(b.parameter_types.iter().copied()).collect();
        let forward = pairs.iter().all(|&(x, y)| self.is_implicitly_convertible(x, y));
        let backward = pairs.iter().all(|&(x, y)| self.is_implicitly_convertible(y, x));
        forward && !backward
    }

    /// Implicit conversion between types: identity, null to reference
    /// types, numeric widening, nullable wrapping and reference conversions
    /// to base types and implemented interfaces. Unknown types convert
    /// both ways.
    pub fn is_implicitly_convertible(&mut self, from: SymbolId, to: SymbolId) -> bool {
        let from = self.strip_instance(from);
        let to = self.strip_instance(to);
        if from == to || self.is_sentinel(from) || self.is_sentinel(to) {
            return true;
        }
        if from == self.null_type {
            return self.is_reference_type(to) || matches!(self.symbol(to).shape, Shape::Nullable { .. });
        }
        if to == self.object_type() {
            return true;
        }
        if self.symbol(to).kind == SymbolKind::TypeParameter {
            return true;
        }
        if let (Some(a), Some(b)) = (self.builtin_keyword(from), self.builtin_keyword(to)) {
            if is_numeric_widening(a, b) {
                return true;
            }
        }
        if let Shape::Nullable { underlying } = self.symbol(to).shape {
            return self.is_implicitly_convertible(from, underlying);
        }
        let mut target = to;
        self.derives_from_ref(from, &mut target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method_group(model: &mut SemanticModel, source: &str) -> SymbolId {
        model.add_file("a.cs", source);
        let c = model.symbol(model.global_namespace()).member("C").unwrap();
        model.find_name(c, "F", 0, false).unwrap()
    }

    fn parameter_count(model: &SemanticModel, method: SymbolId) -> usize {
        model.symbol(method).parameters().len()
    }

    #[test]
    fn test_exact_beats_defaulted_and_params() {
        let mut model = SemanticModel::default();
        let group = method_group(
            &mut model,
            "class C { void F() {} void F(int a) {} void F(int a, int b = 0) {} void F(params int[] a) {} }",
        );
        let int = model.builtin_type("int");
        let result = model.resolve_overload(group, &[CallArgument::positional(int)], &[]);
        let OverloadResolution::Resolved(method) = result else {
            panic!("expected a resolution, got {result:?}");
        };
        assert_eq!(parameter_count(&model, method), 1);
        assert!(!model.has_params_array(method));
    }

    #[test]
    fn test_params_expanded_form() {
        let mut model = SemanticModel::default();
        let group = method_group(&mut model, "class C { void F(string s) {} void F(params int[] a) {} }");
        let int = model.builtin_type("int");
        let args = vec![CallArgument::positional(int); 3];
        let OverloadResolution::Resolved(method) = model.resolve_overload(group, &args, &[]) else {
            panic!("expected a resolution");
        };
        assert!(model.has_params_array(method));
    }

    #[test]
    fn test_tie_is_ambiguous() {
        let mut model = SemanticModel::default();
        let group = method_group(&mut model, "class C { void F(int a, long b) {} void F(long a, int b) {} }");
        let int = model.builtin_type("int");
        let args = [CallArgument::positional(int), CallArgument::positional(int)];
        let OverloadResolution::Ambiguous(tied) = model.resolve_overload(group, &args, &[]) else {
            panic!("expected ambiguity");
        };
        assert_eq!(tied.len(), 2);
    }

    #[test]
    fn test_named_arguments() {
        let mut model = SemanticModel::default();
        let group = method_group(&mut model, "class C { void F(int a, string b) {} void F(string b) {} }");
        let int = model.builtin_type("int");
        let string = model.builtin_type("string");
        let args = [CallArgument::named("b", string), CallArgument::named("a", int)];
        let OverloadResolution::Resolved(method) = model.resolve_overload(group, &args, &[]) else {
            panic!("expected a resolution");
        };
        assert_eq!(parameter_count(&model, method), 2);
        let bad = [CallArgument::named("zzz", int)];
        assert_eq!(model.resolve_overload(group, &bad, &[]), OverloadResolution::Unresolved);
    }

    #[test]
    fn test_more_specific_conversion_wins() {
        let mut model = SemanticModel::default();
        let group = method_group(&mut model, "class C { void F(long a) {} void F(double a) {} }");
        let int = model.builtin_type("int");
        let long = model.builtin_type("long");
        let OverloadResolution::Resolved(method) = model.resolve_overload(group, &[CallArgument::positional(int)], &[]) else {
            panic!("expected a resolution");
        };
        let param = model.symbol(method).parameters()[0];
        assert_eq!(model.type_of(param), long);
    }

    #[test]
    fn test_implicit_conversions() {
        let mut model = SemanticModel::default();
        let int = model.builtin_type("int");
        let long = model.builtin_type("long");
        let string = model.builtin_type("string");
        let object = model.builtin_type("object");
        let null = model.null_type();
        let nullable_int = model.nullable_of(int);
        assert!(model.is_implicitly_convertible(int, long));
        assert!(!model.is_implicitly_convertible(long, int));
        assert!(model.is_implicitly_convertible(string, object));
        assert!(model.is_implicitly_convertible(null, string));
        assert!(!model.is_implicitly_convertible(null, int));
        assert!(model.is_implicitly_convertible(int, nullable_int));
        assert!(model.is_implicitly_convertible(null, nullable_int));
        assert!(!model.is_implicitly_convertible(string, int));
    }
}
