//! Presentation of symbols: display names, qualified names, tooltips and
//! documentation ids.
//!
//! These are read-only views over the graph. They may still import foreign
//! members or compute types on the way, hence `&mut self`.

use super::ids::SymbolId;
use super::model::SemanticModel;
use super::symbols::{Modifiers, Shape, SymbolKind};

impl SemanticModel {
    /// Short name as written in source: `List<int>`, `int[]`, `M<T>`.
    /// Predefined types use their keyword.
    pub fn display_name(&mut self, sym: SymbolId) -> String {
        self.render(sym, false)
    }

    /// Name qualified with namespaces and enclosing types.
    pub fn full_name(&mut self, sym: SymbolId) -> String {
        self.render(sym, true)
    }

    /// Display name of a type, instances shown as their type.
    pub fn display_type(&mut self, ty: SymbolId) -> String {
        let ty = self.strip_instance(ty);
        self.display_name(ty)
    }

    fn render(&mut self, sym: SymbolId, qualified: bool) -> String {
        let symbol = self.symbol(sym);
        if let Some(sentinel) = symbol.sentinel {
            return sentinel.name().to_string();
        }
        let kind = symbol.kind;
        match symbol.shape.clone() {
            Shape::Instance { ty } => return self.render(ty, qualified),
            Shape::Array { element, rank } => {
                let commas = ",".repeat(rank.saturating_sub(1) as usize);
                return format!("{}[{commas}]", self.render(element, qualified));
            }
            Shape::Nullable { underlying } => return format!("{}?", self.render(underlying, qualified)),
            Shape::Constructed { generic, args } => {
                let base = self.render_bare(generic, qualified);
                let args: Vec<String> = args.iter().map(|&a| self.render(a, qualified)).collect();
                return format!("{base}<{}>", args.join(", "));
            }
            Shape::Member { generic, .. } if kind == SymbolKind::Constructor => {
                return self.render(generic, qualified);
            }
            _ => {}
        }
        if kind.is_type() {
            if let Some(keyword) = self.builtin_keyword(sym) {
                return keyword.to_string();
            }
        }
        let base = self.render_bare(sym, qualified);
        let type_parameters = self.symbol(sym).type_parameters.clone();
        if type_parameters.is_empty() {
            return base;
        }
        let names: Vec<String> = type_parameters
            .iter()
            .map(|&tp| self.symbol(tp).name.to_string())
            .collect();
        format!("{base}<{}>", names.join(", "))
    }

    /// Name without type parameters, optionally qualified.
    fn render_bare(&mut self, sym: SymbolId, qualified: bool) -> String {
        let symbol = self.symbol(sym);
        let name = if symbol.kind == SymbolKind::Constructor {
            symbol
                .parent
                .map_or_else(|| symbol.name.to_string(), |p| self.symbol(self.definition_root(p)).name.to_string())
        } else {
            symbol.name.to_string()
        };
        let parent = symbol.parent;
        let kind = symbol.kind;
        if !qualified || matches!(kind, SymbolKind::TypeParameter | SymbolKind::Parameter | SymbolKind::Local) {
            return name;
        }
        match parent {
            Some(p) if p != self.global => {
                let prefix = self.render(p, true);
                if prefix.is_empty() {
                    name
                } else {
                    format!("{prefix}.{name}")
                }
            }
            _ => name,
        }
    }

    /// One-line description for hover popups.
    pub fn tooltip_text(&mut self, sym: SymbolId) -> String {
        let symbol = self.symbol(sym);
        if let Some(sentinel) = symbol.sentinel {
            return sentinel.name().to_string();
        }
        if let Shape::Instance { ty } = symbol.shape {
            return format!("(value) {}", self.display_name(ty));
        }
        let kind = symbol.kind;
        match kind {
            SymbolKind::Namespace => format!("namespace {}", self.full_name(sym)),
            SymbolKind::TypeParameter => format!("(type parameter) {}", symbol.name),
            k if k.is_type() => {
                let access = symbol.access.keyword();
                format!("{access} {} {}", k.display(), self.full_name(sym))
            }
            SymbolKind::MethodGroup => {
                let overloads = symbol.overloads.len();
                format!("(method group) {} ({overloads} overloads)", self.full_name(sym))
            }
            SymbolKind::Method | SymbolKind::Constructor | SymbolKind::Indexer => self.signature_text(sym),
            SymbolKind::Parameter | SymbolKind::Local => {
                let name = symbol.name.clone();
                let ty = self.type_of(sym);
                format!("({}) {} {name}", kind.display(), self.display_name(ty))
            }
            _ => {
                let ty = self.type_of(sym);
                let ty = self.display_name(ty);
                format!("({}) {ty} {}", kind.display(), self.full_name(sym))
            }
        }
    }

    /// `int C.M(string s, params int[] rest)` style signature.
    fn signature_text(&mut self, sym: SymbolId) -> String {
        let kind = self.symbol(sym).kind;
        let parameters = self.symbol(sym).parameters.clone();
        let mut rendered = Vec::with_capacity(parameters.len());
        for p in parameters {
            let modifiers = self.symbol(p).modifiers;
            let name = self.symbol(p).name.clone();
            let ty = self.type_of(p);
            let mut text = String::new();
            for (flag, keyword) in [
                (Modifiers::THIS, "this "),
                (Modifiers::REF, "ref "),
                (Modifiers::OUT, "out "),
                (Modifiers::PARAMS, "params "),
            ] {
                if modifiers.contains(flag) {
                    text.push_str(keyword);
                }
            }
            text.push_str(&self.display_name(ty));
            text.push(' ');
            text.push_str(&name);
            rendered.push(text);
        }
        let (open, close) = if kind == SymbolKind::Indexer { ('[', ']') } else { ('(', ')') };
        let params = rendered.join(", ");
        match kind {
            SymbolKind::Constructor => format!("(constructor) {}{open}{params}{close}", self.full_name(sym)),
            SymbolKind::Indexer => {
                let ty = self.type_of(sym);
                let owner = self.symbol(sym).parent.map(|p| self.full_name(p)).unwrap_or_default();
                format!("(indexer) {} {owner}.this{open}{params}{close}", self.display_name(ty))
            }
            _ => {
                let ty = self.type_of(sym);
                format!("{} {}{open}{params}{close}", self.display_name(ty), self.full_name(sym))
            }
        }
    }

    /// XML documentation id (`T:N.C`, ``M:N.C.M(System.Int32)``,
    /// `F:`, `P:`, `E:`). `None` for symbols that have no documentation
    /// entry, such as locals or synthesized values.
    pub fn documentation_key(&mut self, sym: SymbolId) -> Option<String> {
        let root = self.definition_root(sym);
        let symbol = self.symbol(root);
        if symbol.is_sentinel() {
            return None;
        }
        let kind = symbol.kind;
        let prefix = match kind {
            SymbolKind::Namespace => "N",
            k if k.is_type() && k != SymbolKind::TypeParameter => "T",
            SymbolKind::Field | SymbolKind::ConstantField | SymbolKind::EnumMember => "F",
            SymbolKind::Property | SymbolKind::Indexer => "P",
            SymbolKind::Event => "E",
            SymbolKind::Method | SymbolKind::Constructor => "M",
            _ => return None,
        };
        let name = self.documentation_name(root);
        if !matches!(kind, SymbolKind::Method | SymbolKind::Constructor | SymbolKind::Indexer) {
            return Some(format!("{prefix}:{name}"));
        }
        let parameters = self.symbol(root).parameters.clone();
        if parameters.is_empty() {
            return Some(format!("{prefix}:{name}"));
        }
        let mut rendered = Vec::with_capacity(parameters.len());
        for p in parameters {
            let ty = self.type_of(p);
            let mut text = self.documentation_type(ty);
            if self.symbol(p).modifiers.intersects(Modifiers::REF | Modifiers::OUT) {
                text.push('@');
            }
            rendered.push(text);
        }
        Some(format!("{prefix}:{name}({})", rendered.join(",")))
    }

    /// Qualified metadata name: arity suffixes, `#ctor`, `Item`.
    fn documentation_name(&mut self, sym: SymbolId) -> String {
        let symbol = self.symbol(sym);
        let mut name = match symbol.kind {
            SymbolKind::Constructor => "#ctor".to_string(),
            _ => symbol.name.to_string(),
        };
        let arity = symbol.type_parameters.len();
        if arity > 0 {
            let ticks = if symbol.kind.is_method() { "``" } else { "`" };
            name = format!("{name}{ticks}{arity}");
        }
        match symbol.parent {
            Some(p) if p != self.global => {
                let prefix = self.documentation_name(p);
                if prefix.is_empty() {
                    name
                } else {
                    format!("{prefix}.{name}")
                }
            }
            _ => name,
        }
    }

    /// Parameter type as written in documentation ids.
    fn documentation_type(&mut self, ty: SymbolId) -> String {
        let ty = self.strip_instance(ty);
        match self.symbol(ty).shape.clone() {
            Shape::Array { element, rank } => {
                let inner = self.documentation_type(element);
                if rank == 1 {
                    format!("{inner}[]")
                } else {
                    let dims = vec!["0:"; rank as usize].join(",");
                    format!("{inner}[{dims}]")
                }
            }
            Shape::Nullable { underlying } => {
                format!("System.Nullable{{{}}}", self.documentation_type(underlying))
            }
            Shape::Constructed { generic, args } => {
                let base = self.documentation_name(generic);
                let base = base.split('`').next().unwrap_or_default().to_string();
                let args: Vec<String> = args.iter().map(|&a| self.documentation_type(a)).collect();
                format!("{base}{{{}}}", args.join(","))
            }
            Shape::TypeParameter { position } => {
                let owner = self.symbol(ty).parent;
                let on_method = owner.is_some_and(|o| self.symbol(o).kind.is_method());
                if on_method {
                    format!("``{position}")
                } else {
                    format!("`{position}")
                }
            }
            _ => self.documentation_name(ty),
        }
    }
}
