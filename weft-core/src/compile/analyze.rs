//! Binding collection and reactivity inference.
//!
//! Analysis runs over a token range (a whole source in function mode, one
//! function body in module mode) in three passes:
//!
//! 1. Collect `let`/`const` declarations with simple identifier patterns,
//!    recording each `const` initializer's references to earlier bindings.
//! 2. Seed the reactive set with every binding mentioned inside a tagged
//!    view template (`html\`...\`` by default). Those are the values the
//!    rendered output actually observes.
//! 3. Propagate to a fixed point in both directions: anything a reactive
//!    `const` reads becomes reactive, and any `const` that reads something
//!    reactive becomes reactive itself.
//!
//! The result classifies each binding as [`BindingKind::Cell`] (mutable and
//! reactive), [`BindingKind::Derived`] (const, reactive, and reading at
//! least one reactive dependency), or [`BindingKind::Plain`].

use indexmap::{IndexMap, IndexSet};

use super::binding::{Binding, BindingKind};
use super::error::Diagnostic;
use super::lexer::{Token, TokenKind};

#[derive(Debug)]
pub struct Analysis {
    pub bindings: IndexMap<String, Binding>,
    pub reactive: IndexSet<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
    pub fn kind_of(&self, name: &str) -> BindingKind {
        self.bindings
            .get(name)
            .map(|b| b.kind)
            .unwrap_or(BindingKind::Plain)
    }

    /// Bindings that get a rewritten declaration.
    pub fn is_rewritten(&self, name: &str) -> bool {
        self.kind_of(name) != BindingKind::Plain
    }
}

/// True when the identifier at `i` is a member name (`obj.count`,
/// `obj?.count`) rather than a variable reference.
pub(super) fn after_member_access(
    src: &str,
    tokens: &[Token],
    i: usize,
    range_start: usize,
) -> bool {
    if i == range_start {
        return false;
    }
    let prev = tokens[i - 1];
    prev.kind == TokenKind::Punct && matches!(prev.text(src), "." | "?.")
}

pub(super) fn is_assign_op(text: &str) -> bool {
    matches!(
        text,
        "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "&&=" | "||=" | "??="
    )
}

/// End of an expression that started at token `from`, with `from` (and the
/// statement it belongs to) sitting at depth `d0`. The expression runs to
/// the first `;` or `,` at that depth, or to the first token that closes an
/// enclosing group, or to `limit`. Returns an exclusive token index.
pub(super) fn expression_end(
    src: &str,
    tokens: &[Token],
    depths: &[u32],
    from: usize,
    limit: usize,
    d0: u32,
) -> usize {
    let mut j = from;
    while j < limit {
        if depths[j] < d0 {
            break;
        }
        if depths[j] == d0
            && tokens[j].kind == TokenKind::Punct
            && matches!(tokens[j].text(src), ";" | ",")
        {
            break;
        }
        j += 1;
    }
    j
}

/// An initializer that is a function expression: `function ...`,
/// `async ...`, `ident => ...`, or `( params ) => ...`.
fn init_is_function(
    src: &str,
    tokens: &[Token],
    depths: &[u32],
    init: (usize, usize),
) -> bool {
    let first = tokens[init.0];
    match first.kind {
        TokenKind::Ident => {
            if matches!(first.text(src), "function" | "async") {
                return true;
            }
            init.0 + 1 < init.1
                && tokens[init.0 + 1].kind == TokenKind::Punct
                && tokens[init.0 + 1].text(src) == "=>"
        }
        TokenKind::Punct if first.text(src) == "(" => {
            let d_open = depths[init.0];
            for j in init.0 + 1..init.1 {
                if depths[j] == d_open
                    && tokens[j].kind == TokenKind::Punct
                    && tokens[j].text(src) == ")"
                {
                    return j + 1 < init.1
                        && tokens[j + 1].kind == TokenKind::Punct
                        && tokens[j + 1].text(src) == "=>";
                }
            }
            false
        }
        _ => false,
    }
}

fn collect_bindings(
    src: &str,
    tokens: &[Token],
    depths: &[u32],
    range: (usize, usize),
    diagnostics: &mut Vec<Diagnostic>,
) -> IndexMap<String, Binding> {
    let mut bindings: IndexMap<String, Binding> = IndexMap::new();
    let mut i = range.0;
    while i < range.1 {
        let t = tokens[i];
        let keyword = t.kind == TokenKind::Ident && matches!(t.text(src), "let" | "const");
        if !keyword || after_member_access(src, tokens, i, range.0) {
            i += 1;
            continue;
        }
        // Simple pattern only: `let name = init`. Destructuring and
        // multi-declarator forms are left alone.
        let ok_shape = i + 3 < range.1
            && tokens[i + 1].kind == TokenKind::Ident
            && tokens[i + 2].kind == TokenKind::Punct
            && tokens[i + 2].text(src) == "=";
        if !ok_shape {
            i += 1;
            continue;
        }
        let name = tokens[i + 1].text(src).to_owned();
        let mutable = t.text(src) == "let";
        let d0 = depths[i];
        let end = expression_end(src, tokens, depths, i + 3, range.1, d0);
        if end == i + 3 {
            i += 1;
            continue;
        }
        let init = (i + 3, end);
        let has_semi = end < range.1
            && depths[end] == d0
            && tokens[end].kind == TokenKind::Punct
            && tokens[end].text(src) == ";";
        let decl_end = if has_semi {
            tokens[end].end
        } else {
            tokens[end - 1].end
        };

        if mutable || !init_is_function(src, tokens, depths, init) {
            let mut deps = IndexSet::new();
            let mut self_referential = false;
            if !mutable {
                for j in init.0..init.1 {
                    if tokens[j].kind != TokenKind::Ident
                        || after_member_access(src, tokens, j, range.0)
                    {
                        continue;
                    }
                    let text = tokens[j].text(src);
                    if text == name {
                        self_referential = true;
                    } else if bindings.contains_key(text) {
                        deps.insert(text.to_owned());
                    }
                }
            }
            if self_referential {
                diagnostics.push(Diagnostic::SelfReferentialDerived {
                    name: name.clone(),
                    offset: t.start,
                });
            }
            if !bindings.contains_key(&name) {
                bindings.insert(
                    name.clone(),
                    Binding {
                        name,
                        mutable,
                        decl_span: (t.start, decl_end),
                        init_tokens: init,
                        deps,
                        self_referential,
                        kind: BindingKind::Plain,
                    },
                );
            }
        }
        i = end;
    }
    bindings
}

/// Bindings mentioned inside tagged view templates. Nested templates count;
/// member names do not.
fn collect_seeds(
    src: &str,
    tokens: &[Token],
    range: (usize, usize),
    view_tags: &[String],
    bindings: &IndexMap<String, Binding>,
) -> IndexSet<String> {
    let mut seeds = IndexSet::new();
    let mut i = range.0;
    while i < range.1 {
        let tagged = tokens[i].kind == TokenKind::TemplateOpen
            && i > range.0
            && tokens[i - 1].kind == TokenKind::Ident
            && view_tags.iter().any(|tag| tag == tokens[i - 1].text(src));
        if !tagged {
            i += 1;
            continue;
        }
        let mut nesting = 1usize;
        let mut j = i + 1;
        while j < range.1 && nesting > 0 {
            match tokens[j].kind {
                TokenKind::TemplateOpen => nesting += 1,
                TokenKind::TemplateClose => nesting -= 1,
                TokenKind::Ident if !after_member_access(src, tokens, j, range.0) => {
                    let text = tokens[j].text(src);
                    if bindings.contains_key(text) {
                        seeds.insert(text.to_owned());
                    }
                }
                _ => {}
            }
            j += 1;
        }
        i = j;
    }
    seeds
}

pub fn analyze(
    src: &str,
    tokens: &[Token],
    depths: &[u32],
    range: (usize, usize),
    view_tags: &[String],
) -> Analysis {
    let mut diagnostics = Vec::new();
    let mut bindings = collect_bindings(src, tokens, depths, range, &mut diagnostics);
    let mut reactive = collect_seeds(src, tokens, range, view_tags, &bindings);

    // Taint in both directions until nothing changes. Downstream: a const
    // reading a reactive binding is itself reactive. Upstream: everything a
    // reactive const reads must be reactive too, or its recomputation would
    // never fire.
    loop {
        let mut changed = false;
        for binding in bindings.values() {
            if !binding.derived_candidate() {
                continue;
            }
            if reactive.contains(&binding.name) {
                for dep in &binding.deps {
                    changed |= reactive.insert(dep.clone());
                }
            } else if binding.deps.iter().any(|d| reactive.contains(d))
                && reactive.insert(binding.name.clone())
            {
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    // Classify in declaration order so a const can check what its (earlier)
    // dependencies became. A derived cell needs at least one dependency that
    // is itself backed by a cell; a reactive const whose dependencies all
    // stayed plain can never change, so wrapping it would be pure overhead.
    // This is also what makes compiled output a fixed point: `count.get()`
    // keeps `count` in dependency sets, but `count` is a plain const there.
    for i in 0..bindings.len() {
        let kind = {
            let binding = &bindings[i];
            if !reactive.contains(&binding.name) || binding.self_referential {
                BindingKind::Plain
            } else if binding.mutable {
                BindingKind::Cell
            } else if binding
                .deps
                .iter()
                .any(|d| bindings.get(d).is_some_and(|dep| dep.kind != BindingKind::Plain))
            {
                BindingKind::Derived
            } else {
                BindingKind::Plain
            }
        };
        bindings[i].kind = kind;
    }

    Analysis {
        bindings,
        reactive,
        diagnostics,
    }
}
