//! Edit planning: turn a classified [`Analysis`] into positional rewrites.
//!
//! Three kinds of site are planned, in order, with each planned span
//! claimed so later passes never touch text that is already being replaced:
//!
//! 1. Declarations. `let n = init` becomes `const n = createCell(init')`
//!    and a derived `const n = expr` becomes
//!    `const n = createDerived(() => expr')`, where the primed forms have
//!    reactive reads spliced to `.get()`.
//! 2. Write sites on cells: plain and compound assignment, and `++`/`--`.
//! 3. Remaining read sites, rewritten to `.get()`.

use indexmap::IndexSet;

use super::analyze::{after_member_access, expression_end, is_assign_op, Analysis};
use super::binding::BindingKind;
use super::lexer::{Token, TokenKind};
use super::rewrite::Rewriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BraceKind {
    Object,
    Block,
}

/// Guess whether a `{` opens an object literal from the token before it.
/// Expression position means object; statement or arrow-body position means
/// block.
fn classify_brace(src: &str, tokens: &[Token], i: usize, range_start: usize) -> BraceKind {
    if i == range_start {
        return BraceKind::Block;
    }
    let prev = tokens[i - 1];
    match prev.kind {
        TokenKind::InterpOpen => BraceKind::Object,
        TokenKind::Ident if prev.text(src) == "return" => BraceKind::Object,
        TokenKind::Punct
            if matches!(
                prev.text(src),
                "(" | "[" | "," | "=" | ":" | "?" | "&&" | "||" | "??"
            ) =>
        {
            BraceKind::Object
        }
        _ => BraceKind::Block,
    }
}

fn in_claimed(claimed: &[(usize, usize)], pos: usize) -> bool {
    claimed.iter().any(|&(s, e)| pos >= s && pos < e)
}

/// Token indices of reactive-binding reads in `range` that should become
/// `.get()` calls. Skips member names, write positions, `++`/`--` operands,
/// object-literal keys and shorthand properties, and anything in `claimed`.
fn read_sites(
    src: &str,
    tokens: &[Token],
    range: (usize, usize),
    analysis: &Analysis,
    claimed: &[(usize, usize)],
) -> Vec<usize> {
    let mut sites = Vec::new();
    let mut braces: Vec<BraceKind> = Vec::new();

    for i in range.0..range.1 {
        let t = tokens[i];
        match t.kind {
            TokenKind::Punct if t.text(src) == "{" => {
                braces.push(classify_brace(src, tokens, i, range.0));
            }
            TokenKind::Punct if t.text(src) == "}" => {
                braces.pop();
            }
            TokenKind::Ident => {
                let name = t.text(src);
                if !analysis.is_rewritten(name)
                    || in_claimed(claimed, t.start)
                    || after_member_access(src, tokens, i, range.0)
                {
                    continue;
                }
                if i + 1 < range.1 && tokens[i + 1].kind == TokenKind::Punct {
                    let next = tokens[i + 1].text(src);
                    if is_assign_op(next) || next == "++" || next == "--" {
                        continue;
                    }
                }
                if i > range.0
                    && tokens[i - 1].kind == TokenKind::Punct
                    && matches!(tokens[i - 1].text(src), "++" | "--")
                {
                    continue;
                }
                if braces.last() == Some(&BraceKind::Object) {
                    let key_prev = i > range.0
                        && tokens[i - 1].kind == TokenKind::Punct
                        && matches!(tokens[i - 1].text(src), "{" | ",");
                    let key_next = i + 1 < range.1
                        && tokens[i + 1].kind == TokenKind::Punct
                        && matches!(tokens[i + 1].text(src), ":" | "," | "}");
                    if key_prev && key_next {
                        continue;
                    }
                }
                sites.push(i);
            }
            _ => {}
        }
    }
    sites
}

/// Render the expression covered by `token_range` with reactive reads
/// spliced to `.get()`. Everything else is copied verbatim.
fn rewrite_expr(
    src: &str,
    tokens: &[Token],
    token_range: (usize, usize),
    analysis: &Analysis,
) -> String {
    let sites = read_sites(src, tokens, token_range, analysis, &[]);
    let start = tokens[token_range.0].start;
    let end = tokens[token_range.1 - 1].end;
    let mut out = String::with_capacity(end - start + sites.len() * 6);
    let mut cursor = start;
    for &i in &sites {
        let t = tokens[i];
        out.push_str(&src[cursor..t.start]);
        out.push_str(t.text(src));
        out.push_str(".get()");
        cursor = t.end;
    }
    out.push_str(&src[cursor..end]);
    out
}

/// Plan every rewrite for `range` into `rewriter`, recording which runtime
/// constructors the generated code calls in `used`.
pub(super) fn plan_edits(
    src: &str,
    tokens: &[Token],
    depths: &[u32],
    range: (usize, usize),
    analysis: &Analysis,
    used: &mut IndexSet<&'static str>,
    rewriter: &mut Rewriter,
) {
    let mut claimed: Vec<(usize, usize)> = Vec::new();

    for binding in analysis.bindings.values() {
        let init = rewrite_expr(src, tokens, binding.init_tokens, analysis);
        let text = match binding.kind {
            BindingKind::Cell => {
                used.insert("createCell");
                format!("const {} = createCell({});", binding.name, init)
            }
            BindingKind::Derived => {
                used.insert("createDerived");
                format!("const {} = createDerived(() => {});", binding.name, init)
            }
            BindingKind::Plain => continue,
        };
        rewriter.replace(binding.decl_span.0, binding.decl_span.1, text);
        claimed.push(binding.decl_span);
    }

    // Write sites on cells.
    let mut i = range.0;
    while i < range.1 {
        let t = tokens[i];
        if t.kind != TokenKind::Ident
            || analysis.kind_of(t.text(src)) != BindingKind::Cell
            || in_claimed(&claimed, t.start)
            || after_member_access(src, tokens, i, range.0)
        {
            i += 1;
            continue;
        }
        let name = t.text(src);

        if i + 1 < range.1 && tokens[i + 1].kind == TokenKind::Punct {
            let op = tokens[i + 1];
            let op_text = op.text(src);
            if op_text == "++" || op_text == "--" {
                let step = if op_text == "++" { "+" } else { "-" };
                rewriter.replace(
                    t.start,
                    op.end,
                    format!("{name}.update(v => v {step} 1)"),
                );
                claimed.push((t.start, op.end));
                i += 2;
                continue;
            }
            if is_assign_op(op_text) {
                let end = expression_end(src, tokens, depths, i + 2, range.1, depths[i]);
                if end > i + 2 {
                    let rhs = rewrite_expr(src, tokens, (i + 2, end), analysis);
                    let byte_end = tokens[end - 1].end;
                    let text = if op_text == "=" {
                        format!("{name}.set({rhs})")
                    } else {
                        let base = &op_text[..op_text.len() - 1];
                        format!("{name}.update(v => v {base} ({rhs}))")
                    };
                    rewriter.replace(t.start, byte_end, text);
                    claimed.push((t.start, byte_end));
                    i = end;
                    continue;
                }
            }
        }

        // Prefix ++/--: the operator precedes the identifier. Only rewrite
        // when the operator is unambiguously prefix.
        if i > range.0 {
            let prev = tokens[i - 1];
            if prev.kind == TokenKind::Punct
                && matches!(prev.text(src), "++" | "--")
                && !in_claimed(&claimed, prev.start)
            {
                let prefix = if i >= range.0 + 2 {
                    // A `++` right after an operand is that operand's
                    // postfix operator, not our prefix.
                    let before = tokens[i - 2];
                    !(matches!(before.kind, TokenKind::Ident | TokenKind::Number)
                        || (before.kind == TokenKind::Punct
                            && matches!(before.text(src), ")" | "]")))
                } else {
                    true
                };
                if prefix {
                    let step = if prev.text(src) == "++" { "+" } else { "-" };
                    rewriter.replace(
                        prev.start,
                        t.end,
                        format!("{name}.update(v => v {step} 1)"),
                    );
                    claimed.push((prev.start, t.end));
                }
            }
        }
        i += 1;
    }

    for i in read_sites(src, tokens, range, analysis, &claimed) {
        let t = tokens[i];
        rewriter.replace(t.start, t.end, format!("{}.get()", t.text(src)));
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::Compiler;

    fn compile(src: &str) -> String {
        Compiler::default()
            .compile_function(src, "demo.js")
            .unwrap()
            .code
    }

    #[test]
    fn cell_declaration_and_template_read() {
        let out = compile("let count = 0;\nreturn html`<span>${count}</span>`;\n");
        assert_eq!(
            out,
            concat!(
                "import { createCell } from \"@weft/runtime\";\n",
                "const count = createCell(0);\n",
                "return html`<span>${count.get()}</span>`;\n",
            )
        );
    }

    #[test]
    fn plain_assignment_becomes_set() {
        let out = compile(concat!(
            "let count = 0;\n",
            "const reset = () => { count = 0; };\n",
            "return html`<button onclick=${reset}>${count}</button>`;\n",
        ));
        assert!(out.contains("const reset = () => { count.set(0); };"));
    }

    #[test]
    fn compound_assignment_becomes_update() {
        let out = compile(concat!(
            "let count = 0;\n",
            "const add = () => { count += 2 * 3; };\n",
            "return html`<button onclick=${add}>${count}</button>`;\n",
        ));
        assert!(out.contains("const add = () => { count.update(v => v + (2 * 3)); };"));
    }

    #[test]
    fn increment_forms_become_update() {
        let out = compile(concat!(
            "let count = 0;\n",
            "const a = () => { count++; };\n",
            "const b = () => { --count; };\n",
            "return html`${count} ${a} ${b}`;\n",
        ));
        assert!(out.contains("{ count.update(v => v + 1); }"));
        assert!(out.contains("{ count.update(v => v - 1); }"));
    }

    #[test]
    fn rhs_reads_are_rewritten_inside_set() {
        let out = compile(concat!(
            "let count = 0;\n",
            "let total = 0;\n",
            "const sync = () => { total = count + 1; };\n",
            "return html`${count} ${total} ${sync}`;\n",
        ));
        assert!(out.contains("total.set(count.get() + 1)"));
    }

    #[test]
    fn member_names_matching_a_binding_are_untouched() {
        let out = compile(concat!(
            "let count = 0;\n",
            "const poke = () => { stats.count = 1; return box.count; };\n",
            "return html`${count} ${poke}`;\n",
        ));
        assert!(out.contains("stats.count = 1"));
        assert!(out.contains("box.count"));
    }

    #[test]
    fn object_keys_and_shorthand_are_untouched() {
        let out = compile(concat!(
            "let count = 0;\n",
            "const snap = () => ({ count: count, at: now() });\n",
            "return html`${count} ${snap}`;\n",
        ));
        assert!(out.contains("({ count: count.get(), at: now() })"));
    }

    #[test]
    fn logical_compound_assignment_uses_base_operator() {
        let out = compile(concat!(
            "let flag = false;\n",
            "const arm = () => { flag ||= true; };\n",
            "return html`${flag} ${arm}`;\n",
        ));
        assert!(out.contains("flag.update(v => v || (true))"));
    }
}
