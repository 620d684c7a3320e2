//! Reactivity compiler for view-function source.
//!
//! Input is a small JS-flavored dialect where views build their output with
//! tagged template literals (`html\`...\``). The compiler finds the plain
//! `let`/`const` bindings whose values flow into that output and rewrites
//! them onto the reactive runtime: mutable state becomes `createCell(...)`,
//! computed values become `createDerived(() => ...)`, writes become
//! `.set(...)`/`.update(...)`, and reads become `.get()`. Source the
//! analysis cannot prove reactive is copied through byte for byte, and a
//! [`SourceMap`] records every span that changed.
//!
//! Already-compiled source contains no bare reactive bindings, so compiling
//! it again returns it unchanged.

mod analyze;
mod binding;
mod error;
mod lexer;
mod rewrite;
mod transform;

pub use binding::BindingKind;
pub use error::{CompileError, Diagnostic};
pub use rewrite::{MapSegment, SourceMap};

use indexmap::IndexSet;
use tracing::debug;

use lexer::{Token, TokenKind};
use rewrite::Rewriter;

/// Knobs for a [`Compiler`].
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Module specifier the generated import line pulls constructors from.
    pub runtime_module: String,
    /// Template tags whose interpolations count as view output.
    pub view_tags: Vec<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            runtime_module: "@weft/runtime".to_owned(),
            view_tags: vec!["html".to_owned()],
        }
    }
}

/// Result of a successful compile.
#[derive(Debug)]
pub struct Output {
    pub code: String,
    pub map: SourceMap,
    pub diagnostics: Vec<Diagnostic>,
    /// False when the input needed no rewrites and `code` is the input
    /// verbatim.
    pub rewritten: bool,
}

/// Module-mode entry predicate: view components are the top-level functions
/// whose names start with an ASCII uppercase letter.
pub fn is_view_candidate(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile source that is the body of a single view function.
    pub fn compile_function(&self, source: &str, file: &str) -> Result<Output, CompileError> {
        let tokens = self.lex(source, file)?;
        let depths = lexer::depths(&tokens, source);
        let all = (0, tokens.len());
        self.compile_ranges(source, file, &tokens, &depths, vec![all])
    }

    /// Compile a whole module, rewriting only the bodies of top-level view
    /// candidate functions (see [`is_view_candidate`]).
    pub fn compile_module(&self, source: &str, file: &str) -> Result<Output, CompileError> {
        let tokens = self.lex(source, file)?;
        let depths = lexer::depths(&tokens, source);
        let bodies = view_function_bodies(source, &tokens, &depths);
        self.compile_ranges(source, file, &tokens, &depths, bodies)
    }

    fn lex(&self, source: &str, file: &str) -> Result<Vec<Token>, CompileError> {
        lexer::lex(source).map_err(|e| CompileError::Unterminated {
            file: file.to_owned(),
            what: e.what,
            offset: e.offset,
        })
    }

    fn compile_ranges(
        &self,
        source: &str,
        file: &str,
        tokens: &[Token],
        depths: &[u32],
        ranges: Vec<(usize, usize)>,
    ) -> Result<Output, CompileError> {
        let mut rewriter = Rewriter::new();
        let mut used: IndexSet<&'static str> = IndexSet::new();
        let mut diagnostics = Vec::new();

        for range in ranges {
            let analysis = analyze::analyze(source, tokens, depths, range, &self.options.view_tags);
            diagnostics.extend(analysis.diagnostics.iter().cloned());
            transform::plan_edits(
                source,
                tokens,
                depths,
                range,
                &analysis,
                &mut used,
                &mut rewriter,
            );
        }

        let rewritten = !rewriter.is_empty();
        if rewritten {
            rewriter.insert(0, self.prelude(&used));
        }
        debug!(file = file, rewrites = rewriter.len(), "compiled view source");

        let (code, map) = rewriter.apply(source, file)?;
        Ok(Output {
            code,
            map,
            diagnostics,
            rewritten,
        })
    }

    /// Import line naming only the constructors the rewrites call, in a
    /// fixed order.
    fn prelude(&self, used: &IndexSet<&'static str>) -> String {
        let names: Vec<&str> = ["createCell", "createDerived"]
            .into_iter()
            .filter(|n| used.contains(n))
            .collect();
        format!(
            "import {{ {} }} from \"{}\";\n",
            names.join(", "),
            self.options.runtime_module
        )
    }
}

/// Token ranges of the bodies of top-level `function Name(...) { ... }`
/// declarations whose name passes [`is_view_candidate`].
fn view_function_bodies(src: &str, tokens: &[Token], depths: &[u32]) -> Vec<(usize, usize)> {
    let mut bodies = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let is_fn = tokens[i].kind == TokenKind::Ident
            && tokens[i].text(src) == "function"
            && depths[i] == 0
            && i + 1 < tokens.len()
            && tokens[i + 1].kind == TokenKind::Ident;
        if !is_fn {
            i += 1;
            continue;
        }
        let name = tokens[i + 1].text(src);
        let open = (i + 2..tokens.len()).find(|&j| {
            depths[j] == 0 && tokens[j].kind == TokenKind::Punct && tokens[j].text(src) == "{"
        });
        let Some(open) = open else {
            i += 2;
            continue;
        };
        let close = (open + 1..tokens.len()).find(|&j| {
            depths[j] == 0 && tokens[j].kind == TokenKind::Punct && tokens[j].text(src) == "}"
        });
        let Some(close) = close else { break };
        if is_view_candidate(name) {
            bodies.push((open + 1, close));
        }
        i = close + 1;
    }
    bodies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_candidate_requires_leading_uppercase() {
        assert!(is_view_candidate("Counter"));
        assert!(is_view_candidate("App"));
        assert!(!is_view_candidate("counter"));
        assert!(!is_view_candidate("_Private"));
        assert!(!is_view_candidate(""));
    }

    #[test]
    fn module_mode_rewrites_only_view_functions() {
        let src = concat!(
            "function Counter() {\n",
            "  let count = 0;\n",
            "  return html`<p>${count}</p>`;\n",
            "}\n",
            "function helper() {\n",
            "  let count = 0;\n",
            "  return html`<p>${count}</p>`;\n",
            "}\n",
        );
        let out = Compiler::default().compile_module(src, "demo.js").unwrap();
        assert!(out.rewritten);
        assert!(out.code.contains("const count = createCell(0);"));
        assert!(out.code.contains("function helper() {\n  let count = 0;"));
    }

    #[test]
    fn module_prelude_is_emitted_once_at_the_top() {
        let src = concat!(
            "function A() {\n",
            "  let n = 1;\n",
            "  return html`${n}`;\n",
            "}\n",
            "function B() {\n",
            "  let m = 2;\n",
            "  const twice = m * 2;\n",
            "  return html`${twice}`;\n",
            "}\n",
        );
        let out = Compiler::default().compile_module(src, "demo.js").unwrap();
        assert!(out
            .code
            .starts_with("import { createCell, createDerived } from \"@weft/runtime\";\n"));
        assert_eq!(out.code.matches("import {").count(), 1);
    }

    #[test]
    fn unrewritten_input_comes_back_verbatim() {
        let src = "const answer = 42;\nconsole.log(answer);\n";
        let out = Compiler::default().compile_function(src, "demo.js").unwrap();
        assert!(!out.rewritten);
        assert_eq!(out.code, src);
        assert!(out.map.segments.is_empty());
    }

    #[test]
    fn unterminated_template_maps_to_compile_error() {
        let err = Compiler::default()
            .compile_function("return html`oops", "demo.js")
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::Unterminated {
                what: "template literal",
                ..
            }
        ));
    }

    #[test]
    fn runtime_module_option_changes_the_import() {
        let compiler = Compiler::new(CompileOptions {
            runtime_module: "./runtime.js".to_owned(),
            ..CompileOptions::default()
        });
        let out = compiler
            .compile_function("let n = 0;\nreturn html`${n}`;\n", "demo.js")
            .unwrap();
        assert!(out
            .code
            .starts_with("import { createCell } from \"./runtime.js\";\n"));
    }

    #[test]
    fn custom_view_tags_control_seeding() {
        let compiler = Compiler::new(CompileOptions {
            view_tags: vec!["svg".to_owned()],
            ..CompileOptions::default()
        });
        let out = compiler
            .compile_function("let n = 0;\nreturn html`${n}`;\n", "demo.js")
            .unwrap();
        assert!(!out.rewritten);
    }

    #[test]
    fn source_map_segments_cover_every_rewrite() {
        let src = "let count = 0;\nreturn html`${count}`;\n";
        let out = Compiler::default().compile_function(src, "demo.js").unwrap();
        // Prelude insertion, declaration, one read.
        assert_eq!(out.map.segments.len(), 3);
        assert_eq!(out.map.file, "demo.js");
        let decl = out.map.segments[1];
        assert_eq!(&src[decl.src_start..decl.src_end], "let count = 0;");
        assert_eq!(
            &out.code[decl.gen_start..decl.gen_end],
            "const count = createCell(0);"
        );
    }
}
