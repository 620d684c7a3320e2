//! Bindings discovered in a view function body.

use indexmap::IndexSet;

/// What a binding compiles to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Mutable reactive state, rewritten to `createCell(...)`.
    Cell,
    /// Computed reactive value, rewritten to `createDerived(() => ...)`.
    Derived,
    /// Left exactly as written.
    Plain,
}

/// One `let`/`const` declaration with a simple identifier pattern and an
/// initializer. Function-valued `const` bindings are never collected.
#[derive(Debug)]
pub struct Binding {
    pub name: String,
    /// Declared with `let` rather than `const`.
    pub mutable: bool,
    /// Byte span of the whole declaration, trailing `;` included when present.
    pub decl_span: (usize, usize),
    /// Token index range of the initializer expression, end exclusive.
    pub init_tokens: (usize, usize),
    /// Earlier-declared bindings the initializer mentions. Only meaningful
    /// for `const` bindings, which are derived candidates.
    pub deps: IndexSet<String>,
    /// The initializer mentions the binding's own name.
    pub self_referential: bool,
    pub kind: BindingKind,
}

impl Binding {
    /// A `const` whose initializer mentions its own name cannot become a
    /// derived cell; it stays plain and gets a diagnostic instead.
    pub fn derived_candidate(&self) -> bool {
        !self.mutable && !self.self_referential
    }
}
