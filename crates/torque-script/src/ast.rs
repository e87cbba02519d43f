//! Tagged AST produced by the parser and consumed by the compiler.
//!
//! A parent node owns its children outright (plain `Vec`/`Box` ownership);
//! nothing here implements visitor dispatch through virtual calls — the
//! compiler matches on these variants directly (spec.md §9's "reimplement as
//! a tagged variant with an exhaustive match").

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Minus,
    Multiply,
    Divide,
    Modulus,
    BitwiseOr,
    BitwiseAnd,
    LessThan,
    GreaterThan,
    GreaterThanOrEqual,
    Equals,
    NotEquals,
    StringEquals,
    StringNotEquals,
    LogicalAnd,
    LogicalOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Negate,
    Not,
}

/// Literal separator used by a concatenation expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatSep {
    None,
    Space,
    Tab,
    Newline,
}

impl ConcatSep {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Space => " ",
            Self::Tab => "\t",
            Self::Newline => "\n",
        }
    }
}

/// A variable-reference target: either a `%local` or a `$global`, holding the
/// full `::`-joined identifier path as written in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Local,
    Global,
}

#[derive(Debug, Clone)]
pub struct VarRef {
    pub kind: VarKind,
    pub name: String,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Integer(i32),
    Float(f32),
    /// A plain string literal.
    StringLit(String),
    /// A tagged (single-quoted) string literal; interned per spec.md's
    /// chosen "ID-based form" (see DESIGN.md Open Question #2).
    TaggedStringLit(String),
    Var(VarRef),
    /// `target[i, j, k]` where `target` is a bare Local/Global variable.
    ArrayAccess { target: VarRef, indices: Vec<Expr> },
    /// A subreference spine `a.b.c[...]`: `target` is the left-hand object
    /// expression, `field` the next hop's name, `indices` its optional array
    /// indices.
    Subreference {
        target: Box<Expr>,
        field: String,
        indices: Vec<Expr>,
    },
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Concat(Box<Expr>, Box<Expr>, ConcatSep),
    Unary(UnOp, Box<Expr>),
    Increment(Box<Expr>),
    Decrement(Box<Expr>),
    Assign(Box<Expr>, Box<Expr>),
    AddAssign(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// Unqualified or `Namespace::` qualified call.
    Call {
        namespace: Option<String>,
        name: String,
        args: Vec<Expr>,
    },
    /// `expr.method(args)` — resolved against the target's class hierarchy.
    BoundCall {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    /// `new Type(Name : Parent) { ... }` — an expression because the
    /// compiled form (`PopObjectInstantiation`) pushes the materialised
    /// root's object ID, letting it be assigned like any other value.
    ObjectInstantiation(Box<ObjectNode>),
    /// `datablock Type(Name : Parent) { ... }`.
    DatablockInstantiation(Box<DatablockNode>),
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub namespace: Option<String>,
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct FieldAssign {
    pub base_name: String,
    pub indices: Vec<Expr>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct ObjectNode {
    pub type_expr: Expr,
    pub name_expr: Option<Expr>,
    pub fields: Vec<FieldAssign>,
    pub children: Vec<ObjectNode>,
}

/// `datablock Type(Name : Parent) { field = value; ... };`
///
/// Lowered through the same instantiation-descriptor machinery as
/// `ObjectNode` (spec.md §3 names it as a distinct declaration shape, but the
/// original engine materialises it identically to an object with no
/// children); the `parent` name becomes the instance's declared name suffix
/// exactly as the original datablock-copy-on-parent semantics describe.
#[derive(Debug, Clone)]
pub struct DatablockNode {
    pub name: String,
    pub type_name: String,
    pub parent: Option<String>,
    pub fields: Vec<FieldAssign>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    If {
        /// Primary `if` plus every `else if`, in source order.
        branches: Vec<(Expr, Vec<Stmt>)>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        init: Expr,
        cond: Expr,
        advance: Expr,
        body: Vec<Stmt>,
    },
    Switch {
        expr: Expr,
        cases: Vec<(Vec<Expr>, Vec<Stmt>)>,
        default: Option<Vec<Stmt>>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    FunctionDecl(FunctionDecl),
    PackageDecl(String, Vec<FunctionDecl>),
}

pub type Program = Vec<Stmt>;
