//! Syntax tree for analysis programs.

/// A parsed program: a sequence of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

/// A statement tagged with the 1-based source line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// `a = b = value`; each target receives the same value.
    Assign { targets: Vec<Expr>, value: Expr },
    AugAssign { target: Expr, op: BinOp, value: Expr },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    While { test: Expr, body: Vec<Stmt> },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Pass,
    Import { names: Vec<ImportName> },
    ImportFrom { module: String, names: Vec<ImportName> },
    Del { targets: Vec<Expr> },
}

impl StmtKind {
    /// Short label used in execution traces.
    pub fn label(&self) -> &'static str {
        match self {
            StmtKind::Expr(_) => "expression",
            StmtKind::Assign { .. } => "assignment",
            StmtKind::AugAssign { .. } => "augmented assignment",
            StmtKind::If { .. } => "if",
            StmtKind::While { .. } => "while",
            StmtKind::For { .. } => "for",
            StmtKind::Break => "break",
            StmtKind::Continue => "continue",
            StmtKind::Pass => "pass",
            StmtKind::Import { .. } => "import",
            StmtKind::ImportFrom { .. } => "from-import",
            StmtKind::Del { .. } => "del",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// Piece of an f-string.
#[derive(Debug, Clone, PartialEq)]
pub enum FPart {
    Lit(String),
    Expr {
        expr: Box<Expr>,
        /// `r`, `s` or `a` from a `!r`-style conversion.
        conversion: Option<char>,
        spec: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    FString(Vec<FPart>),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Set(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<(CmpOp, Expr)>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    ListComp {
        elt: Box<Expr>,
        target: Box<Expr>,
        iter: Box<Expr>,
        conds: Vec<Expr>,
    },
}

impl Expr {
    /// Whether this expression may appear on the left of `=`.
    pub fn is_assignable(&self) -> bool {
        match self {
            Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. } => true,
            Expr::Tuple(items) | Expr::List(items) => items.iter().all(Expr::is_assignable),
            _ => false,
        }
    }

    /// Whether assigning to this target binds `name` directly.
    pub fn binds_name(&self, name: &str) -> bool {
        match self {
            Expr::Name(n) => n == name,
            Expr::Tuple(items) | Expr::List(items) => items.iter().any(|e| e.binds_name(name)),
            _ => false,
        }
    }
}

impl Program {
    /// Visit every statement, including those nested in compound bodies.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Stmt)) {
        walk_block(&self.body, visit);
    }

    /// Whether any statement anywhere in the program assigns `name`.
    pub fn assigns(&self, name: &str) -> bool {
        let mut found = false;
        self.walk(&mut |stmt| {
            let hit = match &stmt.kind {
                StmtKind::Assign { targets, .. } => targets.iter().any(|t| t.binds_name(name)),
                StmtKind::AugAssign { target, .. } => target.binds_name(name),
                StmtKind::For { target, .. } => target.binds_name(name),
                _ => false,
            };
            found |= hit;
        });
        found
    }
}

fn walk_block<'a>(stmts: &'a [Stmt], visit: &mut impl FnMut(&'a Stmt)) {
    for stmt in stmts {
        visit(stmt);
        match &stmt.kind {
            StmtKind::If { branches, orelse } => {
                for (_, body) in branches {
                    walk_block(body, visit);
                }
                walk_block(orelse, visit);
            }
            StmtKind::While { body, .. } | StmtKind::For { body, .. } => walk_block(body, visit),
            _ => {}
        }
    }
}
