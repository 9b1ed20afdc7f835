//! Recursive-descent parser producing [`Program`].

use super::ast::{BinOp, BoolOp, CmpOp, Expr, FPart, ImportName, Program, Stmt, StmtKind, UnaryOp};
use super::error::ParseError;
use super::lexer::{tokenize, Tok, Token};

type PResult<T> = Result<T, ParseError>;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

const UNSUPPORTED_COMPOUND: &[&str] = &["def", "class", "try", "with", "async"];
const UNSUPPORTED_SIMPLE: &[&str] = &[
    "return", "raise", "global", "nonlocal", "assert", "yield", "await",
];

/// Parse a whole program.
pub fn parse(src: &str) -> PResult<Program> {
    let tokens = tokenize(src)?;
    Parser::new(tokens).program()
}

/// Parse a standalone expression (used for f-string fields). Line numbers in
/// errors are reported relative to `line`.
pub fn parse_expression(src: &str, line: usize) -> PResult<Expr> {
    let shift = |mut e: ParseError| {
        e.line = line + e.line.saturating_sub(1);
        e
    };
    let tokens = tokenize(src).map_err(shift)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.expr_list().map_err(shift)?;
    if !matches!(parser.peek(), Tok::Newline | Tok::Eof) {
        return Err(ParseError::new(line, "f-string: invalid expression"));
    }
    Ok(expr)
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Bound on combined block and expression nesting so hostile input cannot
/// exhaust the stack.
const MAX_NESTING: usize = 100;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.err("too many nested blocks or expressions"));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    // -----------------------------------------------------------------------
    // Token helpers
    // -----------------------------------------------------------------------

    fn peek(&self) -> &Tok {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Tok {
        self.tokens
            .get(self.pos + n)
            .map_or(&Tok::Eof, |t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line(), message)
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> PResult<()> {
        if self.eat_op(op) {
            return Ok(());
        }
        if matches!(op, ")" | "]" | "}") && starts_expr(self.peek()) {
            return Err(self.err("invalid syntax. Perhaps you forgot a comma?"));
        }
        if op == ":" {
            return Err(self.err("expected ':'"));
        }
        Err(self.err(format!("invalid syntax: expected '{op}'")))
    }

    fn is_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == kw)
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.is_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> PResult<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.err(format!("invalid syntax: expected '{kw}'")))
        }
    }

    fn expect_name(&mut self) -> PResult<String> {
        match self.peek().clone() {
            Tok::Name(n) if !is_keyword(&n) => {
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.err("invalid syntax: expected a name")),
        }
    }

    fn expect_line_end(&mut self) -> PResult<()> {
        match self.peek() {
            Tok::Newline => {
                self.pos += 1;
                Ok(())
            }
            Tok::Eof => Ok(()),
            _ => Err(self.err("invalid syntax")),
        }
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn program(&mut self) -> PResult<Program> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::Eof => break,
                Tok::Newline | Tok::Dedent => {
                    self.pos += 1;
                }
                Tok::Indent => return Err(self.err("unexpected indent")),
                _ => body.extend(self.statement()?),
            }
        }
        Ok(Program { body })
    }

    fn statement(&mut self) -> PResult<Vec<Stmt>> {
        if self.is_kw("if") {
            return Ok(vec![self.if_stmt()?]);
        }
        if self.is_kw("while") {
            return Ok(vec![self.while_stmt()?]);
        }
        if self.is_kw("for") {
            return Ok(vec![self.for_stmt()?]);
        }
        if let Tok::Name(n) = self.peek() {
            if UNSUPPORTED_COMPOUND.contains(&n.as_str()) {
                return Err(self.err(format!("'{n}' statements are not supported")));
            }
        }
        self.simple_line()
    }

    fn simple_line(&mut self) -> PResult<Vec<Stmt>> {
        let mut out = vec![self.simple_stmt()?];
        while self.eat_op(";") {
            if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                break;
            }
            out.push(self.simple_stmt()?);
        }
        self.expect_line_end()?;
        Ok(out)
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        if !matches!(self.peek(), Tok::Newline) {
            return self.simple_line();
        }
        self.pos += 1;
        if !matches!(self.peek(), Tok::Indent) {
            return Err(self.err("expected an indented block"));
        }
        self.pos += 1;
        self.nested(Self::indented_body)
    }

    fn indented_body(&mut self) -> PResult<Vec<Stmt>> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::Dedent => {
                    self.pos += 1;
                    break;
                }
                Tok::Eof => break,
                Tok::Newline => self.pos += 1,
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn if_stmt(&mut self) -> PResult<Stmt> {
        let line = self.line();
        self.expect_kw("if")?;
        let test = self.test()?;
        self.expect_op(":")?;
        let body = self.block()?;
        let mut branches = vec![(test, body)];
        let mut orelse = Vec::new();
        loop {
            if self.eat_kw("elif") {
                let test = self.test()?;
                self.expect_op(":")?;
                branches.push((test, self.block()?));
            } else if self.eat_kw("else") {
                self.expect_op(":")?;
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            line,
            kind: StmtKind::If { branches, orelse },
        })
    }

    fn while_stmt(&mut self) -> PResult<Stmt> {
        let line = self.line();
        self.expect_kw("while")?;
        let test = self.test()?;
        self.expect_op(":")?;
        let body = self.block()?;
        Ok(Stmt {
            line,
            kind: StmtKind::While { test, body },
        })
    }

    fn for_stmt(&mut self) -> PResult<Stmt> {
        let line = self.line();
        self.expect_kw("for")?;
        let target = self.target_list()?;
        self.expect_kw("in")?;
        let iter = self.expr_list()?;
        self.expect_op(":")?;
        let body = self.block()?;
        Ok(Stmt {
            line,
            kind: StmtKind::For { target, iter, body },
        })
    }

    fn simple_stmt(&mut self) -> PResult<Stmt> {
        let line = self.line();
        let kind = if self.eat_kw("pass") {
            StmtKind::Pass
        } else if self.eat_kw("break") {
            StmtKind::Break
        } else if self.eat_kw("continue") {
            StmtKind::Continue
        } else if self.eat_kw("import") {
            let mut names = vec![self.import_name()?];
            while self.eat_op(",") {
                names.push(self.import_name()?);
            }
            StmtKind::Import { names }
        } else if self.eat_kw("from") {
            let module = self.dotted_name()?;
            self.expect_kw("import")?;
            if self.is_op("*") {
                return Err(self.err("wildcard imports are not supported"));
            }
            let paren = self.eat_op("(");
            let mut names = vec![self.import_alias()?];
            while self.eat_op(",") {
                if paren && self.is_op(")") {
                    break;
                }
                names.push(self.import_alias()?);
            }
            if paren {
                self.expect_op(")")?;
            }
            StmtKind::ImportFrom { module, names }
        } else if self.eat_kw("del") {
            let target = self.expr_list()?;
            let targets = match target {
                Expr::Tuple(items) => items,
                other => vec![other],
            };
            if !targets.iter().all(Expr::is_assignable) {
                return Err(ParseError::new(line, "cannot delete expression"));
            }
            StmtKind::Del { targets }
        } else {
            if let Tok::Name(n) = self.peek() {
                if UNSUPPORTED_SIMPLE.contains(&n.as_str()) {
                    return Err(self.err(format!("'{n}' statements are not supported")));
                }
            }
            self.expression_statement(line)?
        };
        Ok(Stmt { line, kind })
    }

    fn expression_statement(&mut self, line: usize) -> PResult<StmtKind> {
        let first = self.expr_list()?;

        if self.is_op("=") {
            let mut targets = vec![first];
            let value = loop {
                self.expect_op("=")?;
                let next = self.expr_list()?;
                if self.is_op("=") {
                    targets.push(next);
                } else {
                    break next;
                }
            };
            if let Some(bad) = targets.iter().find(|t| !t.is_assignable()) {
                return Err(ParseError::new(
                    line,
                    format!("cannot assign to {}", describe_target(bad)),
                ));
            }
            return Ok(StmtKind::Assign { targets, value });
        }

        let aug = match self.peek() {
            Tok::Op("+=") => Some(BinOp::Add),
            Tok::Op("-=") => Some(BinOp::Sub),
            Tok::Op("*=") => Some(BinOp::Mul),
            Tok::Op("/=") => Some(BinOp::Div),
            Tok::Op("//=") => Some(BinOp::FloorDiv),
            Tok::Op("%=") => Some(BinOp::Mod),
            Tok::Op("**=") => Some(BinOp::Pow),
            Tok::Op("&=") => Some(BinOp::BitAnd),
            Tok::Op("|=") => Some(BinOp::BitOr),
            Tok::Op("^=") => Some(BinOp::BitXor),
            _ => None,
        };
        if let Some(op) = aug {
            self.pos += 1;
            if !matches!(
                first,
                Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. }
            ) {
                return Err(ParseError::new(
                    line,
                    "illegal expression for augmented assignment",
                ));
            }
            let value = self.expr_list()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if self.is_op(":") {
            return Err(self.err("annotated assignments are not supported"));
        }
        Ok(StmtKind::Expr(first))
    }

    fn dotted_name(&mut self) -> PResult<String> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn import_name(&mut self) -> PResult<ImportName> {
        let name = self.dotted_name()?;
        let alias = if self.eat_kw("as") {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(ImportName { name, alias })
    }

    fn import_alias(&mut self) -> PResult<ImportName> {
        let name = self.expect_name()?;
        let alias = if self.eat_kw("as") {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(ImportName { name, alias })
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    /// `test (',' test)* [',']`; a bare tuple when commas are present.
    fn expr_list(&mut self) -> PResult<Expr> {
        let first = self.test()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if !starts_expr(self.peek()) {
                break;
            }
            items.push(self.test()?);
        }
        Ok(Expr::Tuple(items))
    }

    /// Loop targets: comma-separated expressions that stop before `in`.
    fn target_list(&mut self) -> PResult<Expr> {
        let first = self.bitor()?;
        let expr = if self.is_op(",") {
            let mut items = vec![first];
            while self.eat_op(",") {
                if self.is_kw("in") {
                    break;
                }
                items.push(self.bitor()?);
            }
            Expr::Tuple(items)
        } else {
            first
        };
        if !expr.is_assignable() {
            return Err(self.err(format!("cannot assign to {}", describe_target(&expr))));
        }
        Ok(expr)
    }

    fn test(&mut self) -> PResult<Expr> {
        self.nested(Self::test_inner)
    }

    fn test_inner(&mut self) -> PResult<Expr> {
        if self.is_kw("lambda") {
            return self.lambda();
        }
        let body = self.or_test()?;
        if self.is_kw("if") {
            self.pos += 1;
            let test = self.or_test()?;
            self.expect_kw("else")?;
            let orelse = self.test()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn lambda(&mut self) -> PResult<Expr> {
        self.expect_kw("lambda")?;
        let mut params = Vec::new();
        while !self.is_op(":") {
            params.push(self.expect_name()?);
            if self.is_op("=") {
                return Err(self.err("lambda default arguments are not supported"));
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(":")?;
        let body = self.test()?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
        })
    }

    fn or_test(&mut self) -> PResult<Expr> {
        let mut left = self.and_test()?;
        while self.eat_kw("or") {
            let right = self.and_test()?;
            left = Expr::BoolOp {
                op: BoolOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and_test(&mut self) -> PResult<Expr> {
        let mut left = self.not_test()?;
        while self.eat_kw("and") {
            let right = self.not_test()?;
            left = Expr::BoolOp {
                op: BoolOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn not_test(&mut self) -> PResult<Expr> {
        if self.eat_kw("not") {
            let operand = self.nested(Self::not_test)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let left = self.bitor()?;
        let mut ops = Vec::new();
        loop {
            let op = match self.peek() {
                Tok::Op("==") => CmpOp::Eq,
                Tok::Op("!=") => CmpOp::NotEq,
                Tok::Op("<") => CmpOp::Lt,
                Tok::Op("<=") => CmpOp::LtE,
                Tok::Op(">") => CmpOp::Gt,
                Tok::Op(">=") => CmpOp::GtE,
                Tok::Name(n) if n == "in" => CmpOp::In,
                Tok::Name(n) if n == "not" && matches!(self.peek_at(1), Tok::Name(m) if m == "in") => {
                    self.pos += 1;
                    CmpOp::NotIn
                }
                Tok::Name(n) if n == "is" => {
                    if matches!(self.peek_at(1), Tok::Name(m) if m == "not") {
                        self.pos += 1;
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                _ => break,
            };
            self.pos += 1;
            ops.push((op, self.bitor()?));
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
            })
        }
    }

    fn binary_level(
        &mut self,
        table: &[(&str, BinOp)],
        next: fn(&mut Self) -> PResult<Expr>,
    ) -> PResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (sym, op) in table {
                if self.eat_op(sym) {
                    let right = next(self)?;
                    left = Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            break;
        }
        Ok(left)
    }

    fn bitor(&mut self) -> PResult<Expr> {
        self.binary_level(&[("|", BinOp::BitOr)], Self::bitxor)
    }

    fn bitxor(&mut self) -> PResult<Expr> {
        self.binary_level(&[("^", BinOp::BitXor)], Self::bitand)
    }

    fn bitand(&mut self) -> PResult<Expr> {
        self.binary_level(&[("&", BinOp::BitAnd)], Self::arith)
    }

    fn arith(&mut self) -> PResult<Expr> {
        self.binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::term)
    }

    fn term(&mut self) -> PResult<Expr> {
        if self.is_op("@") {
            return Err(self.err("matrix multiplication is not supported"));
        }
        self.binary_level(
            &[
                ("*", BinOp::Mul),
                ("//", BinOp::FloorDiv),
                ("/", BinOp::Div),
                ("%", BinOp::Mod),
            ],
            Self::factor,
        )
    }

    fn factor(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            Tok::Op("-") => Some(UnaryOp::Neg),
            Tok::Op("+") => Some(UnaryOp::Pos),
            Tok::Op("~") => Some(UnaryOp::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.nested(Self::factor)?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.power()
    }

    fn power(&mut self) -> PResult<Expr> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            let exp = self.factor()?;
            return Ok(Expr::Binary {
                op: BinOp::Pow,
                left: Box::new(base),
                right: Box::new(exp),
            });
        }
        Ok(base)
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op("(") {
                expr = self.call(expr)?;
            } else if self.eat_op("[") {
                let index = self.subscript()?;
                expr = Expr::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat_op(".") {
                let attr = match self.advance() {
                    Tok::Name(n) => n,
                    _ => return Err(self.err("invalid syntax: expected attribute name")),
                };
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn call(&mut self, func: Expr) -> PResult<Expr> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        loop {
            if self.eat_op(")") {
                break;
            }
            if self.is_op("*") || self.is_op("**") {
                return Err(self.err("star arguments are not supported"));
            }
            let is_kwarg = matches!(self.peek(), Tok::Name(n) if !is_keyword(n))
                && matches!(self.peek_at(1), Tok::Op("="));
            if is_kwarg {
                let name = self.expect_name()?;
                self.pos += 1;
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(self.err(format!("keyword argument repeated: {name}")));
                }
                kwargs.push((name, self.test()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.err("positional argument follows keyword argument"));
                }
                let mut arg = self.test()?;
                if self.is_kw("for") {
                    arg = self.comprehension(arg)?;
                }
                args.push(arg);
            }
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        Ok(Expr::Call {
            func: Box::new(func),
            args,
            kwargs,
        })
    }

    fn subscript(&mut self) -> PResult<Expr> {
        let mut items = vec![self.slice_or_test()?];
        let mut trailing_comma = false;
        while self.eat_op(",") {
            if self.is_op("]") {
                trailing_comma = true;
                break;
            }
            items.push(self.slice_or_test()?);
        }
        self.expect_op("]")?;
        if items.len() == 1 && !trailing_comma {
            Ok(items.remove(0))
        } else {
            Ok(Expr::Tuple(items))
        }
    }

    fn slice_or_test(&mut self) -> PResult<Expr> {
        let lower = if self.is_op(":") {
            None
        } else {
            Some(self.test()?)
        };
        if !self.eat_op(":") {
            return lower.ok_or_else(|| self.err("invalid syntax"));
        }
        let ends = |p: &Self| p.is_op("]") || p.is_op(",") || p.is_op(":");
        let upper = if ends(self) { None } else { Some(self.test()?) };
        let step = if self.eat_op(":") {
            if self.is_op("]") || self.is_op(",") {
                None
            } else {
                Some(self.test()?)
            }
        } else {
            None
        };
        Ok(Expr::Slice {
            lower: lower.map(Box::new),
            upper: upper.map(Box::new),
            step: step.map(Box::new),
        })
    }

    fn comprehension(&mut self, elt: Expr) -> PResult<Expr> {
        let (target, iter, conds) = self.comp_clause()?;
        Ok(Expr::ListComp {
            elt: Box::new(elt),
            target: Box::new(target),
            iter: Box::new(iter),
            conds,
        })
    }

    fn comp_clause(&mut self) -> PResult<(Expr, Expr, Vec<Expr>)> {
        self.expect_kw("for")?;
        let target = self.target_list()?;
        self.expect_kw("in")?;
        let iter = self.or_test()?;
        let mut conds = Vec::new();
        while self.eat_kw("if") {
            conds.push(self.or_test()?);
        }
        if self.is_kw("for") {
            return Err(self.err("nested comprehension loops are not supported"));
        }
        Ok((target, iter, conds))
    }

    fn atom(&mut self) -> PResult<Expr> {
        let line = self.line();
        match self.peek().clone() {
            Tok::Name(n) => {
                self.pos += 1;
                match n.as_str() {
                    "None" => Ok(Expr::None),
                    "True" => Ok(Expr::Bool(true)),
                    "False" => Ok(Expr::Bool(false)),
                    kw if is_keyword(kw) => Err(ParseError::new(line, "invalid syntax")),
                    _ => Ok(Expr::Name(n)),
                }
            }
            Tok::Int(i) => {
                self.pos += 1;
                Ok(Expr::Int(i))
            }
            Tok::Float(f) => {
                self.pos += 1;
                Ok(Expr::Float(f))
            }
            Tok::Str(_) | Tok::FStr(_) => self.strings(),
            Tok::Op("(") => {
                self.pos += 1;
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.test()?;
                if self.is_kw("for") {
                    let comp = self.comprehension(first)?;
                    self.expect_op(")")?;
                    return Ok(comp);
                }
                if !self.is_op(",") {
                    self.expect_op(")")?;
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.is_op(")") {
                        break;
                    }
                    items.push(self.test()?);
                }
                self.expect_op(")")?;
                Ok(Expr::Tuple(items))
            }
            Tok::Op("[") => {
                self.pos += 1;
                if self.eat_op("]") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.test()?;
                if self.is_kw("for") {
                    let comp = self.comprehension(first)?;
                    self.expect_op("]")?;
                    return Ok(comp);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.is_op("]") {
                        break;
                    }
                    items.push(self.test()?);
                }
                self.expect_op("]")?;
                Ok(Expr::List(items))
            }
            Tok::Op("{") => {
                self.pos += 1;
                if self.eat_op("}") {
                    return Ok(Expr::Dict(Vec::new()));
                }
                let first = self.test()?;
                if self.eat_op(":") {
                    let value = self.test()?;
                    if self.is_kw("for") {
                        return Err(self.err("dict comprehensions are not supported"));
                    }
                    let mut pairs = vec![(first, value)];
                    while self.eat_op(",") {
                        if self.is_op("}") {
                            break;
                        }
                        let k = self.test()?;
                        self.expect_op(":")?;
                        let v = self.test()?;
                        pairs.push((k, v));
                    }
                    self.expect_op("}")?;
                    return Ok(Expr::Dict(pairs));
                }
                if self.is_kw("for") {
                    return Err(self.err("set comprehensions are not supported"));
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.is_op("}") {
                        break;
                    }
                    items.push(self.test()?);
                }
                self.expect_op("}")?;
                Ok(Expr::Set(items))
            }
            Tok::Newline | Tok::Eof => Err(self.err("invalid syntax: unexpected end of line")),
            Tok::Indent => Err(self.err("unexpected indent")),
            _ => Err(self.err("invalid syntax")),
        }
    }

    /// Adjacent string literals concatenate; any f-string makes the whole run an f-string.
    fn strings(&mut self) -> PResult<Expr> {
        let line = self.line();
        let mut parts: Vec<FPart> = Vec::new();
        let mut formatted = false;
        loop {
            match self.peek().clone() {
                Tok::Str(s) => {
                    self.pos += 1;
                    push_lit(&mut parts, &s);
                }
                Tok::FStr(body) => {
                    self.pos += 1;
                    formatted = true;
                    parts.extend(fstring_parts(&body, line)?);
                }
                _ => break,
            }
        }
        if formatted {
            return Ok(Expr::FString(parts));
        }
        let text = parts
            .into_iter()
            .map(|p| match p {
                FPart::Lit(s) => s,
                FPart::Expr { .. } => String::new(),
            })
            .collect();
        Ok(Expr::Str(text))
    }
}

fn push_lit(parts: &mut Vec<FPart>, s: &str) {
    if let Some(FPart::Lit(last)) = parts.last_mut() {
        last.push_str(s);
    } else {
        parts.push(FPart::Lit(s.to_string()));
    }
}

/// Split an f-string body into literal text and `{expr[!conv][:spec]}` fields.
fn fstring_parts(body: &str, line: usize) -> PResult<Vec<FPart>> {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut lit = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '{' && chars.get(i + 1) == Some(&'{') {
            lit.push('{');
            i += 2;
            continue;
        }
        if c == '}' && chars.get(i + 1) == Some(&'}') {
            lit.push('}');
            i += 2;
            continue;
        }
        if c == '}' {
            return Err(ParseError::new(line, "f-string: single '}' is not allowed"));
        }
        if c != '{' {
            lit.push(c);
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut split: Option<usize> = None;
        let mut conv: Option<usize> = None;
        let mut j = start;
        let end = loop {
            let Some(&ch) = chars.get(j) else {
                return Err(ParseError::new(line, "f-string: expecting '}'"));
            };
            match (quote, ch) {
                (Some(q), ch) if ch == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(ch),
                (None, '(' | '[' | '{') => depth += 1,
                (None, ')' | ']') => depth = depth.saturating_sub(1),
                (None, '}') if depth > 0 => depth -= 1,
                (None, '}') => break j,
                (None, '!') if depth == 0 && split.is_none() && chars.get(j + 1) != Some(&'=') => {
                    conv.get_or_insert(j);
                }
                (None, ':') if depth == 0 && split.is_none() => split = Some(j),
                _ => {}
            }
            j += 1;
        };

        let expr_end = conv.or(split).unwrap_or(end);
        let src: String = chars[start..expr_end].iter().collect();
        if src.trim().is_empty() {
            return Err(ParseError::new(line, "f-string: empty expression not allowed"));
        }
        let expr = parse_expression(src.trim(), line)?;
        let spec = split.map(|s| chars[s + 1..end].iter().collect::<String>());
        let conversion = conv.and_then(|c| chars.get(c + 1).copied());

        if !lit.is_empty() {
            parts.push(FPart::Lit(std::mem::take(&mut lit)));
        }
        parts.push(FPart::Expr {
            expr: Box::new(expr),
            conversion,
            spec,
        });
        i = end + 1;
    }
    if !lit.is_empty() {
        parts.push(FPart::Lit(lit));
    }
    Ok(parts)
}

fn starts_expr(tok: &Tok) -> bool {
    match tok {
        Tok::Name(n) => {
            !is_keyword(n) || matches!(n.as_str(), "None" | "True" | "False" | "not" | "lambda")
        }
        Tok::Int(_) | Tok::Float(_) | Tok::Str(_) | Tok::FStr(_) => true,
        Tok::Op(op) => matches!(*op, "(" | "[" | "{" | "-" | "+" | "~"),
        _ => false,
    }
}

fn describe_target(expr: &Expr) -> &'static str {
    match expr {
        Expr::Call { .. } => "function call",
        Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Bool(_) | Expr::None => "literal",
        Expr::Binary { .. } | Expr::Unary { .. } => "expression",
        Expr::Compare { .. } => "comparison",
        Expr::Lambda { .. } => "lambda",
        _ => "expression",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(src: &str) -> StmtKind {
        parse(src).unwrap().body.remove(0).kind
    }

    #[test]
    fn test_parses_method_chain_assignment() {
        match stmt("result = df.groupby('a')['b'].sum().reset_index()") {
            StmtKind::Assign { targets, value } => {
                assert_eq!(targets, vec![Expr::Name("result".into())]);
                assert!(matches!(value, Expr::Call { .. }));
            }
            other => panic!("expected Assign, got {:?}", other),
        }
    }

    #[test]
    fn test_same_line_while_body() {
        let program = parse("while true: pass\nresult=1").unwrap();
        assert_eq!(program.body.len(), 2);
        match &program.body[0].kind {
            StmtKind::While { body, .. } => assert_eq!(body[0].kind, StmtKind::Pass),
            other => panic!("expected While, got {:?}", other),
        }
        assert_eq!(program.body[1].line, 2);
    }

    #[test]
    fn test_semicolon_separated_statements() {
        let program = parse("df['new_col'] = 999; result = df").unwrap();
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn test_if_elif_else_blocks() {
        let src = "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n";
        match stmt(src) {
            StmtKind::If { branches, orelse } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(orelse.len(), 1);
            }
            other => panic!("expected If, got {:?}", other),
        }
    }

    #[test]
    fn test_imports_with_aliases() {
        match stmt("import pandas as pd, numpy") {
            StmtKind::Import { names } => {
                assert_eq!(names[0].name, "pandas");
                assert_eq!(names[0].alias.as_deref(), Some("pd"));
                assert_eq!(names[1].alias, None);
            }
            other => panic!("expected Import, got {:?}", other),
        }
        match stmt("from os.path import join as j") {
            StmtKind::ImportFrom { module, names } => {
                assert_eq!(module, "os.path");
                assert_eq!(names[0].alias.as_deref(), Some("j"));
            }
            other => panic!("expected ImportFrom, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_comma_is_syntax_error() {
        let err = parse("\nresult = df.nlargest(10 'price')\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("comma"));
    }

    #[test]
    fn test_comparison_chain_and_not_in() {
        match stmt("x = 1 < y <= 3 and z not in w") {
            StmtKind::Assign { value, .. } => {
                assert!(matches!(value, Expr::BoolOp { op: BoolOp::And, .. }));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_slices_and_tuples_in_subscript() {
        match stmt("x = df.iloc[1:, 0]") {
            StmtKind::Assign { value, .. } => match value {
                Expr::Subscript { index, .. } => {
                    assert!(matches!(*index, Expr::Tuple(ref items) if items.len() == 2));
                }
                other => panic!("{:?}", other),
            },
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_fstring_fields_and_spec() {
        match stmt("x = f'total {a + 1:.2f} {{lit}}'") {
            StmtKind::Assign { value, .. } => match value {
                Expr::FString(parts) => {
                    assert_eq!(parts.len(), 3);
                    assert!(matches!(&parts[1], FPart::Expr { spec: Some(s), .. } if s == ".2f"));
                    assert_eq!(parts[2], FPart::Lit(" {lit}".into()));
                }
                other => panic!("{:?}", other),
            },
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_lambda_and_comprehension() {
        assert!(parse("f = lambda x, y: x + y").is_ok());
        assert!(parse("xs = [v * 2 for v in items if v > 0]").is_ok());
        assert!(parse("total = sum(v for v in items)").is_ok());
    }

    #[test]
    fn test_unsupported_statements_rejected() {
        let err = parse("def f():\n    return 1\n").unwrap_err();
        assert!(err.message.contains("'def'"));
        assert!(parse("return 1").is_err());
    }

    #[test]
    fn test_cannot_assign_to_call() {
        let err = parse("f() = 1").unwrap_err();
        assert!(err.message.contains("function call"));
    }

    #[test]
    fn test_deep_nesting_is_a_parse_error() {
        let src = format!("x = {}1{}", "(".repeat(500), ")".repeat(500));
        let err = parse(&src).unwrap_err();
        assert!(err.message.contains("nested"));
        let src = format!("x = {}1", "-".repeat(5000));
        assert!(parse(&src).is_err());
    }

    fn nested_ifs(depth: usize) -> String {
        let mut src = String::new();
        for level in 0..depth {
            src.push_str(&" ".repeat(level));
            src.push_str("if 1:\n");
        }
        src.push_str(&" ".repeat(depth));
        src.push_str("result = 1\n");
        src
    }

    #[test]
    fn test_deep_block_nesting_is_a_parse_error() {
        let err = parse(&nested_ifs(2_000)).unwrap_err();
        assert!(err.message.contains("nested blocks"));
        assert!(parse(&nested_ifs(20)).unwrap().assigns("result"));
    }

    #[test]
    fn test_assigns_walks_nested_blocks() {
        let program = parse("if x:\n    result = 1\n").unwrap();
        assert!(program.assigns("result"));
        assert!(!program.assigns("other"));
        let program = parse("top = df.nlargest(3, 'price')").unwrap();
        assert!(!program.assigns("result"));
    }
}
