//! Tree-walking evaluation of a parsed program.
//!
//! Values have value semantics: a method that mutates its receiver hands the
//! updated receiver back (see [`Returned`]) and the interpreter stores it into
//! the expression the receiver came from. Item and attribute assignment work
//! the same way, so `df.loc[m, "c"] = 0` rebuilds `df` through the `.loc`
//! indexer and rebinds it.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::dataset::Index;
use crate::script::ast::{BoolOp, CmpOp, Expr, FPart, ImportName, Program, Stmt, StmtKind};

use super::args::{Args, Invoker, Returned};
use super::builtins;
use super::collections;
use super::context::ExecutionContext;
use super::fault::{Exec, Fault, FaultClass};
use super::format;
use super::frame_ops;
use super::groupby;
use super::modules;
use super::ops;
use super::series_ops;
use super::value::{IndexerKind, Key, Lambda, SliceValue, Value};

/// Deepest chain of nested lambda calls.
const MAX_CALL_DEPTH: usize = 100;

const COPY_WARNING: &str =
    "SettingWithCopyWarning: a value was set on a copy of a slice; the original is unchanged\n";

enum Flow {
    Normal,
    Break,
    Continue,
}

type Scope = HashMap<String, Value>;

/// Runs statements against an [`ExecutionContext`].
pub struct Interpreter<'c> {
    ctx: &'c mut ExecutionContext,
    /// Lambda and comprehension scopes, innermost last. Empty at top level.
    scopes: Vec<Scope>,
    depth: usize,
    loop_depth: usize,
}

impl<'c> Interpreter<'c> {
    pub fn new(ctx: &'c mut ExecutionContext) -> Self {
        Self {
            ctx,
            scopes: Vec::new(),
            depth: 0,
            loop_depth: 0,
        }
    }

    /// Execute every top-level statement in order.
    pub fn run(&mut self, program: &Program) -> Exec<()> {
        self.exec_block(&program.body).map(|_| ())
    }

    fn tick(&self) -> Exec<()> {
        if self.ctx.interrupted() {
            return Err(self.ctx.timeout_fault());
        }
        Ok(())
    }

    // ---- statements ----

    fn exec_block(&mut self, body: &[Stmt]) -> Exec<Flow> {
        for stmt in body {
            match self
                .exec_stmt(stmt)
                .map_err(|f| f.at(stmt.line, stmt.kind.label()))?
            {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Exec<Flow> {
        self.tick()?;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.eval(target)?;
                let rhs = self.eval(value)?;
                let updated = ops::binary(*op, current, rhs, self.ctx.limit())?;
                self.assign(target, updated)?;
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval(test)?.truthy()? {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::While { test, body } => {
                self.loop_depth += 1;
                let result = self.run_while(test, body);
                self.loop_depth -= 1;
                result?;
            }
            StmtKind::For { target, iter, body } => {
                self.loop_depth += 1;
                let result = self.run_for(target, iter, body);
                self.loop_depth -= 1;
                result?;
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    return Err(Fault::new(FaultClass::SyntaxError, "'break' outside loop"));
                }
                return Ok(Flow::Break);
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(Fault::new(
                        FaultClass::SyntaxError,
                        "'continue' not properly in loop",
                    ));
                }
                return Ok(Flow::Continue);
            }
            StmtKind::Pass => {}
            StmtKind::Import { names } => {
                for item in names {
                    self.import(item)?;
                }
            }
            StmtKind::ImportFrom { module, names } => self.import_from(module, names)?,
            StmtKind::Del { targets } => {
                for target in targets {
                    self.delete(target)?;
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn run_while(&mut self, test: &Expr, body: &[Stmt]) -> Exec<()> {
        loop {
            self.tick()?;
            if !self.eval(test)?.truthy()? {
                return Ok(());
            }
            if let Flow::Break = self.exec_block(body)? {
                return Ok(());
            }
        }
    }

    fn run_for(&mut self, target: &Expr, iter: &Expr, body: &[Stmt]) -> Exec<()> {
        let items = self.eval(iter)?.into_iter_values()?;
        for item in items {
            self.tick()?;
            self.assign(target, item)?;
            if let Flow::Break = self.exec_block(body)? {
                break;
            }
        }
        Ok(())
    }

    fn import(&mut self, item: &ImportName) -> Exec<()> {
        let kind = self.ctx.module(&item.name).ok_or_else(|| {
            Fault::disallowed(format!("import of module '{}' is not allowed", item.name))
        })?;
        let bound = item.alias.as_deref().unwrap_or(&item.name);
        self.bind(bound, Value::Module(kind));
        Ok(())
    }

    fn import_from(&mut self, module: &str, names: &[ImportName]) -> Exec<()> {
        let kind = self.ctx.module(module).ok_or_else(|| {
            Fault::disallowed(format!("import of module '{module}' is not allowed"))
        })?;
        for item in names {
            let value = modules::attribute(kind, &item.name).map_err(|_| {
                Fault::disallowed(format!(
                    "cannot import name '{}' from '{module}'",
                    item.name
                ))
            })?;
            let bound = item.alias.as_deref().unwrap_or(&item.name);
            self.bind(bound, value);
        }
        Ok(())
    }

    fn delete(&mut self, target: &Expr) -> Exec<()> {
        match target {
            Expr::Name(name) => {
                if self.ctx.globals.shift_remove(name).is_none() {
                    return Err(Fault::name(name));
                }
                Ok(())
            }
            Expr::Subscript { value: base, index } => {
                let key = self.eval(index)?;
                let container = self.eval(base)?;
                let updated = del_item(container, &key)?;
                self.write_back(base, updated)
            }
            Expr::Tuple(items) | Expr::List(items) => {
                for item in items {
                    self.delete(item)?;
                }
                Ok(())
            }
            _ => Err(Fault::new(
                FaultClass::SyntaxError,
                "cannot delete expression",
            )),
        }
    }

    // ---- binding ----

    fn bind(&mut self, name: &str, value: Value) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.to_string(), value);
            }
            None => {
                self.ctx.globals.insert(name.to_string(), value);
            }
        }
    }

    fn lookup(&self, name: &str) -> Exec<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.ctx.global(name))
            .ok_or_else(|| Fault::name(name))
    }

    /// Store `value` into an assignment target.
    fn assign(&mut self, target: &Expr, value: Value) -> Exec<()> {
        match target {
            Expr::Name(name) => {
                self.bind(name, value);
                Ok(())
            }
            Expr::Tuple(items) | Expr::List(items) => {
                let values = value.collect_values(self.ctx.limit())?;
                if values.len() < items.len() {
                    return Err(Fault::value(format!(
                        "not enough values to unpack (expected {}, got {})",
                        items.len(),
                        values.len()
                    )));
                }
                if values.len() > items.len() {
                    return Err(Fault::value(format!(
                        "too many values to unpack (expected {})",
                        items.len()
                    )));
                }
                for (item, v) in items.iter().zip(values) {
                    self.assign(item, v)?;
                }
                Ok(())
            }
            Expr::Subscript { value: base, index } => {
                let key = self.eval(index)?;
                let container = self.eval(base)?;
                let updated = set_item(container, &key, value, self.ctx.limit())?;
                self.write_back(base, updated)
            }
            Expr::Attribute { value: base, attr } => {
                let obj = self.eval(base)?;
                let updated = set_attr(obj, attr, value, self.ctx.limit())?;
                self.write_back(base, updated)
            }
            _ => Err(Fault::new(
                FaultClass::SyntaxError,
                "cannot assign to expression",
            )),
        }
    }

    /// Propagate an updated container or receiver back to where it was read
    /// from. Selections that pandas would return as copies are not written
    /// back; a warning goes to stderr instead.
    fn write_back(&mut self, target: &Expr, value: Value) -> Exec<()> {
        match target {
            Expr::Name(_) | Expr::Attribute { .. } => self.assign(target, value),
            Expr::Subscript { value: base, index } => {
                let key = self.eval(index)?;
                let container = self.eval(base)?;
                if selects_copy(&container, &key) {
                    self.ctx.capture.write_stderr(COPY_WARNING);
                    return Ok(());
                }
                let updated = set_item(container, &key, value, self.ctx.limit())?;
                self.write_back(base, updated)
            }
            _ => {
                self.ctx.capture.write_stderr(COPY_WARNING);
                Ok(())
            }
        }
    }

    // ---- expressions ----

    fn eval(&mut self, expr: &Expr) -> Exec<Value> {
        match expr {
            Expr::Name(name) => self.lookup(name).cloned(),
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::FString(parts) => self.fstring(parts),
            Expr::List(items) => self.eval_bounded(items).map(Value::List),
            Expr::Tuple(items) => self.eval_bounded(items).map(Value::Tuple),
            Expr::Set(items) => {
                let mut set = IndexSet::new();
                for v in self.eval_all(items)? {
                    set.insert(Key::from_value(&v)?);
                }
                Ok(Value::Set(set))
            }
            Expr::Dict(pairs) => {
                let limit = self.ctx.limit();
                let mut size = 0usize;
                let mut map = IndexMap::new();
                for (k, v) in pairs {
                    let key = Key::from_value(&self.eval(k)?)?;
                    let value = self.eval(v)?;
                    size = size.saturating_add(1).saturating_add(value.weight(limit));
                    if size > limit {
                        return Err(Fault::too_large(limit));
                    }
                    map.insert(key, value);
                }
                Ok(Value::Dict(map))
            }
            Expr::Attribute { value, attr } => {
                if let Expr::Name(name) = value.as_ref() {
                    return get_attr(self.lookup(name)?, attr);
                }
                let obj = self.eval(value)?;
                get_attr(&obj, attr)
            }
            Expr::Subscript { value, index } => {
                let key = self.eval(index)?;
                let limit = self.ctx.limit();
                if let Expr::Name(name) = value.as_ref() {
                    return get_item(self.lookup(name)?, &key, limit);
                }
                let container = self.eval(value)?;
                get_item(&container, &key, limit)
            }
            Expr::Slice { lower, upper, step } => Ok(Value::Slice(Box::new(SliceValue {
                lower: self.eval_opt(lower.as_deref())?,
                upper: self.eval_opt(upper.as_deref())?,
                step: self.eval_opt(step.as_deref())?,
            }))),
            Expr::Call { func, args, kwargs } => self.eval_call(func, args, kwargs),
            Expr::Unary { op, operand } => {
                let v = self.eval(operand)?;
                ops::unary(*op, v)
            }
            Expr::Binary { op, left, right } => {
                let a = self.eval(left)?;
                let b = self.eval(right)?;
                ops::binary(*op, a, b, self.ctx.limit())
            }
            Expr::BoolOp { op, left, right } => {
                let l = self.eval(left)?;
                let short_circuit = match op {
                    BoolOp::And => !l.truthy()?,
                    BoolOp::Or => l.truthy()?,
                };
                if short_circuit {
                    Ok(l)
                } else {
                    self.eval(right)
                }
            }
            Expr::Compare { left, ops } => self.eval_compare(left, ops),
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test)?.truthy()? {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Lambda { params, body } => Ok(Value::Lambda(Rc::new(Lambda {
                params: params.clone(),
                body: body.as_ref().clone(),
                captured: self.captured(),
            }))),
            Expr::ListComp {
                elt,
                target,
                iter,
                conds,
            } => self.list_comp(elt, target, iter, conds),
        }
    }

    fn eval_opt(&mut self, expr: Option<&Expr>) -> Exec<Value> {
        match expr {
            Some(e) => self.eval(e),
            None => Ok(Value::None),
        }
    }

    fn eval_all(&mut self, items: &[Expr]) -> Exec<Vec<Value>> {
        items.iter().map(|e| self.eval(e)).collect()
    }

    /// Container literal items; their combined weight stays within the limit.
    fn eval_bounded(&mut self, items: &[Expr]) -> Exec<Vec<Value>> {
        let limit = self.ctx.limit();
        let mut size = 0usize;
        let mut out = Vec::with_capacity(items.len());
        for e in items {
            let v = self.eval(e)?;
            size = size.saturating_add(v.weight(limit));
            if size > limit {
                return Err(Fault::too_large(limit));
            }
            out.push(v);
        }
        Ok(out)
    }

    fn eval_args(&mut self, args: &[Expr], kwargs: &[(String, Expr)]) -> Exec<Args> {
        let pos = self.eval_all(args)?;
        let mut kw = IndexMap::with_capacity(kwargs.len());
        for (name, e) in kwargs {
            let v = self.eval(e)?;
            if kw.insert(name.clone(), v).is_some() {
                return Err(Fault::new(
                    FaultClass::SyntaxError,
                    format!("keyword argument repeated: {name}"),
                ));
            }
        }
        Ok(Args::new(pos, kw))
    }

    fn fstring(&mut self, parts: &[FPart]) -> Exec<Value> {
        let mut out = String::new();
        for part in parts {
            match part {
                FPart::Lit(s) => out.push_str(s),
                FPart::Expr {
                    expr,
                    conversion,
                    spec,
                } => {
                    let v = self.eval(expr)?;
                    let conversion = conversion.map(String::from);
                    out.push_str(&format::convert_and_format(
                        &v,
                        conversion.as_deref(),
                        spec.as_deref().unwrap_or(""),
                    )?);
                }
            }
        }
        Ok(Value::Str(out))
    }

    fn eval_compare(&mut self, left: &Expr, chain: &[(CmpOp, Expr)]) -> Exec<Value> {
        let mut lhs = self.eval(left)?;
        let mut result = Value::Bool(true);
        for (op, rhs) in chain {
            let rhs = self.eval(rhs)?;
            result = ops::compare(*op, &lhs, &rhs)?;
            if chain.len() > 1 && !result.truthy()? {
                return Ok(result);
            }
            lhs = rhs;
        }
        Ok(result)
    }

    /// Local bindings visible to a lambda created here.
    fn captured(&self) -> Vec<(String, Value)> {
        let mut merged: IndexMap<String, Value> = IndexMap::new();
        for scope in &self.scopes {
            for (k, v) in scope {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged.into_iter().collect()
    }

    fn list_comp(&mut self, elt: &Expr, target: &Expr, iter: &Expr, conds: &[Expr]) -> Exec<Value> {
        let items = self.eval(iter)?.into_iter_values()?;
        self.scopes.push(Scope::new());
        let result = self.comprehend(elt, target, items, conds);
        self.scopes.pop();
        result.map(Value::List)
    }

    fn comprehend(
        &mut self,
        elt: &Expr,
        target: &Expr,
        items: impl Iterator<Item = Value>,
        conds: &[Expr],
    ) -> Exec<Vec<Value>> {
        let limit = self.ctx.limit();
        let mut size = 0usize;
        let mut out = Vec::new();
        'items: for item in items {
            self.tick()?;
            self.assign(target, item)?;
            for cond in conds {
                if !self.eval(cond)?.truthy()? {
                    continue 'items;
                }
            }
            let value = self.eval(elt)?;
            size = size.saturating_add(value.weight(limit));
            if size > limit {
                return Err(Fault::too_large(limit));
            }
            out.push(value);
        }
        Ok(out)
    }

    // ---- calls ----

    fn eval_call(&mut self, func: &Expr, args: &[Expr], kwargs: &[(String, Expr)]) -> Exec<Value> {
        if let Expr::Attribute {
            value: recv_expr,
            attr,
        } = func
        {
            let recv = self.eval(recv_expr)?;
            if is_method(&recv, attr) {
                let args = self.eval_args(args, kwargs)?;
                let returned = self.call_method(recv, attr, args)?;
                if let Some(updated) = returned.receiver {
                    self.write_back(recv_expr, updated)?;
                }
                return Ok(returned.value);
            }
            let callee = get_attr(&recv, attr)?;
            let args = self.eval_args(args, kwargs)?;
            return self.call_value(&callee, args);
        }
        let callee = self.eval(func)?;
        let args = self.eval_args(args, kwargs)?;
        self.call_value(&callee, args)
    }

    fn call_method(&mut self, recv: Value, name: &str, args: Args) -> Exec<Returned> {
        match recv {
            Value::Frame(df) => frame_ops::call_method(df, name, args, self),
            Value::Series(s) => series_ops::call_method(s, name, args, self),
            Value::GroupBy(g) => groupby::call_method(&g, name, args, self).map(Returned::value),
            Value::Indexer(IndexerKind::Str, inner) => match *inner {
                Value::Series(s) => series_ops::str_method(&s, name, args).map(Returned::value),
                other => Err(Fault::attribute(other.type_name(), name)),
            },
            other => collections::call_method(other, name, args, self),
        }
    }

    fn call_value(&mut self, func: &Value, args: Args) -> Exec<Value> {
        self.tick()?;
        match func {
            Value::Builtin(name) | Value::Type(name) => builtins::call(name, args, self),
            Value::Stub(name) => Err(builtins::disallowed(name)),
            Value::ModuleFn(kind, name) => modules::call(*kind, name, args, self),
            Value::Method(recv, name) => Ok(self.call_method(recv.as_ref().clone(), name, args)?.value),
            Value::Lambda(lambda) => self.call_lambda(lambda, args),
            other => Err(Fault::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_lambda(&mut self, lambda: &Lambda, mut args: Args) -> Exec<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Fault::new(
                FaultClass::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        let mut frame: Scope = lambda.captured.iter().cloned().collect();
        for (i, param) in lambda.params.iter().enumerate() {
            let v = args.required(i, param, "<lambda>")?;
            frame.insert(param.clone(), v);
        }
        args.finish("<lambda>")?;

        let saved = std::mem::replace(&mut self.scopes, vec![frame]);
        self.depth += 1;
        let result = self.eval(&lambda.body);
        self.depth -= 1;
        self.scopes = saved;
        result
    }
}

impl Invoker for Interpreter<'_> {
    fn invoke(&mut self, func: &Value, args: Vec<Value>) -> Exec<Value> {
        self.call_value(func, Args::positional(args))
    }

    fn limit(&self) -> usize {
        self.ctx.limit()
    }

    fn poll(&self) -> Exec<()> {
        self.tick()
    }

    fn write_stdout(&mut self, text: &str) {
        self.ctx.capture.write_stdout(text);
    }
}

// ---- attribute and item protocol ----

fn is_method(recv: &Value, name: &str) -> bool {
    match recv {
        Value::Frame(_) => frame_ops::METHODS.contains(&name),
        Value::Series(_) => series_ops::METHODS.contains(&name),
        Value::GroupBy(_) => groupby::METHODS.contains(&name),
        Value::Indexer(IndexerKind::Str, _) => series_ops::STR_METHODS.contains(&name),
        other => collections::has_method(other, name),
    }
}

fn bound_method(recv: &Value, name: &str) -> Value {
    Value::Method(Box::new(recv.clone()), name.to_string())
}

fn get_attr(obj: &Value, attr: &str) -> Exec<Value> {
    if attr.starts_with("__") {
        return Err(Fault::disallowed(format!(
            "access to attribute '{attr}' is not allowed"
        )));
    }
    if is_method(obj, attr) {
        return Ok(bound_method(obj, attr));
    }
    let found = match obj {
        Value::Module(kind) => return modules::attribute(*kind, attr),
        Value::Frame(df) => frame_ops::attribute(df, attr)?,
        Value::Series(s) => series_ops::attribute(s, attr)?,
        Value::GroupBy(g) => groupby::attribute(g, attr)?,
        _ => None,
    };
    let type_name = match obj {
        Value::GroupBy(g) => g.type_name(),
        other => other.type_name(),
    };
    found.ok_or_else(|| Fault::attribute(type_name, attr))
}

fn sequence_index(len: usize, key: &Value, what: &str) -> Exec<usize> {
    let i = key.as_int().ok_or_else(|| {
        Fault::type_error(format!(
            "{what} indices must be integers or slices, not {}",
            key.type_name()
        ))
    })?;
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved as usize >= len {
        return Err(Fault::index(format!("{what} index out of range")));
    }
    Ok(resolved as usize)
}

fn get_item(container: &Value, key: &Value, limit: usize) -> Exec<Value> {
    match container {
        Value::Frame(df) => frame_ops::subscript(df, key),
        Value::Series(s) => series_ops::subscript(s, key),
        Value::GroupBy(g) => groupby::select(g, key),
        Value::Indexer(kind, inner) => match (kind, inner.as_ref()) {
            (IndexerKind::Str, Value::Series(s)) => series_ops::str_subscript(s, key),
            (kind, Value::Frame(df)) => frame_ops::indexer_get(*kind, df, key),
            (kind, Value::Series(s)) => series_ops::indexer_get(*kind, s, key),
            _ => Err(Fault::type_error("indexer has no target")),
        },
        Value::List(items) | Value::Tuple(items) => {
            let what = container.type_name();
            match key {
                Value::Slice(slice) => {
                    let picked = slice
                        .positions(items.len())?
                        .into_iter()
                        .map(|i| items[i].clone())
                        .collect();
                    Ok(match container {
                        Value::Tuple(_) => Value::Tuple(picked),
                        _ => Value::List(picked),
                    })
                }
                other => Ok(items[sequence_index(items.len(), other, what)?].clone()),
            }
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            match key {
                Value::Slice(slice) => Ok(Value::Str(
                    slice
                        .positions(chars.len())?
                        .into_iter()
                        .map(|i| chars[i])
                        .collect(),
                )),
                other => Ok(Value::Str(
                    chars[sequence_index(chars.len(), other, "string")?].to_string(),
                )),
            }
        }
        Value::Range(r) => match key {
            Value::Slice(_) => {
                let items = Value::Range(*r).collect_values(limit)?;
                get_item(&Value::List(items), key, limit)
            }
            other => {
                let i = sequence_index(r.len(), other, "range object")?;
                Ok(Value::Int(r.start + r.step * i as i64))
            }
        },
        Value::Dict(map) => map
            .get(&Key::from_value(key)?)
            .cloned()
            .ok_or_else(|| Fault::key(key.repr())),
        other => Err(Fault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `container[key] = value`, returning the updated container.
fn set_item(container: Value, key: &Value, value: Value, limit: usize) -> Exec<Value> {
    match container {
        Value::Frame(df) => frame_ops::assign(df, key, &value).map(Value::Frame),
        Value::Series(s) => series_ops::assign(s, None, key, &value).map(Value::Series),
        Value::Indexer(kind, inner) if kind != IndexerKind::Str => {
            let updated = match *inner {
                Value::Frame(df) => Value::Frame(frame_ops::indexer_set(kind, df, key, &value)?),
                Value::Series(s) => Value::Series(series_ops::assign(s, Some(kind), key, &value)?),
                other => {
                    return Err(Fault::type_error(format!(
                        "'{}' object does not support item assignment",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Indexer(kind, Box::new(updated)))
        }
        Value::List(mut items) => {
            match key {
                Value::Slice(slice) => {
                    let replacement = value.collect_values(limit)?;
                    splice(&mut items, slice, replacement)?;
                    if items.len() > limit {
                        return Err(Fault::too_large(limit));
                    }
                }
                other => {
                    let i = sequence_index(items.len(), other, "list assignment")?;
                    if items.len().saturating_add(value.weight(limit)) > limit {
                        return Err(Fault::too_large(limit));
                    }
                    items[i] = value;
                }
            }
            Ok(Value::List(items))
        }
        Value::Dict(mut map) => {
            if map.len().saturating_add(value.weight(limit)) > limit {
                return Err(Fault::too_large(limit));
            }
            map.insert(Key::from_value(key)?, value);
            if map.len() > limit {
                return Err(Fault::too_large(limit));
            }
            Ok(Value::Dict(map))
        }
        other => Err(Fault::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn splice(items: &mut Vec<Value>, slice: &SliceValue, replacement: Vec<Value>) -> Exec<()> {
    let unit_step = matches!(slice.step, Value::None) || slice.step.as_int() == Some(1);
    if unit_step {
        let n = items.len() as i64;
        let bound = |v: &Value, default: i64| -> Exec<usize> {
            match v {
                Value::None => Ok(default as usize),
                other => {
                    let i = other.as_int().ok_or_else(|| {
                        Fault::type_error("slice indices must be integers or None")
                    })?;
                    let i = if i < 0 { i + n } else { i };
                    Ok(i.clamp(0, n) as usize)
                }
            }
        };
        let start = bound(&slice.lower, 0)?;
        let stop = bound(&slice.upper, n)?.max(start);
        items.splice(start..stop, replacement);
        return Ok(());
    }
    let positions = slice.positions(items.len())?;
    if positions.len() != replacement.len() {
        return Err(Fault::value(format!(
            "attempt to assign sequence of size {} to extended slice of size {}",
            replacement.len(),
            positions.len()
        )));
    }
    for (p, v) in positions.into_iter().zip(replacement) {
        items[p] = v;
    }
    Ok(())
}

fn relabel(len: usize, value: Value, limit: usize) -> Exec<Index> {
    let labels = series_ops::cells_of(value, limit)?;
    if labels.len() != len {
        return Err(Fault::value(format!(
            "Length mismatch: Expected axis has {len} elements, new values have {} elements",
            labels.len()
        )));
    }
    Ok(Index::from_labels(None, labels))
}

fn unwrap_indexer(value: Value, attr: &str) -> Exec<Value> {
    match value {
        Value::Indexer(_, inner) => Ok(*inner),
        _ => Err(Fault::new(
            FaultClass::AttributeError,
            format!("can't set attribute '{attr}'"),
        )),
    }
}

/// `obj.attr = value`, returning the updated object.
fn set_attr(obj: Value, attr: &str, value: Value, limit: usize) -> Exec<Value> {
    if attr.starts_with("__") {
        return Err(Fault::disallowed(format!(
            "access to attribute '{attr}' is not allowed"
        )));
    }
    match obj {
        Value::Frame(mut df) => match attr {
            "columns" => frame_ops::set_columns(df, value, limit).map(Value::Frame),
            "index" => {
                df.index = relabel(df.n_rows(), value, limit)?;
                Ok(Value::Frame(df))
            }
            a if IndexerKind::from_attr(a).is_some() => unwrap_indexer(value, a),
            a if df.column(a).is_some() => {
                frame_ops::assign(df, &Value::Str(a.to_string()), &value).map(Value::Frame)
            }
            a => Err(Fault::new(
                FaultClass::AttributeError,
                format!("cannot create column '{a}' by attribute; use df['{a}'] = ..."),
            )),
        },
        Value::Series(mut s) => match attr {
            "name" => {
                s.name = match value {
                    Value::None => None,
                    other => Some(other.to_str()),
                };
                Ok(Value::Series(s))
            }
            "index" => {
                s.index = relabel(s.len(), value, limit)?;
                Ok(Value::Series(s))
            }
            a if IndexerKind::from_attr(a).is_some() => unwrap_indexer(value, a),
            a => Err(Fault::new(
                FaultClass::AttributeError,
                format!("can't set attribute '{a}'"),
            )),
        },
        other => Err(Fault::new(
            FaultClass::AttributeError,
            format!(
                "'{}' object attribute '{attr}' is read-only",
                other.type_name()
            ),
        )),
    }
}

fn del_item(container: Value, key: &Value) -> Exec<Value> {
    match container {
        Value::Dict(mut map) => {
            map.shift_remove(&Key::from_value(key)?)
                .ok_or_else(|| Fault::key(key.repr()))?;
            Ok(Value::Dict(map))
        }
        Value::List(mut items) => {
            match key {
                Value::Slice(slice) => {
                    let mut positions = slice.positions(items.len())?;
                    positions.sort_unstable();
                    for p in positions.into_iter().rev() {
                        items.remove(p);
                    }
                }
                other => {
                    let i = sequence_index(items.len(), other, "list assignment")?;
                    items.remove(i);
                }
            }
            Ok(Value::List(items))
        }
        Value::Frame(mut df) => {
            let name = key
                .as_str()
                .ok_or_else(|| Fault::type_error("column names must be strings"))?;
            let pos = df
                .column_position(name)
                .ok_or_else(|| Fault::key(key.repr()))?;
            df.columns.remove(pos);
            Ok(Value::Frame(df))
        }
        other => Err(Fault::type_error(format!(
            "'{}' object does not support item deletion",
            other.type_name()
        ))),
    }
}

/// Whether `container[key]` is a fresh selection rather than a view.
fn selects_copy(container: &Value, key: &Value) -> bool {
    matches!(container, Value::Frame(_) | Value::Series(_))
        && matches!(
            key,
            Value::List(_) | Value::Series(_) | Value::Slice(_) | Value::Tuple(_)
        )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;
    use crate::config::ExecutorConfig;
    use crate::dataset::{DataFrame, Scalar};
    use crate::script::parse;

    fn sales() -> DataFrame {
        DataFrame::from_columns(vec![
            (
                "region",
                vec!["north".into(), "south".into(), "north".into()],
            ),
            ("revenue", vec![Scalar::Int(10), Scalar::Int(20), Scalar::Int(30)]),
        ])
        .unwrap()
    }

    fn run(code: &str) -> (ExecutionContext, Exec<()>) {
        let mut ctx = ExecutionContext::new(
            &ExecutorConfig::default(),
            &sales(),
            1000,
            Arc::new(AtomicBool::new(false)),
        );
        let program = parse(code).unwrap();
        let result = Interpreter::new(&mut ctx).run(&program);
        (ctx, result)
    }

    fn result_of(code: &str) -> Value {
        let (ctx, result) = run(code);
        result.unwrap();
        ctx.global("result").cloned().unwrap()
    }

    #[test]
    fn test_arithmetic_and_control_flow() {
        let code = "total = 0\nfor i in range(10):\n    if i % 2 == 0:\n        continue\n    total += i\nresult = total";
        assert_eq!(result_of(code), Value::Int(25));
    }

    #[test]
    fn test_while_break() {
        let code = "n = 0\nwhile True:\n    n += 1\n    if n >= 5:\n        break\nresult = n";
        assert_eq!(result_of(code), Value::Int(5));
    }

    #[test]
    fn test_list_append_writes_back() {
        assert_eq!(
            result_of("xs = [1]\nxs.append(2)\nresult = xs"),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_nested_dict_assignment() {
        let code = "d = {'a': {}}\nd['a']['b'] = 1\nresult = d['a']['b']";
        assert_eq!(result_of(code), Value::Int(1));
    }

    #[test]
    fn test_lambda_captures_comprehension_variable() {
        let code = "result = [(lambda x: x + k)(10) for k in range(3) if k > 0]";
        assert_eq!(
            result_of(code),
            Value::List(vec![Value::Int(11), Value::Int(12)])
        );
    }

    #[test]
    fn test_recursion_limit() {
        let fault = std::thread::Builder::new()
            .stack_size(64 << 20)
            .spawn(|| run("f = lambda n: f(n + 1)\nresult = f(0)").1.unwrap_err())
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(fault.class, FaultClass::RecursionError);
        assert_eq!(fault.line, Some(2));
    }

    #[test]
    fn test_fault_carries_statement_location() {
        let (_, result) = run("x = 1\nif x:\n    y = undefined_variable\n");
        let fault = result.unwrap_err();
        assert_eq!(fault.class, FaultClass::NameError);
        assert_eq!(fault.line, Some(3));
        assert_eq!(fault.statement, Some("assignment"));
    }

    #[test]
    fn test_stub_through_alias_is_disallowed() {
        let (_, result) = run("f = eval\nresult = f('1+1')");
        assert_eq!(result.unwrap_err().class, FaultClass::DisallowedOperation);
    }

    #[test]
    fn test_dunder_attribute_is_disallowed() {
        let (_, result) = run("result = df.__class__");
        assert_eq!(result.unwrap_err().class, FaultClass::DisallowedOperation);
    }

    #[test]
    fn test_import_rules() {
        assert!(matches!(result_of("import pandas as p\nresult = p"), Value::Module(_)));
        let (_, result) = run("import os\nresult = 1");
        assert_eq!(result.unwrap_err().class, FaultClass::DisallowedOperation);
    }

    #[test]
    fn test_column_assignment_and_loc() {
        let code = "df['double'] = df['revenue'] * 2\ndf.loc[df['region'] == 'south', 'double'] = 0\nresult = df['double'].tolist()";
        assert_eq!(
            result_of(code),
            Value::List(vec![Value::Int(20), Value::Int(0), Value::Int(60)])
        );
    }

    #[test]
    fn test_inplace_method_writes_back() {
        let code = "df.sort_values('revenue', ascending=False, inplace=True)\nresult = df['revenue'].tolist()";
        assert_eq!(
            result_of(code),
            Value::List(vec![Value::Int(30), Value::Int(20), Value::Int(10)])
        );
    }

    #[test]
    fn test_chained_assignment_on_copy_warns() {
        let (ctx, result) = run("df[df['revenue'] > 10]['revenue'] = 0\nresult = df['revenue'].sum()");
        result.unwrap();
        assert_eq!(ctx.global("result"), Some(&Value::Int(60)));
        assert!(ctx.capture.stderr().contains("SettingWithCopyWarning"));
    }

    #[test]
    fn test_fstring_with_spec_and_conversion() {
        assert_eq!(
            result_of("x = 3.14159\nname = 'a'\nresult = f'{name!r}={x:.2f}'"),
            Value::Str("'a'=3.14".into())
        );
    }

    #[test]
    fn test_unpacking_mismatch() {
        let (_, result) = run("a, b = [1, 2, 3]");
        let fault = result.unwrap_err();
        assert_eq!(fault.class, FaultClass::ValueError);
        assert!(fault.message.contains("too many values"));
    }

    #[test]
    fn test_interrupt_raises_timeout() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut ctx = ExecutionContext::new(&ExecutorConfig::default(), &sales(), 5, flag);
        let program = parse("while True:\n    pass").unwrap();
        let fault = Interpreter::new(&mut ctx).run(&program).unwrap_err();
        assert!(fault.is_timeout());
        assert_eq!(fault.message, "Execution timeout after 5 ms");
    }

    #[test]
    fn test_print_is_captured() {
        let (ctx, result) = run("print('rows:', len(df))");
        result.unwrap();
        assert_eq!(ctx.capture.stdout(), "rows: 3\n");
    }
}
