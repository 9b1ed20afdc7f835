//! Call arguments with Python-style positional/keyword binding.

use indexmap::IndexMap;

use super::fault::{Exec, Fault};
use super::value::Value;

#[derive(Debug, Default)]
pub struct Args {
    pos: Vec<Option<Value>>,
    kw: IndexMap<String, Value>,
}

impl Args {
    pub fn new(pos: Vec<Value>, kw: IndexMap<String, Value>) -> Self {
        Self {
            pos: pos.into_iter().map(Some).collect(),
            kw,
        }
    }

    pub fn positional(pos: Vec<Value>) -> Self {
        Self::new(pos, IndexMap::new())
    }

    /// Number of positional arguments supplied.
    pub fn n_pos(&self) -> usize {
        self.pos.len()
    }

    /// Take the argument bound to position `i` or keyword `name`.
    pub fn take(&mut self, i: usize, name: &str) -> Option<Value> {
        if let Some(slot) = self.pos.get_mut(i) {
            if let Some(v) = slot.take() {
                return Some(v);
            }
        }
        self.kw.shift_remove(name)
    }

    /// Keyword-only argument.
    pub fn take_kw(&mut self, name: &str) -> Option<Value> {
        self.kw.shift_remove(name)
    }

    pub fn required(&mut self, i: usize, name: &str, func: &str) -> Exec<Value> {
        self.take(i, name).ok_or_else(|| {
            Fault::type_error(format!(
                "{func}() missing required argument: '{name}'"
            ))
        })
    }

    /// Like `take`, but `None` counts as absent.
    pub fn optional(&mut self, i: usize, name: &str) -> Option<Value> {
        self.take(i, name).filter(|v| !matches!(v, Value::None))
    }

    pub fn flag(&mut self, i: usize, name: &str, default: bool) -> Exec<bool> {
        match self.take(i, name) {
            None => Ok(default),
            Some(v) => v.truthy(),
        }
    }

    pub fn flag_kw(&mut self, name: &str, default: bool) -> Exec<bool> {
        match self.take_kw(name) {
            None => Ok(default),
            Some(v) => v.truthy(),
        }
    }

    pub fn int(&mut self, i: usize, name: &str, default: i64, func: &str) -> Exec<i64> {
        match self.take(i, name) {
            None | Some(Value::None) => Ok(default),
            Some(v) => v.as_int().ok_or_else(|| {
                Fault::type_error(format!(
                    "{func}() argument '{name}' must be an integer, not '{}'",
                    v.type_name()
                ))
            }),
        }
    }

    pub fn string(&mut self, i: usize, name: &str, func: &str) -> Exec<Option<String>> {
        match self.take(i, name) {
            None | Some(Value::None) => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(v) => Err(Fault::type_error(format!(
                "{func}() argument '{name}' must be a string, not '{}'",
                v.type_name()
            ))),
        }
    }

    /// All remaining positional arguments from `from` on (varargs).
    pub fn rest(&mut self, from: usize) -> Vec<Value> {
        self.pos
            .iter_mut()
            .skip(from)
            .filter_map(Option::take)
            .collect()
    }

    /// Remaining keyword arguments, in call order.
    pub fn take_all_kw(&mut self) -> IndexMap<String, Value> {
        std::mem::take(&mut self.kw)
    }

    /// Reject anything the callee did not consume.
    pub fn finish(self, func: &str) -> Exec<()> {
        if let Some(name) = self.kw.keys().next() {
            return Err(Fault::type_error(format!(
                "{func}() got an unexpected keyword argument '{name}'"
            )));
        }
        let extra = self.pos.iter().filter(|p| p.is_some()).count();
        if extra > 0 {
            return Err(Fault::type_error(format!(
                "{func}() takes {} positional argument(s) but {} were given",
                self.pos.len() - extra,
                self.pos.len()
            )));
        }
        Ok(())
    }
}

/// Calls back into the interpreter from library code (sort keys, `apply`,
/// `map`, group-by lambdas).
pub trait Invoker {
    fn invoke(&mut self, func: &Value, args: Vec<Value>) -> Exec<Value>;

    /// Largest collection the program may materialize.
    fn limit(&self) -> usize;

    /// Fails with a timeout fault once the deadline has passed.
    fn poll(&self) -> Exec<()>;

    /// Append to the captured stdout of the running program.
    fn write_stdout(&mut self, text: &str);
}

/// Rows processed between deadline checks in bulk row loops.
pub const POLL_ROWS: usize = 4096;

/// Deadline check for row `i` of a bulk loop; polls every [`POLL_ROWS`] rows.
pub fn poll_row(inv: &dyn Invoker, i: usize) -> Exec<()> {
    if i % POLL_ROWS == 0 {
        inv.poll()
    } else {
        Ok(())
    }
}

/// What a method call hands back: its return value and, for mutating
/// methods, the updated receiver to write back.
#[derive(Debug)]
pub struct Returned {
    pub value: Value,
    pub receiver: Option<Value>,
}

impl Returned {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            receiver: None,
        }
    }

    pub fn mutated(value: Value, receiver: Value) -> Self {
        Self {
            value,
            receiver: Some(receiver),
        }
    }
}
