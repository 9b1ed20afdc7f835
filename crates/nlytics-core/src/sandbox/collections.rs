//! Methods of the built-in containers: `str`, `list`, `tuple`, `dict`, `set`.

use std::cmp::Ordering;

use indexmap::{IndexMap, IndexSet};

use super::args::{Args, Invoker, Returned};
use super::fault::{Exec, Fault};
use super::format;
use super::ops;
use super::value::{weight_of, Key, Value};

/// Dispatch `recv.name(args)` for a container receiver.
pub fn call_method(
    recv: Value,
    name: &str,
    args: Args,
    inv: &mut dyn Invoker,
) -> Exec<Returned> {
    match recv {
        Value::Str(s) => str_method(&s, name, args, inv.limit()).map(Returned::value),
        Value::List(items) => list_method(items, name, args, inv),
        Value::Tuple(items) => tuple_method(&items, name, args).map(Returned::value),
        Value::Dict(map) => dict_method(map, name, args),
        Value::Set(set) => set_method(set, name, args, inv),
        other => Err(Fault::attribute(other.type_name(), name)),
    }
}

/// Whether `recv.name` names a method of a container receiver.
pub fn has_method(recv: &Value, name: &str) -> bool {
    let names: &[&str] = match recv {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Tuple(_) => &["index", "count"],
        Value::Dict(_) => DICT_METHODS,
        Value::Set(_) => SET_METHODS,
        _ => &[],
    };
    names.contains(&name)
}

const STR_METHODS: &[&str] = &[
    "lower", "upper", "strip", "lstrip", "rstrip", "split", "rsplit", "join", "replace",
    "startswith", "endswith", "find", "rfind", "index", "count", "title", "capitalize",
    "swapcase", "isdigit", "isnumeric", "isdecimal", "isalpha", "isalnum", "isspace",
    "isupper", "islower", "format", "zfill", "center", "ljust", "rjust", "splitlines",
    "partition",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "index", "count", "sort", "reverse", "copy",
    "clear",
];

const DICT_METHODS: &[&str] = &[
    "get", "keys", "values", "items", "update", "pop", "setdefault", "copy", "clear",
];

const SET_METHODS: &[&str] = &[
    "add", "remove", "discard", "update", "union", "intersection", "difference",
    "symmetric_difference", "pop", "copy", "clear", "issubset", "issuperset",
];

fn str_arg(v: Value, func: &str) -> Exec<String> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(Fault::type_error(format!(
            "{func}() argument must be str, not {}",
            other.type_name()
        ))),
    }
}

fn strip_set(args: &mut Args, func: &str) -> Exec<Option<Vec<char>>> {
    Ok(args
        .string(0, "chars", func)?
        .map(|c| c.chars().collect()))
}

/// String methods; `limit` bounds the byte length of produced strings.
fn str_method(s: &str, name: &str, mut args: Args, limit: usize) -> Exec<Value> {
    let v = match name {
        "lower" => Value::Str(s.to_lowercase()),
        "upper" => Value::Str(s.to_uppercase()),
        "swapcase" => Value::Str(
            s.chars()
                .map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<String>()
                    } else {
                        c.to_uppercase().collect::<String>()
                    }
                })
                .collect(),
        ),
        "strip" | "lstrip" | "rstrip" => {
            let chars = strip_set(&mut args, name)?;
            let matcher = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            Value::Str(
                match name {
                    "strip" => s.trim_matches(matcher),
                    "lstrip" => s.trim_start_matches(matcher),
                    _ => s.trim_end_matches(matcher),
                }
                .to_string(),
            )
        }
        "split" | "rsplit" => {
            let sep = args.string(0, "sep", name)?;
            let maxsplit = args.int(1, "maxsplit", -1, name)?;
            Value::List(
                split(s, sep.as_deref(), maxsplit, name == "rsplit")?
                    .into_iter()
                    .map(Value::Str)
                    .collect(),
            )
        }
        "splitlines" => Value::List(s.lines().map(|l| Value::Str(l.to_string())).collect()),
        "partition" => {
            let sep = str_arg(args.required(0, "sep", name)?, name)?;
            match s.split_once(sep.as_str()) {
                Some((a, b)) => Value::Tuple(vec![
                    Value::Str(a.to_string()),
                    Value::Str(sep.clone()),
                    Value::Str(b.to_string()),
                ]),
                None => Value::Tuple(vec![
                    Value::Str(s.to_string()),
                    Value::Str(String::new()),
                    Value::Str(String::new()),
                ]),
            }
        }
        "join" => {
            let items = args.required(0, "iterable", name)?.collect_values(limit)?;
            let mut parts = Vec::with_capacity(items.len());
            let mut size = 0usize;
            for (i, item) in items.into_iter().enumerate() {
                match item {
                    Value::Str(p) => {
                        size = size.saturating_add(p.len()).saturating_add(s.len());
                        if size > limit {
                            return Err(Fault::too_large(limit));
                        }
                        parts.push(p);
                    }
                    other => {
                        return Err(Fault::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                }
            }
            Value::Str(parts.join(s))
        }
        "replace" => {
            let old = str_arg(args.required(0, "old", name)?, name)?;
            let new = str_arg(args.required(1, "new", name)?, name)?;
            let count = args.int(2, "count", -1, name)?;
            if new.len() > old.len() {
                let hits = if old.is_empty() {
                    s.chars().count() + 1
                } else {
                    s.matches(old.as_str()).count()
                };
                let hits = if count < 0 { hits } else { hits.min(count as usize) };
                if s.len().saturating_add(hits.saturating_mul(new.len() - old.len())) > limit {
                    return Err(Fault::too_large(limit));
                }
            }
            Value::Str(if count < 0 {
                s.replace(old.as_str(), &new)
            } else {
                s.replacen(old.as_str(), &new, count as usize)
            })
        }
        "startswith" | "endswith" => {
            let prefixes = match args.required(0, "prefix", name)? {
                Value::Str(p) => vec![p],
                Value::Tuple(items) => items
                    .into_iter()
                    .map(|v| str_arg(v, name))
                    .collect::<Exec<Vec<_>>>()?,
                other => {
                    return Err(Fault::type_error(format!(
                        "{name} first arg must be str or a tuple of str, not {}",
                        other.type_name()
                    )))
                }
            };
            Value::Bool(prefixes.iter().any(|p| {
                if name == "startswith" {
                    s.starts_with(p.as_str())
                } else {
                    s.ends_with(p.as_str())
                }
            }))
        }
        "find" | "rfind" | "index" => {
            let sub = str_arg(args.required(0, "sub", name)?, name)?;
            let found = if name == "rfind" {
                s.rfind(sub.as_str())
            } else {
                s.find(sub.as_str())
            };
            match found {
                Some(byte) => Value::Int(s[..byte].chars().count() as i64),
                None if name == "index" => return Err(Fault::value("substring not found")),
                None => Value::Int(-1),
            }
        }
        "count" => {
            let sub = str_arg(args.required(0, "sub", name)?, name)?;
            if sub.is_empty() {
                Value::Int(s.chars().count() as i64 + 1)
            } else {
                Value::Int(s.matches(sub.as_str()).count() as i64)
            }
        }
        "title" => Value::Str(title_case(s)),
        "capitalize" => {
            let mut chars = s.chars();
            Value::Str(match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            })
        }
        "isdigit" | "isnumeric" | "isdecimal" => {
            Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_numeric()))
        }
        "isalpha" => Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic)),
        "isalnum" => Value::Bool(!s.is_empty() && s.chars().all(char::is_alphanumeric)),
        "isspace" => Value::Bool(!s.is_empty() && s.chars().all(char::is_whitespace)),
        "isupper" => Value::Bool(
            s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_lowercase),
        ),
        "islower" => Value::Bool(
            s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_uppercase),
        ),
        "format" => {
            let pos = args.rest(0);
            let kw = args.take_all_kw();
            return format::format_template(s, &pos, &kw).map(Value::Str);
        }
        "zfill" => {
            let width = args.int(0, "width", 0, name)?.max(0) as usize;
            if width > limit {
                return Err(Fault::too_large(limit));
            }
            let len = s.chars().count();
            if len >= width {
                Value::Str(s.to_string())
            } else {
                let (sign, digits) = match s.strip_prefix(['-', '+']) {
                    Some(rest) => (&s[..1], rest),
                    None => ("", s),
                };
                Value::Str(format!("{sign}{}{digits}", "0".repeat(width - len)))
            }
        }
        "center" | "ljust" | "rjust" => {
            let width = args.int(0, "width", 0, name)?;
            let fill = args.string(1, "fillchar", name)?.unwrap_or_else(|| " ".into());
            let align = match name {
                "center" => '^',
                "ljust" => '<',
                _ => '>',
            };
            let fill_char = fill.chars().next().unwrap_or(' ');
            return format::format_value(
                &Value::Str(s.to_string()),
                &format!("{fill_char}{align}{}", width.max(0)),
            )
            .map(Value::Str);
        }
        other => return Err(Fault::attribute("str", other)),
    };
    args.finish(name)?;
    Ok(v)
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

fn split(s: &str, sep: Option<&str>, maxsplit: i64, from_right: bool) -> Exec<Vec<String>> {
    let limit = if maxsplit < 0 { usize::MAX } else { maxsplit as usize + 1 };
    match sep {
        Some("") => Err(Fault::value("empty separator")),
        Some(sep) => {
            let mut parts: Vec<String> = if from_right {
                s.rsplitn(limit, sep).map(str::to_string).collect()
            } else {
                s.splitn(limit, sep).map(str::to_string).collect()
            };
            if from_right {
                parts.reverse();
            }
            Ok(parts)
        }
        None => {
            let words: Vec<&str> = s.split_whitespace().collect();
            if words.len() <= limit {
                return Ok(words.into_iter().map(str::to_string).collect());
            }
            if from_right {
                let cut = words.len() - (limit - 1);
                let head = words[..cut].join(" ");
                let mut out = vec![head];
                out.extend(words[cut..].iter().map(|w| w.to_string()));
                Ok(out)
            } else {
                let mut out: Vec<String> =
                    words[..limit - 1].iter().map(|w| w.to_string()).collect();
                out.push(words[limit - 1..].join(" "));
                Ok(out)
            }
        }
    }
}

fn index_arg(v: Value, len: usize, func: &str) -> Exec<usize> {
    let i = v.as_int().ok_or_else(|| {
        Fault::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            v.type_name()
        ))
    })?;
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved as usize >= len {
        return Err(Fault::index(format!("{func} index out of range")));
    }
    Ok(resolved as usize)
}

/// Sort values, optionally by a key function. Stable.
pub fn sort_values(
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
    inv: &mut dyn Invoker,
) -> Exec<Vec<Value>> {
    let keys = match key {
        Some(f) => items
            .iter()
            .map(|v| inv.invoke(f, vec![v.clone()]))
            .collect::<Exec<Vec<_>>>()?,
        None => items.clone(),
    };
    let mut order: Vec<usize> = (0..items.len()).collect();
    let mut failure = None;
    order.sort_by(|&a, &b| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        match ops::order(&keys[a], &keys[b], "<") {
            Ok(Some(o)) => {
                if reverse {
                    o.reverse()
                } else {
                    o
                }
            }
            Ok(None) => Ordering::Equal,
            Err(e) => {
                failure = Some(e);
                Ordering::Equal
            }
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    let mut slots: Vec<Option<Value>> = items.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

fn list_method(
    mut items: Vec<Value>,
    name: &str,
    mut args: Args,
    inv: &mut dyn Invoker,
) -> Exec<Returned> {
    let limit = inv.limit();
    let out = match name {
        "append" => {
            let object = args.required(0, "object", name)?;
            if items.len().saturating_add(object.weight(limit)) > limit {
                return Err(Fault::too_large(limit));
            }
            items.push(object);
            args.finish(name)?;
            return Ok(Returned::mutated(Value::None, Value::List(items)));
        }
        "extend" => {
            let more = args.required(0, "iterable", name)?.collect_values(limit)?;
            if items.len().saturating_add(weight_of(&more, limit)) > limit {
                return Err(Fault::too_large(limit));
            }
            items.extend(more);
            args.finish(name)?;
            return Ok(Returned::mutated(Value::None, Value::List(items)));
        }
        "insert" => {
            let at = args.required(0, "index", name)?.as_int().unwrap_or(0);
            let value = args.required(1, "object", name)?;
            if items.len().saturating_add(value.weight(limit)) > limit {
                return Err(Fault::too_large(limit));
            }
            let len = items.len() as i64;
            let pos = if at < 0 { (at + len).max(0) } else { at.min(len) };
            items.insert(pos as usize, value);
            args.finish(name)?;
            return Ok(Returned::mutated(Value::None, Value::List(items)));
        }
        "pop" => {
            if items.is_empty() {
                return Err(Fault::index("pop from empty list"));
            }
            let at = match args.take(0, "index") {
                Some(v) => index_arg(v, items.len(), "pop")?,
                None => items.len() - 1,
            };
            args.finish(name)?;
            let v = items.remove(at);
            return Ok(Returned::mutated(v, Value::List(items)));
        }
        "remove" => {
            let target = args.required(0, "value", name)?;
            args.finish(name)?;
            let at = items
                .iter()
                .position(|v| v.py_eq(&target))
                .ok_or_else(|| Fault::value("list.remove(x): x not in list"))?;
            items.remove(at);
            return Ok(Returned::mutated(Value::None, Value::List(items)));
        }
        "clear" => {
            args.finish(name)?;
            return Ok(Returned::mutated(Value::None, Value::List(Vec::new())));
        }
        "reverse" => {
            args.finish(name)?;
            items.reverse();
            return Ok(Returned::mutated(Value::None, Value::List(items)));
        }
        "sort" => {
            let key = args.take_kw("key").filter(|k| !matches!(k, Value::None));
            let reverse = args.flag_kw("reverse", false)?;
            args.finish(name)?;
            let sorted = sort_values(items, key.as_ref(), reverse, inv)?;
            return Ok(Returned::mutated(Value::None, Value::List(sorted)));
        }
        "copy" => Value::List(items),
        "index" | "count" => return tuple_method(&items, name, args).map(Returned::value),
        other => return Err(Fault::attribute("list", other)),
    };
    args.finish(name)?;
    Ok(Returned::value(out))
}

fn tuple_method(items: &[Value], name: &str, mut args: Args) -> Exec<Value> {
    let target = args.required(0, "value", name)?;
    args.finish(name)?;
    match name {
        "index" => items
            .iter()
            .position(|v| v.py_eq(&target))
            .map(|i| Value::Int(i as i64))
            .ok_or_else(|| Fault::value(format!("{} is not in list", target.repr()))),
        "count" => Ok(Value::Int(
            items.iter().filter(|v| v.py_eq(&target)).count() as i64,
        )),
        other => Err(Fault::attribute("tuple", other)),
    }
}

fn dict_method(mut map: IndexMap<Key, Value>, name: &str, mut args: Args) -> Exec<Returned> {
    let out = match name {
        "get" => {
            let key = Key::from_value(&args.required(0, "key", name)?)?;
            let default = args.take(1, "default").unwrap_or(Value::None);
            map.get(&key).cloned().unwrap_or(default)
        }
        "keys" => Value::List(map.keys().map(Key::to_value).collect()),
        "values" => Value::List(map.values().cloned().collect()),
        "items" => Value::List(
            map.iter()
                .map(|(k, v)| Value::Tuple(vec![k.to_value(), v.clone()]))
                .collect(),
        ),
        "copy" => Value::Dict(map),
        "update" => {
            if let Some(other) = args.take(0, "other") {
                merge_into(&mut map, other)?;
            }
            for (k, v) in args.take_all_kw() {
                map.insert(Key::Str(k), v);
            }
            return Ok(Returned::mutated(Value::None, Value::Dict(map)));
        }
        "pop" => {
            let key = Key::from_value(&args.required(0, "key", name)?)?;
            let default = args.take(1, "default");
            args.finish(name)?;
            let v = match (map.shift_remove(&key), default) {
                (Some(v), _) => v,
                (None, Some(d)) => d,
                (None, None) => return Err(Fault::key(key.to_value().repr())),
            };
            return Ok(Returned::mutated(v, Value::Dict(map)));
        }
        "setdefault" => {
            let key = Key::from_value(&args.required(0, "key", name)?)?;
            let default = args.take(1, "default").unwrap_or(Value::None);
            args.finish(name)?;
            let v = map.entry(key).or_insert(default).clone();
            return Ok(Returned::mutated(v, Value::Dict(map)));
        }
        "clear" => {
            args.finish(name)?;
            return Ok(Returned::mutated(Value::None, Value::Dict(IndexMap::new())));
        }
        other => return Err(Fault::attribute("dict", other)),
    };
    args.finish(name)?;
    Ok(Returned::value(out))
}

/// `dict.update` / `dict(...)` source: a dict or an iterable of pairs.
pub fn merge_into(map: &mut IndexMap<Key, Value>, other: Value) -> Exec<()> {
    match other {
        Value::Dict(m) => map.extend(m),
        other => {
            for pair in other.collect_values(usize::MAX)? {
                match pair {
                    Value::Tuple(kv) | Value::List(kv) if kv.len() == 2 => {
                        let mut kv = kv.into_iter();
                        if let (Some(k), Some(v)) = (kv.next(), kv.next()) {
                            map.insert(Key::from_value(&k)?, v);
                        }
                    }
                    other => {
                        return Err(Fault::type_error(format!(
                            "cannot convert '{}' element to a key/value pair",
                            other.type_name()
                        )))
                    }
                }
            }
        }
    }
    Ok(())
}

fn to_key_set(v: Value, limit: usize) -> Exec<IndexSet<Key>> {
    match v {
        Value::Set(s) => Ok(s),
        other => other
            .collect_values(limit)?
            .iter()
            .map(Key::from_value)
            .collect(),
    }
}

fn set_method(
    mut set: IndexSet<Key>,
    name: &str,
    mut args: Args,
    inv: &mut dyn Invoker,
) -> Exec<Returned> {
    let limit = inv.limit();
    let out = match name {
        "add" => {
            let key = Key::from_value(&args.required(0, "elem", name)?)?;
            args.finish(name)?;
            if set.len() >= limit {
                return Err(Fault::too_large(limit));
            }
            set.insert(key);
            return Ok(Returned::mutated(Value::None, Value::Set(set)));
        }
        "remove" | "discard" => {
            let v = args.required(0, "elem", name)?;
            args.finish(name)?;
            let key = Key::from_value(&v)?;
            if !set.shift_remove(&key) && name == "remove" {
                return Err(Fault::key(v.repr()));
            }
            return Ok(Returned::mutated(Value::None, Value::Set(set)));
        }
        "update" => {
            for other in args.rest(0) {
                set.extend(to_key_set(other, limit)?);
            }
            args.finish(name)?;
            return Ok(Returned::mutated(Value::None, Value::Set(set)));
        }
        "pop" => {
            args.finish(name)?;
            let key = set
                .shift_remove_index(0)
                .ok_or_else(|| Fault::key("'pop from an empty set'"))?;
            return Ok(Returned::mutated(key.to_value(), Value::Set(set)));
        }
        "clear" => {
            args.finish(name)?;
            return Ok(Returned::mutated(Value::None, Value::Set(IndexSet::new())));
        }
        "copy" => Value::Set(set),
        "union" | "intersection" | "difference" | "symmetric_difference" => {
            let mut acc = set;
            for other in args.rest(0) {
                let other = to_key_set(other, limit)?;
                acc = match name {
                    "union" => acc.union(&other).cloned().collect(),
                    "intersection" => acc.intersection(&other).cloned().collect(),
                    "difference" => acc.difference(&other).cloned().collect(),
                    _ => acc.symmetric_difference(&other).cloned().collect(),
                };
            }
            Value::Set(acc)
        }
        "issubset" | "issuperset" => {
            let other = to_key_set(args.required(0, "other", name)?, limit)?;
            Value::Bool(if name == "issubset" {
                set.is_subset(&other)
            } else {
                set.is_superset(&other)
            })
        }
        other => return Err(Fault::attribute("set", other)),
    };
    args.finish(name)?;
    Ok(Returned::value(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoCalls;

    impl Invoker for NoCalls {
        fn invoke(&mut self, func: &Value, args: Vec<Value>) -> Exec<Value> {
            match (func, args.first()) {
                (Value::Builtin("abs"), Some(v)) => Ok(Value::Float(v.as_f64().unwrap_or(0.0).abs())),
                _ => Err(Fault::type_error("not callable in tests")),
            }
        }

        fn limit(&self) -> usize {
            100
        }

        fn poll(&self) -> Exec<()> {
            Ok(())
        }

        fn write_stdout(&mut self, _text: &str) {}
    }

    fn call(recv: Value, name: &str, pos: Vec<Value>) -> Exec<Returned> {
        call_method(recv, name, Args::positional(pos), &mut NoCalls)
    }

    fn s(v: &str) -> Value {
        Value::Str(v.into())
    }

    #[test]
    fn test_str_methods() {
        assert_eq!(call(s("  Hi "), "strip", vec![]).unwrap().value, s("Hi"));
        assert_eq!(
            call(s("a,b,,c"), "split", vec![s(",")]).unwrap().value,
            Value::List(vec![s("a"), s("b"), s(""), s("c")])
        );
        assert_eq!(
            call(s(" a  b "), "split", vec![]).unwrap().value,
            Value::List(vec![s("a"), s("b")])
        );
        assert_eq!(call(s("-"), "join", vec![Value::List(vec![s("x"), s("y")])]).unwrap().value, s("x-y"));
        assert_eq!(call(s("hello world"), "title", vec![]).unwrap().value, s("Hello World"));
        assert_eq!(call(s("-5"), "zfill", vec![Value::Int(4)]).unwrap().value, s("-005"));
        assert!(call(s("x"), "join", vec![Value::List(vec![Value::Int(1)])]).is_err());
    }

    #[test]
    fn test_list_append_returns_updated_receiver() {
        let r = call(Value::List(vec![]), "append", vec![Value::Int(1)]).unwrap();
        assert_eq!(r.value, Value::None);
        assert_eq!(r.receiver, Some(Value::List(vec![Value::Int(1)])));
    }

    #[test]
    fn test_list_append_respects_limit() {
        let full = Value::List(vec![Value::None; 100]);
        assert!(call(full, "append", vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn test_append_counts_nested_values() {
        let nested = Value::List(vec![Value::Int(0); 60]);
        assert!(call(Value::List(vec![Value::None; 30]), "append", vec![nested.clone()]).is_ok());
        let err = call(Value::List(vec![Value::None; 50]), "append", vec![nested.clone()]).unwrap_err();
        assert!(err.message.contains("limit"));
        assert!(call(Value::List(vec![]), "extend", vec![Value::List(vec![nested.clone(), nested])]).is_err());
    }

    #[test]
    fn test_string_growth_respects_limit() {
        let err = call(s("aaaa"), "replace", vec![s("a"), s(&"b".repeat(30))]).unwrap_err();
        assert!(err.message.contains("limit"));
        assert_eq!(call(s("aaaa"), "replace", vec![s("a"), s("bb")]).unwrap().value, s("bbbbbbbb"));
        let parts = Value::List(vec![s(&"x".repeat(40)); 3]);
        assert!(call(s(","), "join", vec![parts]).is_err());
        assert!(call(s("7"), "zfill", vec![Value::Int(1_000)]).is_err());
    }

    #[test]
    fn test_sort_with_key_and_reverse() {
        let items = vec![Value::Int(-3), Value::Int(1), Value::Int(2)];
        let sorted = sort_values(items, Some(&Value::Builtin("abs")), true, &mut NoCalls).unwrap();
        assert_eq!(sorted, vec![Value::Int(-3), Value::Int(2), Value::Int(1)]);
        let mixed = vec![Value::Int(1), s("a")];
        assert!(sort_values(mixed, None, false, &mut NoCalls).is_err());
    }

    #[test]
    fn test_dict_methods() {
        let mut map = IndexMap::new();
        map.insert(Key::Str("a".into()), Value::Int(1));
        let d = Value::Dict(map);
        assert_eq!(call(d.clone(), "get", vec![s("z"), Value::Int(0)]).unwrap().value, Value::Int(0));
        assert!(call(d.clone(), "pop", vec![s("z")]).is_err());
        let r = call(d, "setdefault", vec![s("b"), Value::Int(2)]).unwrap();
        match r.receiver {
            Some(Value::Dict(m)) => assert_eq!(m.len(), 2),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_set_remove_missing_is_key_error() {
        let set: IndexSet<Key> = [Key::Int(1)].into_iter().collect();
        let err = call(Value::Set(set), "remove", vec![Value::Int(2)]).unwrap_err();
        assert_eq!(err.class, super::super::fault::FaultClass::KeyError);
    }
}
