//! String formatting: format specs (`f"{x:,.2f}"`, `format(x, spec)`),
//! `str.format` templates and `%` interpolation.

use indexmap::IndexMap;

use super::fault::{Exec, Fault};
use super::value::{Key, Value};

/// Largest field width or precision a spec may request.
const MAX_FIELD: usize = 1 << 20;

#[derive(Debug, Default, Clone, PartialEq)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> Exec<Spec> {
    let bad = || Fault::value(format!("Invalid format specifier '{spec}'"));
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if chars.first().copied().is_some_and(is_align) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i) {
        if matches!(c, '+' | '-' | ' ') {
            out.sign = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'#') {
        out.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(char::is_ascii_digit) {
        i += 1;
    }
    if i > start {
        let digits: String = chars[start..i].iter().collect();
        out.width = digits.parse().map_err(|_| bad())?;
    }
    if let Some(&c) = chars.get(i) {
        if c == ',' || c == '_' {
            out.grouping = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i == start {
            return Err(Fault::value("Format specifier missing precision"));
        }
        let digits: String = chars[start..i].iter().collect();
        out.precision = Some(digits.parse().map_err(|_| bad())?);
    }
    if out.width > MAX_FIELD || out.precision.is_some_and(|p| p > MAX_FIELD) {
        return Err(Fault::value("Too many decimal digits in format string"));
    }
    if let Some(&c) = chars.get(i) {
        out.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(bad());
    }
    Ok(out)
}

/// `format(value, spec)`.
pub fn format_value(v: &Value, spec: &str) -> Exec<String> {
    if spec.is_empty() {
        return Ok(v.to_str());
    }
    let spec = parse_spec(spec)?;
    match v {
        Value::Str(s) => format_str(s, &spec),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => format_number(v, &spec),
        Value::None if spec.kind.is_none() && spec.precision.is_none() => {
            Ok(pad("None", &spec, '<'))
        }
        other => Err(Fault::type_error(format!(
            "unsupported format string passed to {}.__format__",
            other.type_name()
        ))),
    }
}

fn format_str(s: &str, spec: &Spec) -> Exec<String> {
    match spec.kind {
        None | Some('s') => {}
        Some(k) => {
            return Err(Fault::value(format!(
                "Unknown format code '{k}' for object of type 'str'"
            )))
        }
    }
    if spec.sign.is_some() {
        return Err(Fault::value("Sign not allowed in string format specifier"));
    }
    let body: String = match spec.precision {
        Some(p) => s.chars().take(p).collect(),
        None => s.to_string(),
    };
    Ok(pad(&body, spec, '<'))
}

fn format_number(v: &Value, spec: &Spec) -> Exec<String> {
    let is_int = matches!(v, Value::Int(_) | Value::Bool(_));
    let x = v.as_f64().unwrap_or(f64::NAN);
    let kind = spec.kind;
    let (negative, digits) = match kind {
        Some('d') | Some('n') => {
            let i = v.as_int().ok_or_else(|| {
                Fault::value(format!(
                    "Unknown format code 'd' for object of type '{}'",
                    v.type_name()
                ))
            })?;
            (i < 0, group(&i.unsigned_abs().to_string(), spec.grouping))
        }
        Some(k @ ('x' | 'X' | 'o' | 'b')) => {
            let i = v.as_int().ok_or_else(|| {
                Fault::value(format!(
                    "Unknown format code '{k}' for object of type '{}'",
                    v.type_name()
                ))
            })?;
            let mag = i.unsigned_abs();
            let body = match k {
                'x' => format!("{mag:x}"),
                'X' => format!("{mag:X}"),
                'o' => format!("{mag:o}"),
                _ => format!("{mag:b}"),
            };
            let prefix = if spec.alternate {
                match k {
                    'x' => "0x",
                    'X' => "0X",
                    'o' => "0o",
                    _ => "0b",
                }
            } else {
                ""
            };
            (i < 0, format!("{prefix}{body}"))
        }
        Some('f' | 'F') => (x.is_sign_negative() && !x.is_nan(), fixed(x.abs(), spec.precision.unwrap_or(6), spec.grouping)),
        Some('%') => {
            let body = fixed((x * 100.0).abs(), spec.precision.unwrap_or(6), spec.grouping);
            (x.is_sign_negative() && !x.is_nan(), format!("{body}%"))
        }
        Some('e' | 'E') => {
            let body = scientific(x.abs(), spec.precision.unwrap_or(6));
            let body = if kind == Some('E') { body.to_uppercase() } else { body };
            (x.is_sign_negative() && !x.is_nan(), body)
        }
        Some('g' | 'G') => {
            let body = general(x.abs(), spec.precision.unwrap_or(6), spec.alternate);
            let body = if kind == Some('G') { body.to_uppercase() } else { body };
            (x.is_sign_negative() && !x.is_nan(), group_number(&body, spec.grouping))
        }
        None if is_int => {
            let i = v.as_int().unwrap_or(0);
            (i < 0, group(&i.unsigned_abs().to_string(), spec.grouping))
        }
        None => {
            let body = match spec.precision {
                Some(p) => general(x.abs(), p, false),
                None => Value::Float(x.abs()).to_str(),
            };
            (x.is_sign_negative() && !x.is_nan(), group_number(&body, spec.grouping))
        }
        Some(k) => {
            return Err(Fault::value(format!(
                "Unknown format code '{k}' for object of type '{}'",
                v.type_name()
            )))
        }
    };
    let sign = if negative {
        "-"
    } else {
        match spec.sign {
            Some('+') => "+",
            Some(' ') => " ",
            _ => "",
        }
    };
    let mut spec = spec.clone();
    if spec.zero && spec.align.is_none() {
        spec.align = Some('=');
        spec.fill = Some('0');
    }
    if spec.align == Some('=') {
        let fill = spec.fill.unwrap_or(' ');
        let used = sign.chars().count() + digits.chars().count();
        let padding: String = std::iter::repeat(fill)
            .take(spec.width.saturating_sub(used))
            .collect();
        return Ok(format!("{sign}{padding}{digits}"));
    }
    Ok(pad(&format!("{sign}{digits}"), &spec, '>'))
}

fn fixed(x: f64, precision: usize, grouping: Option<char>) -> String {
    if !x.is_finite() {
        return nonfinite(x);
    }
    group_number(&format!("{x:.precision$}"), grouping)
}

fn nonfinite(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else {
        "inf".to_string()
    }
}

fn scientific(x: f64, precision: usize) -> String {
    if !x.is_finite() {
        return nonfinite(x);
    }
    let raw = format!("{x:.precision$e}");
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => raw,
    }
}

fn general(x: f64, precision: usize, keep_zeros: bool) -> String {
    if !x.is_finite() {
        return nonfinite(x);
    }
    let p = precision.max(1);
    if x == 0.0 {
        return if keep_zeros {
            format!("{:.*}", p - 1, 0.0)
        } else {
            "0".to_string()
        };
    }
    let sci = scientific(x, p - 1);
    let exp: i32 = sci
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);
    let body = if exp < -4 || exp >= p as i32 {
        sci
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        format!("{x:.decimals$}")
    };
    if keep_zeros {
        return body;
    }
    strip_zeros(&body)
}

fn strip_zeros(body: &str) -> String {
    let (mantissa, exp) = match body.split_once('e') {
        Some((m, e)) => (m, Some(e)),
        None => (body, None),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    match exp {
        Some(e) => format!("{mantissa}e{e}"),
        None => mantissa.to_string(),
    }
}

/// Group the integer part of a plain decimal number.
fn group_number(body: &str, grouping: Option<char>) -> String {
    if grouping.is_none() || body.contains('e') {
        return body.to_string();
    }
    match body.split_once('.') {
        Some((int, frac)) => format!("{}.{frac}", group(int, grouping)),
        None => group(body, grouping),
    }
}

fn group(digits: &str, grouping: Option<char>) -> String {
    let Some(sep) = grouping else {
        return digits.to_string();
    };
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return digits.to_string();
    }
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

fn pad(body: &str, spec: &Spec, default_align: char) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body.to_string();
    }
    let fill = spec.fill.unwrap_or(' ');
    let gap = spec.width - len;
    let run = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
    match spec.align.unwrap_or(default_align) {
        '<' => format!("{body}{}", run(gap)),
        '^' => format!("{}{body}{}", run(gap / 2), run(gap - gap / 2)),
        _ => format!("{}{body}", run(gap)),
    }
}

/// `template.format(*args, **kwargs)`.
pub fn format_template(
    template: &str,
    args: &[Value],
    kwargs: &IndexMap<String, Value>,
) -> Exec<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(Fault::value(
                    "Single '}' encountered in format string",
                ))
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for d in chars.by_ref() {
                    if d == '}' {
                        closed = true;
                        break;
                    }
                    field.push(d);
                }
                if !closed {
                    return Err(Fault::value("expected '}' before end of string"));
                }
                let (head, spec) = match field.split_once(':') {
                    Some((h, s)) => (h.to_string(), s.to_string()),
                    None => (field, String::new()),
                };
                let (name, conv) = match head.split_once('!') {
                    Some((n, c)) => (n.to_string(), Some(c.to_string())),
                    None => (head, None),
                };
                let value = if name.is_empty() {
                    let v = args.get(auto).ok_or_else(|| {
                        Fault::index(format!(
                            "Replacement index {auto} out of range for positional args tuple"
                        ))
                    })?;
                    auto += 1;
                    v
                } else if let Ok(i) = name.parse::<usize>() {
                    args.get(i).ok_or_else(|| {
                        Fault::index(format!(
                            "Replacement index {i} out of range for positional args tuple"
                        ))
                    })?
                } else {
                    kwargs
                        .get(&name)
                        .ok_or_else(|| Fault::key(format!("'{name}'")))?
                };
                out.push_str(&convert_and_format(value, conv.as_deref(), &spec)?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Apply an optional `!r`/`!s` conversion then a format spec.
pub fn convert_and_format(value: &Value, conv: Option<&str>, spec: &str) -> Exec<String> {
    match conv {
        None => format_value(value, spec),
        Some("r") | Some("a") => format_value(&Value::Str(value.repr()), spec),
        Some("s") => format_value(&Value::Str(value.to_str()), spec),
        Some(other) => Err(Fault::value(format!(
            "Unknown conversion specifier {other}"
        ))),
    }
}

/// `fmt % args`.
pub fn percent_format(fmt: &str, args: &Value) -> Exec<String> {
    let positional: Vec<Value> = match args {
        Value::Tuple(items) => items.clone(),
        other => vec![other.clone()],
    };
    let mapping = match args {
        Value::Dict(map) => Some(map),
        _ => None,
    };
    let mut next = 0usize;
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        let mut key = None;
        if chars.peek() == Some(&'(') {
            chars.next();
            let mut name = String::new();
            for d in chars.by_ref() {
                if d == ')' {
                    break;
                }
                name.push(d);
            }
            key = Some(name);
        }
        let mut flags = String::new();
        while let Some(&d) = chars.peek() {
            if matches!(d, '-' | '+' | ' ' | '0' | '#') {
                flags.push(d);
                chars.next();
            } else {
                break;
            }
        }
        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }
        let mut precision = String::new();
        if chars.peek() == Some(&'.') {
            chars.next();
            precision.push('.');
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                precision.push(d);
                chars.next();
            }
        }
        let conv = chars
            .next()
            .ok_or_else(|| Fault::value("incomplete format"))?;
        let value = match (&key, mapping) {
            (Some(name), Some(map)) => map
                .get(&Key::Str(name.clone()))
                .cloned()
                .ok_or_else(|| Fault::key(format!("'{name}'")))?,
            (Some(_), None) => return Err(Fault::type_error("format requires a mapping")),
            (None, _) => {
                let v = positional.get(next).cloned().ok_or_else(|| {
                    Fault::type_error("not enough arguments for format string")
                })?;
                next += 1;
                v
            }
        };
        let align = if flags.contains('-') { "<" } else { "" };
        let sign = if flags.contains('+') {
            "+"
        } else if flags.contains(' ') {
            " "
        } else {
            ""
        };
        let zero = if flags.contains('0') && align.is_empty() { "0" } else { "" };
        let rendered = match conv {
            's' => format_value(&Value::Str(value.to_str()), &format!("{align}{width}{precision}"))?,
            'r' => format_value(&Value::Str(value.repr()), &format!("{align}{width}{precision}"))?,
            'd' | 'i' | 'u' => {
                let n = match &value {
                    Value::Float(f) => Value::Int(f.trunc() as i64),
                    other if other.is_number() => other.clone(),
                    other => {
                        return Err(Fault::type_error(format!(
                            "%{conv} format: a real number is required, not {}",
                            other.type_name()
                        )))
                    }
                };
                format_value(&n, &format!("{align}{sign}{zero}{width}d"))?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'x' | 'X' | 'o' => {
                if !value.is_number() {
                    return Err(Fault::type_error(format!(
                        "must be real number, not {}",
                        value.type_name()
                    )));
                }
                format_value(&value, &format!("{align}{sign}{zero}{width}{precision}{conv}"))?
            }
            other => {
                return Err(Fault::value(format!(
                    "unsupported format character '{other}'"
                )))
            }
        };
        out.push_str(&rendered);
    }
    if mapping.is_none() && next < positional.len() {
        return Err(Fault::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(v: Value, spec: &str) -> String {
        format_value(&v, spec).unwrap()
    }

    #[test]
    fn test_fixed_and_grouping() {
        assert_eq!(f(Value::Float(1234567.891), ",.2f"), "1,234,567.89");
        assert_eq!(f(Value::Int(60), ".1f"), "60.0");
        assert_eq!(f(Value::Int(-1234), ","), "-1,234");
    }

    #[test]
    fn test_oversized_fields_rejected() {
        assert!(format_value(&Value::Int(1), ">999999999").is_err());
        assert!(format_value(&Value::Float(1.0), ".99999999f").is_err());
    }

    #[test]
    fn test_percent_and_sign() {
        assert_eq!(f(Value::Float(0.256), ".1%"), "25.6%");
        assert_eq!(f(Value::Int(5), "+d"), "+5");
    }

    #[test]
    fn test_alignment_and_zero_padding() {
        assert_eq!(f(Value::Str("ab".into()), ">5"), "   ab");
        assert_eq!(f(Value::Str("ab".into()), "*^6"), "**ab**");
        assert_eq!(f(Value::Int(42), "05d"), "00042");
        assert_eq!(f(Value::Float(-3.5), "08.2f"), "-0003.50");
    }

    #[test]
    fn test_scientific_and_general() {
        assert_eq!(f(Value::Float(1500.0), ".2e"), "1.50e+03");
        assert_eq!(f(Value::Float(0.0001234), "g"), "0.0001234");
        assert_eq!(f(Value::Float(123456789.0), "g"), "1.23457e+08");
        assert_eq!(f(Value::Float(2.5), ".3"), "2.5");
    }

    #[test]
    fn test_bad_code_for_type() {
        assert!(format_value(&Value::Str("x".into()), "d").is_err());
        assert!(format_value(&Value::Float(1.5), "d").is_err());
    }

    #[test]
    fn test_template() {
        let mut kw = IndexMap::new();
        kw.insert("name".to_string(), Value::Str("AAPL".into()));
        let out = format_template(
            "{} {name}: {1:.2f} {{ok}}",
            &[Value::Int(1), Value::Float(2.0)],
            &kw,
        )
        .unwrap();
        assert_eq!(out, "1 AAPL: 2.00 {ok}");
    }

    #[test]
    fn test_percent_interpolation() {
        let args = Value::Tuple(vec![Value::Str("x".into()), Value::Float(2.5)]);
        assert_eq!(percent_format("%s=%.1f%%", &args).unwrap(), "x=2.5%");
        assert_eq!(percent_format("%5d|", &Value::Int(42)).unwrap(), "   42|");
        assert!(percent_format("%s %s", &Value::Int(1)).is_err());
    }
}
