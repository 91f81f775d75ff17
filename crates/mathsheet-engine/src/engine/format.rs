//! Turning values into annotation text.
//!
//! [`render`] gives the natural text of a value. [`apply_format`] fills a
//! `{}` / `{:spec}` template the way Python's `str.format` does, including
//! strftime patterns for dates (`{:%d %b %Y}`).

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use super::calendar;
use super::value::Value;

/// Display options that do not affect evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Render `1.5e20` as `1.5·10²⁰`.
    #[serde(default)]
    pub pretty_exponents: bool,
}

const SIGNIFICANT_DIGITS: i32 = 12;

fn trim_fraction_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

fn superscript(exp: i32) -> String {
    const DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];
    let mut out = String::new();
    if exp < 0 {
        out.push('⁻');
    }
    for c in exp.unsigned_abs().to_string().chars() {
        let d = c.to_digit(10).unwrap_or(0) as usize;
        out.push(DIGITS[d]);
    }
    out
}

/// Format a real for display: 12 significant digits, no trailing zeros,
/// scientific notation for very small or very large magnitudes.
pub fn format_number(x: f64, options: &RenderOptions) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return "0".to_string();
    }

    let magnitude = x.abs();
    if !(1e-5..1e15).contains(&magnitude) {
        let s = format!("{:.*e}", (SIGNIFICANT_DIGITS - 1) as usize, x);
        let (mantissa, exp) = s.split_once('e').unwrap_or((s.as_str(), "0"));
        let mantissa = trim_fraction_zeros(mantissa);
        let exp: i32 = exp.parse().unwrap_or(0);
        return if options.pretty_exponents {
            format!("{}·10{}", mantissa, superscript(exp))
        } else {
            format!("{}e{}", mantissa, exp)
        };
    }

    let decimals = (SIGNIFICANT_DIGITS - 1 - magnitude.log10().floor() as i32).max(0) as usize;
    trim_fraction_zeros(&format!("{:.*}", decimals, x))
}

/// Natural text of a value.
pub fn render(value: &Value, options: &RenderOptions) -> String {
    match value {
        Value::Nothing => String::new(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Real(x) => format_number(*x, options),
        Value::Rational(f) => f.to_string(),
        Value::Date(d) => calendar::format_date(*d),
        Value::DateTime(dt) => calendar::format_datetime(*dt),
        Value::Duration(td) => calendar::format_duration(*td).replace(", 0:00:00", ""),
        Value::Period(p) => p.to_string(),
        Value::Text(s) => s.clone(),
        Value::Sequence(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::Text(s) => format!("{:?}", s),
                    other => render(other, options),
                })
                .collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Function(f) => format!("<function {}>", f.name()),
        Value::Quantity(q) => format!(
            "{} {}",
            format_number(q.display_value(), options),
            q.unit_text()
        ),
    }
}

/// Fill a Python-style format template with `value`.
pub fn apply_format(template: &str, value: &Value, options: &RenderOptions) -> Result<String, String> {
    let mut out = String::new();
    let mut rest = template;
    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("{{") {
            out.push('{');
            rest = after;
            continue;
        }
        if let Some(after) = tail.strip_prefix("}}") {
            out.push('}');
            rest = after;
            continue;
        }
        if tail.starts_with('}') {
            return Err("Single '}' encountered in format string".to_string());
        }
        let close = tail
            .find('}')
            .ok_or_else(|| "Single '{' encountered in format string".to_string())?;
        let field = &tail[1..close];
        let (name, spec) = field.split_once(':').unwrap_or((field, ""));
        let name = name.split_once('!').map_or(name, |(n, _)| n);
        if !(name.is_empty() || name == "0") {
            return Err(format!("Replacement index {} out of range", name));
        }
        out.push_str(&format_value(value, spec, options)?);
        rest = &tail[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[derive(Debug)]
struct FormatSpec {
    fill: char,
    align: Option<char>,
    sign: char,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> Result<FormatSpec, String> {
    let invalid = || format!("Invalid format specifier '{}'", spec);
    let chars: Vec<char> = spec.chars().collect();
    let mut i = 0;
    let mut parsed = FormatSpec {
        fill: ' ',
        align: None,
        sign: '-',
        alternate: false,
        zero: false,
        width: 0,
        grouping: None,
        precision: None,
        kind: None,
    };
    let is_align = |c: char| matches!(c, '<' | '>' | '=' | '^');

    if chars.len() >= 2 && is_align(chars[1]) {
        parsed.fill = chars[0];
        parsed.align = Some(chars[1]);
        i = 2;
    } else if chars.first().copied().is_some_and(is_align) {
        parsed.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i).filter(|c| matches!(c, '+' | '-' | ' ')) {
        parsed.sign = c;
        i += 1;
    }
    if chars.get(i) == Some(&'#') {
        parsed.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        parsed.zero = true;
        i += 1;
    }
    let width_start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i > width_start {
        let digits: String = chars[width_start..i].iter().collect();
        parsed.width = digits.parse().map_err(|_| invalid())?;
    }
    if let Some(&c) = chars.get(i).filter(|c| matches!(c, ',' | '_')) {
        parsed.grouping = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == start {
            return Err("Format specifier missing precision".to_string());
        }
        let digits: String = chars[start..i].iter().collect();
        parsed.precision = Some(digits.parse().map_err(|_| invalid())?);
    }
    match &chars[i..] {
        [] => {}
        [c] => parsed.kind = Some(*c),
        _ => return Err(invalid()),
    }
    Ok(parsed)
}

fn format_value(value: &Value, spec: &str, options: &RenderOptions) -> Result<String, String> {
    if spec.is_empty() {
        return Ok(render(value, options));
    }
    match value {
        Value::Date(d) => return strftime(spec, |items| d.format_with_items(items).to_string()),
        Value::DateTime(dt) => return strftime(spec, |items| dt.format_with_items(items).to_string()),
        _ => {}
    }

    let spec = parse_spec(spec)?;
    let unknown = |code: char| {
        format!(
            "Unknown format code '{}' for object of type '{}'",
            code,
            value.kind()
        )
    };

    match spec.kind {
        None | Some('s') if !is_number(value) => Ok(format_text(&render(value, options), &spec)),
        Some('s') => Err(unknown('s')),
        Some(code @ ('d' | 'n' | 'x' | 'X' | 'o' | 'b')) => {
            let n = match value {
                Value::Int(n) => *n,
                Value::Bool(b) => *b as i64,
                _ => return Err(unknown(code)),
            };
            Ok(format_integer(n, code, &spec))
        }
        Some(code @ ('f' | 'F' | 'e' | 'E' | 'g' | 'G' | '%')) => {
            let x = value.as_f64().ok_or_else(|| unknown(code))?;
            Ok(format_float(x, code, &spec))
        }
        None => match value {
            Value::Int(n) => Ok(format_integer(*n, 'd', &spec)),
            Value::Bool(b) => Ok(format_integer(*b as i64, 'd', &spec)),
            _ if spec.precision.is_some() => {
                let x = value.as_f64().ok_or_else(|| unknown('g'))?;
                Ok(format_float(x, 'g', &spec))
            }
            _ => {
                let text = render(value, options);
                let (sign, body) = match text.strip_prefix('-') {
                    Some(body) => ("-", body),
                    None => (sign_for(false, spec.sign), text.as_str()),
                };
                Ok(pad(sign, &group_leading(body, spec.grouping), &spec, '>'))
            }
        },
        Some(code) => Err(unknown(code)),
    }
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Real(_) | Value::Rational(_) | Value::Bool(_))
}

fn strftime(spec: &str, format: impl FnOnce(StrftimeItems<'_>) -> String) -> Result<String, String> {
    if StrftimeItems::new(spec).any(|item| matches!(item, Item::Error)) {
        return Err(format!("Invalid date format '{}'", spec));
    }
    Ok(format(StrftimeItems::new(spec)))
}

fn sign_for(negative: bool, sign: char) -> &'static str {
    match (negative, sign) {
        (true, _) => "-",
        (false, '+') => "+",
        (false, ' ') => " ",
        _ => "",
    }
}

fn group_digits(digits: &str, separator: char, every: usize) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % every == 0 {
            out.push(separator);
        }
        out.push(*c);
    }
    out
}

/// Group the leading run of digits in `body`.
fn group_leading(body: &str, separator: Option<char>) -> String {
    let Some(sep) = separator else {
        return body.to_string();
    };
    let end = body.find(|c: char| !c.is_ascii_digit()).unwrap_or(body.len());
    format!("{}{}", group_digits(&body[..end], sep, 3), &body[end..])
}

fn format_integer(n: i64, code: char, spec: &FormatSpec) -> String {
    let magnitude = n.unsigned_abs();
    let (prefix, body) = match code {
        'x' => ("0x", format!("{:x}", magnitude)),
        'X' => ("0X", format!("{:X}", magnitude)),
        'o' => ("0o", format!("{:o}", magnitude)),
        'b' => ("0b", format!("{:b}", magnitude)),
        _ => ("", group_leading(&magnitude.to_string(), spec.grouping)),
    };
    let body = match (code, spec.grouping) {
        ('x' | 'X' | 'o' | 'b', Some(sep)) => group_digits(&body, sep, 4),
        _ => body,
    };
    let mut sign = sign_for(n < 0, spec.sign).to_string();
    if spec.alternate {
        sign.push_str(prefix);
    }
    pad(&sign, &body, spec, '>')
}

fn scientific(x: f64, precision: usize, upper: bool) -> String {
    let s = format!("{:.*e}", precision, x);
    let (mantissa, exp) = s.split_once('e').unwrap_or((s.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let e = if upper { 'E' } else { 'e' };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{}{}{}{:02}", mantissa, e, sign, exp.unsigned_abs())
}

fn general(x: f64, precision: usize, alternate: bool, upper: bool) -> String {
    let precision = precision.max(1);
    if x == 0.0 {
        return "0".to_string();
    }
    let probe = format!("{:.*e}", precision - 1, x);
    let exp: i32 = probe
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);
    if exp >= -4 && exp < precision as i32 {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        let fixed = format!("{:.*}", decimals, x);
        if alternate { fixed } else { trim_fraction_zeros(&fixed) }
    } else {
        let sci = scientific(x, precision - 1, upper);
        if alternate {
            return sci;
        }
        match sci.split_once(['e', 'E']) {
            Some((mantissa, _)) => {
                let exp_part = &sci[mantissa.len()..];
                format!("{}{}", trim_fraction_zeros(mantissa), exp_part)
            }
            None => sci,
        }
    }
}

fn format_float(x: f64, code: char, spec: &FormatSpec) -> String {
    let upper = code.is_ascii_uppercase();
    let negative = x.is_sign_negative() && !x.is_nan();
    let magnitude = x.abs();
    let body = if magnitude.is_nan() {
        "nan".to_string()
    } else if magnitude.is_infinite() {
        "inf".to_string()
    } else {
        match code.to_ascii_lowercase() {
            'f' => format!("{:.*}", spec.precision.unwrap_or(6), magnitude),
            '%' => format!("{:.*}%", spec.precision.unwrap_or(6), magnitude * 100.0),
            'e' => scientific(magnitude, spec.precision.unwrap_or(6), upper),
            _ => general(magnitude, spec.precision.unwrap_or(6), spec.alternate, upper),
        }
    };
    let body = if upper { body.to_uppercase() } else { body };
    let body = group_leading(&body, spec.grouping);
    pad(sign_for(negative, spec.sign), &body, spec, '>')
}

fn format_text(text: &str, spec: &FormatSpec) -> String {
    let text: String = match spec.precision {
        Some(p) => text.chars().take(p).collect(),
        None => text.to_string(),
    };
    pad("", &text, spec, '<')
}

fn pad(sign: &str, body: &str, spec: &FormatSpec, default_align: char) -> String {
    let (align, fill) = match spec.align {
        Some(a) => (a, spec.fill),
        None if spec.zero => ('=', '0'),
        None => (default_align, spec.fill),
    };
    let len = sign.chars().count() + body.chars().count();
    if len >= spec.width {
        return format!("{}{}", sign, body);
    }
    let gap = spec.width - len;
    let fill_str = |n: usize| fill.to_string().repeat(n);
    match align {
        '<' => format!("{}{}{}", sign, body, fill_str(gap)),
        '^' => format!("{}{}{}{}", fill_str(gap / 2), sign, body, fill_str(gap - gap / 2)),
        '=' => format!("{}{}{}", sign, fill_str(gap), body),
        _ => format!("{}{}{}", fill_str(gap), sign, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fraction::Fraction;
    use chrono::{NaiveDate, TimeDelta};

    fn plain() -> RenderOptions {
        RenderOptions::default()
    }

    #[test]
    fn test_format_number_rounds_noise_away() {
        assert_eq!(format_number(110.00000000000001, &plain()), "110");
        assert_eq!(format_number(0.1 + 0.2, &plain()), "0.3");
        assert_eq!(format_number(2.5, &plain()), "2.5");
        assert_eq!(format_number(-0.125, &plain()), "-0.125");
    }

    #[test]
    fn test_format_number_scientific() {
        assert_eq!(format_number(1.5e20, &plain()), "1.5e20");
        assert_eq!(format_number(2e-7, &plain()), "2e-7");
        let pretty = RenderOptions {
            pretty_exponents: true,
        };
        assert_eq!(format_number(1.5e20, &pretty), "1.5·10²⁰");
        assert_eq!(format_number(2e-7, &pretty), "2·10⁻⁷");
    }

    #[test]
    fn test_render_variants() {
        let opts = plain();
        assert_eq!(render(&Value::Rational(Fraction::new(3, 4).unwrap()), &opts), "3/4");
        assert_eq!(render(&Value::Bool(true), &opts), "TRUE");
        assert_eq!(render(&Value::Duration(TimeDelta::days(3)), &opts), "3 days");
        assert_eq!(
            render(&Value::Duration(TimeDelta::hours(26)), &opts),
            "1 day, 2:00:00"
        );
        let seq = Value::Sequence(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(render(&seq, &opts), "[1, \"a\"]");
    }

    #[test]
    fn test_apply_format_numbers() {
        let opts = plain();
        assert_eq!(apply_format("{:.2f}", &Value::Real(3.14159), &opts).unwrap(), "3.14");
        assert_eq!(apply_format("{:,}", &Value::Int(1234567), &opts).unwrap(), "1,234,567");
        assert_eq!(apply_format("{:,.2f}", &Value::Real(1234.5), &opts).unwrap(), "1,234.50");
        assert_eq!(apply_format("{:.1%}", &Value::Real(0.256), &opts).unwrap(), "25.6%");
        assert_eq!(apply_format("{:08.3f}", &Value::Real(-3.5), &opts).unwrap(), "-003.500");
        assert_eq!(apply_format("{:.3e}", &Value::Real(123456.0), &opts).unwrap(), "1.235e+05");
        assert_eq!(apply_format("{:g}", &Value::Real(0.00001), &opts).unwrap(), "1e-05");
        assert_eq!(apply_format("{:#x}", &Value::Int(255), &opts).unwrap(), "0xff");
        assert_eq!(apply_format("${:>8.2f}", &Value::Int(5), &opts).unwrap(), "$    5.00");
    }

    #[test]
    fn test_apply_format_text_and_dates() {
        let opts = plain();
        assert_eq!(apply_format("[{:^7}]", &Value::from("ab"), &opts).unwrap(), "[  ab   ]");
        let day = Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(apply_format("{:%d %b %Y}", &day, &opts).unwrap(), "29 Feb 2024");
        assert_eq!(apply_format("{}", &day, &opts).unwrap(), "2024-02-29");
    }

    #[test]
    fn test_apply_format_errors() {
        let opts = plain();
        assert!(apply_format("{:d}", &Value::Real(1.5), &opts).is_err());
        assert!(apply_format("{1}", &Value::Int(1), &opts).is_err());
        assert!(apply_format("{:.2f", &Value::Int(1), &opts).is_err());
        assert!(apply_format("{:.2q}", &Value::Int(1), &opts).is_err());
    }
}
