//! Excel number format codes applied to numeric cell values.
//!
//! Handles the codes test data tends to carry: General, fixed and optional
//! decimals, thousands separators, percentages, scientific notation,
//! currency and quoted literals, and date, time, and elapsed-time patterns.
//! Fractions and conditional sections (`[>100]`) render as General.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

/// Renders a number with at most 15 significant digits, like Excel's
/// General format. Whole numbers have no decimal point.
#[must_use]
pub fn general(value: f64) -> String {
    let rounded: f64 = format!("{value:.14e}").parse().unwrap_or(value);
    if rounded == 0.0 {
        return "0".to_string();
    }
    rounded.to_string()
}

/// Formats `value` with an Excel number format code.
#[must_use]
pub fn format(value: f64, code: &str) -> String {
    if code.trim().is_empty() {
        return general(value);
    }

    let sections = split_sections(code);
    let (section, shown, signed) = pick_section(&sections, value);
    if section.is_empty() {
        // An explicitly empty section hides the value.
        return String::new();
    }

    let Some(tokens) = tokenize(section) else {
        return general(value);
    };

    if tokens.iter().any(Token::is_date_part) {
        return serial_to_datetime(shown)
            .map_or_else(|| general(value), |dt| render_date(&tokens, shown, dt));
    }
    render_number(&tokens, shown, signed).unwrap_or_else(|| general(value))
}

/// Splits a format code on `;` outside quotes and escapes.
fn split_sections(code: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in code.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                sections.push(&code[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    sections.push(&code[start..]);
    sections
}

/// Chooses the positive, negative, or zero section. The returned flag is
/// `true` when a negative value must still print its own minus sign.
fn pick_section<'a>(sections: &[&'a str], value: f64) -> (&'a str, f64, bool) {
    match sections {
        [_, negative, ..] if value < 0.0 => (negative, value.abs(), false),
        [_, _, zero, ..] if value == 0.0 => (zero, value, false),
        [first, ..] => (first, value, true),
        [] => ("", value, true),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Digit(char),
    Point,
    Comma,
    Percent,
    Exponent { plus: bool },
    /// `y`, `m`, `d`, `h`, or `s` repeated `n` times.
    DatePart(char, usize),
    /// `[h]`, `[mm]`, `[ss]`.
    Elapsed(char, usize),
    /// `AM/PM` or `A/P` as written.
    AmPm(String),
    Text,
}

impl Token {
    const fn is_date_part(&self) -> bool {
        matches!(self, Self::DatePart(..) | Self::Elapsed(..) | Self::AmPm(_))
    }
}

/// Lexes one section, or `None` for codes rendered as General.
fn tokenize(section: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = section.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '"' => {
                let literal: String = chars[i..].iter().take_while(|&&ch| ch != '"').collect();
                i += literal.chars().count() + 1;
                tokens.push(Token::Literal(literal));
            }
            '\\' => {
                if let Some(&next) = chars.get(i) {
                    tokens.push(Token::Literal(next.to_string()));
                    i += 1;
                }
            }
            '_' => {
                // Padding the width of the next character.
                i += 1;
                tokens.push(Token::Literal(" ".to_string()));
            }
            '*' => i += 1,
            '[' => {
                let content: String = chars[i..].iter().take_while(|&&ch| ch != ']').collect();
                i += content.chars().count() + 1;
                tokens.extend(bracket_token(&content)?);
            }
            '0' | '#' | '?' => tokens.push(Token::Digit(c)),
            '.' => tokens.push(Token::Point),
            ',' => tokens.push(Token::Comma),
            '%' => tokens.push(Token::Percent),
            '@' => tokens.push(Token::Text),
            'E' | 'e' if matches!(chars.get(i), Some('+' | '-')) => {
                tokens.push(Token::Exponent {
                    plus: chars[i] == '+',
                });
                i += 1;
            }
            'y' | 'Y' | 'm' | 'M' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' => {
                let lower = c.to_ascii_lowercase();
                let mut run = 1;
                while chars.get(i).is_some_and(|ch| ch.to_ascii_lowercase() == lower) {
                    run += 1;
                    i += 1;
                }
                tokens.push(Token::DatePart(lower, run));
            }
            'A' | 'a' => {
                let long: String = chars[i - 1..].iter().take(5).collect();
                let short: String = chars[i - 1..].iter().take(3).collect();
                if long.eq_ignore_ascii_case("am/pm") {
                    tokens.push(Token::AmPm(long));
                    i += 4;
                } else if short.eq_ignore_ascii_case("a/p") {
                    tokens.push(Token::AmPm(short));
                    i += 2;
                } else {
                    tokens.push(Token::Literal(c.to_string()));
                }
            }
            'G' | 'g' => {
                let rest: String = chars[i - 1..].iter().take(7).collect();
                if rest.eq_ignore_ascii_case("general") {
                    return None;
                }
                tokens.push(Token::Literal(c.to_string()));
            }
            _ => tokens.push(Token::Literal(c.to_string())),
        }
    }

    let has_digits = tokens.iter().any(|t| matches!(t, Token::Digit(_)));
    let is_date = tokens.iter().any(Token::is_date_part);
    let is_fraction = tokens.iter().any(|t| *t == Token::Literal("/".to_string()));
    if !is_date && ((is_fraction && has_digits) || (!has_digits && tokens.contains(&Token::Text))) {
        return None;
    }
    Some(tokens)
}

/// Interprets `[...]`: elapsed time, a currency symbol, or a color to drop.
fn bracket_token(content: &str) -> Option<Option<Token>> {
    let lower = content.to_ascii_lowercase();
    let mut letters = lower.chars();
    if let Some(first @ ('h' | 'm' | 's')) = letters.next() {
        if letters.all(|c| c == first) {
            return Some(Some(Token::Elapsed(first, lower.len())));
        }
    }
    if let Some(currency) = content.strip_prefix('$') {
        let symbol = currency.split('-').next().unwrap_or_default();
        return Some(Some(Token::Literal(symbol.to_string())));
    }
    if content.starts_with(['<', '>', '=']) {
        return None;
    }
    Some(None)
}

/// Layout of the digit placeholders in a numeric section.
#[derive(Debug, Default)]
struct NumberLayout {
    prefix: String,
    suffix: String,
    int_zeros: usize,
    decimals: usize,
    decimal_zeros: usize,
    thousands: bool,
    scale: i32,
    percent: i32,
    exponent: Option<(bool, usize)>,
}

impl NumberLayout {
    fn from_tokens(tokens: &[Token]) -> Self {
        let mut layout = Self::default();
        let mut seen_digit = false;
        let mut in_fraction = false;

        for (i, token) in tokens.iter().enumerate() {
            match token {
                Token::Digit(c) => {
                    if let Some((_, digits)) = layout.exponent.as_mut() {
                        *digits += 1;
                    } else if in_fraction {
                        layout.decimals += 1;
                        if *c == '0' {
                            layout.decimal_zeros += 1;
                        }
                    } else if *c == '0' {
                        layout.int_zeros += 1;
                    }
                    seen_digit = true;
                }
                Token::Point if layout.exponent.is_none() => {
                    in_fraction = true;
                    seen_digit = true;
                }
                Token::Comma if seen_digit => {
                    if matches!(tokens.get(i + 1), Some(Token::Digit(_))) && !in_fraction {
                        layout.thousands = true;
                    } else {
                        layout.scale += 1;
                    }
                }
                Token::Percent => {
                    layout.percent += 1;
                    layout.push_literal("%", seen_digit);
                }
                Token::Exponent { plus } => layout.exponent = Some((*plus, 0)),
                Token::Literal(s) => layout.push_literal(s, seen_digit),
                Token::Point => layout.push_literal(".", seen_digit),
                Token::Comma => layout.push_literal(",", seen_digit),
                _ => {}
            }
        }
        layout
    }

    fn push_literal(&mut self, s: &str, after_digits: bool) {
        if after_digits {
            self.suffix.push_str(s);
        } else {
            self.prefix.push_str(s);
        }
    }
}

fn render_number(tokens: &[Token], value: f64, signed: bool) -> Option<String> {
    let layout = NumberLayout::from_tokens(tokens);
    if !tokens.iter().any(|t| matches!(t, Token::Digit(_))) {
        return Some(format!("{}{}", layout.prefix, layout.suffix));
    }

    let scaled = value.abs() * 100_f64.powi(layout.percent) / 1000_f64.powi(layout.scale);
    let body = match layout.exponent {
        Some((plus, digits)) => scientific(scaled, layout.decimals, plus, digits)?,
        None => fixed(scaled, &layout),
    };

    let negative = signed && value < 0.0 && body.chars().any(|c| matches!(c, '1'..='9'));
    let sign = if negative { "-" } else { "" };
    Some(format!("{sign}{}{body}{}", layout.prefix, layout.suffix))
}

fn fixed(value: f64, layout: &NumberLayout) -> String {
    let decimals = layout.decimals;
    let text = format!("{value:.decimals$}");
    let (int_part, frac_part) = text.split_once('.').unwrap_or((&text, ""));

    let int_part = int_part.trim_start_matches('0');
    let width = layout.int_zeros;
    let mut digits = format!("{int_part:0>width$}");
    if layout.thousands {
        digits = group_thousands(&digits);
    }

    if decimals == 0 {
        return digits;
    }
    let mut frac = frac_part.to_string();
    while frac.len() > layout.decimal_zeros && frac.ends_with('0') {
        frac.pop();
    }
    format!("{digits}.{frac}")
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn scientific(value: f64, decimals: usize, plus: bool, exp_digits: usize) -> Option<String> {
    let text = format!("{value:.decimals$e}");
    let (mantissa, exponent) = text.split_once('e')?;
    let exponent: i32 = exponent.parse().ok()?;
    let sign = if exponent < 0 {
        "-"
    } else if plus {
        "+"
    } else {
        ""
    };
    let width = exp_digits.max(1);
    Some(format!("{mantissa}E{sign}{:0>width$}", exponent.unsigned_abs()))
}

/// Converts a 1900-system serial to a timestamp rounded to the second.
#[allow(clippy::cast_possible_truncation)] // bounded by the range check
fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !(0.0..2_958_466.0).contains(&serial) {
        return None;
    }
    // Serial 60 is the nonexistent 1900-02-29, so earlier days shift by one.
    let epoch = if serial < 60.0 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    let seconds = (serial * 86_400.0).round() as i64;
    epoch
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::seconds(seconds))
}

/// Which `m` runs mean minutes: those after an hour or before a second.
fn minute_positions(tokens: &[Token]) -> Vec<bool> {
    let parts: Vec<(usize, &Token)> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| matches!(t, Token::DatePart(..) | Token::Elapsed(..)))
        .collect();

    let mut minutes = vec![false; tokens.len()];
    for (p, &(index, token)) in parts.iter().enumerate() {
        if !matches!(token, Token::DatePart('m', _)) {
            continue;
        }
        let after_hour = p > 0
            && matches!(parts[p - 1].1, Token::DatePart('h', _) | Token::Elapsed('h', _));
        let before_second = parts
            .get(p + 1)
            .is_some_and(|(_, t)| matches!(t, Token::DatePart('s', _) | Token::Elapsed('s', _)));
        minutes[index] = after_hour || before_second;
    }
    minutes
}

#[allow(clippy::cast_possible_truncation)] // elapsed units of an in-range serial fit in i64
fn render_date(tokens: &[Token], serial: f64, dt: NaiveDateTime) -> String {
    let minutes = minute_positions(tokens);
    let twelve_hour = tokens.iter().any(|t| matches!(t, Token::AmPm(_)));
    let mut out = String::new();

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Literal(s) => out.push_str(s),
            Token::DatePart('y', n) if *n <= 2 => out.push_str(&format!("{:02}", dt.year() % 100)),
            Token::DatePart('y', _) => out.push_str(&format!("{:04}", dt.year())),
            Token::DatePart('m', n) if minutes[i] => out.push_str(&pad(dt.minute(), *n)),
            Token::DatePart('m', n) => out.push_str(&match n {
                1 | 2 => pad(dt.month(), *n),
                3 => dt.format("%b").to_string(),
                4 => dt.format("%B").to_string(),
                _ => dt.format("%B").to_string().chars().take(1).collect(),
            }),
            Token::DatePart('d', n) => out.push_str(&match n {
                1 | 2 => pad(dt.day(), *n),
                3 => dt.format("%a").to_string(),
                _ => dt.format("%A").to_string(),
            }),
            Token::DatePart('h', n) => {
                let hour = if twelve_hour {
                    (dt.hour() + 11) % 12 + 1
                } else {
                    dt.hour()
                };
                out.push_str(&pad(hour, *n));
            }
            Token::DatePart('s', n) => out.push_str(&pad(dt.second(), *n)),
            Token::Elapsed(unit, n) => {
                let per_day = match unit {
                    'h' => 24.0,
                    'm' => 1_440.0,
                    _ => 86_400.0,
                };
                let total = (serial * per_day + 1e-9).floor() as i64;
                out.push_str(&format!("{total:0>n$}", n = *n));
            }
            Token::AmPm(written) => {
                let pm = dt.hour() >= 12;
                let text = match (written.len(), pm) {
                    (5, false) => "AM",
                    (5, true) => "PM",
                    (_, false) => "A",
                    (_, true) => "P",
                };
                if written.starts_with(char::is_lowercase) {
                    out.push_str(&text.to_ascii_lowercase());
                } else {
                    out.push_str(text);
                }
            }
            Token::Digit(c) => out.push(*c),
            Token::Point => out.push('.'),
            Token::Comma => out.push(','),
            Token::Percent => out.push('%'),
            Token::Exponent { .. } | Token::Text | Token::DatePart(..) => {}
        }
    }
    out
}

fn pad(value: u32, width: usize) -> String {
    if width >= 2 {
        format!("{value:02}")
    } else {
        value.to_string()
    }
}
