//! Reader and writer for Fortran namelist documents.
//!
//! Covers the subset simulation configurations use in practice: `&group ... /`
//! blocks, `key = v1, v2, ...` assignments, `!` comments, quoted strings,
//! logicals, integers, reals and `n*value` repeat counts. Group names and keys
//! are case-insensitive and stored in lower case. Comments are not preserved
//! when a document is rendered back.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Namelist syntax error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct NamelistError {
    /// 1-based source line.
    pub line: usize,
    /// What went wrong.
    pub message: String,
}

/// Largest accepted `n` in an `n*value` repeat.
pub const MAX_REPEAT: usize = 1 << 16;

fn syntax(line: usize, message: impl Into<String>) -> NamelistError {
    NamelistError {
        line,
        message: message.into(),
    }
}

/// A single namelist value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer.
    Int(i64),
    /// Real, including `d` exponent forms.
    Real(f64),
    /// Logical.
    Bool(bool),
    /// Quoted character string, unescaped.
    Str(String),
}

impl Value {
    /// Integer payload, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Logical payload, if this is a logical.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            // Debug keeps the decimal point on whole numbers ("1.0", not "1").
            Value::Real(v) => write!(f, "{v:?}"),
            Value::Bool(true) => f.write_str(".true."),
            Value::Bool(false) => f.write_str(".false."),
            Value::Str(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

/// One `&name ... /` block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Group {
    name: String,
    entries: Vec<(String, Vec<Value>)>,
}

impl Group {
    /// Empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            entries: Vec::new(),
        }
    }

    /// Group name, lower case.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All values assigned to `key`.
    pub fn get(&self, key: &str) -> Option<&[Value]> {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// First column of `key` (the parent domain for per-domain arrays).
    pub fn first(&self, key: &str) -> Option<&Value> {
        self.get(key)?.first()
    }

    /// Replaces every value of `key`, appending the key if it is new.
    pub fn set(&mut self, key: &str, values: Vec<Value>) {
        let key = key.to_ascii_lowercase();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((key, values)),
        }
    }

    /// Replaces column 0 of `key`, leaving the other columns alone.
    pub fn set_first(&mut self, key: &str, value: Value) {
        let key = key.to_ascii_lowercase();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) if !existing.is_empty() => existing[0] = value,
            Some((_, existing)) => existing.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Assignments in document order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// A parsed namelist document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Namelist {
    groups: Vec<Group>,
}

impl Namelist {
    /// Looks up a group by (case-insensitive) name.
    pub fn group(&self, name: &str) -> Option<&Group> {
        let name = name.to_ascii_lowercase();
        self.groups.iter().find(|g| g.name == name)
    }

    /// Mutable lookup by (case-insensitive) name.
    pub fn group_mut(&mut self, name: &str) -> Option<&mut Group> {
        let name = name.to_ascii_lowercase();
        self.groups.iter_mut().find(|g| g.name == name)
    }

    /// Groups in document order.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Appends a group.
    pub fn push(&mut self, group: Group) {
        self.groups.push(group);
    }
}

impl fmt::Display for Namelist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "&{}", group.name)?;
            let width = group.entries.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            for (key, values) in &group.entries {
                write!(f, " {key:<width$} =")?;
                for value in values {
                    write!(f, " {value},")?;
                }
                writeln!(f)?;
            }
            writeln!(f, "/")?;
        }
        Ok(())
    }
}

impl FromStr for Namelist {
    type Err = NamelistError;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        Parser {
            tokens: tokenize(src)?,
            pos: 0,
        }
        .document()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    GroupStart(String),
    GroupEnd,
    Equals,
    Comma,
    Str(String),
    Word(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::GroupStart(name) => format!("group start &{name}"),
            Token::GroupEnd => "group end".into(),
            Token::Equals => "'='".into(),
            Token::Comma => "','".into(),
            Token::Str(s) => format!("string '{s}'"),
            Token::Word(w) => format!("'{w}'"),
        }
    }
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, ',' | '=' | '/' | '!' | '\'' | '"' | '&' | '$')
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, NamelistError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '!' => {
                while chars.peek().is_some_and(|&c| c != '\n') {
                    chars.next();
                }
            }
            ',' => {
                chars.next();
                tokens.push((line, Token::Comma));
            }
            '=' => {
                chars.next();
                tokens.push((line, Token::Equals));
            }
            '/' => {
                chars.next();
                tokens.push((line, Token::GroupEnd));
            }
            '&' | '$' => {
                chars.next();
                let mut word = String::new();
                while let Some(&c) = chars.peek().filter(|&&c| is_word_char(c)) {
                    word.push(c);
                    chars.next();
                }
                if word.is_empty() {
                    return Err(syntax(line, format!("'{c}' must be followed by a group name")));
                }
                if word.eq_ignore_ascii_case("end") {
                    tokens.push((line, Token::GroupEnd));
                } else {
                    tokens.push((line, Token::GroupStart(word.to_ascii_lowercase())));
                }
            }
            quote @ ('\'' | '"') => {
                let start = line;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => return Err(syntax(start, "unterminated string")),
                        Some(c) if c == quote => {
                            // A doubled quote is an escaped quote.
                            if chars.peek() == Some(&quote) {
                                chars.next();
                                s.push(quote);
                            } else {
                                break;
                            }
                        }
                        Some(c) => {
                            if c == '\n' {
                                line += 1;
                            }
                            s.push(c);
                        }
                    }
                }
                tokens.push((start, Token::Str(s)));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek().filter(|&&c| is_word_char(c)) {
                    word.push(c);
                    chars.next();
                }
                tokens.push((line, Token::Word(word)));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map(|(l, _)| *l).unwrap_or(1)
    }

    fn document(mut self) -> Result<Namelist, NamelistError> {
        let mut doc = Namelist::default();
        while let Some((line, tok)) = self.next() {
            let Token::GroupStart(name) = tok else {
                return Err(syntax(line, format!("expected a group, found {}", tok.describe())));
            };
            let group = self.group(name)?;
            doc.push(group);
        }
        Ok(doc)
    }

    fn group(&mut self, name: String) -> Result<Group, NamelistError> {
        let mut group = Group::new(name);
        loop {
            match self.next() {
                None => {
                    return Err(syntax(
                        self.last_line(),
                        format!("group &{} is not terminated", group.name),
                    ))
                }
                Some((_, Token::GroupEnd)) => return Ok(group),
                Some((_, Token::Comma)) => {}
                Some((line, Token::Word(key))) => {
                    match self.next() {
                        Some((_, Token::Equals)) => {}
                        _ => return Err(syntax(line, format!("expected '=' after {key}"))),
                    }
                    let values = self.values()?;
                    group.set(&key, values);
                }
                Some((line, tok)) => {
                    return Err(syntax(line, format!("unexpected {}", tok.describe())))
                }
            }
        }
    }

    fn values(&mut self) -> Result<Vec<Value>, NamelistError> {
        let mut values = Vec::new();
        loop {
            match (self.peek(0), self.peek(1)) {
                (None, _) | (Some(Token::GroupEnd), _) => break,
                // `key =` starts the next assignment.
                (Some(Token::Word(_)), Some(Token::Equals)) => break,
                (Some(Token::Comma), _) => {
                    self.next();
                }
                (Some(Token::Str(_)), _) => {
                    if let Some((_, Token::Str(s))) = self.next() {
                        values.push(Value::Str(s));
                    }
                }
                (Some(Token::Word(_)), _) => {
                    let Some((line, Token::Word(word))) = self.next() else {
                        break;
                    };
                    self.literal(line, &word, &mut values)?;
                }
                (Some(tok), _) => {
                    let line = self.tokens[self.pos].0;
                    return Err(syntax(line, format!("unexpected {}", tok.describe())));
                }
            }
        }
        if values.is_empty() {
            let line = self
                .tokens
                .get(self.pos.saturating_sub(1))
                .map(|(l, _)| *l)
                .unwrap_or(1);
            return Err(syntax(line, "assignment has no value"));
        }
        Ok(values)
    }

    fn literal(&mut self, line: usize, word: &str, out: &mut Vec<Value>) -> Result<(), NamelistError> {
        let Some((count, rest)) = word.split_once('*') else {
            out.push(parse_scalar(word).ok_or_else(|| syntax(line, format!("unrecognized value '{word}'")))?);
            return Ok(());
        };
        let count: usize = count
            .parse()
            .map_err(|_| syntax(line, format!("bad repeat count in '{word}'")))?;
        if count > MAX_REPEAT {
            return Err(syntax(line, format!("repeat count {count} exceeds the limit of {MAX_REPEAT}")));
        }
        let value = if rest.is_empty() {
            // `n*'text'`: the repeated value is the following string token.
            match self.next() {
                Some((_, Token::Str(s))) => Value::Str(s),
                _ => return Err(syntax(line, format!("null values are not supported ('{word}')"))),
            }
        } else {
            parse_scalar(rest).ok_or_else(|| syntax(line, format!("unrecognized value '{rest}'")))?
        };
        out.extend(std::iter::repeat(value).take(count));
        Ok(())
    }
}

fn parse_scalar(word: &str) -> Option<Value> {
    let lower = word.to_ascii_lowercase();
    match lower.as_str() {
        ".true." | ".t." | "t" | "true" => return Some(Value::Bool(true)),
        ".false." | ".f." | "f" | "false" => return Some(Value::Bool(false)),
        _ => {}
    }
    if let Ok(v) = lower.parse::<i64>() {
        return Some(Value::Int(v));
    }
    lower.replace('d', "e").parse::<f64>().ok().map(Value::Real)
}
