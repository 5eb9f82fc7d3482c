//! Built-in parameter types.
//!
//! Each type implements [`ParameterType`] and can be used as a slot in a
//! command signature with [`Definition::param`](crate::Definition::param).

use crate::command::{Completion, ParameterType};
use crate::context::Context;
use regex::Regex;
use std::fmt;

fn complete_from_options<'a>(options: impl IntoIterator<Item = &'a str>, token: &str) -> Vec<Completion> {
    options
        .into_iter()
        .filter(|option| option.starts_with(token))
        .map(|option| Completion::Complete(option.to_string()))
        .collect()
}

fn render_options(f: &mut fmt::Formatter<'_>, name: Option<&str>, options: &[String]) -> fmt::Result {
    if let Some(name) = name {
        f.write_str(name)?;
    }
    write!(f, "<{}>", options.join("|"))
}

/// `true` or `false`.
#[derive(Debug, Clone, Default)]
pub struct BoolType {
    name: Option<String>,
}

impl BoolType {
    const OPTIONS: [&'static str; 2] = ["true", "false"];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()) }
    }
}

impl ParameterType for BoolType {
    fn matches(&self, word: &str, _context: &Context, _partial_line: &[String]) -> bool {
        Self::OPTIONS.contains(&word)
    }

    fn partial_match(&self, word: &str, _context: &Context, _partial_line: &[String]) -> bool {
        Self::OPTIONS.iter().any(|option| option.starts_with(word))
    }

    fn complete(&self, token: &str, _tokens: &[String], _context: &Context) -> Vec<Completion> {
        complete_from_options(Self::OPTIONS, token)
    }
}

impl fmt::Display for BoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => write!(f, "<{}>", Self::OPTIONS.join("|")),
        }
    }
}

/// An integer, optionally bounded. Both bounds are exclusive.
#[derive(Debug, Clone, Default)]
pub struct IntegerType {
    min: Option<i64>,
    max: Option<i64>,
    name: Option<String>,
}

impl IntegerType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn in_range(&self, word: &str) -> bool {
        let Ok(value) = word.parse::<i64>() else {
            return false;
        };
        self.min.is_none_or(|min| value > min) && self.max.is_none_or(|max| value < max)
    }
}

impl ParameterType for IntegerType {
    fn matches(&self, word: &str, _context: &Context, _partial_line: &[String]) -> bool {
        self.in_range(word)
    }

    fn partial_match(&self, word: &str, _context: &Context, _partial_line: &[String]) -> bool {
        self.in_range(word)
    }

    fn complete(&self, _token: &str, _tokens: &[String], _context: &Context) -> Vec<Completion> {
        Vec::new()
    }
}

impl fmt::Display for IntegerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_deref().unwrap_or("IntegerType"))
    }
}

/// Any non-empty word.
#[derive(Debug, Clone, Default)]
pub struct StringType {
    name: Option<String>,
}

impl StringType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()) }
    }
}

impl ParameterType for StringType {
    fn matches(&self, word: &str, _context: &Context, _partial_line: &[String]) -> bool {
        !word.is_empty()
    }

    fn partial_match(&self, word: &str, _context: &Context, _partial_line: &[String]) -> bool {
        !word.is_empty()
    }

    fn complete(&self, _token: &str, _tokens: &[String], _context: &Context) -> Vec<Completion> {
        Vec::new()
    }
}

impl fmt::Display for StringType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_deref().unwrap_or("StringType"))
    }
}

/// A word the regex matches from its first character on.
#[derive(Debug, Clone)]
pub struct RegexType {
    pattern: String,
    regex: Regex,
    name: Option<String>,
}

impl RegexType {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(&format!("^(?:{})", pattern))?,
            name: None,
        })
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl ParameterType for RegexType {
    fn matches(&self, word: &str, _context: &Context, _partial_line: &[String]) -> bool {
        self.regex.is_match(word)
    }

    fn partial_match(&self, word: &str, context: &Context, partial_line: &[String]) -> bool {
        self.matches(word, context, partial_line)
    }

    fn complete(&self, _token: &str, _tokens: &[String], _context: &Context) -> Vec<Completion> {
        Vec::new()
    }
}

impl fmt::Display for RegexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => write!(f, "RegexType({})", self.pattern),
        }
    }
}

/// One of a fixed list of words.
#[derive(Debug, Clone)]
pub struct OptionsType {
    options: Vec<String>,
    name: Option<String>,
}

impl OptionsType {
    pub fn new<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: options.into_iter().map(Into::into).collect(),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl ParameterType for OptionsType {
    fn matches(&self, word: &str, _context: &Context, _partial_line: &[String]) -> bool {
        self.options.iter().any(|option| option == word)
    }

    fn partial_match(&self, word: &str, _context: &Context, _partial_line: &[String]) -> bool {
        self.options.iter().any(|option| option.starts_with(word))
    }

    fn complete(&self, token: &str, _tokens: &[String], _context: &Context) -> Vec<Completion> {
        complete_from_options(self.options.iter().map(String::as_str), token)
    }
}

impl fmt::Display for OptionsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render_options(f, self.name.as_deref(), &self.options)
    }
}

/// Like [`OptionsType`], but the list is fetched on every query.
pub struct DynamicOptionsType {
    options: Box<dyn Fn() -> Vec<String>>,
    name: Option<String>,
}

impl DynamicOptionsType {
    pub fn new(options: impl Fn() -> Vec<String> + 'static) -> Self {
        Self {
            options: Box::new(options),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl ParameterType for DynamicOptionsType {
    fn matches(&self, word: &str, _context: &Context, _partial_line: &[String]) -> bool {
        (self.options)().iter().any(|option| option == word)
    }

    fn partial_match(&self, word: &str, _context: &Context, _partial_line: &[String]) -> bool {
        (self.options)().iter().any(|option| option.starts_with(word))
    }

    fn complete(&self, token: &str, _tokens: &[String], _context: &Context) -> Vec<Completion> {
        let options = (self.options)();
        complete_from_options(options.iter().map(String::as_str), token)
    }
}

impl fmt::Display for DynamicOptionsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render_options(f, self.name.as_deref(), &(self.options)())
    }
}

/// Accepts a word when any of its member types does.
pub struct OrType {
    types: Vec<Box<dyn ParameterType>>,
    name: Option<String>,
}

impl OrType {
    pub fn new(types: Vec<Box<dyn ParameterType>>) -> Self {
        Self { types, name: None }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl ParameterType for OrType {
    fn matches(&self, word: &str, context: &Context, partial_line: &[String]) -> bool {
        self.types.iter().any(|t| t.matches(word, context, partial_line))
    }

    fn partial_match(&self, word: &str, context: &Context, partial_line: &[String]) -> bool {
        self.types.iter().any(|t| t.partial_match(word, context, partial_line))
    }

    fn complete(&self, token: &str, tokens: &[String], context: &Context) -> Vec<Completion> {
        self.types
            .iter()
            .flat_map(|t| t.complete(token, tokens, context))
            .collect()
    }
}

impl fmt::Display for OrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<String> = self.types.iter().map(ToString::to_string).collect();
        match &self.name {
            Some(name) => write!(f, "{}({})", name, members.join("|")),
            None => write!(f, "({})", members.join("|")),
        }
    }
}
