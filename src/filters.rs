//! Output filters attached to a command with `cmd ... | include <regex>` or
//! `cmd ... | exclude <regex>`.

use crate::error::ShellError;
use crate::lexer::{self, LexingError, Token};
use regex::Regex;
use std::collections::BTreeSet;
use std::io::{Result as IoResult, Write};

/// Which lines a filter lets through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Lines containing a match.
    Include,
    /// Lines without a match.
    Exclude,
}

impl FilterKind {
    const ALL: [FilterKind; 2] = [FilterKind::Include, FilterKind::Exclude];

    pub fn keyword(self) -> &'static str {
        match self {
            FilterKind::Include => "include",
            FilterKind::Exclude => "exclude",
        }
    }

    /// Resolve a possibly abbreviated filter keyword.
    pub fn from_keyword(word: &str) -> Option<Self> {
        if word.is_empty() {
            return None;
        }
        let mut candidates = Self::ALL.into_iter().filter(|kind| kind.keyword().starts_with(word));
        match (candidates.next(), candidates.next()) {
            (Some(kind), None) => Some(kind),
            _ => None,
        }
    }
}

/// A writer that forwards complete lines to a downstream sink when they pass
/// the regex test. Partial writes are buffered until a newline shows up; a
/// trailing unterminated line is never forwarded.
pub struct LineFilter<W: Write> {
    kind: FilterKind,
    regex: Regex,
    sink: W,
    pending: Vec<u8>,
}

impl<W: Write> LineFilter<W> {
    pub fn new(kind: FilterKind, regex: Regex, sink: W) -> Self {
        Self {
            kind,
            regex,
            sink,
            pending: Vec::new(),
        }
    }

    pub fn include(regex: Regex, sink: W) -> Self {
        Self::new(FilterKind::Include, regex, sink)
    }

    pub fn exclude(regex: Regex, sink: W) -> Self {
        Self::new(FilterKind::Exclude, regex, sink)
    }

    /// Give back the downstream sink, dropping any unterminated line.
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn passes(&self, line: &[u8]) -> bool {
        let found = self.regex.is_match(&String::from_utf8_lossy(line));
        match self.kind {
            FilterKind::Include => found,
            FilterKind::Exclude => !found,
        }
    }
}

impl<W: Write> Write for LineFilter<W> {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.pending.extend_from_slice(data);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Ok(data.len());
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        for line in complete.split_inclusive(|b| *b == b'\n') {
            if self.passes(&line[..line.len() - 1]) {
                self.sink.write_all(line)?;
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        self.sink.flush()
    }
}

/// A filter installed as the interpreter's output while a command runs.
///
/// The interpreter hands its sink to the filter and takes it back with
/// [`OutputFilter::into_sink`] once the command is done.
pub trait OutputFilter: Write {
    fn into_sink(self: Box<Self>) -> Box<dyn Write>;
}

impl OutputFilter for LineFilter<Box<dyn Write>> {
    fn into_sink(self: Box<Self>) -> Box<dyn Write> {
        self.into_inner()
    }
}

/// Builds the filters the interpreter wraps around its output.
pub trait FilterFactory {
    fn create_include_filter(&self, regex: Regex, output: Box<dyn Write>) -> Box<dyn OutputFilter>;

    fn create_exclude_filter(&self, regex: Regex, output: Box<dyn Write>) -> Box<dyn OutputFilter>;
}

/// Factory producing [`LineFilter`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexFilterFactory;

impl FilterFactory for RegexFilterFactory {
    fn create_include_filter(&self, regex: Regex, output: Box<dyn Write>) -> Box<dyn OutputFilter> {
        Box::new(LineFilter::include(regex, output))
    }

    fn create_exclude_filter(&self, regex: Regex, output: Box<dyn Write>) -> Box<dyn OutputFilter> {
        Box::new(LineFilter::exclude(regex, output))
    }
}

/// A validated filter directive.
#[derive(Debug, Clone)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub regex: Regex,
}

impl FilterSpec {
    /// Validate the words of the segment after the pipe.
    pub fn parse(words: &[String]) -> Result<Self, ShellError> {
        let (keyword, pattern) = match words {
            [keyword, pattern] => (keyword, pattern),
            [] => return Err(ShellError::Syntax("missing filter after `|`".to_string())),
            [keyword] => {
                return Err(ShellError::Syntax(format!("filter `{}` needs a regex", keyword)));
            }
            [_, _, extra, ..] => {
                return Err(ShellError::Syntax(format!("unexpected `{}` after filter regex", extra)));
            }
        };
        let kind = FilterKind::from_keyword(keyword)
            .ok_or_else(|| ShellError::Syntax(format!("unknown filter `{}`", keyword)))?;
        let regex = Regex::new(pattern)
            .map_err(|e| ShellError::Syntax(format!("invalid filter regex `{}`: {}", pattern, e)))?;
        Ok(Self { kind, regex })
    }

    pub(crate) fn build(self, factory: &dyn FilterFactory, output: Box<dyn Write>) -> Box<dyn OutputFilter> {
        match self.kind {
            FilterKind::Include => factory.create_include_filter(self.regex, output),
            FilterKind::Exclude => factory.create_exclude_filter(self.regex, output),
        }
    }
}

/// A line cut at its unquoted pipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    /// Words before the first pipe.
    pub command: Vec<String>,
    /// Words of every segment after a pipe.
    pub filters: Vec<Vec<String>>,
}

impl Pipeline {
    pub fn split(line: &str) -> Result<Self, LexingError> {
        let mut segments = vec![Vec::new()];
        for token in lexer::split_into_tokens(line)? {
            match token {
                Token::Word(word) => {
                    if let Some(segment) = segments.last_mut() {
                        segment.push(word);
                    }
                }
                Token::PipeOp => segments.push(Vec::new()),
            }
        }
        let command = segments.remove(0);
        Ok(Self {
            command,
            filters: segments,
        })
    }

    pub fn has_pipe(&self) -> bool {
        !self.filters.is_empty()
    }

    /// The single filter directive, validated. `None` when there is no pipe.
    pub fn filter(&self) -> Result<Option<FilterSpec>, ShellError> {
        match self.filters.as_slice() {
            [] => Ok(None),
            [words] => {
                if self.command.is_empty() {
                    return Err(ShellError::Syntax("missing command before `|`".to_string()));
                }
                FilterSpec::parse(words).map(Some)
            }
            _ => Err(ShellError::Syntax("only one filter is allowed".to_string())),
        }
    }
}

/// Candidates for the segment after the last pipe.
pub fn complete_filter(words: &[String]) -> BTreeSet<String> {
    match words {
        [] => BTreeSet::from([" ".to_string()]),
        [word] => FilterKind::ALL
            .into_iter()
            .map(FilterKind::keyword)
            .filter(|keyword| keyword.starts_with(word.as_str()))
            .map(str::to_string)
            .collect(),
        _ => BTreeSet::new(),
    }
}
