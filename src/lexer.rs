//! Lexical analysis of a command line into words and pipe operators.
//!
//! Quoting follows the usual shell rules: single quotes keep everything
//! literally, double quotes keep everything except `\"` and `\\`, and a
//! backslash outside quotes escapes the next character. A line that ends in
//! an unquoted blank gets an extra empty word, which is how completion knows
//! the user has started a new word.

use thiserror::Error;

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word with quotes and escapes already removed.
    Word(String),
    /// An unquoted, unescaped pipe operator, `|`.
    PipeOp,
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexingError {
    /// A closing quote (single or double) was not found.
    #[error("unfinished quote")]
    UnfinishedQuote,
    /// The line ended right after a backslash.
    #[error("no character to escape at end of line")]
    UnfinishedEscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
    // Set once a quote opened the word, so `''` still yields an empty word.
    in_word: bool,
    ended_with_blank: bool,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
            in_word: false,
            ended_with_blank: false,
        }
    }

    fn make_tokens(&mut self) -> Result<Vec<Token>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            self.ended_with_blank = false;
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out)?,
                LexingState::ReadingWord => self.handle_word(ch, &mut out)?,
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote | LexingState::ReadingDoubleQuote => {
                return Err(LexingError::UnfinishedQuote);
            }
            _ => {}
        }

        self.finish_word(&mut out);

        if self.ended_with_blank && !out.is_empty() {
            out.push(Token::Word(String::new()));
        }

        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn read_escaped(&mut self) -> Result<char, LexingError> {
        self.read_char().ok_or(LexingError::UnfinishedEscape)
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), LexingError> {
        match ch {
            c if c.is_whitespace() => self.ended_with_blank = true,
            '|' => out.push(Token::PipeOp),
            '\'' => {
                self.in_word = true;
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.in_word = true;
                self.state = LexingState::ReadingDoubleQuote;
            }
            '\\' => {
                let escaped = self.read_escaped()?;
                self.buffer.push(escaped);
                self.in_word = true;
                self.state = LexingState::ReadingWord;
            }
            c => {
                self.buffer.push(c);
                self.in_word = true;
                self.state = LexingState::ReadingWord;
            }
        }
        Ok(())
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), LexingError> {
        match ch {
            c if c.is_whitespace() => {
                self.finish_word(out);
                self.ended_with_blank = true;
                self.state = LexingState::Start;
            }
            '|' => {
                self.finish_word(out);
                out.push(Token::PipeOp);
                self.state = LexingState::Start;
            }
            '\'' => self.state = LexingState::ReadingSingleQuote,
            '"' => self.state = LexingState::ReadingDoubleQuote,
            '\\' => {
                let escaped = self.read_escaped()?;
                self.buffer.push(escaped);
            }
            c => self.buffer.push(c),
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<(), LexingError> {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '\\' => match self.read_escaped() {
                Ok(c @ ('"' | '\\')) => self.buffer.push(c),
                Ok(c) => {
                    self.buffer.push('\\');
                    self.buffer.push(c);
                }
                // The quote itself is missing, report that instead.
                Err(_) => return Err(LexingError::UnfinishedQuote),
            },
            c => self.buffer.push(c),
        }
        Ok(())
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        if self.in_word {
            out.push(Token::Word(std::mem::take(&mut self.buffer)));
            self.in_word = false;
        }
    }
}

/// Splits a line into words and pipe operators.
///
/// An empty or blank line yields no tokens. Otherwise, when the line ends in an
/// unquoted blank, an empty [`Token::Word`] is appended.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, LexingError> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_tokens()
}

/// Splits a line into plain words, the token form commands are matched against.
///
/// Pipe operators are kept as `|` words; the interpreter splits filter segments
/// off before calling into command matching.
pub fn parse(line: &str) -> Result<Vec<String>, LexingError> {
    Ok(split_into_tokens(line)?
        .into_iter()
        .map(|token| match token {
            Token::Word(word) => word,
            Token::PipeOp => "|".to_string(),
        })
        .collect())
}
