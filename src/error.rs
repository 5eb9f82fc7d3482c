use crate::command::Command;
use crate::lexer::LexingError;
use std::rc::Rc;
use thiserror::Error;

/// Errors surfaced by [`Interpreter`](crate::Interpreter) operations.
#[derive(Debug, Error)]
pub enum ShellError {
    /// No visible command matched a fully-specified line. Carries the line.
    #[error("no matching command found for `{0}`")]
    NoMatchingCommand(String),
    /// More than one visible command matched. Carries every matching command.
    #[error("ambiguous command, candidates: {}", render_candidates(.0))]
    AmbiguousCommand(Vec<Rc<Command>>),
    /// Only the default context is left on the stack.
    #[error("no context to pop")]
    NoContextToPop,
    /// Malformed filter pipe.
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error(transparent)]
    Lexing(#[from] LexingError),
    /// The handler failed with something other than an interrupt.
    #[error("command failed: {0}")]
    Handler(#[source] anyhow::Error),
}

fn render_candidates(commands: &[Rc<Command>]) -> String {
    commands
        .iter()
        .map(|c| format!("`{}`", c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Marker error a handler returns when the user interrupted it (e.g. Ctrl-C).
///
/// [`Interpreter::eval`](crate::Interpreter::eval) swallows it for that single
/// evaluation; anything the handler did before returning stays done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted")]
pub struct Interrupted;
