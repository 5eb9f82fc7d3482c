//! Keyword command matching for interactive line shells.
//!
//! This crate turns text typed at a prompt into calls to registered commands.
//! A command is a signature of literal keywords and typed parameter slots plus
//! an optional handler. On top of matching, the [`Interpreter`] offers
//! completion candidates and help for incomplete lines, abbreviated parameters,
//! a stack of named contexts deciding which commands are visible, and
//! `| include <regex>` / `| exclude <regex>` output filters.
//!
//! The main entry point is [`Interpreter`]. [`Repl`] drives one interactively
//! with a line editor. Parameter types live in [`types`]; implement
//! [`ParameterType`] for your own.

pub mod command;
pub mod context;
mod error;
pub mod filters;
mod interpreter;
mod io_adapters;
pub mod lexer;
mod repl;
pub mod types;

pub use command::{Command, Completion, Definition, Flow, Handler, Invocation, ParameterType};
pub use context::{Context, DEFAULT_CONTEXT_NAME};
pub use error::{Interrupted, ShellError};
pub use filters::{FilterFactory, FilterKind, LineFilter, OutputFilter, RegexFilterFactory};
/// Just a convenient re-export of the command interpreter.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::{HelpIndex, Interpreter};
pub use io_adapters::CaptureWriter;
pub use lexer::LexingError;
pub use repl::Repl;
pub use types::{BoolType, DynamicOptionsType, IntegerType, OptionsType, OrType, RegexType, StringType};
