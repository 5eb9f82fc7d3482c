use crate::command::Flow;
use crate::interpreter::Interpreter;
use anyhow::anyhow;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Editor, Helper};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Line editor helper completing with the interpreter's candidates.
struct ShellHelper {
    interpreter: Rc<RefCell<Interpreter>>,
}

// Candidates replace the word under the cursor. A pipe also ends a word.
fn word_start(line: &str) -> usize {
    line.rfind(|c: char| c.is_whitespace() || c == '|')
        .map(|i| i + 1)
        .unwrap_or(0)
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let prefix = &line[..pos];
        let start = word_start(prefix);
        let candidates = match self.interpreter.try_borrow() {
            Ok(interpreter) => interpreter.complete(prefix).unwrap_or_default(),
            Err(_) => return Ok((start, Vec::new())),
        };

        let pairs = candidates
            .into_iter()
            .map(|candidate| Pair {
                display: candidate.trim().to_string(),
                replacement: candidate,
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for ShellHelper {}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}

/// Interactive read-eval loop around an [`Interpreter`].
pub struct Repl {
    interpreter: Rc<RefCell<Interpreter>>,
    editor: Editor<ShellHelper, DefaultHistory>,
}

impl Repl {
    pub fn new(interpreter: Interpreter) -> anyhow::Result<Self> {
        let interpreter = Rc::new(RefCell::new(interpreter));
        let mut editor: Editor<ShellHelper, DefaultHistory> =
            Editor::new().map_err(|e| anyhow!("failed to init line editor: {e}"))?;
        editor.set_helper(Some(ShellHelper {
            interpreter: interpreter.clone(),
        }));
        Ok(Self { interpreter, editor })
    }

    /// Shared handle to the interpreter driven by this loop.
    pub fn interpreter(&self) -> Rc<RefCell<Interpreter>> {
        self.interpreter.clone()
    }

    /// Read and evaluate lines until a command asks to exit or input ends.
    pub fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let prompt = format!("{}> ", self.interpreter.borrow().prompt());
            let line = match self.editor.readline(&prompt) {
                Ok(line) => line,
                Err(ReadlineError::Eof) => break,
                Err(ReadlineError::Interrupted) => continue,
                Err(e) => return Err(anyhow!("readline error: {e}")),
            };

            if !line.trim().is_empty() {
                self.editor
                    .add_history_entry(line.as_str())
                    .map_err(|e| anyhow!("failed to record history: {e}"))?;
            }

            let result = self.interpreter.borrow_mut().eval(&line);
            match result {
                Ok(Flow::Exit) => break,
                Ok(Flow::Continue(value)) => {
                    if let Some(value) = value {
                        debug!(value = %value, "command returned a value");
                    }
                }
                Err(e) => eprintln!("error: {e}"),
            }
        }
        Ok(())
    }
}
