use crate::context::Context;
use crate::interpreter::Interpreter;
use std::fmt;

/// What an evaluation asks the read-eval loop to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Keep going. Carries the handler's result value, if any.
    Continue(Option<String>),
    /// Stop the read-eval loop (end of program).
    Exit,
}

impl Flow {
    /// Continue without a result value.
    pub fn done() -> Self {
        Flow::Continue(None)
    }

    /// Continue with a result value.
    pub fn value(value: impl Into<String>) -> Self {
        Flow::Continue(Some(value.into()))
    }
}

/// A completion candidate produced by a [`ParameterType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Untagged candidate. Rendered like a finished value after trimming.
    Plain(String),
    /// A finished value; the cursor moves on to the next word.
    Complete(String),
    /// A longer prefix that still needs typing.
    Partial(String),
}

impl Completion {
    pub fn text(&self) -> &str {
        match self {
            Completion::Plain(text) | Completion::Complete(text) | Completion::Partial(text) => text,
        }
    }

    fn render(&self) -> String {
        match self {
            Completion::Plain(text) => format!("{} ", text.trim()),
            Completion::Complete(text) => format!("{} ", text),
            Completion::Partial(text) => text.clone(),
        }
    }
}

/// Capability every typed parameter slot implements.
///
/// `partial_line` is the whole token list being evaluated and `context` is the
/// active context, so types can make decisions based on either. `Display` gives
/// the slot's form in a command signature.
pub trait ParameterType: fmt::Display {
    /// Exact acceptance of a finished word.
    fn matches(&self, word: &str, context: &Context, partial_line: &[String]) -> bool;

    /// Whether `word` could still grow into an accepted value.
    fn partial_match(&self, word: &str, context: &Context, partial_line: &[String]) -> bool;

    /// Candidates for `token`. `tokens` is the full line being completed.
    fn complete(&self, token: &str, tokens: &[String], context: &Context) -> Vec<Completion>;
}

/// One positional slot of a command signature.
pub enum Definition {
    Literal(String),
    Parameter(Box<dyn ParameterType>),
}

impl Definition {
    pub fn param(parameter: impl ParameterType + 'static) -> Self {
        Definition::Parameter(Box::new(parameter))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Definition::Literal(_))
    }

    fn partial_match(&self, word: &str, context: &Context, partial_line: &[String]) -> bool {
        match self {
            Definition::Literal(name) => name.starts_with(word),
            Definition::Parameter(parameter) => parameter.partial_match(word, context, partial_line),
        }
    }
}

impl From<&str> for Definition {
    fn from(name: &str) -> Self {
        Definition::Literal(name.to_string())
    }
}

impl From<String> for Definition {
    fn from(name: String) -> Self {
        Definition::Literal(name)
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Definition::Literal(name) => f.write_str(name),
            Definition::Parameter(parameter) => write!(f, "{}", parameter),
        }
    }
}

/// Arguments handed to a command handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Tokens in parameter slots, in signature order.
    pub params: Vec<String>,
    /// The whole normalized line.
    pub tokens: Vec<String>,
    pub cmd_id: Option<String>,
}

impl Invocation {
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

/// Code run when a command matches.
///
/// Handlers get a back-reference to the interpreter so they can push or pop
/// contexts and write to its output. Returning [`Interrupted`](crate::Interrupted)
/// cancels the evaluation silently.
pub type Handler = Box<dyn Fn(&mut Interpreter, &Invocation) -> anyhow::Result<Flow>>;

/// A command signature plus what to do when a line matches it.
///
/// Built once when registering, never mutated afterwards:
/// ```
/// use keyword_shell::{Command, Definition, Flow, OptionsType};
/// let cmd = Command::new(vec!["show".into(), Definition::param(OptionsType::new(["ip", "arp"]))])
///     .help("show a table")
///     .handler(|_, inv| Ok(Flow::value(inv.params.join(","))));
/// assert_eq!(cmd.to_string(), "show <ip|arp>");
/// ```
pub struct Command {
    definitions: Vec<Definition>,
    handler: Option<Handler>,
    help: Option<String>,
    context_name: Option<String>,
    always: bool,
    cmd_id: Option<String>,
}

impl Command {
    pub fn new(definitions: Vec<Definition>) -> Self {
        Self {
            definitions,
            handler: None,
            help: None,
            context_name: None,
            always: false,
            cmd_id: None,
        }
    }

    /// A command made only of literal keywords.
    pub fn keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            keywords
                .into_iter()
                .map(|k| Definition::Literal(k.into()))
                .collect(),
        )
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Interpreter, &Invocation) -> anyhow::Result<Flow> + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Bind the command to a context name; it is only visible inside it.
    pub fn context(mut self, context_name: impl Into<String>) -> Self {
        self.context_name = Some(context_name.into());
        self
    }

    /// Make the command visible in every context.
    pub fn always(mut self) -> Self {
        self.always = true;
        self
    }

    pub fn id(mut self, cmd_id: impl Into<String>) -> Self {
        self.cmd_id = Some(cmd_id.into());
        self
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    pub fn help_text(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn context_name(&self) -> Option<&str> {
        self.context_name.as_deref()
    }

    pub fn is_always(&self) -> bool {
        self.always
    }

    pub fn cmd_id(&self) -> Option<&str> {
        self.cmd_id.as_deref()
    }

    pub(crate) fn execute(
        &self,
        interpreter: &mut Interpreter,
        invocation: &Invocation,
    ) -> anyhow::Result<Flow> {
        match &self.handler {
            Some(handler) => handler(interpreter, invocation),
            None => Ok(Flow::done()),
        }
    }

    /// Whether the command is visible in `context`.
    pub fn context_match(&self, context: &Context) -> bool {
        if self.always {
            return true;
        }
        match &self.context_name {
            Some(_) if context.is_default() => false,
            None => context.is_default(),
            Some(name) => context.has_name(name),
        }
    }

    /// Canonical form of `tokens`: literal text for keywords and unique
    /// completions substituted for abbreviated parameters.
    pub fn normalize_tokens(&self, tokens: &[String], context: &Context) -> Vec<String> {
        tokens
            .iter()
            .enumerate()
            .map(|(index, word)| match self.definitions.get(index) {
                Some(Definition::Literal(name)) => name.clone(),
                Some(Definition::Parameter(parameter)) => {
                    expand_parameter(parameter.as_ref(), word, tokens, context)
                }
                None => word.clone(),
            })
            .collect()
    }

    /// Exact match: visible, same length, every word accepted.
    pub fn matches(&self, tokens: &[String], context: &Context) -> bool {
        self.context_match(context)
            && tokens.len() == self.definitions.len()
            && tokens
                .iter()
                .enumerate()
                .all(|(index, word)| self.match_word(index, word, context, tokens))
    }

    /// Whether `tokens` is a viable beginning of this command. Only the last
    /// word may be incomplete. Visibility is the caller's business.
    pub fn partial_match(&self, tokens: &[String], context: &Context) -> bool {
        if tokens.len() > self.definitions.len() {
            return false;
        }

        let last = tokens.len().saturating_sub(1);
        tokens.iter().enumerate().all(|(index, word)| {
            if index == last {
                self.definitions[index].partial_match(word, context, tokens)
            } else {
                self.match_word(index, word, context, tokens)
            }
        })
    }

    /// A match where nothing is left to expand.
    pub fn perfect_match(&self, tokens: &[String], context: &Context) -> bool {
        self.matches(tokens, context) && self.normalize_tokens(tokens, context) == tokens
    }

    /// The tokens in parameter slots, in signature order.
    pub fn matching_parameters(&self, tokens: &[String]) -> Vec<String> {
        tokens
            .iter()
            .zip(&self.definitions)
            .filter(|(_, definition)| !definition.is_literal())
            .map(|(token, _)| token.clone())
            .collect()
    }

    /// Candidates for the last word of `tokens` (or the first word when empty).
    ///
    /// Finished candidates end with a space to move on to the next slot, unless
    /// the slot is the last one of the signature.
    pub fn complete(&self, tokens: &[String], context: &Context) -> Vec<String> {
        let (index, token) = match tokens.last() {
            Some(last) => (tokens.len() - 1, last.as_str()),
            None => (0, ""),
        };
        let Some(definition) = self.definitions.get(index) else {
            return Vec::new();
        };

        let raw = match definition {
            Definition::Literal(name) => self.complete_literal(name, token, tokens, context),
            Definition::Parameter(parameter) => parameter.complete(token, tokens, context),
        };

        let is_last_slot = index + 1 == self.definitions.len();
        raw.iter()
            .map(Completion::render)
            .map(|candidate| {
                if is_last_slot {
                    candidate.trim_end().to_string()
                } else {
                    candidate
                }
            })
            .collect()
    }

    fn complete_literal(
        &self,
        name: &str,
        token: &str,
        tokens: &[String],
        context: &Context,
    ) -> Vec<Completion> {
        if name == token {
            if self.matches(tokens, context) {
                Vec::new()
            } else {
                vec![Completion::Complete(name.to_string())]
            }
        } else if name.starts_with(token) {
            vec![Completion::Complete(name.to_string())]
        } else {
            Vec::new()
        }
    }

    fn match_word(&self, index: usize, word: &str, context: &Context, partial_line: &[String]) -> bool {
        match &self.definitions[index] {
            Definition::Literal(name) => word == name,
            Definition::Parameter(parameter) => {
                let word = expand_parameter(parameter.as_ref(), word, partial_line, context);
                parameter.matches(&word, context, partial_line)
            }
        }
    }
}

// A word expands only when the type offers exactly one candidate for it.
fn expand_parameter(
    parameter: &dyn ParameterType,
    word: &str,
    tokens: &[String],
    context: &Context,
) -> String {
    match parameter.complete(word, tokens, context).as_slice() {
        [only] => only.text().trim().to_string(),
        _ => word.to_string(),
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signature: Vec<String> = self.definitions.iter().map(ToString::to_string).collect();
        f.write_str(&signature.join(" "))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("signature", &self.to_string())
            .field("help", &self.help)
            .field("context_name", &self.context_name)
            .field("always", &self.always)
            .field("cmd_id", &self.cmd_id)
            .finish_non_exhaustive()
    }
}
