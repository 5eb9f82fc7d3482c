use crate::command::{Command, Flow, Invocation};
use crate::context::Context;
use crate::error::{Interrupted, ShellError};
use crate::filters::{FilterFactory, FilterSpec, OutputFilter, Pipeline, RegexFilterFactory, complete_filter};
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Help text of a set of commands, sorted by signature.
///
/// Commands without help are present with `None`, which is different from a
/// command missing from the index.
#[derive(Debug, Clone, Default)]
pub struct HelpIndex {
    entries: Vec<(Rc<Command>, Option<String>)>,
}

impl HelpIndex {
    fn from_commands<'a>(commands: impl IntoIterator<Item = &'a Rc<Command>>) -> Self {
        let mut entries: Vec<(Rc<Command>, Option<String>)> = commands
            .into_iter()
            .map(|command| (command.clone(), command.help_text().map(str::to_string)))
            .collect();
        entries.sort_by_cached_key(|(command, _)| command.to_string());
        Self { entries }
    }

    /// `Some(help)` when the command is in the index, `None` otherwise.
    pub fn get(&self, command: &Rc<Command>) -> Option<Option<&str>> {
        self.entries
            .iter()
            .find(|(c, _)| Rc::ptr_eq(c, command))
            .map(|(_, help)| help.as_deref())
    }

    pub fn contains(&self, command: &Rc<Command>) -> bool {
        self.get(command).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Rc<Command>, Option<&str>)> {
        self.entries.iter().map(|(c, help)| (c, help.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Resolved {
    command: Rc<Command>,
    tokens: Vec<String>,
    filter: Option<FilterSpec>,
}

/// Command registry plus context stack: turns lines into command invocations
/// and incomplete lines into completion candidates.
///
/// Not meant to be shared between threads; callers serialize access.
///
/// Example
/// ```
/// use keyword_shell::{Command, Flow, Interpreter};
/// let mut sh = Interpreter::default();
/// sh.add_command(Command::keywords(["sys", "reboot"]).handler(|_, _| Ok(Flow::value("rebooting"))));
/// sh.add_command(Command::keywords(["net", "show"]));
///
/// assert_eq!(sh.eval("sys reboot").unwrap(), Flow::value("rebooting"));
/// assert!(sh.complete("").unwrap().contains("sys "));
/// assert!(sh.complete("sys r").unwrap().contains("reboot"));
/// ```
pub struct Interpreter {
    commands: Vec<Rc<Command>>,
    contexts: Vec<Context>,
    output: Box<dyn Write>,
    filter: Option<Box<dyn OutputFilter>>,
    filter_factory: Box<dyn FilterFactory>,
}

impl Interpreter {
    /// Create an interpreter whose default context uses `prompt`
    /// (or `"Default"` when empty). Output goes to stdout.
    pub fn new(prompt: &str) -> Self {
        Self {
            commands: Vec::new(),
            contexts: vec![Context::default_context(Some(prompt))],
            output: Box::new(io::stdout()),
            filter: None,
            filter_factory: Box::new(RegexFilterFactory),
        }
    }

    /// Replace the output sink handlers write to.
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Replace the factory building `| include` / `| exclude` filters.
    pub fn with_filter_factory(mut self, factory: impl FilterFactory + 'static) -> Self {
        self.filter_factory = Box::new(factory);
        self
    }

    /// Register a command. Duplicates are only detected when a line matches
    /// more than one command.
    pub fn add_command(&mut self, command: Command) -> Rc<Command> {
        let command = Rc::new(command);
        self.commands.push(command.clone());
        command
    }

    pub fn commands(&self) -> &[Rc<Command>] {
        &self.commands
    }

    pub fn push_context(&mut self, name: &str, prompt: Option<&str>) {
        debug!(context = name, depth = self.contexts.len() + 1, "push context");
        self.contexts.push(Context::new(name, prompt));
    }

    /// Drop the active context. The default context is never removed.
    pub fn pop_context(&mut self) -> Result<Context, ShellError> {
        let top = self.contexts.len() - 1;
        if top == 0 {
            return Err(ShellError::NoContextToPop);
        }
        let popped = self.contexts.remove(top);
        debug!(context = popped.name(), depth = self.contexts.len(), "pop context");
        Ok(popped)
    }

    /// The active (top of stack) context.
    pub fn context(&self) -> &Context {
        // The stack always holds the default context.
        &self.contexts[self.contexts.len() - 1]
    }

    pub fn context_mut(&mut self) -> &mut Context {
        let top = self.contexts.len() - 1;
        &mut self.contexts[top]
    }

    pub fn context_depth(&self) -> usize {
        self.contexts.len()
    }

    pub fn prompt(&self) -> &str {
        &self.context().prompt
    }

    /// Change the prompt of the active context only.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.context_mut().prompt = prompt.into();
    }

    /// Where handlers write their output; a filter while one is installed.
    pub fn output(&mut self) -> &mut dyn Write {
        match &mut self.filter {
            Some(filter) => filter as &mut dyn Write,
            None => &mut self.output,
        }
    }

    /// Commands visible in the active context.
    pub fn active_commands(&self) -> Vec<Rc<Command>> {
        let context = self.context();
        self.commands
            .iter()
            .filter(|command| command.context_match(context))
            .cloned()
            .collect()
    }

    /// Evaluate one line and run the matching command.
    ///
    /// An empty line does nothing. A handler returning [`Interrupted`] is
    /// cancelled silently.
    pub fn eval(&mut self, line: &str) -> Result<Flow, ShellError> {
        let Some(Resolved { command, tokens, filter }) = self.resolve(line)? else {
            return Ok(Flow::done());
        };

        let tokens = command.normalize_tokens(&tokens, self.context());
        let invocation = Invocation {
            params: command.matching_parameters(&tokens),
            tokens,
            cmd_id: command.cmd_id().map(str::to_string),
        };
        debug!(command = %command, params = ?invocation.params, "executing command");

        let result = match filter {
            Some(spec) => self.execute_filtered(&command, &invocation, spec)?,
            None => command.execute(self, &invocation),
        };

        match result {
            Ok(flow) => Ok(flow),
            Err(e) if e.is::<Interrupted>() => {
                debug!(command = %command, "command interrupted");
                Ok(Flow::done())
            }
            Err(e) => Err(ShellError::Handler(e)),
        }
    }

    /// Evaluate lines in order; context changes carry over from line to line.
    ///
    /// Stops at the first error, or after the first line asking to exit.
    pub fn eval_multiple<I, S>(&mut self, lines: I) -> Result<Vec<Flow>, ShellError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut results = Vec::new();
        for line in lines {
            let flow = self.eval(line.as_ref())?;
            let exit = flow == Flow::Exit;
            results.push(flow);
            if exit {
                break;
            }
        }
        Ok(results)
    }

    /// Resolve a line like [`eval`](Self::eval) without running anything and
    /// return the command's id.
    pub fn parse(&self, line: &str) -> Result<Option<String>, ShellError> {
        Ok(self
            .resolve(line)?
            .and_then(|resolved| resolved.command.cmd_id().map(str::to_string)))
    }

    /// Help for the visible commands `line` could still turn into.
    pub fn help(&self, line: &str) -> Result<HelpIndex, ShellError> {
        let pipeline = Pipeline::split(line)?;
        Ok(HelpIndex::from_commands(&self.partial_matches(&pipeline.command)))
    }

    /// Help for every registered command, visible or not.
    pub fn all_commands_help(&self) -> HelpIndex {
        HelpIndex::from_commands(&self.commands)
    }

    /// Completion candidates for an incomplete line.
    pub fn complete(&self, line: &str) -> Result<BTreeSet<String>, ShellError> {
        let pipeline = Pipeline::split(line)?;
        match pipeline.filters.as_slice() {
            [] => {}
            [filter] => return Ok(complete_filter(filter)),
            _ => return Ok(BTreeSet::new()),
        }

        let tokens = pipeline.command;
        let context = self.context();
        let completions: BTreeSet<String> = self
            .partial_matches(&tokens)
            .iter()
            .flat_map(|command| command.complete(&tokens, context))
            .collect();
        trace!(line, candidates = completions.len(), "completed line");
        Ok(completions)
    }

    fn partial_matches(&self, tokens: &[String]) -> Vec<Rc<Command>> {
        let context = self.context();
        self.active_commands()
            .into_iter()
            .filter(|command| command.partial_match(tokens, context))
            .collect()
    }

    fn resolve(&self, line: &str) -> Result<Option<Resolved>, ShellError> {
        let line = line.trim_start();
        if line.trim_end().is_empty() {
            return Ok(None);
        }

        let mut pipeline = Pipeline::split(line)?;
        // A trailing blank only matters to completion.
        if line.ends_with(char::is_whitespace) {
            let last = match pipeline.filters.last_mut() {
                Some(filter) => filter,
                None => &mut pipeline.command,
            };
            if last.last().is_some_and(String::is_empty) {
                last.pop();
            }
        }

        let filter = pipeline.filter()?;
        if pipeline.command.is_empty() {
            return Ok(None);
        }

        let command = self.matching_command(&pipeline.command, line.trim_end())?;
        Ok(Some(Resolved {
            command,
            tokens: pipeline.command,
            filter,
        }))
    }

    fn matching_command(&self, tokens: &[String], line: &str) -> Result<Rc<Command>, ShellError> {
        let context = self.context();
        let mut matching: Vec<Rc<Command>> = self
            .commands
            .iter()
            .filter(|command| command.matches(tokens, context))
            .cloned()
            .collect();

        match matching.len() {
            0 => {
                debug!(line, "no matching command");
                Err(ShellError::NoMatchingCommand(line.to_string()))
            }
            1 => Ok(matching.remove(0)),
            n => {
                debug!(line, candidates = n, "ambiguous command");
                Err(ShellError::AmbiguousCommand(matching))
            }
        }
    }

    // The sink goes into the filter for the duration of the command and comes
    // back whatever the handler returns.
    fn execute_filtered(
        &mut self,
        command: &Command,
        invocation: &Invocation,
        spec: FilterSpec,
    ) -> Result<anyhow::Result<Flow>, ShellError> {
        if self.filter.is_some() {
            return Err(ShellError::Syntax("filters cannot be nested".to_string()));
        }

        debug!(kind = ?spec.kind, regex = spec.regex.as_str(), "installing output filter");
        let sink = std::mem::replace(&mut self.output, Box::new(io::sink()));
        self.filter = Some(spec.build(self.filter_factory.as_ref(), sink));

        let result = command.execute(self, invocation);

        if let Some(mut filter) = self.filter.take() {
            if let Err(e) = filter.flush() {
                warn!(error = %e, "failed to flush output filter");
            }
            self.output = filter.into_sink();
        }
        Ok(result)
    }
}

impl Default for Interpreter {
    /// An interpreter with the `"Default"` prompt writing to stdout.
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Completion, Definition, ParameterType};
    use crate::filters::{FilterKind, LineFilter};
    use crate::io_adapters::CaptureWriter;
    use crate::types::{OptionsType, RegexType, StringType};
    use regex::Regex;
    use std::cell::RefCell;
    use std::fmt;

    type Calls = Rc<RefCell<Vec<Invocation>>>;

    fn record(
        calls: &Calls,
    ) -> impl Fn(&mut Interpreter, &Invocation) -> anyhow::Result<Flow> + 'static {
        let calls = calls.clone();
        move |_: &mut Interpreter, inv: &Invocation| {
            calls.borrow_mut().push(inv.clone());
            Ok(Flow::done())
        }
    }

    fn toks(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn invocation(params: &[&str], tokens: &[&str], cmd_id: Option<&str>) -> Invocation {
        Invocation {
            params: toks(params),
            tokens: toks(tokens),
            cmd_id: cmd_id.map(str::to_string),
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn interpreter(calls: &Calls) -> Interpreter {
        let mut sh = Interpreter::default();
        sh.add_command(Command::keywords(["cmd", "key"]).handler(record(calls)).id("id1"));
        sh.add_command(
            Command::new(vec![
                "cmd_with_parameters".into(),
                Definition::param(StringType::new()),
                Definition::param(StringType::new()),
            ])
            .handler(record(calls))
            .id("id2"),
        );
        sh.add_command(
            Command::new(vec!["cmd_with_ops".into(), Definition::param(OptionsType::new(["op1", "op2"]))])
                .handler(record(calls))
                .id("id3"),
        );
        sh.add_command(
            Command::new(vec![
                "cmd_with_regex".into(),
                Definition::param(RegexType::new("^start.*").unwrap()),
            ])
            .handler(record(calls))
            .id("id4"),
        );
        sh
    }

    #[test]
    fn test_executes_command_when_all_keywords_match() {
        let calls = Calls::default();
        let mut sh = interpreter(&calls);

        assert_eq!(sh.eval("cmd key").unwrap(), Flow::done());
        assert_eq!(*calls.borrow(), vec![invocation(&[], &["cmd", "key"], Some("id1"))]);
    }

    #[test]
    fn test_empty_line_returns_nothing() {
        let calls = Calls::default();
        let mut sh = interpreter(&calls);

        assert_eq!(sh.eval("").unwrap(), Flow::done());
        assert_eq!(sh.eval("   ").unwrap(), Flow::done());
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_trailing_blank_still_matches() {
        let calls = Calls::default();
        let mut sh = interpreter(&calls);

        sh.eval(" cmd key ").unwrap();
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_no_matching_command_carries_line() {
        let calls = Calls::default();
        let mut sh = interpreter(&calls);

        match sh.eval("unknown command") {
            Err(ShellError::NoMatchingCommand(line)) => assert_eq!(line, "unknown command"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_abbreviated_keywords_do_not_execute() {
        let calls = Calls::default();
        let mut sh = interpreter(&calls);

        assert!(matches!(sh.eval("cm ke"), Err(ShellError::NoMatchingCommand(_))));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_ambiguous_command_carries_both_commands() {
        let calls = Calls::default();
        let mut sh = interpreter(&calls);
        let cmd1 = sh.add_command(Command::keywords(["duplicate_cmd"]).handler(record(&calls)));
        let cmd2 = sh.add_command(Command::keywords(["duplicate_cmd"]).handler(record(&calls)));

        match sh.eval("duplicate_cmd") {
            Err(ShellError::AmbiguousCommand(commands)) => {
                assert_eq!(commands.len(), 2);
                assert!(Rc::ptr_eq(&commands[0], &cmd1));
                assert!(Rc::ptr_eq(&commands[1], &cmd2));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_string_parameters_are_passed() {
        let calls = Calls::default();
        let mut sh = interpreter(&calls);

        sh.eval("cmd_with_parameters param1 param2").unwrap();
        sh.eval(r#"cmd_with_parameters param1 "param with spaces""#).unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![
                invocation(
                    &["param1", "param2"],
                    &["cmd_with_parameters", "param1", "param2"],
                    Some("id2")
                ),
                invocation(
                    &["param1", "param with spaces"],
                    &["cmd_with_parameters", "param1", "param with spaces"],
                    Some("id2")
                ),
            ]
        );
    }

    #[test]
    fn test_options_parameters() {
        let calls = Calls::default();
        let mut sh = interpreter(&calls);

        sh.eval("cmd_with_ops op1").unwrap();
        assert_eq!(calls.borrow()[0], invocation(&["op1"], &["cmd_with_ops", "op1"], Some("id3")));
        assert!(matches!(sh.eval("cmd_with_ops invalid_op"), Err(ShellError::NoMatchingCommand(_))));
    }

    #[test]
    fn test_regex_parameters() {
        let calls = Calls::default();
        let mut sh = interpreter(&calls);

        sh.eval("cmd_with_regex start_whatever").unwrap();
        assert_eq!(
            calls.borrow()[0],
            invocation(&["start_whatever"], &["cmd_with_regex", "start_whatever"], Some("id4"))
        );
        assert!(matches!(
            sh.eval("cmd_with_regex not_matching_parameter"),
            Err(ShellError::NoMatchingCommand(_))
        ));
    }

    #[test]
    fn test_autoexpands_unique_parameter_completions() {
        let calls = Calls::default();
        let mut sh = interpreter(&calls);
        sh.add_command(
            Command::new(vec![
                "cmd1".into(),
                Definition::param(OptionsType::new(["firstOp", "secondOp"])),
                Definition::param(OptionsType::new(["firstOp", "secondOp"])),
            ])
            .handler(record(&calls)),
        );

        sh.eval("cmd1 first second").unwrap();

        assert_eq!(
            calls.borrow()[0],
            invocation(&["firstOp", "secondOp"], &["cmd1", "firstOp", "secondOp"], None)
        );
    }

    #[test]
    fn test_shared_prefix_is_not_expanded() {
        let calls = Calls::default();
        let mut sh = interpreter(&calls);
        sh.add_command(
            Command::new(vec!["pick".into(), Definition::param(OptionsType::new(["opA", "opB"]))])
                .handler(record(&calls)),
        );

        assert!(matches!(sh.eval("pick op"), Err(ShellError::NoMatchingCommand(_))));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_no_handler_is_a_noop() {
        let mut sh = Interpreter::default();
        sh.add_command(Command::keywords(["noop"]));
        assert_eq!(sh.eval("noop").unwrap(), Flow::done());
    }

    #[test]
    fn test_handler_errors_are_surfaced() {
        let mut sh = Interpreter::default();
        sh.add_command(Command::keywords(["fail"]).handler(|_, _| Err(anyhow::anyhow!("boom"))));

        match sh.eval("fail") {
            Err(ShellError::Handler(e)) => assert_eq!(e.to_string(), "boom"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_interrupt_stops_the_command_silently() {
        let steps = Rc::new(RefCell::new(Vec::new()));
        let recorded = steps.clone();
        let mut sh = Interpreter::default();
        sh.add_command(Command::keywords(["cmd", "ctrl+c"]).handler(move |_, _| {
            recorded.borrow_mut().push("cmd1");
            Err(Interrupted.into())
        }));

        assert_eq!(sh.eval("cmd ctrl+c").unwrap(), Flow::done());
        assert_eq!(*steps.borrow(), vec!["cmd1"]);
    }

    #[test]
    fn test_interrupt_does_not_stop_following_lines() {
        let mut sh = Interpreter::default();
        sh.add_command(Command::keywords(["stop"]).handler(|_, _| Err(Interrupted.into())));
        sh.add_command(Command::keywords(["go"]).handler(|_, _| Ok(Flow::value("ran"))));

        let results = sh.eval_multiple(["stop", "go"]).unwrap();

        assert_eq!(results, vec![Flow::done(), Flow::value("ran")]);
    }

    #[test]
    fn test_exit_is_a_flow_not_an_error() {
        let mut sh = Interpreter::default();
        sh.add_command(Command::keywords(["exit"]).handler(|_, _| Ok(Flow::Exit)));
        assert_eq!(sh.eval("exit").unwrap(), Flow::Exit);
    }

    #[test]
    fn test_eval_multiple_runs_each_line() {
        let calls = Calls::default();
        let mut sh = interpreter(&calls);
        sh.add_command(Command::keywords(["answer"]).handler(|_, _| Ok(Flow::value("a_result"))));

        let results = sh.eval_multiple(["answer", "cmd_with_parameters s1 s2"]).unwrap();

        assert_eq!(results, vec![Flow::value("a_result"), Flow::done()]);
        assert_eq!(
            calls.borrow()[0],
            invocation(&["s1", "s2"], &["cmd_with_parameters", "s1", "s2"], Some("id2"))
        );
    }

    #[test]
    fn test_eval_multiple_keeps_context_changes_and_stops_at_exit() {
        let calls = Calls::default();
        let mut sh = Interpreter::default();
        sh.add_command(Command::keywords(["enter"]).handler(|sh, _| {
            sh.push_context("c1", None);
            Ok(Flow::done())
        }));
        sh.add_command(Command::keywords(["inside"]).context("c1").handler(record(&calls)));
        sh.add_command(Command::keywords(["quit"]).always().handler(|_, _| Ok(Flow::Exit)));

        let results = sh.eval_multiple(["enter", "inside", "quit", "inside"]).unwrap();

        assert_eq!(results, vec![Flow::done(), Flow::done(), Flow::Exit]);
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_parse_returns_command_id_without_executing() {
        let calls = Calls::default();
        let mut sh = Interpreter::default();
        sh.add_command(Command::keywords(["cmd", "key1"]).handler(record(&calls)).id("id1"));
        sh.add_command(Command::keywords(["cmd", "key2"]).handler(record(&calls)).id("id2"));
        sh.add_command(Command::keywords(["anon"]));

        assert_eq!(sh.parse("cmd key1").unwrap().as_deref(), Some("id1"));
        assert_eq!(sh.parse("cmd key2").unwrap().as_deref(), Some("id2"));
        assert_eq!(sh.parse(" cmd key1 ").unwrap().as_deref(), Some("id1"));
        assert_eq!(sh.parse("").unwrap(), None);
        assert_eq!(sh.parse("anon").unwrap(), None);
        assert!(matches!(sh.parse("unknown command"), Err(ShellError::NoMatchingCommand(_))));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_lexing_errors_are_surfaced() {
        let mut sh = Interpreter::default();
        sh.add_command(Command::keywords(["cmd"]));
        assert!(matches!(sh.eval("cmd 'open"), Err(ShellError::Lexing(_))));
        assert!(matches!(sh.complete("cmd \"open"), Err(ShellError::Lexing(_))));
    }

    #[test]
    fn test_prompt_management() {
        let mut sh = Interpreter::default();
        assert_eq!(sh.prompt(), "Default");

        sh.set_prompt("default");
        assert_eq!(sh.prompt(), "default");

        sh.push_context("context1", Some("prompt_context1"));
        assert_eq!(sh.prompt(), "prompt_context1");

        sh.push_context("context2", Some("prompt_context2"));
        assert_eq!(sh.prompt(), "prompt_context2");

        sh.pop_context().unwrap();
        assert_eq!(sh.prompt(), "prompt_context1");

        sh.pop_context().unwrap();
        assert_eq!(sh.prompt(), "default");
    }

    #[test]
    fn test_push_pop_restores_stack() {
        let mut sh = Interpreter::new("irrelevant_prompt");
        let before = sh.context().clone();

        for i in 0..3 {
            sh.push_context(&format!("c{}", i), None);
        }
        assert_eq!(sh.context_depth(), 4);
        for _ in 0..3 {
            sh.pop_context().unwrap();
        }

        assert_eq!(sh.context_depth(), 1);
        assert_eq!(*sh.context(), before);
        assert!(matches!(sh.pop_context(), Err(ShellError::NoContextToPop)));
        assert_eq!(sh.context_depth(), 1);
    }

    struct ContextFixture {
        sh: Interpreter,
        main_exit: Calls,
        context_calls: Calls,
        always_present: Calls,
    }

    fn context_fixture() -> ContextFixture {
        let main_exit = Calls::default();
        let context_calls = Calls::default();
        let always_present = Calls::default();
        let mut sh = Interpreter::new("irrelevant_prompt");
        sh.add_command(Command::keywords(["exit"]).handler(record(&main_exit)));
        sh.add_command(Command::keywords(["always_present"]).always().handler(record(&always_present)));
        sh.add_command(Command::keywords(["cmd1"]).context("context1").handler(record(&context_calls)));
        sh.add_command(Command::keywords(["cmd2"]).context("context1").handler(record(&context_calls)));
        sh.add_command(Command::keywords(["exit"]).context("context1").handler(record(&context_calls)));
        ContextFixture {
            sh,
            main_exit,
            context_calls,
            always_present,
        }
    }

    #[test]
    fn test_context_commands_are_hidden_outside_their_context() {
        let mut f = context_fixture();

        assert!(matches!(f.sh.eval("cmd1"), Err(ShellError::NoMatchingCommand(_))));
        assert!(matches!(f.sh.eval("cmd2"), Err(ShellError::NoMatchingCommand(_))));
        f.sh.eval("exit").unwrap();

        assert!(f.context_calls.borrow().is_empty());
        assert_eq!(f.main_exit.borrow().len(), 1);
    }

    #[test]
    fn test_context_commands_replace_default_ones_inside_context() {
        let mut f = context_fixture();
        f.sh.push_context("context1", None);

        f.sh.eval("cmd1").unwrap();
        f.sh.eval("cmd2").unwrap();
        f.sh.eval("exit").unwrap();
        f.sh.eval("always_present").unwrap();

        assert_eq!(f.context_calls.borrow().len(), 3);
        assert!(f.main_exit.borrow().is_empty());
        assert_eq!(f.always_present.borrow().len(), 1);
        assert!(f.sh.context().has_name("context1"));
        assert_eq!(f.sh.prompt(), "context1");
    }

    #[test]
    fn test_context_data_and_stacking() {
        let mut f = context_fixture();
        assert_eq!(f.sh.prompt(), "irrelevant_prompt");

        f.sh.push_context("context1", None);
        f.sh.context_mut().set("key1", "data1");
        f.sh.context_mut().set("key2", "data2");
        assert_eq!(f.sh.context().get("key1"), Some("data1"));
        assert_eq!(f.sh.context().data.len(), 2);

        f.sh.push_context("context2", Some("prompt1"));
        assert_eq!(f.sh.context().name(), "context2");
        assert_eq!(f.sh.prompt(), "prompt1");
        assert!(f.sh.context().data.is_empty());

        f.sh.pop_context().unwrap();
        assert_eq!(f.sh.context().name(), "context1");
        assert_eq!(f.sh.context().get("key2"), Some("data2"));
    }

    #[test]
    fn test_active_commands_follow_context() {
        let mut f = context_fixture();
        let names = |sh: &Interpreter| -> Vec<String> {
            sh.active_commands().iter().map(|c| c.to_string()).collect()
        };

        assert_eq!(names(&f.sh), toks(&["exit", "always_present"]));
        f.sh.push_context("context1", None);
        assert_eq!(names(&f.sh), toks(&["always_present", "cmd1", "cmd2", "exit"]));
    }

    /// Records what the interpreter hands to a parameter type.
    struct RecordingType {
        seen: Rc<RefCell<Vec<(&'static str, String, String, Vec<String>)>>>,
    }

    impl fmt::Display for RecordingType {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("recording")
        }
    }

    impl ParameterType for RecordingType {
        fn matches(&self, word: &str, context: &Context, partial_line: &[String]) -> bool {
            self.seen
                .borrow_mut()
                .push(("match", word.to_string(), context.name().to_string(), partial_line.to_vec()));
            true
        }

        fn partial_match(&self, word: &str, context: &Context, partial_line: &[String]) -> bool {
            self.seen
                .borrow_mut()
                .push(("partial_match", word.to_string(), context.name().to_string(), partial_line.to_vec()));
            true
        }

        fn complete(&self, token: &str, tokens: &[String], context: &Context) -> Vec<Completion> {
            self.seen
                .borrow_mut()
                .push(("complete", token.to_string(), context.name().to_string(), tokens.to_vec()));
            Vec::new()
        }
    }

    #[test]
    fn test_types_receive_active_context_and_line() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let calls = Calls::default();
        let mut sh = Interpreter::new("irrelevant_prompt");
        sh.add_command(
            Command::new(vec![Definition::param(RecordingType { seen: seen.clone() })])
                .context("context1")
                .handler(record(&calls)),
        );
        sh.push_context("context1", Some("prompt1"));

        sh.complete("test").unwrap();
        let expected = ("partial_match", "test".to_string(), "context1".to_string(), toks(&["test"]));
        assert!(seen.borrow().contains(&expected));
        let expected = ("complete", "test".to_string(), "context1".to_string(), toks(&["test"]));
        assert!(seen.borrow().contains(&expected));

        seen.borrow_mut().clear();
        sh.eval("test").unwrap();
        let expected = ("match", "test".to_string(), "context1".to_string(), toks(&["test"]));
        assert!(seen.borrow().contains(&expected));
        assert_eq!(calls.borrow().len(), 1);
    }

    fn completion_fixture() -> Interpreter {
        let mut sh = Interpreter::default();
        sh.add_command(Command::keywords(["sys", "reboot"]));
        sh.add_command(Command::keywords(["sys", "shutdown"]));
        sh.add_command(Command::keywords(["net", "show", "configuration"]));
        sh
    }

    #[test]
    fn test_completes_empty_line_with_initial_keywords() {
        let sh = completion_fixture();
        assert_eq!(sh.complete("").unwrap(), set(&["sys ", "net "]));
    }

    #[test]
    fn test_completes_keywords() {
        let sh = completion_fixture();
        assert_eq!(sh.complete("sy").unwrap(), set(&["sys "]));
        assert_eq!(sh.complete("sys").unwrap(), set(&["sys "]));
        assert_eq!(sh.complete("sys ").unwrap(), set(&["reboot", "shutdown"]));
        assert_eq!(sh.complete("sys r").unwrap(), set(&["reboot"]));
    }

    #[test]
    fn test_does_not_complete_matched_or_unknown_commands() {
        let mut sh = completion_fixture();
        assert!(sh.complete("sys reboot").unwrap().is_empty());
        assert!(sh.complete("sys reboot ").unwrap().is_empty());
        assert!(sh.complete("unknown command").unwrap().is_empty());

        sh.eval("sys reboot").unwrap();
        sh.eval("sys reboot ").unwrap();
    }

    #[test]
    fn test_completes_parameters() {
        let mut sh = completion_fixture();
        sh.add_command(Command::new(vec![
            "cmd".into(),
            Definition::param(OptionsType::new(["op1", "op2"])),
            "last".into(),
        ]));
        sh.add_command(Command::new(vec!["opt".into(), Definition::param(OptionsType::new(["op1", "op2"]))]));
        sh.add_command(Command::new(vec!["str".into(), Definition::param(StringType::new())]));

        assert_eq!(sh.complete("cmd o").unwrap(), set(&["op1 ", "op2 "]));
        assert_eq!(sh.complete("cmd op1 ").unwrap(), set(&["last"]));
        assert_eq!(sh.complete("opt o").unwrap(), set(&["op1", "op2"]));
        assert!(sh.complete("str ").unwrap().is_empty());
    }

    #[test]
    fn test_fully_matched_line_offers_no_keyword() {
        let mut sh = Interpreter::default();
        sh.add_command(Command::new(vec![
            "show".into(),
            Definition::param(OptionsType::new(["ip", "arp"])),
            "detail".into(),
        ]));

        assert_eq!(sh.parse("show i detail").unwrap(), None);
        assert!(sh.complete("show i detail").unwrap().is_empty());
        assert!(sh.complete("show ip detail").unwrap().is_empty());
        assert_eq!(sh.complete("show i").unwrap(), set(&["ip "]));
        assert_eq!(sh.complete("show ip det").unwrap(), set(&["detail"]));
    }

    #[test]
    fn test_completion_respects_context() {
        let mut f = context_fixture();
        assert_eq!(f.sh.complete("").unwrap(), set(&["exit", "always_present"]));

        f.sh.push_context("context1", None);
        assert_eq!(f.sh.complete("c").unwrap(), set(&["cmd1", "cmd2"]));
    }

    #[test]
    fn test_completes_filters() {
        let sh = completion_fixture();
        assert_eq!(sh.complete("net show configuration |").unwrap(), set(&[" "]));
        assert_eq!(sh.complete("net show configuration | ").unwrap(), set(&["include", "exclude"]));
        assert_eq!(sh.complete("net show configuration | inclu").unwrap(), set(&["include"]));
        assert_eq!(sh.complete("net show configuration | exclu").unwrap(), set(&["exclude"]));
        assert!(sh.complete("net show configuration | include x").unwrap().is_empty());
    }

    struct HelpFixture {
        sh: Interpreter,
        cmd1: Rc<Command>,
        cmd2: Rc<Command>,
        cmd_no_help: Rc<Command>,
        cmd_context: Rc<Command>,
    }

    fn help_fixture() -> HelpFixture {
        let mut sh = Interpreter::default();
        let cmd1 = sh.add_command(Command::keywords(["cmd", "key1"]).help("help_cmd1").always());
        let cmd2 = sh.add_command(Command::keywords(["cmd", "normal"]).help("help_normal"));
        let cmd_no_help = sh.add_command(Command::new(vec![
            "description".into(),
            Definition::param(StringType::new()),
        ]));
        let cmd_context = sh.add_command(
            Command::keywords(["cmd", "key2"])
                .context("irrelevant_context")
                .help("help_cmd_context"),
        );
        HelpFixture {
            sh,
            cmd1,
            cmd2,
            cmd_no_help,
            cmd_context,
        }
    }

    #[test]
    fn test_help_for_empty_line_lists_visible_commands() {
        let f = help_fixture();
        let help = f.sh.help("").unwrap();

        assert_eq!(help.len(), 3);
        assert_eq!(help.get(&f.cmd1), Some(Some("help_cmd1")));
        assert_eq!(help.get(&f.cmd2), Some(Some("help_normal")));
        assert_eq!(help.get(&f.cmd_no_help), Some(None));
        assert!(!help.contains(&f.cmd_context));
    }

    #[test]
    fn test_help_inside_context() {
        let mut f = help_fixture();
        f.sh.push_context("irrelevant_context", None);
        let help = f.sh.help("").unwrap();

        assert_eq!(help.get(&f.cmd_context), Some(Some("help_cmd_context")));
        assert_eq!(help.get(&f.cmd1), Some(Some("help_cmd1")));
        assert!(!help.contains(&f.cmd2));
        assert!(!help.contains(&f.cmd_no_help));
    }

    #[test]
    fn test_help_for_partial_command() {
        let f = help_fixture();
        let help = f.sh.help("cmd ").unwrap();

        assert!(help.contains(&f.cmd1));
        assert!(help.contains(&f.cmd2));
        assert!(!help.contains(&f.cmd_no_help));
        assert!(!help.contains(&f.cmd_context));
    }

    #[test]
    fn test_help_for_all_commands_ignores_context() {
        let f = help_fixture();
        let help = f.sh.all_commands_help();

        assert_eq!(help.len(), 4);
        assert_eq!(help.get(&f.cmd_context), Some(Some("help_cmd_context")));
        assert_eq!(help.get(&f.cmd_no_help), Some(None));
        let order: Vec<String> = help.iter().map(|(c, _)| c.to_string()).collect();
        assert_eq!(
            order,
            toks(&["cmd key1", "cmd key2", "cmd normal", "description StringType"])
        );
    }

    type FilterCalls = Rc<RefCell<Vec<(FilterKind, String)>>>;

    /// Builds real line filters and records what it was asked for.
    struct SpyFactory {
        calls: FilterCalls,
    }

    impl FilterFactory for SpyFactory {
        fn create_include_filter(&self, regex: Regex, output: Box<dyn Write>) -> Box<dyn OutputFilter> {
            self.calls.borrow_mut().push((FilterKind::Include, regex.as_str().to_string()));
            Box::new(LineFilter::include(regex, output))
        }

        fn create_exclude_filter(&self, regex: Regex, output: Box<dyn Write>) -> Box<dyn OutputFilter> {
            self.calls.borrow_mut().push((FilterKind::Exclude, regex.as_str().to_string()));
            Box::new(LineFilter::exclude(regex, output))
        }
    }

    fn filtered_fixture() -> (Interpreter, Calls, FilterCalls, CaptureWriter) {
        let calls = Calls::default();
        let filter_calls = FilterCalls::default();
        let out = CaptureWriter::new();
        let mut sh = Interpreter::default()
            .with_output(out.clone())
            .with_filter_factory(SpyFactory {
                calls: filter_calls.clone(),
            });
        sh.add_command(Command::keywords(["cmd", "key"]).handler(record(&calls)));
        sh.add_command(Command::keywords(["show"]).handler(|sh, _| {
            write!(sh.output(), "alpha\nbeta\nalphabet\n")?;
            Ok(Flow::done())
        }));
        (sh, calls, filter_calls, out)
    }

    #[test]
    fn test_malformed_filters_are_syntax_errors_before_execution() {
        let (mut sh, calls, filter_calls, _) = filtered_fixture();

        for line in [
            "cmd key | include regexp | exclude regexp",
            "cmd key | include",
            "cmd key | unknown_filter regexp",
            "cmd key |",
            "| include regexp",
        ] {
            assert!(matches!(sh.eval(line), Err(ShellError::Syntax(_))), "{}", line);
        }
        assert!(calls.borrow().is_empty());
        assert!(filter_calls.borrow().is_empty());
    }

    #[test]
    fn test_executes_command_connected_to_filters() {
        let (mut sh, calls, filter_calls, _) = filtered_fixture();

        sh.eval("cmd key | include regexp").unwrap();
        sh.eval("cmd key | inc regexp").unwrap();
        sh.eval("cmd key | exclude regexp").unwrap();
        sh.eval("cmd key | exc regexp").unwrap();

        assert_eq!(calls.borrow().len(), 4);
        assert!(calls.borrow().iter().all(|inv| inv.tokens == toks(&["cmd", "key"])));
        assert_eq!(
            *filter_calls.borrow(),
            vec![
                (FilterKind::Include, "regexp".to_string()),
                (FilterKind::Include, "regexp".to_string()),
                (FilterKind::Exclude, "regexp".to_string()),
                (FilterKind::Exclude, "regexp".to_string()),
            ]
        );
    }

    #[test]
    fn test_filter_applies_to_output_and_sink_is_restored() {
        let (mut sh, _, _, out) = filtered_fixture();

        sh.eval("show | include ^alpha").unwrap();
        assert_eq!(out.contents(), "alpha\nalphabet\n");

        out.clear();
        sh.eval("show | exclude alpha").unwrap();
        assert_eq!(out.contents(), "beta\n");

        out.clear();
        sh.eval("show").unwrap();
        assert_eq!(out.contents(), "alpha\nbeta\nalphabet\n");
    }

    #[test]
    fn test_sink_is_restored_after_interrupt_and_error() {
        let (mut sh, _, _, out) = filtered_fixture();
        sh.add_command(Command::keywords(["stop"]).handler(|sh, _| {
            writeln!(sh.output(), "partial output")?;
            Err(Interrupted.into())
        }));
        sh.add_command(Command::keywords(["broken"]).handler(|_, _| Err(anyhow::anyhow!("boom"))));

        assert_eq!(sh.eval("stop | include partial").unwrap(), Flow::done());
        assert_eq!(out.contents(), "partial output\n");
        assert!(matches!(sh.eval("broken | include x"), Err(ShellError::Handler(_))));

        out.clear();
        sh.eval("show").unwrap();
        assert_eq!(out.contents(), "alpha\nbeta\nalphabet\n");
    }
}
