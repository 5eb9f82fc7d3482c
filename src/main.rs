use argh::FromArgs;
use keyword_shell::{
    Command, Definition, DynamicOptionsType, Flow, IntegerType, Interpreter, Repl, StringType,
};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

const INTERFACE_CONTEXT: &str = "interface";

#[derive(FromArgs)]
/// Interactive shell for a toy network device.
struct Args {
    #[argh(option, default = "String::from(\"router\")")]
    /// prompt shown outside any context.
    prompt: String,

    #[argh(switch, short = 'v')]
    /// log at debug level unless RUST_LOG says otherwise.
    verbose: bool,
}

#[derive(Debug, Clone, Default)]
struct Interface {
    description: Option<String>,
    shutdown: bool,
}

type Interfaces = Rc<RefCell<BTreeMap<String, Interface>>>;

fn current_interface(sh: &Interpreter) -> anyhow::Result<String> {
    sh.context()
        .get("name")
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("no interface selected"))
}

fn register_commands(sh: &mut Interpreter, interfaces: &Interfaces) {
    sh.add_command(
        Command::keywords(["exit"])
            .always()
            .help("leave the shell")
            .handler(|_, _| Ok(Flow::Exit)),
    );

    sh.add_command(
        Command::keywords(["help"])
            .always()
            .help("list the commands available here")
            .handler(|sh, _| {
                let mut lines: Vec<(String, String)> = sh
                    .active_commands()
                    .iter()
                    .map(|c| (c.to_string(), c.help_text().unwrap_or_default().to_string()))
                    .collect();
                lines.sort();
                for (signature, help) in lines {
                    writeln!(sh.output(), "{:<40} {}", signature, help)?;
                }
                Ok(Flow::done())
            }),
    );

    sh.add_command(
        Command::keywords(["show", "version"])
            .help("print the software version")
            .handler(|sh, _| {
                writeln!(sh.output(), "keyword_shell {}", env!("CARGO_PKG_VERSION"))?;
                Ok(Flow::done())
            }),
    );

    let table = interfaces.clone();
    sh.add_command(
        Command::keywords(["show", "interfaces"])
            .help("list interfaces and their state")
            .handler(move |sh, _| {
                for (name, iface) in table.borrow().iter() {
                    let state = if iface.shutdown { "down" } else { "up" };
                    let description = iface.description.as_deref().unwrap_or("");
                    writeln!(sh.output(), "{:<12} {:<6} {}", name, state, description)?;
                }
                Ok(Flow::done())
            }),
    );

    sh.add_command(
        Command::new(vec![
            "ping".into(),
            Definition::param(StringType::named("<host>")),
            "count".into(),
            Definition::param(IntegerType::new().min(0).max(100).named("<1-99>")),
        ])
        .help("send echo requests to a host")
        .handler(|sh, inv| {
            let host = inv.param(0).unwrap_or_default();
            let count: u32 = inv.param(1).unwrap_or_default().parse()?;
            for seq in 0..count {
                writeln!(sh.output(), "reply from {}: seq={}", host, seq)?;
            }
            Ok(Flow::done())
        }),
    );

    let names = interfaces.clone();
    let table = interfaces.clone();
    sh.add_command(
        Command::new(vec![
            "interface".into(),
            Definition::param(
                DynamicOptionsType::new(move || names.borrow().keys().cloned().collect())
                    .named("<interface>"),
            ),
        ])
        .help("configure an interface")
        .handler(move |sh, inv| {
            let name = inv.param(0).unwrap_or_default().to_string();
            if !table.borrow().contains_key(&name) {
                anyhow::bail!("unknown interface {}", name);
            }
            let prompt = format!("{}(config-if-{})", sh.prompt(), name);
            sh.push_context(INTERFACE_CONTEXT, Some(&prompt));
            sh.context_mut().set("name", name);
            Ok(Flow::done())
        }),
    );

    let table = interfaces.clone();
    sh.add_command(
        Command::new(vec!["description".into(), Definition::param(StringType::named("<text>"))])
            .context(INTERFACE_CONTEXT)
            .help("set the interface description")
            .handler(move |sh, inv| {
                let name = current_interface(sh)?;
                if let Some(iface) = table.borrow_mut().get_mut(&name) {
                    iface.description = inv.param(0).map(str::to_string);
                }
                Ok(Flow::done())
            }),
    );

    for (keywords, shutdown) in [(vec!["shutdown"], true), (vec!["no", "shutdown"], false)] {
        let table = interfaces.clone();
        sh.add_command(
            Command::keywords(keywords)
                .context(INTERFACE_CONTEXT)
                .help(if shutdown { "disable the interface" } else { "enable the interface" })
                .handler(move |sh, _| {
                    let name = current_interface(sh)?;
                    if let Some(iface) = table.borrow_mut().get_mut(&name) {
                        iface.shutdown = shutdown;
                    }
                    Ok(Flow::done())
                }),
        );
    }

    sh.add_command(
        Command::keywords(["end"])
            .context(INTERFACE_CONTEXT)
            .help("leave interface configuration")
            .handler(|sh, _| {
                sh.pop_context().map_err(|e| anyhow::anyhow!("{e}"))?;
                Ok(Flow::done())
            }),
    );
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    let level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let interfaces: Interfaces = Rc::new(RefCell::new(
        ["eth0", "eth1", "lo"]
            .into_iter()
            .map(|name| (name.to_string(), Interface::default()))
            .collect(),
    ));

    let mut sh = Interpreter::new(&args.prompt);
    register_commands(&mut sh, &interfaces);

    Repl::new(sh)?.run()
}
