use std::io::Read;

use clap::Parser;
use hybrid_shell::{CaptureValue, Captures, MapScope, NoExprEvaluator, PycmdRegistry, Shell, Value};

#[derive(Parser)]
#[command(name = "hshell")]
#[command(about = "Runs a hybrid shell/pycmd pipeline script")]
#[command(version)]
struct Cli {
    /// Execute the script from command line argument
    #[arg(short = 'c')]
    script: Option<String>,

    /// Output the `-> name` / `=> name` captures as JSON instead of leaving
    /// captured command output silent
    #[arg(long = "json")]
    json: bool,

    /// Script file to execute
    #[arg()]
    script_file: Option<String>,
}

fn read_script(cli: &Cli) -> String {
    if let Some(s) = &cli.script {
        return s.clone();
    }
    if let Some(file) = &cli.script_file {
        return std::fs::read_to_string(file).unwrap_or_else(|e| {
            eprintln!("hshell: cannot read script file {file}: {e}");
            std::process::exit(1);
        });
    }
    use std::io::IsTerminal;
    if std::io::stdin().is_terminal() {
        eprintln!("hshell: no script provided. Use -c 'script', a script file, or pipe via stdin.");
        std::process::exit(1);
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf).unwrap_or_default();
    buf
}

fn default_registry() -> PycmdRegistry {
    let mut registry = PycmdRegistry::new();
    registry.register("map", std::sync::Arc::new(hybrid_shell::pycmd::examples::Map));
    registry.register("filter", std::sync::Arc::new(hybrid_shell::pycmd::examples::Filter));
    registry.register("cd", std::sync::Arc::new(hybrid_shell::pycmd::examples::Cd));
    registry
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Value::from(*f),
        Value::Bool(b) => serde_json::Value::from(*b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::None => serde_json::Value::Null,
        Value::Pycmd(_) | Value::Callable(_) | Value::Table(_) => serde_json::Value::String(value.to_display_string()),
    }
}

fn captures_to_json(captures: &Captures) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    for (name, value) in captures {
        let entry = match value {
            CaptureValue::ExitCode(status) => serde_json::json!({
                "exitCode": status.code(),
                "signal": status.signal(),
            }),
            CaptureValue::Lines(lines) => serde_json::Value::Array(lines.iter().cloned().map(serde_json::Value::String).collect()),
            CaptureValue::Objects(objects) => serde_json::Value::Array(objects.iter().map(value_to_json).collect()),
        };
        out.insert(name.clone(), entry);
    }
    serde_json::Value::Object(out)
}

fn main() {
    let cli = Cli::parse();
    let script = read_script(&cli);
    if script.trim().is_empty() {
        std::process::exit(0);
    }

    let shell = Shell::new(default_registry(), NoExprEvaluator);
    let globals = MapScope::new();
    let locals = MapScope::new();

    match shell.run(&script, &globals, &locals, None) {
        Ok(captures) => {
            if cli.json {
                println!("{}", captures_to_json(&captures));
            }
        }
        Err(e) => {
            eprintln!("hshell: {e}");
            std::process::exit(1);
        }
    }
}
