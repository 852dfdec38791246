//! Slash commands typed at the prompt. Anything else goes to the model.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Prompt(String),
    Add(String),
    Toggle(u64),
    Remove(u64),
    List,
    Reset,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub const HELP: &str = "\
Commands:
  /add <title>   add a todo without asking the model
  /toggle <id>   flip a todo between done and open
  /rm <id>       remove a todo
  /todos         show the list
  /reset         stop the current answer, or clear the last one
  /quit          exit
Anything else is sent to the assistant.";

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Prompt(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name {
        "add" if !arg.is_empty() => Command::Add(arg.to_string()),
        "add" => Command::Invalid("usage: /add <title>".into()),
        "toggle" => parse_id(arg).map_or_else(|| Command::Invalid("usage: /toggle <id>".into()), Command::Toggle),
        "rm" => parse_id(arg).map_or_else(|| Command::Invalid("usage: /rm <id>".into()), Command::Remove),
        "todos" | "list" => Command::List,
        "reset" => Command::Reset,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command /{} (try /help)", other)),
    }
}

fn parse_id(arg: &str) -> Option<u64> {
    arg.trim_start_matches('#').parse().ok()
}
