//! Terminal commands
//!
//! Every input line becomes a [`Command`]. Lines that do not start with `/`
//! are chat messages.

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Stream a reply
    Chat(String),
    /// Fetch a reply through the non-streaming endpoint
    Ask(String),
    Cancel,
    Clear,
    New,
    Help,
    Quit,
    Knowledge(KnowledgeCommand),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum KnowledgeCommand {
    List,
    Stats,
    Add { title: String, content: String },
    Delete(String),
    Show(String),
    Search(String),
}

pub const HELP: &str = "\
Commands:
  <text>                      send a message (streamed)
  /ask <text>                 send a message without streaming
  /cancel                     stop the reply being streamed (or press Ctrl-C)
  /clear                      clear this conversation on the server
  /new                        start a new conversation
  /kb list | stats            show knowledge entries or statistics
  /kb add <title> | <content> add a knowledge entry
  /kb show <id>               show one entry
  /kb delete <id>             delete an entry
  /kb search <query>          search the knowledge base
  /help                       show this help
  /quit                       exit";

impl Command {
    /// Parse one input line. Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Some(Command::Chat(line.to_string()));
        };

        let (name, args) = split_word(rest);
        let command = match name {
            "ask" if !args.is_empty() => Command::Ask(args.to_string()),
            "cancel" => Command::Cancel,
            "clear" => Command::Clear,
            "new" => Command::New,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "kb" => match KnowledgeCommand::parse(args) {
                Some(kb) => Command::Knowledge(kb),
                None => Command::Unknown(line.to_string()),
            },
            _ => Command::Unknown(line.to_string()),
        };

        Some(command)
    }
}

impl KnowledgeCommand {
    fn parse(args: &str) -> Option<Self> {
        let (name, rest) = split_word(args);
        match name {
            "list" | "" => Some(KnowledgeCommand::List),
            "stats" => Some(KnowledgeCommand::Stats),
            "add" => {
                let (title, content) = rest.split_once('|')?;
                let (title, content) = (title.trim(), content.trim());
                if title.is_empty() || content.is_empty() {
                    return None;
                }
                Some(KnowledgeCommand::Add {
                    title: title.to_string(),
                    content: content.to_string(),
                })
            }
            "delete" | "rm" if !rest.is_empty() => Some(KnowledgeCommand::Delete(rest.to_string())),
            "show" if !rest.is_empty() => Some(KnowledgeCommand::Show(rest.to_string())),
            "search" if !rest.is_empty() => Some(KnowledgeCommand::Search(rest.to_string())),
            _ => None,
        }
    }
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}
