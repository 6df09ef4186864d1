use super::CommandResult;
use crate::core::session::Session;

pub type CommandHandler = fn(&mut Session, CommandInvocation<'_>) -> CommandResult;

pub struct CommandUsage {
    pub syntax: &'static str,
    pub description: &'static str,
}

pub struct Command {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usages: &'static [CommandUsage],
    pub handler: CommandHandler,
}

impl Command {
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    /// Name as typed, without the slash.
    pub name: &'a str,
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands().iter().find(|command| command.matches(name))
}

/// Every `/name` and `/alias` starting with `prefix`, in registry order.
pub fn matching_commands(prefix: &str) -> Vec<String> {
    let prefix = prefix.to_ascii_lowercase();
    all_commands()
        .iter()
        .flat_map(|command| std::iter::once(command.name).chain(command.aliases.iter().copied()))
        .map(|name| format!("/{name}"))
        .filter(|name| name.starts_with(&prefix))
        .collect()
}

const COMMANDS: &[Command] = &[
    Command {
        name: "exit",
        aliases: &["quit", "q"],
        usages: &[CommandUsage {
            syntax: "/exit, /quit, /q",
            description: "Exit interactive mode",
        }],
        handler: super::handle_exit,
    },
    Command {
        name: "clear",
        aliases: &["c"],
        usages: &[CommandUsage {
            syntax: "/clear, /c",
            description: "Clear conversation history",
        }],
        handler: super::handle_clear,
    },
    Command {
        name: "retry",
        aliases: &["r"],
        usages: &[CommandUsage {
            syntax: "/retry, /r",
            description: "Retry last message",
        }],
        handler: super::handle_retry,
    },
    Command {
        name: "copy",
        aliases: &[],
        usages: &[CommandUsage {
            syntax: "/copy",
            description: "Copy last response to clipboard",
        }],
        handler: super::handle_copy,
    },
    Command {
        name: "export",
        aliases: &[],
        usages: &[CommandUsage {
            syntax: "/export [filename]",
            description: "Export conversation to markdown file",
        }],
        handler: super::handle_export,
    },
    Command {
        name: "system",
        aliases: &[],
        usages: &[CommandUsage {
            syntax: "/system [prompt|reset]",
            description: "Show/set system prompt",
        }],
        handler: super::handle_system,
    },
    Command {
        name: "citations",
        aliases: &[],
        usages: &[CommandUsage {
            syntax: "/citations [on|off]",
            description: "Toggle or set citations display",
        }],
        handler: super::handle_citations,
    },
    Command {
        name: "history",
        aliases: &[],
        usages: &[CommandUsage {
            syntax: "/history",
            description: "Show recent conversations",
        }],
        handler: super::handle_history,
    },
    Command {
        name: "search",
        aliases: &[],
        usages: &[CommandUsage {
            syntax: "/search <keyword>",
            description: "Search conversations by keyword",
        }],
        handler: super::handle_search,
    },
    Command {
        name: "resume",
        aliases: &[],
        usages: &[CommandUsage {
            syntax: "/resume [n]",
            description: "Resume conversation (n=index from /history)",
        }],
        handler: super::handle_resume,
    },
    Command {
        name: "delete",
        aliases: &[],
        usages: &[CommandUsage {
            syntax: "/delete <n>",
            description: "Delete conversation (n=index from /history)",
        }],
        handler: super::handle_delete,
    },
    Command {
        name: "model",
        aliases: &["m"],
        usages: &[
            CommandUsage {
                syntax: "/model <name>, /m <name>",
                description: "Switch model",
            },
            CommandUsage {
                syntax: "/model, /m",
                description: "Show current model",
            },
        ],
        handler: super::handle_model,
    },
    Command {
        name: "help",
        aliases: &["h"],
        usages: &[CommandUsage {
            syntax: "/help, /h",
            description: "Show this help",
        }],
        handler: super::handle_help,
    },
];
