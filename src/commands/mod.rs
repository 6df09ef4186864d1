mod registry;

pub use registry::{all_commands, find_command, matching_commands, Command, CommandInvocation};

use crate::api::models::{self, available_models_string};
use crate::api::Role;
use crate::core::history::{ConversationEntry, RECENT_WINDOW};
use crate::core::session::Session;
use crate::utils::fs::write_private;
use chrono::Local;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Continue,
    Exit,
    /// Resend the last user input.
    Retry,
    SendMessage(String),
}

pub fn process_input(session: &mut Session, input: &str) -> CommandResult {
    let trimmed = input.trim();

    let Some(rest) = trimmed.strip_prefix('/') else {
        return CommandResult::SendMessage(trimmed.to_string());
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let args = parts.next().unwrap_or("").trim();

    match registry::find_command(name) {
        Some(command) => (command.handler)(session, CommandInvocation { name, args }),
        None => {
            session
                .display
                .line(format!("Unknown command: /{}", name.to_lowercase()));
            session.display.line("Type /help for available commands");
            let prefix: String = name.to_lowercase().chars().take(2).collect();
            let suggestions = complete(&format!("/{prefix}"));
            if !prefix.is_empty() && !suggestions.is_empty() {
                session
                    .display
                    .line(format!("Did you mean: {}", suggestions.join(", ")));
            }
            CommandResult::Continue
        }
    }
}

/// Completions for a partially typed line: command names, then arguments
/// for `/model`, `/citations` and `/system`.
pub fn complete(input: &str) -> Vec<String> {
    if !input.starts_with('/') {
        return Vec::new();
    }
    let Some((command, partial)) = input.split_once(' ') else {
        return matching_commands(input);
    };

    let partial = partial.trim_start();
    let options: Vec<&str> = match find_command(command.trim_start_matches('/')) {
        Some(found) if found.name == "model" => models::matching_models(partial),
        Some(found) if found.name == "citations" => vec!["on", "off"],
        Some(found) if found.name == "system" => vec!["reset"],
        _ => Vec::new(),
    };
    options
        .into_iter()
        .filter(|option| option.starts_with(&partial.to_ascii_lowercase()))
        .map(|option| format!("{command} {option}"))
        .collect()
}

fn conversation_summary(index: usize, entry: &ConversationEntry) -> String {
    format!(
        "  {}. [{}] {} ({} messages)",
        index + 1,
        entry.updated_label(),
        entry.model,
        entry.exchange_count()
    )
}

pub(super) fn handle_exit(
    session: &mut Session,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    session.display.line("Goodbye!");
    session.save_history();
    CommandResult::Exit
}

pub(super) fn handle_clear(
    session: &mut Session,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    session.conversation.reset();
    let default_prompt = session.default_system_prompt().to_string();
    session.conversation.set_system_prompt(&default_prompt);
    session.display.line("Conversation cleared.");
    CommandResult::Continue
}

pub(super) fn handle_retry(
    _session: &mut Session,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Retry
}

pub(super) fn handle_copy(
    session: &mut Session,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let Some(response) = session.conversation.last_response().map(str::to_string) else {
        session.display.line("No response to copy.");
        return CommandResult::Continue;
    };
    match (session.clipboard)(&response) {
        Ok(()) => session.display.success("Response copied to clipboard."),
        Err(err) => {
            let message = format!("Failed to copy to clipboard: {}", err.message);
            session.display.error(&message, err.hint);
        }
    }
    CommandResult::Continue
}

/// Markdown transcript of the conversation, without the system message.
pub fn export_markdown(session: &Session) -> String {
    let mut content = String::from("# Conversation Export\n\n");
    content.push_str(&format!("**Date:** {}\n", Local::now().format("%Y-%m-%d %H:%M:%S")));
    content.push_str(&format!("**Model:** {}\n\n", session.model()));
    content.push_str("---\n\n");

    for message in session.conversation.messages() {
        let heading = match message.role {
            Role::System => continue,
            Role::User => "## You",
            Role::Assistant => "## Assistant",
        };
        content.push_str(heading);
        content.push_str("\n\n");
        content.push_str(&message.content);
        content.push_str("\n\n");
    }
    content
}

pub(super) fn handle_export(
    session: &mut Session,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    if !session.conversation.has_exchanges() {
        session.display.line("No conversation to export.");
        return CommandResult::Continue;
    }

    let filename = if invocation.args.is_empty() {
        format!("conversation-{}.md", Local::now().format("%Y-%m-%d-%H%M%S"))
    } else if invocation.args.ends_with(".md") {
        invocation.args.to_string()
    } else {
        format!("{}.md", invocation.args)
    };

    let content = export_markdown(session);
    match write_private(Path::new(&filename), &content) {
        Ok(()) => session
            .display
            .success(format!("Conversation exported to {filename}")),
        Err(err) => session
            .display
            .error(&format!("Failed to export conversation: {err}"), None),
    }
    CommandResult::Continue
}

pub(super) fn handle_system(
    session: &mut Session,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    match invocation.args {
        "" => {
            let prompt = session.conversation.system_prompt().to_string();
            if prompt.is_empty() {
                session.display.line("No system prompt set.");
            } else {
                session
                    .display
                    .line(format!("Current system prompt: {prompt}"));
            }
        }
        "reset" => {
            let default_prompt = session.default_system_prompt().to_string();
            session.conversation.set_system_prompt(&default_prompt);
            session.display.line("System prompt reset to default.");
        }
        prompt => {
            session.conversation.set_system_prompt(prompt);
            session.display.line("System prompt updated.");
        }
    }
    CommandResult::Continue
}

fn parse_toggle(arg: &str) -> Option<bool> {
    match arg.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

pub(super) fn handle_citations(
    session: &mut Session,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let enabled = if invocation.args.is_empty() {
        !session.citations
    } else {
        match parse_toggle(invocation.args) {
            Some(enabled) => enabled,
            None => {
                session.display.line(format!(
                    "Invalid argument: {}. Use 'on' or 'off'.",
                    invocation.args.to_lowercase()
                ));
                return CommandResult::Continue;
            }
        }
    };
    session.citations = enabled;
    session.display.line(if enabled {
        "Citations display enabled."
    } else {
        "Citations display disabled."
    });
    CommandResult::Continue
}

pub(super) fn handle_history(
    session: &mut Session,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let Some(history) = session.history.as_ref() else {
        session.display.line("History not available.");
        return CommandResult::Continue;
    };
    let lines: Vec<String> = history
        .recent(RECENT_WINDOW)
        .iter()
        .enumerate()
        .map(|(index, entry)| conversation_summary(index, entry))
        .collect();

    if lines.is_empty() {
        session.display.line("No conversation history.");
        return CommandResult::Continue;
    }
    session.display.line("\nRecent conversations:");
    for line in lines {
        session.display.line(line);
    }
    session.display.blank();
    CommandResult::Continue
}

pub(super) fn handle_search(
    session: &mut Session,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let Some(history) = session.history.as_ref() else {
        session.display.line("History not available.");
        return CommandResult::Continue;
    };
    let keyword = invocation.args;
    if keyword.is_empty() {
        session.display.line("Usage: /search <keyword>");
        return CommandResult::Continue;
    }

    let lines: Vec<String> = history
        .search(keyword)
        .into_iter()
        .enumerate()
        .map(|(index, entry)| conversation_summary(index, entry))
        .collect();
    if lines.is_empty() {
        session
            .display
            .line(format!("No conversations found containing '{keyword}'."));
        return CommandResult::Continue;
    }
    session
        .display
        .line(format!("\nConversations containing '{keyword}':"));
    for line in lines {
        session.display.line(line);
    }
    session.display.blank();
    CommandResult::Continue
}

pub(super) fn handle_resume(
    session: &mut Session,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let Some(history) = session.history.as_ref() else {
        session.display.line("History not available.");
        return CommandResult::Continue;
    };
    let recent = history.recent(RECENT_WINDOW);
    if recent.is_empty() {
        session.display.line("No conversation to resume.");
        return CommandResult::Continue;
    }

    let entry = if invocation.args.is_empty() {
        recent[recent.len() - 1].clone()
    } else {
        match invocation.args.parse::<usize>() {
            Ok(index) if (1..=recent.len()).contains(&index) => recent[index - 1].clone(),
            _ => {
                let count = recent.len();
                session.display.line(format!(
                    "Invalid conversation index: {} (use 1-{count})",
                    invocation.args
                ));
                return CommandResult::Continue;
            }
        }
    };

    session.conversation.resume_from(&entry);
    session.display.line(format!(
        "Resumed conversation from {} ({} messages)",
        entry.updated_label(),
        entry.exchange_count()
    ));
    session.display.blank();

    let render = session.render;
    let transcript: Vec<(Role, String)> = session
        .conversation
        .messages()
        .iter()
        .map(|message| (message.role, message.content.clone()))
        .collect();
    for (role, content) in transcript {
        match role {
            Role::System => {}
            Role::User => {
                session.display.line(format!("You:\n{content}"));
                session.display.blank();
            }
            Role::Assistant if !content.is_empty() => {
                session.display.line("Assistant:");
                session.display.content(&content, render);
                session.display.blank();
            }
            Role::Assistant => {}
        }
    }
    session.display.line("--- End of conversation history ---");
    session.display.blank();
    CommandResult::Continue
}

pub(super) fn handle_delete(
    session: &mut Session,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let Some(history) = session.history.as_mut() else {
        session.display.line("History not available.");
        return CommandResult::Continue;
    };
    if invocation.args.is_empty() {
        session
            .display
            .line("Usage: /delete <n> (n=index from /history)");
        return CommandResult::Continue;
    }
    let Ok(index) = invocation.args.parse::<usize>() else {
        session
            .display
            .error(&format!("Invalid index: {}", invocation.args), None);
        return CommandResult::Continue;
    };

    if !history.delete_recent(index) {
        session
            .display
            .error(&format!("Invalid conversation index: {index}"), None);
        return CommandResult::Continue;
    }
    match history.save() {
        Ok(()) => session
            .display
            .line(format!("Conversation {index} deleted.")),
        Err(err) => session
            .display
            .error(&format!("Failed to save history: {err}"), None),
    }
    CommandResult::Continue
}

pub(super) fn handle_model(
    session: &mut Session,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let name = invocation.args;
    if name.is_empty() {
        session
            .display
            .line(format!("Current model: {}", session.client.model()));
        session
            .display
            .line(format!("Available: {}", available_models_string()));
    } else if !models::is_valid_model(name) {
        session.display.line(format!("Invalid model: {name}"));
        session
            .display
            .line(format!("Available: {}", available_models_string()));
    } else {
        session.client.set_model(name);
        session.display.line(format!("Switched to model: {name}"));
    }
    CommandResult::Continue
}

pub(super) fn handle_help(
    session: &mut Session,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    session.display.line("\nCommands:");
    for command in all_commands() {
        for usage in command.usages {
            session
                .display
                .line(format!("  {:<24} {}", usage.syntax, usage.description));
        }
    }
    session.display.blank();
    CommandResult::Continue
}
