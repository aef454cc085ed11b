//! Slash command parsing for the chat application.
//!
//! Input starting with `/` controls the session locally and is never sent to the
//! service as a chat message.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Clear the conversation history.
    Clear,

    /// Turn knowledge-base retrieval on or off for later turns.
    Rag(bool),

    /// Log in with a username and password.
    Login {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },

    /// Create an account.
    Register {
        /// Account name.
        username: String,
        /// Contact address.
        email: String,
        /// Account password.
        password: String,
    },

    /// End the session and forget the stored credentials.
    Logout,

    /// Set the auto-save transcript path.
    TranscriptPath(String),

    /// Stop auto-saving the transcript.
    ClearTranscriptPath,

    /// Save the transcript to a specific file immediately.
    SaveTranscript(String),

    /// Load conversation history from a file.
    LoadTranscript(String),

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Display login state and session statistics.
    Status,

    /// Show the current configuration.
    ShowConfig,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be
/// sent as a regular message.
///
/// # Examples
///
/// ```
/// # use kbchat::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/rag off"), Some(ChatCommand::Rag(false)));
/// assert!(parse_command("What does chapter 2 cover?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" => ChatCommand::Clear,
        "rag" => match argument.and_then(parse_on_off) {
            Some(enabled) => ChatCommand::Rag(enabled),
            None => ChatCommand::Invalid("/rag expects 'on' or 'off'".to_string()),
        },
        "login" => match words::<2>(argument) {
            Some([username, password]) => ChatCommand::Login { username, password },
            None => ChatCommand::Invalid("/login requires <username> <password>".to_string()),
        },
        "register" => match words::<3>(argument) {
            Some([username, email, password]) => ChatCommand::Register {
                username,
                email,
                password,
            },
            None => ChatCommand::Invalid(
                "/register requires <username> <email> <password>".to_string(),
            ),
        },
        "logout" => ChatCommand::Logout,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "status" | "stats" => ChatCommand::Status,
        "config" => ChatCommand::ShowConfig,
        "transcript" => match argument {
            Some(arg) if arg.eq_ignore_ascii_case("clear") => ChatCommand::ClearTranscriptPath,
            Some(arg) => ChatCommand::TranscriptPath(arg.to_string()),
            None => ChatCommand::Invalid("/transcript requires a file path".to_string()),
        },
        "save" => match argument {
            Some(arg) => ChatCommand::SaveTranscript(arg.to_string()),
            None => ChatCommand::Invalid("/save requires a file path".to_string()),
        },
        "load" => match argument {
            Some(arg) => ChatCommand::LoadTranscript(arg.to_string()),
            None => ChatCommand::Invalid("/load requires a file path".to_string()),
        },
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Splits `argument` into exactly `N` whitespace-separated words.
fn words<const N: usize>(argument: Option<&str>) -> Option<[String; N]> {
    let words: Vec<String> = argument?.split_whitespace().map(str::to_string).collect();
    words.try_into().ok()
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /login <user> <password>        Log in
  /register <user> <email> <pw>   Create an account (does not log in)
  /logout                         Log out and forget stored credentials
  /rag on|off                     Search the knowledge base before answering
  /clear                          Clear conversation history
  /transcript <file>              Enable auto-saving transcripts (or 'clear')
  /save <file>                    Save the current transcript immediately
  /load <file>                    Load a transcript from disk
  /status                         Show login state and session statistics
  /config                         Show current configuration
  /help                           Show this help message
  /quit                           Exit the chat

Press Ctrl+C while an answer streams to stop it."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_clear() {
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/CLEAR"), Some(ChatCommand::Clear));
    }

    #[test]
    fn parse_rag_toggle() {
        assert_eq!(parse_command("/rag on"), Some(ChatCommand::Rag(true)));
        assert_eq!(parse_command("/rag OFF"), Some(ChatCommand::Rag(false)));
        assert!(matches!(
            parse_command("/rag maybe"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("expects")
        ));
        assert!(matches!(
            parse_command("/rag"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn parse_login() {
        assert_eq!(
            parse_command("/login ada  s3cret"),
            Some(ChatCommand::Login {
                username: "ada".to_string(),
                password: "s3cret".to_string(),
            })
        );
        assert!(matches!(
            parse_command("/login ada"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("requires")
        ));
        assert!(matches!(
            parse_command("/login a b c"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn parse_register() {
        assert_eq!(
            parse_command("/register ada ada@example.com pw"),
            Some(ChatCommand::Register {
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
                password: "pw".to_string(),
            })
        );
        assert!(matches!(
            parse_command("/register ada"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn parse_transcript_commands() {
        assert_eq!(
            parse_command("/transcript chat.json"),
            Some(ChatCommand::TranscriptPath("chat.json".to_string()))
        );
        assert_eq!(
            parse_command("/transcript clear"),
            Some(ChatCommand::ClearTranscriptPath)
        );
        assert_eq!(
            parse_command("/save session.json"),
            Some(ChatCommand::SaveTranscript("session.json".to_string()))
        );
        assert_eq!(
            parse_command("/load session.json"),
            Some(ChatCommand::LoadTranscript("session.json".to_string()))
        );
        assert!(matches!(
            parse_command("/save"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn parse_status_and_config() {
        assert_eq!(parse_command("/status"), Some(ChatCommand::Status));
        assert_eq!(parse_command("/stats"), Some(ChatCommand::Status));
        assert_eq!(parse_command("/config"), Some(ChatCommand::ShowConfig));
        assert_eq!(parse_command("/logout"), Some(ChatCommand::Logout));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse_command("/model gpt"),
            Some(ChatCommand::Invalid("Unknown command: /model".to_string()))
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Hello there"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_lists_commands() {
        let help = help_text();
        assert!(help.contains("/quit"));
        assert!(help.contains("/login"));
        assert!(help.contains("/rag"));
    }
}
