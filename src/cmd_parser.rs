use regex::Regex;

/// What to do with the active buffer before writing the model's code into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open a fresh buffer and write into it.
    New,
    /// Clear the current buffer and write into it.
    Edit,
}

impl Action {
    pub fn parse(token: &str) -> Option<Action> {
        match token.to_lowercase().as_str() {
            "new" => Some(Action::New),
            "edit" => Some(Action::Edit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub action: Action,
    pub file_name: Option<String>,
    pub prompt: String,
}

/// Result of parsing one raw input line. The parser never fails: malformed
/// input degrades to `Invalid` with a reason the caller can show before
/// re-prompting, and empty input becomes `Empty` (nothing to do).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Empty,
    Command(ParsedCommand),
    Invalid(String),
}

/// File names are restricted to letters, digits, '.', '_' and '-'.
pub fn is_valid_file_name(name: &str) -> bool {
    let pattern = Regex::new(r"^[A-Za-z0-9._-]+$").unwrap();
    pattern.is_match(name)
}

/// Parses one raw input line into a command.
///
/// Grammar, first match wins:
///   1. empty or absent input                      -> Empty
///   2. ACTION|<FILE>TEXT or ACTION|<FILE>|TEXT    -> action, file, prompt
///   3. ACTION|TEXT                                -> action, prompt
///   4. <FILE>TEXT                                 -> default action, file, prompt
///   5. TEXT                                       -> default action, prompt
///
/// The default action when no token is given is `new`. An invalid file name
/// does not fail the parse: the name is dropped and reported through `warn`.
pub fn parse_input(raw: Option<&str>, warn: impl FnMut(&str)) -> ParseOutcome {
    let input = match raw {
        Some(s) => s.trim(),
        None => return ParseOutcome::Empty,
    };

    if input.is_empty() {
        return ParseOutcome::Empty;
    }

    if let Some((head, rest)) = input.split_once('|') {
        let token = head.trim();
        let action = match Action::parse(token) {
            Some(action) => action,
            None => {
                return ParseOutcome::Invalid(format!(
                    "Invalid action '{}'. Please use \"new\" or \"edit\".",
                    token
                ))
            }
        };

        let rest = rest.trim_start();
        if let Some(bracketed) = rest.strip_prefix('<') {
            return match bracketed.split_once('>') {
                Some((name, tail)) => build_command(action, name, tail, warn),
                None => ParseOutcome::Invalid(
                    "Unclosed file name: missing '>' after '<'.".to_string(),
                ),
            };
        }

        let prompt = rest.trim();
        if prompt.is_empty() {
            return ParseOutcome::Invalid(
                "Missing request text after the action.".to_string(),
            );
        }
        return ParseOutcome::Command(ParsedCommand {
            action,
            file_name: None,
            prompt: prompt.to_string(),
        });
    }

    if let Some(bracketed) = input.strip_prefix('<') {
        return match bracketed.split_once('>') {
            Some((name, tail)) => build_command(Action::New, name, tail, warn),
            None => {
                ParseOutcome::Invalid("Unclosed file name: missing '>' after '<'.".to_string())
            }
        };
    }

    ParseOutcome::Command(ParsedCommand {
        action: Action::New,
        file_name: None,
        prompt: input.to_string(),
    })
}

fn build_command(
    action: Action,
    name: &str,
    tail: &str,
    mut warn: impl FnMut(&str),
) -> ParseOutcome {
    // The free text may follow the bracket directly or after one more '|'.
    let tail = tail.trim_start();
    let tail = tail.strip_prefix('|').unwrap_or(tail);
    let prompt = tail.trim();
    if prompt.is_empty() {
        return ParseOutcome::Invalid("Missing request text after the file name.".to_string());
    }

    let name = name.trim();
    let file_name = if name.is_empty() || !is_valid_file_name(name) {
        warn(&format!(
            "Ignoring invalid file name '{}': only letters, digits, '.', '_' and '-' are allowed.",
            name
        ));
        None
    } else {
        Some(name.to_string())
    };

    ParseOutcome::Command(ParsedCommand {
        action,
        file_name,
        prompt: prompt.to_string(),
    })
}
