//! Client command parsing
//!
//! The client protocol is line oriented: `SET key value`, `GET key` and
//! `EXIT`, one command per line, exactly one response line per command.
//! Keys and values are single whitespace-delimited tokens. Verbs match
//! in any case; keys and values are case sensitive.

/// A parsed client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store a value under a key
    Set { key: String, value: String },
    /// Read a value
    Get { key: String },
    /// Close the connection
    Exit,
}

/// Protocol-level parse failures, each with its fixed response line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// SET with the wrong number of arguments
    SetUsage,
    /// GET with the wrong number of arguments
    GetUsage,
    /// Verb not recognized
    UnknownCommand,
}

impl ParseError {
    /// The exact response line sent to the client
    pub fn response(&self) -> &'static str {
        match self {
            ParseError::SetUsage => "ERROR: Usage SET key value",
            ParseError::GetUsage => "ERROR: Usage GET key",
            ParseError::UnknownCommand => "ERROR: Unknown command",
        }
    }
}

/// Parse one input line into a command
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or("").to_ascii_uppercase();
    match verb.as_str() {
        "SET" => match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) => Ok(Command::Set {
                key: key.to_string(),
                value: value.to_string(),
            }),
            _ => Err(ParseError::SetUsage),
        },
        "GET" => match (parts.next(), parts.next()) {
            (Some(key), None) => Ok(Command::Get {
                key: key.to_string(),
            }),
            _ => Err(ParseError::GetUsage),
        },
        "EXIT" => Ok(Command::Exit),
        _ => Err(ParseError::UnknownCommand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set() {
        assert_eq!(
            parse("SET user alice"),
            Ok(Command::Set {
                key: "user".to_string(),
                value: "alice".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_set_tolerates_extra_whitespace() {
        assert_eq!(
            parse("  SET   user   alice  "),
            Ok(Command::Set {
                key: "user".to_string(),
                value: "alice".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_set_arity() {
        assert_eq!(parse("SET"), Err(ParseError::SetUsage));
        assert_eq!(parse("SET user"), Err(ParseError::SetUsage));
        assert_eq!(parse("SET user alice extra"), Err(ParseError::SetUsage));
    }

    #[test]
    fn test_parse_get() {
        assert_eq!(
            parse("GET user"),
            Ok(Command::Get {
                key: "user".to_string(),
            })
        );
        assert_eq!(parse("GET"), Err(ParseError::GetUsage));
        assert_eq!(parse("GET user extra"), Err(ParseError::GetUsage));
    }

    #[test]
    fn test_parse_exit() {
        assert_eq!(parse("EXIT"), Ok(Command::Exit));
    }

    #[test]
    fn test_verbs_match_any_case() {
        assert_eq!(
            parse("set user alice"),
            Ok(Command::Set {
                key: "user".to_string(),
                value: "alice".to_string(),
            })
        );
        assert_eq!(
            parse("get User"),
            Ok(Command::Get {
                key: "User".to_string(),
            })
        );
        assert_eq!(parse("exit"), Ok(Command::Exit));
        assert_eq!(parse("Set a"), Err(ParseError::SetUsage));
    }

    #[test]
    fn test_unknown_and_empty_lines() {
        assert_eq!(parse("DELETE user"), Err(ParseError::UnknownCommand));
        assert_eq!(parse(""), Err(ParseError::UnknownCommand));
        assert_eq!(parse("   "), Err(ParseError::UnknownCommand));
    }

    #[test]
    fn test_error_responses() {
        assert_eq!(ParseError::SetUsage.response(), "ERROR: Usage SET key value");
        assert_eq!(ParseError::GetUsage.response(), "ERROR: Usage GET key");
        assert_eq!(ParseError::UnknownCommand.response(), "ERROR: Unknown command");
    }
}
