//! Console input: plain text is chat, a leading `/` starts a command.

use blockmesh_net::BlockType;
use blockmesh_session::LocalCommand;
use glam::IVec3;

pub const HELP: &str = "\
Commands:
  /place X Y Z TYPE   place a block (grass, dirt, stone, wood, sand, water)
  /remove X Y Z       remove a block
  /players            list players in the session
  /reload             re-read config.ron and report what changed
  /help               show this help
  /quit               leave the session
Anything else is sent as chat.";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Command(LocalCommand),
    Help,
    Reload,
    Quit,
    /// A command that could not be parsed, with a message for the user.
    Invalid(String),
}

/// Parse one line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<ConsoleInput> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(ConsoleInput::Command(LocalCommand::Chat(line.to_string())));
    };

    let mut words = rest.split_whitespace();
    let input = match words.next().unwrap_or_default() {
        "place" => {
            let args: Vec<&str> = words.collect();
            match args.as_slice() {
                [x, y, z, block] => match (parse_pos(x, y, z), BlockType::from_name(block)) {
                    (Some(pos), Some(block)) => ConsoleInput::Command(LocalCommand::Place { pos, block }),
                    (None, _) => invalid("coordinates must be integers"),
                    (_, None) => invalid(&format!("unknown block type '{block}'")),
                },
                _ => invalid("usage: /place X Y Z TYPE"),
            }
        }
        "remove" => {
            let args: Vec<&str> = words.collect();
            match args.as_slice() {
                [x, y, z] => match parse_pos(x, y, z) {
                    Some(pos) => ConsoleInput::Command(LocalCommand::Remove { pos }),
                    None => invalid("coordinates must be integers"),
                },
                _ => invalid("usage: /remove X Y Z"),
            }
        }
        "players" | "who" => ConsoleInput::Command(LocalCommand::ListPlayers),
        "help" | "?" => ConsoleInput::Help,
        "reload" => ConsoleInput::Reload,
        "quit" | "exit" => ConsoleInput::Quit,
        other => invalid(&format!("unknown command '/{other}', try /help")),
    };
    Some(input)
}

fn parse_pos(x: &str, y: &str, z: &str) -> Option<IVec3> {
    Some(IVec3::new(x.parse().ok()?, y.parse().ok()?, z.parse().ok()?))
}

fn invalid(message: &str) -> ConsoleInput {
    ConsoleInput::Invalid(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_chat() {
        assert_eq!(
            parse_line("  hello world "),
            Some(ConsoleInput::Command(LocalCommand::Chat("hello world".to_string())))
        );
    }

    #[test]
    fn test_blank_line_ignored() {
        assert_eq!(parse_line("   "), None);
    }

    #[test]
    fn test_place_command() {
        assert_eq!(
            parse_line("/place 1 -2 3 Stone"),
            Some(ConsoleInput::Command(LocalCommand::Place {
                pos: IVec3::new(1, -2, 3),
                block: BlockType::Stone,
            }))
        );
    }

    #[test]
    fn test_place_rejects_bad_input() {
        assert!(matches!(parse_line("/place 1 2 3 lava"), Some(ConsoleInput::Invalid(_))));
        assert!(matches!(parse_line("/place 1 x 3 dirt"), Some(ConsoleInput::Invalid(_))));
        assert!(matches!(parse_line("/place 1 2"), Some(ConsoleInput::Invalid(_))));
    }

    #[test]
    fn test_remove_command() {
        assert_eq!(
            parse_line("/remove 0 5 -7"),
            Some(ConsoleInput::Command(LocalCommand::Remove {
                pos: IVec3::new(0, 5, -7),
            }))
        );
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(
            parse_line("/players"),
            Some(ConsoleInput::Command(LocalCommand::ListPlayers))
        );
        assert_eq!(parse_line("/quit"), Some(ConsoleInput::Quit));
        assert_eq!(parse_line("/help"), Some(ConsoleInput::Help));
        assert_eq!(parse_line(" /reload "), Some(ConsoleInput::Reload));
        assert!(matches!(parse_line("/dance"), Some(ConsoleInput::Invalid(_))));
    }
}
