//! Text commands typed into the input line.

pub const UNKNOWN_COMMAND: &str = "Unknown command! Type `help` or `?` to see list of commands";

pub const HELP_TEXT: &str = "\
There is how you can control me 😉
`SPACE` on an empty input line toggles play/pause

play [channel], p [channel]
  Connect and play or resume playing selected channel.
  If `channel` passed, tries to find channel and tune in it. `Channel` may be
  case insensitive full name, part of name or number of channel.
  Send `list` to give list of channels.
  Examples: `play LoFi Lounge & Chillout`, `play 27`, `play lofi`

pause
  Pause ¯\\_(ツ)_/¯

stop
  Stop playing and release the audio output

list [network], l [network]
  Full list of channels of the browsed network, or of `network` (key like `di`)

help, ?
  This help

quit, q
  Leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(Option<String>),
    Pause,
    Stop,
    List(Option<String>),
    Help,
    Quit,
    Unknown(String),
}

/// Parses one input line. Returns `None` for a blank line.
///
/// The command word is case-insensitive; the rest of the line is kept as typed
/// with inner whitespace collapsed.
pub fn parse(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let name = words.next()?.to_lowercase();
    let rest = words.collect::<Vec<_>>().join(" ");
    let argument = Some(rest).filter(|r| !r.is_empty());

    let command = match name.as_str() {
        "play" | "p" => Command::Play(argument),
        "pause" => Command::Pause,
        "stop" => Command::Stop,
        "list" | "l" => Command::List(argument),
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        _ => Command::Unknown(name),
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_with_and_without_search() {
        assert_eq!(parse("play"), Some(Command::Play(None)));
        assert_eq!(
            parse("  P   LoFi   Lounge "),
            Some(Command::Play(Some("LoFi Lounge".to_string())))
        );
        assert_eq!(parse("PLAY 27"), Some(Command::Play(Some("27".to_string()))));
    }

    #[test]
    fn test_aliases() {
        assert_eq!(parse("l"), Some(Command::List(None)));
        assert_eq!(parse("list rockradio"), Some(Command::List(Some("rockradio".to_string()))));
        assert_eq!(parse("?"), Some(Command::Help));
        assert_eq!(parse("help"), Some(Command::Help));
        assert_eq!(parse("pause"), Some(Command::Pause));
        assert_eq!(parse("stop now"), Some(Command::Stop));
        assert_eq!(parse("q"), Some(Command::Quit));
    }

    #[test]
    fn test_blank_and_unknown() {
        assert_eq!(parse("   "), None);
        assert_eq!(parse("dance"), Some(Command::Unknown("dance".to_string())));
    }
}
