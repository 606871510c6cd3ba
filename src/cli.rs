//! Command-line arguments.
//!
//! Hand-parsed: the surface is a handful of flags and three subcommands.

use crate::logger::level_for_verbosity;

pub const USAGE: &str = "\
Usage: docquery [OPTIONS] [COMMAND]

Commands:
  ask <QUESTION...>          Answer one question and exit
  schema                     Print the indexed collections and exit
  reindex                    Rebuild the schema embeddings cache and exit
  (none)                     Start the interactive prompt

Options:
  -h, --help                 Print help
  -f, --config <PATH>        Path to configuration file (default: config/default.toml)
  -v, -vv, -vvv, -vvvv       Increase logging verbosity";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Repl,
    Ask(String),
    Schema,
    Reindex,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub command: Command,
    pub config_path: Option<String>,
    /// Level forced by `-v` flags; `None` defers to env and config.
    pub log_level: Option<&'static str>,
}

/// Parse arguments, excluding the program name.
pub fn parse_args<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut verbosity = 0u8;
    let mut config_path = None;
    let mut positional: Vec<String> = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            positional.extend(iter.by_ref());
            break;
        }
        match arg.as_str() {
            "-h" | "--help" => {
                return Ok(CliArgs { command: Command::Help, config_path, log_level: None });
            }
            "-f" | "--config" => match iter.next() {
                Some(path) => config_path = Some(path),
                None => return Err("-f/--config requires a path argument".into()),
            },
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            a if a.starts_with('-') && positional.is_empty() => {
                return Err(format!("unknown option: {a}"));
            }
            _ => positional.push(arg),
        }
    }

    let command = match positional.split_first() {
        None => Command::Repl,
        Some((cmd, rest)) => match cmd.as_str() {
            "ask" if rest.is_empty() => return Err("ask requires a question".into()),
            "ask" => Command::Ask(rest.join(" ")),
            "schema" => Command::Schema,
            "reindex" => Command::Reindex,
            other => return Err(format!("unknown command: {other}")),
        },
    };

    Ok(CliArgs { command, config_path, log_level: level_for_verbosity(verbosity) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, String> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn no_arguments_starts_repl() {
        let a = parse(&[]).unwrap();
        assert_eq!(a.command, Command::Repl);
        assert_eq!(a.log_level, None);
    }

    #[test]
    fn ask_joins_question_words() {
        let a = parse(&["-vvv", "ask", "how", "many", "orders?"]).unwrap();
        assert_eq!(a.command, Command::Ask("how many orders?".into()));
        assert_eq!(a.log_level, Some("debug"));
    }

    #[test]
    fn config_flag_and_subcommand() {
        let a = parse(&["-f", "/etc/dq.toml", "schema"]).unwrap();
        assert_eq!(a.config_path.as_deref(), Some("/etc/dq.toml"));
        assert_eq!(a.command, Command::Schema);
        assert_eq!(parse(&["reindex"]).unwrap().command, Command::Reindex);
    }

    #[test]
    fn question_may_contain_dashes_after_separator() {
        let a = parse(&["--", "ask", "-5", "degrees"]).unwrap();
        assert_eq!(a.command, Command::Ask("-5 degrees".into()));
    }

    #[test]
    fn errors() {
        assert!(parse(&["-f"]).is_err());
        assert!(parse(&["ask"]).is_err());
        assert!(parse(&["frobnicate"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
    }

    #[test]
    fn help_flag() {
        assert_eq!(parse(&["-v", "--help"]).unwrap().command, Command::Help);
    }
}
