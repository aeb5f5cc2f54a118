//! Command-line flag parsing for this tool's `-name=value` / bare `-name`
//! grammar: single-token flags, case-insensitive names, matched against a
//! table of recognized names, without the classic two-token `-b value`
//! convention.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// A bare switch, e.g. `-verbose`.
    Flag,
    /// Takes an inline value, e.g. `-cachemegs=64`.
    Valued,
}

#[derive(Debug, Clone, Copy)]
pub struct FlagDef {
    pub name: &'static str,
    pub kind: ArgKind,
}

impl FlagDef {
    pub const fn flag(name: &'static str) -> Self {
        Self { name, kind: ArgKind::Flag }
    }

    pub const fn valued(name: &'static str) -> Self {
        Self { name, kind: ArgKind::Valued }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedArg {
    Flag(String),
    Valued(String, String),
    Positional(String),
    /// A token that looked like a flag but wasn't in the table, or a
    /// valued flag given without `=value`.
    Unknown(String),
}

pub struct ArgParser {
    table: HashMap<String, ArgKind>,
}

impl ArgParser {
    pub fn new(defs: &[FlagDef]) -> Self {
        let table = defs.iter().map(|d| (d.name.to_ascii_lowercase(), d.kind)).collect();
        Self { table }
    }

    pub fn parse<I: IntoIterator<Item = String>>(&self, args: I) -> Vec<ParsedArg> {
        args.into_iter().map(|arg| self.parse_one(&arg)).collect()
    }

    fn parse_one(&self, arg: &str) -> ParsedArg {
        if arg == "/?" {
            return self.lookup("help", arg);
        }
        let trimmed = arg.trim_start_matches('-');
        if trimmed.len() == arg.len() {
            return ParsedArg::Positional(arg.to_string());
        }
        let (name, inline_value) = match trimmed.split_once('=') {
            Some((n, v)) => (n, Some(v.to_string())),
            None => (trimmed, None),
        };
        let lname = name.to_ascii_lowercase();
        match self.table.get(&lname) {
            Some(ArgKind::Flag) => ParsedArg::Flag(lname),
            Some(ArgKind::Valued) => match inline_value {
                Some(v) => ParsedArg::Valued(lname, v),
                None => ParsedArg::Unknown(arg.to_string()),
            },
            None => ParsedArg::Unknown(arg.to_string()),
        }
    }

    fn lookup(&self, name: &str, original: &str) -> ParsedArg {
        match self.table.get(name) {
            Some(ArgKind::Flag) => ParsedArg::Flag(name.to_string()),
            _ => ParsedArg::Unknown(original.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ArgParser {
        ArgParser::new(&[
            FlagDef::flag("verbose"),
            FlagDef::flag("help"),
            FlagDef::valued("cachemegs"),
            FlagDef::valued("in"),
        ])
    }

    #[test]
    fn parses_bare_and_valued_flags_case_insensitively() {
        let parsed = table().parse(vec!["-Verbose".to_string(), "-CacheMegs=64".to_string()]);
        assert_eq!(parsed[0], ParsedArg::Flag("verbose".to_string()));
        assert_eq!(parsed[1], ParsedArg::Valued("cachemegs".to_string(), "64".to_string()));
    }

    #[test]
    fn valued_flag_without_equals_is_unknown() {
        let parsed = table().parse(vec!["-in".to_string()]);
        assert_eq!(parsed[0], ParsedArg::Unknown("-in".to_string()));
    }

    #[test]
    fn unrecognized_flag_is_unknown() {
        let parsed = table().parse(vec!["-bogus".to_string()]);
        assert_eq!(parsed[0], ParsedArg::Unknown("-bogus".to_string()));
    }

    #[test]
    fn help_alias_recognized() {
        let parsed = table().parse(vec!["/?".to_string()]);
        assert_eq!(parsed[0], ParsedArg::Flag("help".to_string()));
    }

    #[test]
    fn non_dash_token_is_positional() {
        let parsed = table().parse(vec!["input.ps".to_string()]);
        assert_eq!(parsed[0], ParsedArg::Positional("input.ps".to_string()));
    }
}
