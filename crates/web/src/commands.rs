use regex::RegexBuilder;

/// A request addressed to the bot in a pull request comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Lint,
    Bump,
    FetchArtifacts,
    Rebuild,
    Merge,
    Unknown(String),
}

impl Command {
    fn from_words(words: &str) -> Self {
        let words = words.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        match words.as_str() {
            "lint" | "relint" => Self::Lint,
            "bump" => Self::Bump,
            "fetch artifacts" => Self::FetchArtifacts,
            "rebuild" => Self::Rebuild,
            "merge" => Self::Merge,
            _ => Self::Unknown(words),
        }
    }
}

/// Every `@<bot> please <command>` line of a comment, in order.
pub fn parse_commands(body: &str, bot_login: &str) -> Vec<Command> {
    let pattern = format!(r"^\s*@{}\s+please\s+(?P<command>.+?)[\s.!]*$", regex::escape(bot_login));
    let Ok(regex) = RegexBuilder::new(&pattern).case_insensitive(true).multi_line(true).build()
    else {
        tracing::error!("Invalid command pattern for {}", bot_login);
        return vec![];
    };
    regex
        .captures_iter(body)
        .filter_map(|caps| caps.name("command"))
        .map(|command| Command::from_words(command.as_str()))
        .collect()
}

pub fn help_message(bot_login: &str, unknown: &str) -> String {
    format!(
        "Sorry, I don't know how to `{unknown}`. I understand:\n\
         - `@{bot_login} please lint`: lint the changed recipes again\n\
         - `@{bot_login} please bump`: increase the build number of the changed recipes\n\
         - `@{bot_login} please fetch artifacts`: list the packages and images CI built\n\
         - `@{bot_login} please rebuild`: ask CI to build this pull request again\n\
         - `@{bot_login} please merge`: upload the built packages and merge\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let body = "Thanks!\n@recipe-bot please fetch  artifacts\n\n@Recipe-Bot Please MERGE.\r\n";
        assert_eq!(parse_commands(body, "recipe-bot"), vec![Command::FetchArtifacts, Command::Merge]);
        assert_eq!(parse_commands("@recipe-bot please relint", "recipe-bot"), vec![Command::Lint]);
        assert_eq!(parse_commands("@recipe-bot please bump", "recipe-bot"), vec![Command::Bump]);
        assert_eq!(parse_commands("@recipe-bot please rebuild!", "recipe-bot"), vec![Command::Rebuild]);
    }

    #[test]
    fn test_ignores_other_mentions() {
        assert!(parse_commands("ping @recipe-bot please merge", "recipe-bot").is_empty());
        assert!(parse_commands("@recipe-botx please merge", "recipe-bot").is_empty());
        assert!(parse_commands("@recipe-bot merge", "recipe-bot").is_empty());
    }

    #[test]
    fn test_unknown_command() {
        let commands = parse_commands("@recipe-bot please make coffee", "recipe-bot");
        assert_eq!(commands, vec![Command::Unknown("make coffee".to_string())]);
        let help = help_message("recipe-bot", "make coffee");
        assert!(help.starts_with("Sorry, I don't know how to `make coffee`."));
        assert!(help.contains("`@recipe-bot please merge`"));
    }
}
