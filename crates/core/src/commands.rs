use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Commands a user can send to the bot in a direct message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmCommand {
    Help,
    Rename,
    Chickens,
    Eggs,
}

impl DmCommand {
    pub const ALL: [DmCommand; 4] = [Self::Help, Self::Rename, Self::Chickens, Self::Eggs];

    pub fn token(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Rename => "rename",
            Self::Chickens => "chickens",
            Self::Eggs => "eggs",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Help => "show this list",
            Self::Rename => "give each of your chickens a new name",
            Self::Chickens => "list your chickens",
            Self::Eggs => "show eggs received and eggs left to give today",
        }
    }
}

impl fmt::Display for DmCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for DmCommand {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|command| command.token() == normalized)
            .ok_or_else(|| DomainError::UnrecognizedCommand(value.trim().to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::DmCommand;
    use crate::errors::DomainError;

    #[test]
    fn tokens_parse_case_insensitively_with_padding() {
        assert_eq!(" Rename ".parse::<DmCommand>(), Ok(DmCommand::Rename));
        assert_eq!("EGGS".parse::<DmCommand>(), Ok(DmCommand::Eggs));
        assert_eq!("help".parse::<DmCommand>(), Ok(DmCommand::Help));
    }

    #[test]
    fn unknown_token_is_an_unrecognized_command() {
        assert_eq!(
            "test_command_ooOOoo".parse::<DmCommand>(),
            Err(DomainError::UnrecognizedCommand("test_command_ooOOoo".to_owned()))
        );
    }

    #[test]
    fn commands_with_arguments_are_not_recognized() {
        assert!(matches!(
            "rename Henrietta".parse::<DmCommand>(),
            Err(DomainError::UnrecognizedCommand(_))
        ));
    }
}
