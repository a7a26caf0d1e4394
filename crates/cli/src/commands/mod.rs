pub mod config;
pub mod migrate;

use serde::Serialize;

/// What stopped a command; each class has a fixed process exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    ConfigValidation,
    RuntimeInit,
    DbConnectivity,
    Migration,
}

impl FailureClass {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::ConfigValidation => 2,
            Self::RuntimeInit => 3,
            Self::DbConnectivity => 4,
            Self::Migration => 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandFailure {
    pub class: FailureClass,
    pub message: String,
}

impl CommandFailure {
    pub fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self { class, message: message.into() }
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Serialize)]
struct StatusLine<'a> {
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<FailureClass>,
    message: &'a str,
}

impl CommandResult {
    /// Human-readable output that always exits 0.
    pub fn text(output: String) -> Self {
        Self { exit_code: 0, output }
    }

    /// One JSON status line for scripted callers.
    pub fn status(command: &str, outcome: Result<String, CommandFailure>) -> Self {
        let (exit_code, line) = match &outcome {
            Ok(message) => {
                (0, StatusLine { command, status: "ok", error_class: None, message })
            }
            Err(failure) => (
                failure.class.exit_code(),
                StatusLine {
                    command,
                    status: "error",
                    error_class: Some(failure.class),
                    message: &failure.message,
                },
            ),
        };
        let output = serde_json::to_string(&line)
            .unwrap_or_else(|error| format!("{command}: {} ({error})", line.message));
        Self { exit_code, output }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{CommandFailure, CommandResult, FailureClass};

    #[test]
    fn failures_carry_their_class_and_exit_code() {
        let result = CommandResult::status(
            "migrate",
            Err(CommandFailure::new(FailureClass::DbConnectivity, "unable to open database")),
        );

        assert_eq!(result.exit_code, 4);
        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "db_connectivity");
        assert_eq!(payload["message"], "unable to open database");
    }

    #[test]
    fn success_omits_the_error_class() {
        let result = CommandResult::status("migrate", Ok("applied 1 migration".to_owned()));

        assert_eq!(result.exit_code, 0);
        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["status"], "ok");
        assert!(payload.get("error_class").is_none());
    }
}
