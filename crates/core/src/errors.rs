use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unrecognized command `{0}`")]
    UnrecognizedCommand(String),
    #[error("not enough eggs: {available} available, {requested} requested")]
    InsufficientEggs { available: u32, requested: u32 },
    #[error("invalid chicken name")]
    InvalidChickenName,
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "That request could not be completed. Send `help` to see what I can do."
            }
            Self::ServiceUnavailable { .. } => {
                "The henhouse is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn unrecognized_command_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DomainError::UnrecognizedCommand("dance".to_owned()))
                .into_interface("env-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ref message,
            } if correlation_id == "env-1" && message.contains("dance")
        ));
        assert_eq!(interface.correlation_id(), "env-1");
    }

    #[test]
    fn bad_request_points_user_at_help() {
        let interface = ApplicationError::from(DomainError::InsufficientEggs {
            available: 1,
            requested: 3,
        })
        .into_interface("env-2");

        assert!(interface.user_message().contains("help"));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("env-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The henhouse is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("invalid bot token".to_owned()).into_interface("env-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
