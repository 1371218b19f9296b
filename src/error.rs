use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use std::env;
use std::fmt::{self, Debug, Display};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    // dependency and internal failures
    Unexpected,
    Configuration,
    Database,
    Upstream,
    Timeout,
    NotFound,

    // validation
    InvalidInput,
    InvalidFormat,
    InvalidAmount,

    // domain state
    InvalidState,
    JobNotFound,
    DriverNotFound,
    JobNotOpen,
    DuplicateBid,
    BidNotFound,
    NotOwner,
    AlreadyDecided,
    ConfirmationExpired,
    CapacityExceeded,
    DriverNotEligible,
}

impl ErrorKind {
    pub fn code(&self) -> i32 {
        match self {
            Self::Unexpected => 0,
            Self::Configuration => 1,
            Self::Database => 2,
            Self::Upstream => 3,
            Self::Timeout => 4,
            Self::NotFound => 5,
            Self::InvalidInput => 100,
            Self::InvalidFormat => 101,
            Self::InvalidAmount => 102,
            Self::InvalidState => 110,
            Self::JobNotFound => 111,
            Self::DriverNotFound => 112,
            Self::JobNotOpen => 113,
            Self::DuplicateBid => 114,
            Self::BidNotFound => 115,
            Self::NotOwner => 116,
            Self::AlreadyDecided => 117,
            Self::ConfirmationExpired => 118,
            Self::CapacityExceeded => 119,
            Self::DriverNotEligible => 120,
        }
    }

    /// Failures of a collaborator (store, geocoder, configuration) rather than
    /// of the caller's request.
    pub fn is_dependency(&self) -> bool {
        self.code() < 100
    }
}

#[derive(Clone, Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub fn invalid_input_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, reason)
    }

    pub fn invalid_format_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidFormat, reason)
    }

    pub fn invalid_amount_error() -> Self {
        Self::new(ErrorKind::InvalidAmount, "bid amount must be positive")
    }

    pub fn invalid_state_error() -> Self {
        Self::new(ErrorKind::InvalidState, "invalid state")
    }

    pub fn job_not_found_error() -> Self {
        Self::new(ErrorKind::JobNotFound, "job not found")
    }

    pub fn driver_not_found_error() -> Self {
        Self::new(ErrorKind::DriverNotFound, "driver not found")
    }

    pub fn job_not_open_error() -> Self {
        Self::new(ErrorKind::JobNotOpen, "job is not open for bidding")
    }

    pub fn duplicate_bid_error() -> Self {
        Self::new(
            ErrorKind::DuplicateBid,
            "driver already has an active bid on this job",
        )
    }

    pub fn bid_not_found_error() -> Self {
        Self::new(ErrorKind::BidNotFound, "bid not found")
    }

    pub fn not_owner_error() -> Self {
        Self::new(ErrorKind::NotOwner, "not permitted for this resource")
    }

    pub fn already_decided_error() -> Self {
        Self::new(ErrorKind::AlreadyDecided, "bid or job already decided")
    }

    pub fn confirmation_expired_error() -> Self {
        Self::new(
            ErrorKind::ConfirmationExpired,
            "confirmation window has lapsed",
        )
    }

    pub fn capacity_exceeded_error(hours_used: f64, ceiling: f64) -> Self {
        Self::new(
            ErrorKind::CapacityExceeded,
            format!(
                "daily capacity exceeded ({:.1}h of {:.1}h)",
                hours_used, ceiling
            ),
        )
    }

    pub fn driver_not_eligible_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::DriverNotEligible, reason)
    }

    pub fn not_found_error(code: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("postcode {} not found", code))
    }

    pub fn timeout_error(what: &str) -> Self {
        Self::new(ErrorKind::Timeout, format!("{} timed out", what))
    }

    pub fn upstream_error() -> Self {
        Self::new(ErrorKind::Upstream, "upstream error")
    }

    pub fn configuration_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, reason)
    }

    pub fn database_error<T: Debug>(err: T) -> Self {
        tracing::error!(?err, "database error");
        Self::new(ErrorKind::Database, "database error")
    }

    pub fn unexpected_error() -> Self {
        Self::new(ErrorKind::Unexpected, "unexpected error")
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({}): {}", self.kind, self.code(), self.message)
    }
}

impl std::error::Error for Error {}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        Error::configuration_error(format!("environment variable error: {}", err))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::database_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Error::timeout_error("upstream request");
        }

        tracing::warn!(?err, "reqwest error");
        Error::upstream_error()
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        tracing::error!(?err, "authorization policy error");
        Error::unexpected_error()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.kind {
            ErrorKind::Timeout => (StatusCode::GATEWAY_TIMEOUT, "Upstream Timeout"),
            // the lookup worked but the postcode does not exist
            ErrorKind::NotFound => (StatusCode::UNPROCESSABLE_ENTITY, self.message.as_str()),
            kind if kind.is_dependency() => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
            ErrorKind::NotOwner => (StatusCode::FORBIDDEN, self.message.as_str()),
            ErrorKind::JobNotFound | ErrorKind::DriverNotFound | ErrorKind::BidNotFound => {
                (StatusCode::NOT_FOUND, self.message.as_str())
            }
            ErrorKind::JobNotOpen
            | ErrorKind::DuplicateBid
            | ErrorKind::AlreadyDecided
            | ErrorKind::ConfirmationExpired
            | ErrorKind::CapacityExceeded => (StatusCode::CONFLICT, self.message.as_str()),
            _ => (StatusCode::BAD_REQUEST, self.message.as_str()),
        };

        let body = Json(json!({
            "code": self.kind.code(),
            "kind": self.kind,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
