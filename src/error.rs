#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Validation(_) => "VALIDATION",
            PaymentError::NotFound(_) => "NOT_FOUND",
            PaymentError::Conflict(_) => "CONFLICT",
            PaymentError::Forbidden(_) => "FORBIDDEN",
            PaymentError::CollaboratorUnavailable(_) => "COLLABORATOR_UNAVAILABLE",
            PaymentError::Storage(_) => "INTERNAL_ERROR",
        }
    }
}
