use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use marketplace_payment_engine::{
    traits::{PaymentGatewayError, ProcessorError},
    CheckoutError,
    RefundApiError,
    SettlementError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Could not complete checkout. {0}")]
    CheckoutError(#[from] CheckoutError),
    #[error("Could not complete the refund action. {0}")]
    RefundError(#[from] RefundApiError),
    #[error("Could not process the capture confirmation. {0}")]
    SettlementError(#[from] SettlementError),
    #[error("The upstream payment processor failed. {0}")]
    ProcessorError(ProcessorError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingIdentity => StatusCode::UNAUTHORIZED,
                AuthError::MalformedIdentity(_) => StatusCode::UNAUTHORIZED,
                AuthError::InvalidSignature => StatusCode::FORBIDDEN,
                AuthError::MissingSignature => StatusCode::FORBIDDEN,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::CheckoutError(e) => match e {
                CheckoutError::Validation(_) => StatusCode::BAD_REQUEST,
                CheckoutError::Plan(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutError::InsufficientStock { .. } => StatusCode::CONFLICT,
                CheckoutError::ProductNotFound(_) => StatusCode::BAD_REQUEST,
                CheckoutError::Processor(_) => StatusCode::BAD_GATEWAY,
                CheckoutError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::RefundError(e) => match e {
                RefundApiError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                RefundApiError::RefundNotFound(_) => StatusCode::NOT_FOUND,
                RefundApiError::OrderNotRefundable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                RefundApiError::UnknownLines => StatusCode::BAD_REQUEST,
                RefundApiError::MixedOwnership => StatusCode::UNPROCESSABLE_ENTITY,
                RefundApiError::ExceedsRefundable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                RefundApiError::InvalidAmount => StatusCode::BAD_REQUEST,
                RefundApiError::ReasonRequired => StatusCode::BAD_REQUEST,
                RefundApiError::NotRefundOwner => StatusCode::FORBIDDEN,
                RefundApiError::InvalidState(_) => StatusCode::CONFLICT,
                RefundApiError::Processor(_) => StatusCode::BAD_GATEWAY,
                RefundApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::SettlementError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ProcessorError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No identity header was supplied.")]
    MissingIdentity,
    #[error("The identity header is not in the correct format. {0}")]
    MalformedIdentity(String),
    #[error("No webhook signature found.")]
    MissingSignature,
    #[error("Invalid webhook signature.")]
    InvalidSignature,
}

impl From<PaymentGatewayError> for ServerError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::OrderNotFound(id) => Self::NoRecordFound(format!("Order {id}")),
            PaymentGatewayError::RefundNotFound(id) => Self::NoRecordFound(format!("Refund {id}")),
            e => Self::BackendError(e.to_string()),
        }
    }
}
