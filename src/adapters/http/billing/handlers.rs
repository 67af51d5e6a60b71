//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Json, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::application::handlers::billing::{
    CancelPaymentCommand, CancelPaymentHandler, GenerateInvoiceCommand, GenerateInvoiceHandler,
    GetInvoiceHandler, GetInvoiceQuery, HandleGatewayWebhookCommand, HandleGatewayWebhookHandler,
    HandleGatewayWebhookResult, NumberingPolicy, RecordPaymentCommand, RecordPaymentHandler,
    SettlementOutcome, StartGatewayPaymentCommand, StartGatewayPaymentHandler,
};
use crate::domain::billing::BillingError;
use crate::domain::foundation::{
    DomainError, InstallmentId, InvoiceId, Money, PaymentId, UserId, ValidationError,
};
use crate::domain::gateway::WebhookVerifier;
use crate::ports::{BillingStore, PaymentGateway};

use super::dto::{
    CheckoutResponse, ErrorResponse, GenerateInvoiceRequest, InstallmentResponse, InvoiceResponse,
    PaymentChangeResponse, PaymentResponse, RecordPaymentRequest, StartCheckoutRequest,
    WebhookAck,
};

/// Header carrying the gateway's webhook signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// Cloned for each request; every dependency is behind an `Arc`.
#[derive(Clone)]
pub struct BillingAppState {
    pub store: Arc<dyn BillingStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub verifier: Arc<WebhookVerifier>,
    pub numbering: NumberingPolicy,
}

impl BillingAppState {
    pub fn generate_invoice_handler(&self) -> GenerateInvoiceHandler {
        GenerateInvoiceHandler::new(self.store.clone(), self.numbering.clone())
    }

    pub fn get_invoice_handler(&self) -> GetInvoiceHandler {
        GetInvoiceHandler::new(self.store.clone())
    }

    pub fn record_payment_handler(&self) -> RecordPaymentHandler {
        RecordPaymentHandler::new(self.store.clone(), self.numbering.clone())
    }

    pub fn cancel_payment_handler(&self) -> CancelPaymentHandler {
        CancelPaymentHandler::new(self.store.clone())
    }

    pub fn start_payment_handler(&self) -> StartGatewayPaymentHandler {
        StartGatewayPaymentHandler::new(
            self.store.clone(),
            self.gateway.clone(),
            self.numbering.clone(),
        )
    }

    pub fn webhook_handler(&self) -> HandleGatewayWebhookHandler {
        HandleGatewayWebhookHandler::new(
            self.store.clone(),
            self.verifier.clone(),
            self.numbering.clone(),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Staff Context
// ════════════════════════════════════════════════════════════════════════════════

/// Acting staff member, identified upstream and passed in `X-User-Id`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/invoices/{id} - Invoice with installments, payments and tickets
pub async fn get_invoice(
    State(state): State<BillingAppState>,
    _user: AuthenticatedUser,
    Path(invoice_id): Path<InvoiceId>,
) -> Result<impl IntoResponse, BillingApiError> {
    let graph = state
        .get_invoice_handler()
        .handle(GetInvoiceQuery { invoice_id })
        .await?;

    Ok(Json(InvoiceResponse::from(graph)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/invoices - Generate an invoice
pub async fn generate_invoice(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<GenerateInvoiceRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = GenerateInvoiceCommand {
        person_id: request.person_id,
        event_id: request.event_id,
        total_amount: Money::new(request.amount)?,
        installments: request.installments,
        ticket_quantity: request.ticket_quantity,
        ticket_type: request.ticket_type,
        created_by: user.user_id,
    };

    let graph = state.generate_invoice_handler().handle(cmd).await?;

    Ok((StatusCode::CREATED, Json(InvoiceResponse::from(graph))))
}

/// POST /api/payments - Register a manual payment
///
/// 201 when a payment was written, 200 on an idempotent replay.
pub async fn record_payment(
    State(state): State<BillingAppState>,
    _user: AuthenticatedUser,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = RecordPaymentCommand {
        installment_id: request.installment_id,
        method: request.method,
        amount: Money::new(request.amount)?,
        external_payment_ref: request.transaction_id,
        external_charge_ref: None,
        note: request.note,
    };

    let result = state.record_payment_handler().handle(cmd).await?;

    let status = match result.outcome {
        SettlementOutcome::Replayed => StatusCode::OK,
        SettlementOutcome::Recorded | SettlementOutcome::Promoted => StatusCode::CREATED,
    };
    let response = PaymentChangeResponse {
        payment: PaymentResponse::from(result.payment),
        installment: InstallmentResponse::from(result.installment),
        invoice_status: result.invoice.status,
    };
    Ok((status, Json(response)))
}

/// POST /api/payments/{id}/cancel - Cancel a settled payment
pub async fn cancel_payment(
    State(state): State<BillingAppState>,
    _user: AuthenticatedUser,
    Path(payment_id): Path<PaymentId>,
) -> Result<impl IntoResponse, BillingApiError> {
    let result = state
        .cancel_payment_handler()
        .handle(CancelPaymentCommand { payment_id })
        .await?;

    Ok(Json(PaymentChangeResponse {
        payment: PaymentResponse::from(result.payment),
        installment: InstallmentResponse::from(result.installment),
        invoice_status: result.invoice.status,
    }))
}

/// POST /api/installments/{id}/checkout - Start a gateway payment
pub async fn start_checkout(
    State(state): State<BillingAppState>,
    _user: AuthenticatedUser,
    Path(installment_id): Path<InstallmentId>,
    Json(request): Json<StartCheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let result = state
        .start_payment_handler()
        .handle(StartGatewayPaymentCommand {
            installment_id,
            method: request.method,
        })
        .await?;

    let response = CheckoutResponse {
        payment: PaymentResponse::from(result.payment),
        client_secret: result.client_secret,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/webhooks/stripe - Handle gateway webhook events
///
/// Only signature failures are rejected. Every authentic delivery is
/// acknowledged, including ones that failed to apply.
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, BillingApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let cmd = HandleGatewayWebhookCommand {
        payload: body.to_vec(),
        signature,
    };
    let result = state.webhook_handler().handle(cmd).await?;

    if let HandleGatewayWebhookResult::Failed { event_id, .. } = &result {
        tracing::debug!(event_id = %event_id, "Acknowledging failed webhook");
    }

    Ok(Json(WebhookAck { received: true }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl From<DomainError> for BillingApiError {
    fn from(err: DomainError) -> Self {
        Self(err.into())
    }
}

impl From<ValidationError> for BillingApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl BillingApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            BillingError::Validation { .. }
            | BillingError::AlreadySettled { .. }
            | BillingError::InvalidSignature => StatusCode::BAD_REQUEST,
            BillingError::NotFound { .. } => StatusCode::NOT_FOUND,
            BillingError::Conflict(_) | BillingError::AlreadyCancelled { .. } => {
                StatusCode::CONFLICT
            }
            BillingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match &self.0 {
            BillingError::Validation { field, .. } => Some(json!({ "field": field })),
            BillingError::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            BillingError::AlreadySettled {
                installment_id,
                payment_id,
            } => Some(json!({
                "installmentId": installment_id.to_string(),
                "paymentId": payment_id.to_string(),
            })),
            BillingError::AlreadyCancelled { payment_id, status } => Some(json!({
                "paymentId": payment_id.to_string(),
                "status": status.as_str(),
            })),
            BillingError::Conflict(_) | BillingError::InvalidSignature | BillingError::Internal(_) => {
                None
            }
        }
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            BillingError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                "Internal error, the request can be retried".to_string()
            }
            other => other.to_string(),
        };
        let body = match self.details() {
            Some(details) => ErrorResponse::with_details(self.0.code(), message, details),
            None => ErrorResponse::new(self.0.code(), message),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::PaymentStatus;

    fn status_of(err: BillingError) -> StatusCode {
        BillingApiError::from(err).into_response().status()
    }

    #[test]
    fn errors_map_to_status_codes() {
        assert_eq!(
            status_of(BillingError::validation("amount", "bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(BillingError::not_found("Invoice", InvoiceId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(BillingError::conflict("taken")), StatusCode::CONFLICT);
        assert_eq!(
            status_of(BillingError::AlreadySettled {
                installment_id: InstallmentId::new(),
                payment_id: PaymentId::new(),
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(BillingError::AlreadyCancelled {
                payment_id: PaymentId::new(),
                status: PaymentStatus::Cancelled,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(BillingError::InvalidSignature), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(BillingError::internal("deadlock")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_details_name_the_field() {
        let err = BillingApiError::from(BillingError::validation("ticketType", "empty"));
        assert_eq!(err.details(), Some(json!({ "field": "ticketType" })));
    }

    #[test]
    fn money_validation_becomes_bad_request() {
        let err = BillingApiError::from(ValidationError::invalid_format("amount", "negative"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
