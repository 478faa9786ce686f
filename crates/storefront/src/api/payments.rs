//! Payment endpoints backing the checkout flow.

use bookswap_core::{BookId, Order, OrderId, Price, ShippingAddress};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{ApiClient, ApiError, ApiToken};

/// Body of `POST payments/create-intent`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateIntentRequest<'a> {
    pub book_id: BookId,
    pub shipping_address: &'a ShippingAddress,
}

/// Body of `POST payments/confirm`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmPaymentRequest<'a> {
    pub payment_intent_id: &'a str,
    pub book_id: BookId,
    pub shipping_address: &'a ShippingAddress,
}

/// A payment intent created by the API on the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub client_secret: String,
    #[serde(alias = "id", alias = "payment_intent")]
    pub payment_intent_id: String,
    #[serde(default)]
    pub amount: Option<Price>,
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfirmResponse {
    Wrapped { order: Order },
    Bare(Order),
}

impl ApiClient {
    /// Create a payment intent for buying one book.
    ///
    /// # Errors
    ///
    /// Returns the normalized API error (e.g. 400 when the book is sold).
    #[instrument(skip(self, request, token), fields(book_id = %request.book_id))]
    pub async fn create_payment_intent(
        &self,
        request: &CreateIntentRequest<'_>,
        token: &ApiToken,
    ) -> Result<PaymentIntent, ApiError> {
        self.post_json("payments/create-intent", request, Some(token))
            .await
    }

    /// Tell the API the intent succeeded client-side; returns the created order.
    ///
    /// # Errors
    ///
    /// Returns the normalized API error.
    #[instrument(skip(self, request, token), fields(book_id = %request.book_id))]
    pub async fn confirm_payment(
        &self,
        request: &ConfirmPaymentRequest<'_>,
        token: &ApiToken,
    ) -> Result<Order, ApiError> {
        let response: ConfirmResponse = self
            .post_json("payments/confirm", request, Some(token))
            .await?;
        // A sold book must drop out of cached listings.
        self.invalidate_cache();
        Ok(match response {
            ConfirmResponse::Wrapped { order } | ConfirmResponse::Bare(order) => order,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_accepts_id_alias() {
        let intent: PaymentIntent = serde_json::from_str(
            r#"{"client_secret": "pi_1_secret_x", "id": "pi_1", "amount": "12.00"}"#,
        )
        .unwrap();
        assert_eq!(intent.payment_intent_id, "pi_1");
        assert_eq!(intent.amount.unwrap().to_cents(), Some(1200));
    }

    #[test]
    fn test_confirm_response_wrapped_or_bare() {
        let wrapped: ConfirmResponse =
            serde_json::from_str(r#"{"order": {"id": 5, "total": "4.00"}}"#).unwrap();
        let bare: ConfirmResponse = serde_json::from_str(r#"{"id": 6, "total": "4.00"}"#).unwrap();
        assert!(matches!(wrapped, ConfirmResponse::Wrapped { order } if order.id == OrderId::new(5)));
        assert!(matches!(bare, ConfirmResponse::Bare(order) if order.id == OrderId::new(6)));
    }
}
