//! Order history endpoints.

use bookswap_core::{Order, OrderId, Page};
use tracing::instrument;

use super::{ApiClient, ApiError, ApiToken};

impl ApiClient {
    /// Orders placed by the token's user. Never cached.
    ///
    /// # Errors
    ///
    /// Returns a 401 error if the token is no longer valid.
    #[instrument(skip(self, token))]
    pub async fn list_my_orders(&self, token: &ApiToken) -> Result<Vec<Order>, ApiError> {
        let page: Page<Order> = self.get_json("orders/mine", &[], Some(token)).await?;
        Ok(page.items)
    }

    /// Fetch one of the user's orders.
    ///
    /// # Errors
    ///
    /// Returns a 404 error if the order does not exist or belongs to someone else.
    #[instrument(skip(self, token), fields(order_id = %id))]
    pub async fn get_order(&self, id: OrderId, token: &ApiToken) -> Result<Order, ApiError> {
        self.get_json(&format!("orders/{id}"), &[], Some(token)).await
    }
}
