use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::Error;

const API_BASE: &str = "https://api.razorpay.com/v1";

/// Razorpay REST client plus the checkout signature check. Amounts are in
/// the smallest currency unit (paise).
#[derive(Clone)]
pub struct RazorpayState {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

impl RazorpayState {
    pub fn new(key_id: String, key_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            key_id,
            key_secret,
        }
    }

    pub fn new_from_env() -> Self {
        let key_id = std::env::var("RAZORPAY_KEY_ID")
            .expect("Cannot retrieve RAZORPAY_KEY_ID from environment variable.");
        let key_secret = std::env::var("RAZORPAY_KEY_SECRET")
            .expect("Cannot retrieve RAZORPAY_KEY_SECRET from environment variable.");

        Self::new(key_id, key_secret)
    }

    /// Publishable key for the checkout widget.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub async fn create_order(&self, amount: i64, currency: &str) -> Result<PaymentOrder, Error> {
        let order = self
            .http
            .post(format!("{}/orders", API_BASE))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&serde_json::json!({
                "amount": amount,
                "currency": currency,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(order)
    }

    /// The checkout callback is authentic iff its signature is the
    /// HMAC-SHA256 of `"{order_id}|{payment_id}"` under the secret key.
    pub fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let signature = match hex::decode(signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let mut mac =
            Hmac::<Sha256>::new_from_slice(self.key_secret.as_bytes()).expect("hmac key");
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());

        // constant-time comparison
        mac.verify_slice(&signature).is_ok()
    }
}
