use crate::error::Error;

const SENDGRID_API: &str = "https://api.sendgrid.com/v3/mail/send";

/// Transactional mail over the SendGrid REST API.
#[derive(Clone)]
pub struct Mailer {
    http: reqwest::Client,
    api_key: String,
    from: String,
    public_url: String,
}

impl Mailer {
    pub fn new(api_key: String, from: String, public_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            from,
            public_url,
        }
    }

    pub fn new_from_env() -> Self {
        let api_key = std::env::var("SENDGRID_API_KEY")
            .expect("Cannot retrieve SENDGRID_API_KEY from environment variable.");
        let from = std::env::var("EMAIL_FROM")
            .expect("Cannot retrieve EMAIL_FROM from environment variable.");
        let public_url =
            std::env::var("PUBLIC_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());

        Self::new(api_key, from, public_url)
    }

    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), Error> {
        self.http
            .post(SENDGRID_API)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "personalizations": [{ "to": [{ "email": to }] }],
                "from": { "email": self.from },
                "subject": subject,
                "content": [{ "type": "text/html", "value": html }],
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    pub async fn send_welcome(&self, name: &str, email: &str) -> Result<(), Error> {
        let html = format!(
            "<p>Hi {}, welcome aboard!</p>\
             <p>Browse our tours at <a href=\"{}\">{}</a>.</p>",
            name, self.public_url, self.public_url
        );

        self.send(email, "Welcome to the tours family!", &html).await
    }

    /// The plaintext reset token travels only through this mail.
    pub async fn send_password_reset(
        &self,
        name: &str,
        email: &str,
        token: &str,
    ) -> Result<(), Error> {
        let link = format!("{}/reset-password/{}", self.public_url, token);
        let html = format!(
            "<p>Hi {}, forgot your password?</p>\
             <p><a href=\"{}\">Reset it here</a> within the next 10 minutes.</p>\
             <p>If you didn't ask for this, just ignore this email.</p>",
            name, link
        );

        self.send(email, "Your password reset token (valid for 10 minutes)", &html)
            .await
    }
}
