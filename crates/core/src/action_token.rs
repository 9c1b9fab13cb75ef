//! Signed approve/reject links sent to admins by email.
//!
//! A token is `<user_id>.<admin_order>.<hex hmac>` where the MAC covers the
//! ticket id, the action, the user and the order the link was issued for.
//! Once the ticket moves past that order the link stops matching the roster.

use hmac::{Hmac, Mac};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

use crate::domain::ticket::TicketId;
use crate::workflow::TicketAction;

type HmacSha256 = Hmac<Sha256>;

pub const ACTION_PATH: &str = "/handle-ticket-action";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionTokenError {
    #[error("action token is malformed")]
    Malformed,
    #[error("action token signature does not match")]
    InvalidSignature,
    #[error("action link signing key is empty")]
    EmptyKey,
    #[error("invalid action link base url `{0}`")]
    InvalidBaseUrl(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionClaims {
    pub user_id: String,
    pub admin_order: u32,
}

#[derive(Clone)]
pub struct ActionTokenSigner {
    secret: SecretString,
}

impl std::fmt::Debug for ActionTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionTokenSigner").field("secret", &"<redacted>").finish()
    }
}

impl ActionTokenSigner {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    pub fn issue(
        &self,
        ticket_id: &TicketId,
        action: TicketAction,
        user_id: &str,
        admin_order: u32,
    ) -> Result<String, ActionTokenError> {
        let mac = self.mac(ticket_id, action, user_id, admin_order)?;
        Ok(format!(
            "{user_id}.{admin_order}.{}",
            encode_hex(mac.finalize().into_bytes().as_slice())
        ))
    }

    pub fn verify(
        &self,
        ticket_id: &TicketId,
        action: TicketAction,
        token: &str,
    ) -> Result<ActionClaims, ActionTokenError> {
        let mut parts = token.trim().rsplitn(3, '.');
        let signature = parts.next().ok_or(ActionTokenError::Malformed)?;
        let admin_order = parts
            .next()
            .and_then(|value| value.parse::<u32>().ok())
            .ok_or(ActionTokenError::Malformed)?;
        let user_id =
            parts.next().filter(|value| !value.is_empty()).ok_or(ActionTokenError::Malformed)?;
        let signature = decode_hex(signature).ok_or(ActionTokenError::Malformed)?;

        self.mac(ticket_id, action, user_id, admin_order)?
            .verify_slice(&signature)
            .map_err(|_| ActionTokenError::InvalidSignature)?;

        Ok(ActionClaims { user_id: user_id.to_string(), admin_order })
    }

    /// Full URL an admin clicks from the approval email.
    pub fn action_link(
        &self,
        base_url: &str,
        ticket_id: &TicketId,
        action: TicketAction,
        user_id: &str,
        admin_order: u32,
    ) -> Result<String, ActionTokenError> {
        let token = self.issue(ticket_id, action, user_id, admin_order)?;
        let endpoint = format!("{}{ACTION_PATH}", base_url.trim_end_matches('/'));
        let url = Url::parse_with_params(
            &endpoint,
            &[("ticketId", ticket_id.0.as_str()), ("action", action.as_str()), ("token", &token)],
        )
        .map_err(|_| ActionTokenError::InvalidBaseUrl(base_url.to_string()))?;
        Ok(url.to_string())
    }

    fn mac(
        &self,
        ticket_id: &TicketId,
        action: TicketAction,
        user_id: &str,
        admin_order: u32,
    ) -> Result<HmacSha256, ActionTokenError> {
        let key = self.secret.expose_secret();
        if key.is_empty() {
            return Err(ActionTokenError::EmptyKey);
        }
        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
            .map_err(|_| ActionTokenError::EmptyKey)?;
        mac.update(
            format!("{}|{}|{}|{}", ticket_id.0, action.as_str(), user_id, admin_order).as_bytes(),
        );
        Ok(mac)
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 || !value.is_ascii() {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&value[index..index + 2], 16).ok())
        .collect()
}
