use edara_core::config::{AppConfig, LoadOptions};
use edara_core::{ActionTokenSigner, TicketAction, TicketId};
use serde_json::json;

use crate::commands::CommandResult;

/// Re-issues the signed link an approver would have received by email.
pub fn run(ticket_id: &str, user_id: &str, order: u32, action: &str) -> CommandResult {
    let action = match action.parse::<TicketAction>() {
        Ok(action) => action,
        Err(error) => {
            return CommandResult::failure("action-link", "invalid_argument", error.to_string(), 6);
        }
    };
    if ticket_id.trim().is_empty() || user_id.trim().is_empty() {
        return CommandResult::failure(
            "action-link",
            "invalid_argument",
            "ticket id and user id must not be blank",
            6,
        );
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "action-link",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let signer = ActionTokenSigner::new(config.action_links.signing_secret.clone());
    let ticket_id = TicketId(ticket_id.trim().to_string());
    let user_id = user_id.trim();
    let issued = signer
        .issue(&ticket_id, action, user_id, order)
        .and_then(|token| {
            signer
                .action_link(&config.server.public_base_url, &ticket_id, action, user_id, order)
                .map(|link| (link, token))
        });

    match issued {
        Ok((link, token)) => CommandResult::success_with_data(
            "action-link",
            format!("{} link issued for {user_id} at order {order}", action.as_str()),
            json!({
                "ticket_id": ticket_id.0,
                "action": action.as_str(),
                "user_id": user_id,
                "order": order,
                "token": token,
                "link": link,
            }),
        ),
        Err(error) => CommandResult::failure("action-link", "signing", error.to_string(), 7),
    }
}
