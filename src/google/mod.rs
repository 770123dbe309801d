/// Google OAuth subsystem and API client
///
/// Drives the authorization-code flow for Gmail and Calendar access, stores the
/// resulting refresh token per user and exchanges it for fresh access tokens when
/// n8n asks for one through the internal API. `GoogleApi` makes the Gmail and
/// Calendar calls n8n requests on a user's behalf.

pub mod accounts;
pub mod api;
pub mod oauth;

pub use accounts::{AccessToken, GoogleAccounts};
pub use api::GoogleApi;
pub use oauth::{GoogleError, GoogleOAuth};
