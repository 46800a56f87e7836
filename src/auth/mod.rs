//! OAuth 2.0 authorization code flow with PKCE
//!
//! This module implements the client side of the flow against a Laravel
//! Passport style authorization server:
//!
//! 1. [`request`] builds the authorize parameters (`state`, PKCE verifier
//!    and S256 challenge).
//! 2. [`correlation`] persists the verifier under the `state` before the
//!    request leaves, and consumes it exactly once when the response comes
//!    back.
//! 3. [`silent`] loads the authorize URL in a background frame; [`redirect`]
//!    sends the whole page there when the silent attempt fails.
//! 4. [`authorization`] parses the response and resolves its `state`.
//! 5. [`exchange`] trades the code for a token, decoded by [`token`].
//! 6. [`session`] ties the steps together and caches the token.

pub mod authorization;
pub mod correlation;
pub mod exchange;
pub mod redirect;
pub mod request;
pub mod session;
pub mod silent;
pub mod token;

pub use authorization::{Authorization, AuthorizationSignature};
pub use correlation::{CorrelationEntry, CorrelationStore};
pub use exchange::TokenExchange;
pub use redirect::RedirectTransport;
pub use request::AuthorizationRequest;
pub use session::PassportClient;
pub use silent::{FrameOutcome, SilentTransport};
pub use token::DecodedToken;
