//! Browser-based OAuth login for a multi-tenant identity provider
//!
//! # Module Layout
//!
//! - [`pkce`]        -- PKCE `S256` parameters and anti-forgery state
//! - [`token_cache`] -- Per-tenant token records on disk
//! - [`callback`]    -- Loopback listener receiving the browser redirect
//! - [`exchange`]    -- Authorization code to token exchange
//! - [`browser`]     -- Opening URLs in the system browser
//! - [`provider`]    -- Identity provider session API
//! - [`flow`]        -- Login orchestration over all of the above

pub mod browser;
pub mod callback;
pub mod exchange;
pub mod flow;
pub mod pkce;
pub mod provider;
pub mod token_cache;
