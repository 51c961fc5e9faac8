//! Usage: OAuth2 authorization-code flow: token cache, loopback callback, exchange and refresh.
//!
//! Collaborators are injected as traits (`TokenStore`, `Exchanger`, `CodeSource`,
//! `BrowserStrategy`, `CodeInput`) so `AuthorizationFlow` runs against fakes in tests.

pub mod browser;
pub mod callback_server;
pub mod code_source;
pub mod config;
pub mod credentials;
pub mod flow;
pub mod token;
pub mod token_exchange;
pub mod token_store;

pub use browser::{BrowserStrategy, SystemBrowser};
pub use code_source::{
    AcquiredCode, CodeInput, CodeSource, LoopbackCodeSource, OfflineCodeSource, StdinCodeInput,
};
pub use config::{OAuthConfig, DRIVE_SCOPE, OOB_REDIRECT_URL};
pub use flow::{AuthorizationFlow, FlowState, PersistPolicy};
pub use token::Token;
pub use token_exchange::{Exchanger, HttpExchanger};
pub use token_store::{FsTokenStore, MemoryTokenStore, TokenStore};
