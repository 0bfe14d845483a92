//! OAuth access tokens for Gmail (REST and IMAP XOAUTH2).

pub mod oauth;
pub mod token_cache;
pub mod token_manager;
pub mod token_store;
