pub mod ai;
pub mod analytics_service;
pub mod auth;
pub mod chat_service;
pub mod config;
pub mod creation_hub_service;
pub mod error;
pub mod game_service;
pub mod handlers;
pub mod image_optimizer;
pub mod lead_service;
pub mod models;
pub mod payments;
pub mod quota;
pub mod recording_service;
pub mod state;
pub mod store;
pub mod supabase;

#[cfg(test)]
mod test_support;
