pub mod api_json;
pub mod auth_context;
