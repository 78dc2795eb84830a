pub mod health_service;
pub mod session_codec;
pub mod sign_in_service;
pub mod token_endpoint;
pub mod token_lifecycle;
