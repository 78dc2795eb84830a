pub mod backend;
pub mod keycloak;
