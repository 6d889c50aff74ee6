//! Authentication and authorization for StreakWars
//!
//! Provides:
//! - JWT token generation and validation
//! - Permission levels for route authorization
//! - Password hashing with Argon2

pub mod jwt;
pub mod password;
pub mod permissions;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenValidationResult};
pub use password::{hash_password, verify_password};
pub use permissions::PermissionLevel;
