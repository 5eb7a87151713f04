//! `trickle_shared`
//!
//! Shared libraries used by the client core and its tests.
//!
//! Design goals:
//! - The wire format lives in one place (`net`) and is explicit.
//! - Event kinds are a closed set; unknown kinds never break decoding.
//! - Traits at the collaborator seams (authentication).
//! - No `unsafe`.

pub mod auth;
pub mod config;
pub mod event;
pub mod math;
pub mod net;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::auth::*;
    pub use crate::config::*;
    pub use crate::event::*;
    pub use crate::math::*;
    pub use crate::net::*;
}
