pub mod commands;
pub mod error;
pub mod icon;
pub mod topics;

pub use commands::*;
pub use error::{CommandError, IconError};
pub use icon::{map_icon_to_payload, IconCategory, IconPayload};
pub use topics::*;
