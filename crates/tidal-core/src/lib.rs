#![allow(clippy::pedantic)]
#![allow(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

pub mod constants;
pub mod decode;
pub mod endpoint;
pub mod event;
pub mod frame;
pub mod notice;
pub mod parser;

pub use crate::constants::*;
pub use crate::decode::*;
pub use crate::endpoint::*;
pub use crate::event::*;
pub use crate::frame::*;
pub use crate::notice::*;
pub use crate::parser::*;
