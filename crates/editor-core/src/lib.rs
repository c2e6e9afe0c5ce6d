mod autosave;
mod block_picker;
mod config;
mod core;
mod forms;
mod markup;
mod normalize;
mod ops;
mod plugin;
pub mod plugins;
mod render;
mod serde_value;
mod serialize;
mod transforms;

pub use crate::autosave::*;
pub use crate::block_picker::*;
pub use crate::config::*;
pub use crate::core::*;
pub use crate::forms::*;
pub use crate::markup::*;
pub use crate::normalize::*;
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::render::*;
pub use crate::serde_value::*;
pub use crate::serialize::*;
pub use crate::transforms::*;
