//! Input handling: platform key and cursor events become per-frame camera
//! [`Action`]s and a [`SceneParams`] value; console lines become
//! [`SceneCommand`]s that edit the same value.
//!
//! # Invariants
//! - Nothing here touches the camera or the GPU; the frame loop consumes
//!   what [`InputState::end_frame`] returns.
//! - Scene parameters only change through key presses and applied commands.

mod console;
mod keys;

pub use console::{ConsoleError, HELP, SceneCommand, parse_command};
pub use keys::{FrameInput, InputState, Key};

pub use modelview_common::{Action, SceneParams};
