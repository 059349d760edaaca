/// Direction of a discrete camera movement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Movement {
    Forward,
    Backward,
    StrafeLeft,
    StrafeRight,
}

/// A camera action produced by input handling for one frame.
///
/// The render core consumes actions, never raw platform events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Move one frame's worth of distance in a direction.
    Move(Movement),
    /// The cursor moved to an absolute position.
    Look { x: f32, y: f32 },
}
