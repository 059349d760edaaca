use glam::{Mat4, Vec3};
use modelview_common::{Action, Movement};
use serde::{Deserialize, Serialize};

pub const LOOK_SENSITIVITY: f32 = 0.1;
/// World units per second.
pub const MOVE_SPEED: f32 = 2.5;
/// Pitch stays strictly inside ±90° so the view never flips.
pub const PITCH_LIMIT: f32 = 89.0;

/// Offset between the stored yaw and the heading angle measured from +X.
const HEADING_OFFSET: f32 = 90.0;

/// Whether a look event has been seen yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LookState {
    /// The next look event only records the cursor position.
    Uninitialized,
    Tracking { last_x: f32, last_y: f32 },
}

/// First-person yaw/pitch camera driven by cursor deltas and movement keys.
///
/// Yaw is in degrees and unbounded; pitch is clamped to [`PITCH_LIMIT`]. The
/// front vector is always unit length and consistent with yaw and pitch once
/// tracking has started.
#[derive(Debug, Clone)]
pub struct OrientationCamera {
    pub position: Vec3,
    yaw: f32,
    pitch: f32,
    front: Vec3,
    world_up: Vec3,
    pub speed: f32,
    pub sensitivity: f32,
    look: LookState,
}

impl OrientationCamera {
    /// Camera at `position` facing `target`.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let front = (target - position).try_normalize().unwrap_or(Vec3::NEG_Z);
        let (yaw, pitch) = yaw_pitch_from_front(front);
        Self {
            position,
            yaw,
            pitch,
            front,
            world_up: Vec3::Y,
            speed: MOVE_SPEED,
            sensitivity: LOOK_SENSITIVITY,
            look: LookState::Uninitialized,
        }
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn look_state(&self) -> LookState {
        self.look
    }

    pub fn right(&self) -> Vec3 {
        self.front
            .cross(self.world_up)
            .try_normalize()
            .unwrap_or(Vec3::X)
    }

    pub fn up(&self) -> Vec3 {
        self.right().cross(self.front).normalize()
    }

    /// Handles an absolute cursor position.
    ///
    /// The first event re-derives yaw and pitch from the current front vector
    /// and records the cursor; the camera does not turn. Later events turn by
    /// the cursor delta times the sensitivity, with screen-space y inverted.
    pub fn process_look(&mut self, x: f32, y: f32) {
        match self.look {
            LookState::Uninitialized => {
                let (yaw, pitch) = yaw_pitch_from_front(self.front);
                self.yaw = yaw;
                self.pitch = pitch;
            }
            LookState::Tracking { last_x, last_y } => {
                let dx = (x - last_x) * self.sensitivity;
                let dy = (last_y - y) * self.sensitivity;
                self.yaw += dx;
                self.pitch = (self.pitch + dy).clamp(-PITCH_LIMIT, PITCH_LIMIT);
                self.front = front_from_yaw_pitch(self.yaw, self.pitch);
            }
        }
        self.look = LookState::Tracking {
            last_x: x,
            last_y: y,
        };
    }

    /// Moves `speed * dt` units along the front or right vector.
    pub fn process_movement(&mut self, movement: Movement, dt: f32) {
        let step = self.speed * dt;
        match movement {
            Movement::Forward => self.position += self.front * step,
            Movement::Backward => self.position -= self.front * step,
            Movement::StrafeLeft => self.position -= self.right() * step,
            Movement::StrafeRight => self.position += self.right() * step,
        }
    }

    pub fn apply(&mut self, action: &Action, dt: f32) {
        match *action {
            Action::Move(movement) => self.process_movement(movement, dt),
            Action::Look { x, y } => self.process_look(x, y),
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up())
    }
}

fn yaw_pitch_from_front(front: Vec3) -> (f32, f32) {
    let yaw = front.z.atan2(front.x).to_degrees() - HEADING_OFFSET;
    let pitch = front
        .y
        .clamp(-1.0, 1.0)
        .asin()
        .to_degrees()
        .clamp(-PITCH_LIMIT, PITCH_LIMIT);
    (yaw, pitch)
}

fn front_from_yaw_pitch(yaw: f32, pitch: f32) -> Vec3 {
    let heading = (yaw + HEADING_OFFSET).to_radians();
    let pitch = pitch.to_radians();
    Vec3::new(
        heading.cos() * pitch.cos(),
        pitch.sin(),
        heading.sin() * pitch.cos(),
    )
    .normalize()
}

/// Perspective projection parameters. The matrix is built once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    pub fn new(fov_y_degrees: f32, width: u32, height: u32, near: f32, far: f32) -> Self {
        Self {
            fov_y_degrees,
            aspect: width as f32 / height.max(1) as f32,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_degrees.to_radians(), self.aspect, self.near, self.far)
    }
}
