use glam::Vec3;
use modelview_common::SceneParams;
use std::str::FromStr;

/// Command list printed by `help`.
pub const HELP: &str = "\
Commands:
    scale <factor>           scale the model (factor > 0)
    rotationx <degrees>      rotate the model about the x axis
    rotationy <degrees>      rotate the model about the y axis
    rotationz <degrees>      rotate the model about the z axis
    alight <intensity>       ambient light intensity in [0, 1]
    movel <x> <y> <z>        move the point light
    help                     print this list
    cls                      clear the console";

/// A parsed console line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneCommand {
    Scale(f32),
    /// Replaces the model rotation; earlier rotations do not accumulate.
    Rotate { axis: Vec3, degrees: f32 },
    AmbientLight(f32),
    MoveLight(Vec3),
    Help,
    Clear,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConsoleError {
    #[error("empty command")]
    Empty,
    #[error("command not found: {0}")]
    Unknown(String),
    #[error("{command} expects {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("{command}: `{value}` is not a number")]
    InvalidNumber { command: &'static str, value: String },
    #[error("{command}: {value} is out of range, expected {range}")]
    OutOfRange {
        command: &'static str,
        value: f32,
        range: &'static str,
    },
    #[error("{command}: unexpected argument `{extra}`")]
    TrailingArgument { command: &'static str, extra: String },
}

struct Args<'a> {
    command: &'static str,
    expected: &'static str,
    words: std::str::SplitWhitespace<'a>,
}

impl Args<'_> {
    fn number<T: FromStr>(&mut self) -> Result<T, ConsoleError> {
        let word = self.words.next().ok_or(ConsoleError::MissingArgument {
            command: self.command,
            expected: self.expected,
        })?;
        word.parse().map_err(|_| ConsoleError::InvalidNumber {
            command: self.command,
            value: word.to_owned(),
        })
    }

    fn finite(&mut self) -> Result<f32, ConsoleError> {
        let value: f32 = self.number()?;
        if !value.is_finite() {
            return Err(ConsoleError::OutOfRange {
                command: self.command,
                value,
                range: "a finite number",
            });
        }
        Ok(value)
    }

    fn finish(mut self) -> Result<(), ConsoleError> {
        match self.words.next() {
            Some(extra) => Err(ConsoleError::TrailingArgument {
                command: self.command,
                extra: extra.to_owned(),
            }),
            None => Ok(()),
        }
    }
}

/// Parses one console line. Commands are case-insensitive and take their
/// arguments on the same line.
pub fn parse_command(line: &str) -> Result<SceneCommand, ConsoleError> {
    let mut words = line.split_whitespace();
    let name = words.next().ok_or(ConsoleError::Empty)?.to_ascii_lowercase();
    let (command, expected) = match name.as_str() {
        "scale" => ("scale", "a scale factor"),
        "rotationx" => ("rotationx", "an angle in degrees"),
        "rotationy" => ("rotationy", "an angle in degrees"),
        "rotationz" => ("rotationz", "an angle in degrees"),
        "alight" => ("alight", "an intensity between 0 and 1"),
        "movel" => ("movel", "three coordinates x y z"),
        "help" => ("help", "no arguments"),
        "cls" => ("cls", "no arguments"),
        _ => return Err(ConsoleError::Unknown(name)),
    };
    let mut args = Args {
        command,
        expected,
        words,
    };

    let parsed = match command {
        "scale" => {
            let factor: f32 = args.number()?;
            if !(factor > 0.0 && factor.is_finite()) {
                return Err(ConsoleError::OutOfRange {
                    command,
                    value: factor,
                    range: "a positive number",
                });
            }
            SceneCommand::Scale(factor)
        }
        "rotationx" | "rotationy" | "rotationz" => {
            let axis = match command {
                "rotationx" => Vec3::X,
                "rotationy" => Vec3::Y,
                _ => Vec3::Z,
            };
            SceneCommand::Rotate {
                axis,
                degrees: args.finite()?,
            }
        }
        "alight" => {
            let intensity: f32 = args.number()?;
            if !(0.0..=1.0).contains(&intensity) {
                return Err(ConsoleError::OutOfRange {
                    command,
                    value: intensity,
                    range: "[0, 1]",
                });
            }
            SceneCommand::AmbientLight(intensity)
        }
        "movel" => SceneCommand::MoveLight(Vec3::new(
            args.finite()?,
            args.finite()?,
            args.finite()?,
        )),
        "help" => SceneCommand::Help,
        _ => SceneCommand::Clear,
    };
    args.finish()?;
    Ok(parsed)
}

impl SceneCommand {
    /// Applies the command to `params`. `help` and `cls` change nothing.
    pub fn apply(&self, params: &mut SceneParams) {
        match *self {
            SceneCommand::Scale(factor) => params.model_scale = factor,
            SceneCommand::Rotate { axis, degrees } => {
                params.rotation_axis = axis;
                params.rotation_degrees = degrees;
            }
            SceneCommand::AmbientLight(intensity) => params.ambient_intensity = intensity,
            SceneCommand::MoveLight(position) => params.light_position = position,
            SceneCommand::Help | SceneCommand::Clear => {}
        }
    }

    /// One-line confirmation for the console.
    pub fn describe(&self) -> String {
        match self {
            SceneCommand::Scale(factor) => format!("scaling model: {factor}"),
            SceneCommand::Rotate { axis, degrees } => {
                format!("rotating model {degrees} degrees about ({axis})")
            }
            SceneCommand::AmbientLight(intensity) => {
                format!("ambient light changed to {intensity}")
            }
            SceneCommand::MoveLight(p) => format!("moving light to ({}, {}, {})", p.x, p.y, p.z),
            SceneCommand::Help => HELP.to_owned(),
            SceneCommand::Clear => String::new(),
        }
    }
}
