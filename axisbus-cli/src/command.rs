use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use axisbus_controller::{MoveCommand, MoveKind};

#[derive(Debug, Parser)]
pub struct Cli {
    /// The CAN socket to connect to (e.g. 'can0' or 'vcan0')
    pub socket: String,
    /// Controller configuration TOML file; defaults are used when omitted
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Give up waiting for the reply after this many seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Zero-initialize all axes, or a single one
    Zei(ZeiArgs),
    /// Move all axes together
    Move(MoveArgs),
    /// Print the alive and initialization status of all axes
    Status,
}

#[derive(Debug, Args)]
pub struct ZeiArgs {
    /// Initialize only this node
    #[arg(short, long)]
    pub node: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MoveKindArg {
    /// Move to absolute positions
    Abs,
    /// Move relative to the current positions
    Rel,
}

impl From<MoveKindArg> for MoveKind {
    fn from(value: MoveKindArg) -> Self {
        match value {
            MoveKindArg::Abs => MoveKind::Absolute,
            MoveKindArg::Rel => MoveKind::Relative,
        }
    }
}

#[derive(Debug, Args)]
pub struct MoveArgs {
    #[arg(short, long, value_enum, default_value_t = MoveKindArg::Abs)]
    pub kind: MoveKindArg,
    /// Lead axis speed in units/s
    #[arg(short, long)]
    pub speed: f64,
    /// Lead axis acceleration in units/s²
    #[arg(short, long)]
    pub accel: f64,
    /// One position or displacement per axis, in node order
    #[arg(required = true, allow_negative_numbers = true)]
    pub units: Vec<f64>,
}

impl MoveArgs {
    pub fn to_command(&self) -> MoveCommand {
        MoveCommand {
            kind: self.kind.into(),
            movement_units: self.units.clone(),
            speed: self.speed,
            acceleration: self.accel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move() {
        let cli = Cli::try_parse_from([
            "axisbus", "can0", "move", "--kind", "rel", "--speed", "90", "--accel", "180", "45",
            "-10", "0",
        ])
        .unwrap();
        assert_eq!("can0", cli.socket);
        let Commands::Move(args) = cli.command else {
            panic!("Expected move command");
        };
        let cmd = args.to_command();
        assert_eq!(MoveKind::Relative, cmd.kind);
        assert_eq!(vec![45.0, -10.0, 0.0], cmd.movement_units);
        assert_eq!(90.0, cmd.speed);
        assert_eq!(180.0, cmd.acceleration);
    }

    #[test]
    fn test_parse_zei() {
        let cli = Cli::try_parse_from(["axisbus", "-c", "axes.toml", "vcan0", "zei", "--node", "2"])
            .unwrap();
        assert_eq!(Some(PathBuf::from("axes.toml")), cli.config);
        assert!(matches!(cli.command, Commands::Zei(ZeiArgs { node: Some(2) })));

        let cli = Cli::try_parse_from(["axisbus", "vcan0", "zei"]).unwrap();
        assert!(matches!(cli.command, Commands::Zei(ZeiArgs { node: None })));
    }

    #[test]
    fn test_move_requires_values() {
        assert!(Cli::try_parse_from(["axisbus", "can0", "move", "--speed", "1", "--accel", "1"]).is_err());
    }
}
