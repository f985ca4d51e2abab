//! Admin command line parsing
//!
//! A line is split on whitespace and parsed with clap into an
//! [`AdminCommand`] completely before anything runs, so a bad line never
//! half-executes. The first two words are command keywords and match
//! case-insensitively.

use crate::contract::{CaptureZonesError, DataValue, Geometry, Position};
use clap::{Parser, Subcommand, ValueEnum};

/// `<id>` or the literal `all`
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    One(String),
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReloadTarget {
    All,
    Lang,
    Zone(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    ZoneCreate {
        id: String,
        world: String,
        geometry: Geometry,
        reward: Option<f64>,
    },
    ZoneDelete { id: String },
    ZoneType { id: String, zone_type: String },
    ZoneActive { id: String, active: bool },
    ZoneLimits { id: String, min: i32, max: i32 },
    CaptureForce { id: String, player: String },
    CaptureStop { id: String, reason: String },
    CaptureReset { target: Target },
    KothStart { ids: Vec<String>, announce: bool },
    KothStop { target: Target, reason: String },
    KothAssign { id: String, assign: bool },
    ShopRestock { id: String },
    ShopEnable { id: String, enabled: bool },
    ShopReload,
    ConfigSetGlobal { path: String, value: DataValue },
    ConfigSetZone { zone: String, path: String, value: DataValue },
    ConfigReset { zone: String, path: Option<String> },
    ConfigRepair { exact: bool },
    Reload(ReloadTarget),
    StatsRemove { player: String },
    StatsReset,
}

pub const DEFAULT_STOP_REASON: &str = "admin";
pub const DEFAULT_KOTH_STOP_REASON: &str = "manual";

/// Program name shown in usage lines
const COMMAND_NAME: &str = "cz";

// ===== Grammar =====

/// Capture zones admin commands.
#[derive(Parser, Debug)]
#[command(name = "cz", disable_help_subcommand = true)]
struct CommandLine {
    #[command(subcommand)]
    group: Group,
}

#[derive(Subcommand, Debug)]
enum Group {
    /// Zone definitions.
    #[command(subcommand)]
    Zone(ZoneAction),
    /// Capture state of one zone or all of them.
    #[command(subcommand)]
    Capture(CaptureAction),
    /// King-of-the-hill session.
    #[command(subcommand)]
    Koth(KothAction),
    /// Zone shops.
    #[command(subcommand)]
    Shop(ShopAction),
    /// Global values and zone overrides.
    #[command(subcommand)]
    Config(ConfigAction),
    /// Re-read data files.
    Reload {
        #[command(subcommand)]
        target: Option<ReloadAction>,
    },
    /// Player statistics.
    #[command(subcommand)]
    Stats(StatsAction),
}

#[derive(Subcommand, Debug)]
enum ZoneAction {
    /// Create a zone.
    Create {
        id: String,
        world: String,
        shape: Shape,
        /// point: X Y Z RADIUS [REWARD]; cuboid: X1 Y1 Z1 X2 Y2 Z2 [REWARD]
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<f64>,
    },
    /// Delete a zone.
    Delete { id: String },
    /// Set the zone type.
    Type { id: String, zone_type: String },
    /// Enable or disable contests.
    Active {
        id: String,
        #[arg(ignore_case = true)]
        state: Switch,
    },
    /// Set player limits.
    Limits {
        id: String,
        #[arg(allow_negative_numbers = true)]
        min: i32,
        #[arg(allow_negative_numbers = true)]
        max: i32,
    },
}

#[derive(Subcommand, Debug)]
enum CaptureAction {
    /// Capture a zone for a player.
    Force { id: String, player: String },
    /// Stop the contest or capture of a zone.
    Stop {
        id: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        reason: Vec<String>,
    },
    /// Return a zone, or `all`, to IDLE.
    Reset { target: String },
}

#[derive(Subcommand, Debug)]
enum KothAction {
    /// Add comma-separated zones to the session.
    Start {
        ids: String,
        #[arg(ignore_case = true)]
        mode: Option<StartMode>,
    },
    /// Remove a member, or `all`.
    Stop {
        target: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        reason: Vec<String>,
    },
    /// Add or remove one zone.
    Assign {
        id: String,
        #[arg(ignore_case = true)]
        state: Switch,
    },
}

#[derive(Subcommand, Debug)]
enum ShopAction {
    /// Restock a shop.
    Restock { id: String },
    /// Enable a shop.
    Enable { id: String },
    /// Disable a shop.
    Disable { id: String },
    /// Rebuild every catalog from config.
    Reload,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Set a value on `global` or a zone.
    Set {
        scope: String,
        path: String,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Remove one override, or every override of a zone.
    Reset { zone: String, path: Option<String> },
    /// Fix values that break the schema.
    Repair {
        #[arg(ignore_case = true)]
        mode: Option<RepairMode>,
    },
}

#[derive(Subcommand, Debug)]
enum ReloadAction {
    /// Config, zones, shops and statistics.
    All,
    /// Message templates.
    Lang,
    /// One zone's overrides.
    Zone { id: String },
}

#[derive(Subcommand, Debug)]
enum StatsAction {
    /// Forget one player.
    Remove { player: String },
    /// Forget every player.
    Reset,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq)]
enum Shape {
    Point,
    Cuboid,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq)]
enum Switch {
    #[value(aliases = ["true", "yes", "enable"])]
    On,
    #[value(aliases = ["false", "no", "disable"])]
    Off,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq)]
enum StartMode {
    Silent,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq)]
enum RepairMode {
    Exact,
}

fn invalid(message: impl Into<String>) -> CaptureZonesError {
    CaptureZonesError::InvalidCommand {
        message: message.into(),
    }
}

/// Error and usage lines of a clap error, without the help hint
fn clap_message(error: &clap::Error) -> String {
    error
        .render()
        .to_string()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("For more information"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse one admin command line
pub fn parse_command(line: &str) -> Result<AdminCommand, CaptureZonesError> {
    let words: Vec<String> = line
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| if i < 2 { word.to_ascii_lowercase() } else { word.to_string() })
        .collect();
    let parsed = CommandLine::try_parse_from(std::iter::once(COMMAND_NAME.to_string()).chain(words))
        .map_err(|e| invalid(clap_message(&e)))?;
    parsed.group.into_command()
}

impl Group {
    fn into_command(self) -> Result<AdminCommand, CaptureZonesError> {
        let command = match self {
            Group::Zone(action) => match action {
                ZoneAction::Create {
                    id,
                    world,
                    shape,
                    values,
                } => {
                    let (geometry, reward) = geometry_from(shape, &values)?;
                    AdminCommand::ZoneCreate {
                        id,
                        world,
                        geometry,
                        reward,
                    }
                }
                ZoneAction::Delete { id } => AdminCommand::ZoneDelete { id },
                ZoneAction::Type { id, zone_type } => AdminCommand::ZoneType { id, zone_type },
                ZoneAction::Active { id, state } => AdminCommand::ZoneActive {
                    id,
                    active: state == Switch::On,
                },
                ZoneAction::Limits { id, min, max } => AdminCommand::ZoneLimits { id, min, max },
            },
            Group::Capture(action) => match action {
                CaptureAction::Force { id, player } => AdminCommand::CaptureForce { id, player },
                CaptureAction::Stop { id, reason } => AdminCommand::CaptureStop {
                    id,
                    reason: reason_or(reason, DEFAULT_STOP_REASON),
                },
                CaptureAction::Reset { target } => AdminCommand::CaptureReset {
                    target: parse_target(&target),
                },
            },
            Group::Koth(action) => match action {
                KothAction::Start { ids, mode } => {
                    let ids: Vec<String> = ids
                        .split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect();
                    if ids.is_empty() {
                        return Err(invalid("koth start needs at least one zone id"));
                    }
                    AdminCommand::KothStart {
                        ids,
                        announce: mode != Some(StartMode::Silent),
                    }
                }
                KothAction::Stop { target, reason } => AdminCommand::KothStop {
                    target: parse_target(&target),
                    reason: reason_or(reason, DEFAULT_KOTH_STOP_REASON),
                },
                KothAction::Assign { id, state } => AdminCommand::KothAssign {
                    id,
                    assign: state == Switch::On,
                },
            },
            Group::Shop(action) => match action {
                ShopAction::Restock { id } => AdminCommand::ShopRestock { id },
                ShopAction::Enable { id } => AdminCommand::ShopEnable { id, enabled: true },
                ShopAction::Disable { id } => AdminCommand::ShopEnable { id, enabled: false },
                ShopAction::Reload => AdminCommand::ShopReload,
            },
            Group::Config(action) => match action {
                ConfigAction::Set { scope, path, value } => {
                    let value = parse_value(&value.join(" "));
                    if scope.eq_ignore_ascii_case("global") {
                        AdminCommand::ConfigSetGlobal { path, value }
                    } else {
                        AdminCommand::ConfigSetZone {
                            zone: scope,
                            path,
                            value,
                        }
                    }
                }
                ConfigAction::Reset { zone, path } => AdminCommand::ConfigReset { zone, path },
                ConfigAction::Repair { mode } => AdminCommand::ConfigRepair {
                    exact: mode == Some(RepairMode::Exact),
                },
            },
            Group::Reload { target } => AdminCommand::Reload(match target {
                None | Some(ReloadAction::All) => ReloadTarget::All,
                Some(ReloadAction::Lang) => ReloadTarget::Lang,
                Some(ReloadAction::Zone { id }) => ReloadTarget::Zone(id),
            }),
            Group::Stats(action) => match action {
                StatsAction::Remove { player } => AdminCommand::StatsRemove { player },
                StatsAction::Reset => AdminCommand::StatsReset,
            },
        };
        Ok(command)
    }
}

fn geometry_from(shape: Shape, values: &[f64]) -> Result<(Geometry, Option<f64>), CaptureZonesError> {
    if let Some(bad) = values.iter().find(|n| !n.is_finite()) {
        return Err(invalid(format!("coordinates must be finite, got {}", bad)));
    }
    match (shape, values) {
        (Shape::Point, [x, y, z, radius, rest @ ..]) if rest.len() <= 1 => {
            if radius.fract() != 0.0 || radius.abs() > f64::from(i32::MAX) {
                return Err(invalid(format!("<radius> must be a whole number of chunks, got {}", radius)));
            }
            let geometry = Geometry::Point {
                center: Position::new(*x, *y, *z),
                radius_chunks: *radius as i32,
            };
            Ok((geometry, rest.first().copied()))
        }
        (Shape::Cuboid, [x1, y1, z1, x2, y2, z2, rest @ ..]) if rest.len() <= 1 => {
            let geometry = Geometry::Cuboid {
                min: Position::new(*x1, *y1, *z1),
                max: Position::new(*x2, *y2, *z2),
            };
            Ok((geometry, rest.first().copied()))
        }
        (Shape::Point, _) => Err(invalid(format!(
            "point takes <x> <y> <z> <radius> [reward], got {} values",
            values.len()
        ))),
        (Shape::Cuboid, _) => Err(invalid(format!(
            "cuboid takes <x1> <y1> <z1> <x2> <y2> <z2> [reward], got {} values",
            values.len()
        ))),
    }
}

fn reason_or(words: Vec<String>, default: &str) -> String {
    if words.is_empty() {
        default.to_string()
    } else {
        words.join(" ")
    }
}

fn parse_target(token: &str) -> Target {
    if token.eq_ignore_ascii_case("all") {
        Target::All
    } else {
        Target::One(token.to_string())
    }
}

fn parse_number(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Typed config value from command text: bool, number, `[a,b]` list, else text
pub fn parse_value(raw: &str) -> DataValue {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return DataValue::Bool(true),
        "false" => return DataValue::Bool(false),
        _ => {}
    }
    if let Some(n) = parse_number(trimmed) {
        return DataValue::Number(n);
    }
    if let Some(inner) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        if inner.trim().is_empty() {
            return DataValue::List(Vec::new());
        }
        return DataValue::List(inner.split(',').map(parse_value).collect());
    }
    DataValue::Text(trimmed.to_string())
}
