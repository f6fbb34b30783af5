//! Line-oriented command shell over [`CircleClient`].

use domain::errors::{CircleError, CircleResult};
use chrono::Utc;
use domain::models::{format_last_seen, BatteryBand, BatterySnapshot, Circle, Coordinates};
use shared::join_code::normalize_join_code;
use std::fmt::Write as _;
use thiserror::Error;

use crate::client::CircleClient;

pub const HELP: &str = "\
commands:
  signin [name]              sign in, optionally with a display name
  signout                    sign out and clear the stored session
  whoami                     show the signed-in identity
  create <name>              create a circle and print its join code
  join <code>                join a circle by code
  circles                    list your circles (* marks the active one)
  use [circle-id]            select the active circle (no id clears it)
  locate <lat> <lng>         publish a location to the active circle
  battery <level> <charging> publish a battery snapshot (level 0-100)
  track | untrack            start or stop sensor-driven presence updates
  sos | confirm | decline | cancel
  status                     show session, circle and SOS state
  help | quit";

/// Parsed shell command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SignIn(Option<String>),
    SignOut,
    WhoAmI,
    Create(String),
    Join(String),
    Circles,
    Use(Option<String>),
    Locate { latitude: f64, longitude: f64 },
    Battery { level: i32, charging: bool },
    Track,
    Untrack,
    Sos,
    Confirm,
    Decline,
    Cancel,
    Status,
    Help,
    Quit,
}

/// Shell input errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0} (try 'help')")]
    UnknownCommand(String),

    #[error("{command}: missing {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("invalid {argument}: {value}")]
    InvalidArgument {
        argument: &'static str,
        value: String,
    },
}

/// Result of running one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue(String),
    Quit,
}

fn rest(line: &str, command: &str) -> Option<String> {
    let rest = line.trim_start()[command.len()..].trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

fn number<T: std::str::FromStr>(
    value: Option<&str>,
    command: &'static str,
    argument: &'static str,
) -> Result<T, ShellError> {
    let value = value.ok_or(ShellError::MissingArgument { command, argument })?;
    value.parse().map_err(|_| ShellError::InvalidArgument {
        argument,
        value: value.to_string(),
    })
}

fn flag(value: Option<&str>) -> Result<bool, ShellError> {
    let value = value.ok_or(ShellError::MissingArgument {
        command: "battery",
        argument: "charging flag",
    })?;
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "charging" => Ok(true),
        "false" | "no" | "n" | "0" | "unplugged" => Ok(false),
        _ => Err(ShellError::InvalidArgument {
            argument: "charging flag",
            value: value.to_string(),
        }),
    }
}

/// Parse one input line.
pub fn parse(line: &str) -> Result<Command, ShellError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err(ShellError::Empty);
    };

    let command = match head.to_ascii_lowercase().as_str() {
        "signin" => Command::SignIn(rest(line, head)),
        "signout" => Command::SignOut,
        "whoami" => Command::WhoAmI,
        "create" => Command::Create(rest(line, head).ok_or(ShellError::MissingArgument {
            command: "create",
            argument: "circle name",
        })?),
        "join" => {
            let code = words.next().ok_or(ShellError::MissingArgument {
                command: "join",
                argument: "code",
            })?;
            Command::Join(normalize_join_code(code))
        }
        "circles" => Command::Circles,
        "use" => Command::Use(words.next().map(str::to_string)),
        "locate" => Command::Locate {
            latitude: number(words.next(), "locate", "latitude")?,
            longitude: number(words.next(), "locate", "longitude")?,
        },
        "battery" => Command::Battery {
            level: number(words.next(), "battery", "level")?,
            charging: flag(words.next())?,
        },
        "track" => Command::Track,
        "untrack" => Command::Untrack,
        "sos" => Command::Sos,
        "confirm" => Command::Confirm,
        "decline" => Command::Decline,
        "cancel" => Command::Cancel,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ShellError::UnknownCommand(other.to_string())),
    };
    Ok(command)
}

fn describe_circle(out: &mut String, circle: &Circle, active: bool) {
    let _ = writeln!(
        out,
        "{} {}  {}  code={}  members={}",
        if active { "*" } else { " " },
        circle.id,
        circle.name,
        circle.code,
        circle.member_count()
    );
}

fn status(client: &CircleClient) -> String {
    let mut out = String::new();
    match client.session().current_identity() {
        Some(identity) => {
            let _ = writeln!(
                out,
                "signed in as {} ({})",
                identity.member_name(client.fallback_name()),
                identity.id
            );
        }
        None => out.push_str("signed out\n"),
    }

    let directory = client.directory().state();
    if directory.loading {
        out.push_str("circles: loading\n");
    }
    if let Some(error) = &directory.last_error {
        let _ = writeln!(out, "circles: stale ({})", error);
    }
    match directory.active_circle() {
        Some(circle) => {
            let _ = writeln!(out, "active circle: {} ({})", circle.name, circle.id);
            let now = Utc::now();
            for member in &circle.members {
                let location = member
                    .location
                    .map(|l| {
                        format!(
                            "{:.5},{:.5} @ {}",
                            l.latitude,
                            l.longitude,
                            l.timestamp.to_rfc3339()
                        )
                    })
                    .unwrap_or_else(|| "-".to_string());
                let battery = member
                    .battery
                    .map(|b| {
                        let charging = if b.is_charging { " charging" } else { "" };
                        let band = match b.band() {
                            BatteryBand::Critical => " (critical)",
                            BatteryBand::Low => " (low)",
                            BatteryBand::Normal => "",
                        };
                        format!("{}%{}{}", b.level, charging, band)
                    })
                    .unwrap_or_else(|| "-".to_string());
                let _ = writeln!(
                    out,
                    "  {}  {}  last seen {}  location={}  battery={}",
                    member.name,
                    if member.online() { "online" } else { "offline" },
                    format_last_seen(member.last_seen, now),
                    location,
                    battery
                );
            }
        }
        None => out.push_str("active circle: none\n"),
    }

    let _ = writeln!(
        out,
        "tracking: {}",
        if client.is_tracking() { "on" } else { "off" }
    );
    let _ = write!(out, "sos: {}", client.sos().state());
    out
}

/// Run one command against the client.
pub async fn execute(client: &CircleClient, command: Command) -> CircleResult<Outcome> {
    let text = match command {
        Command::SignIn(name) => {
            let identity = client.sign_in(name).await;
            format!("signed in as {}", identity.id)
        }
        Command::SignOut => match client.sign_out().await {
            Some(identity) => format!("signed out {}", identity.id),
            None => "not signed in".to_string(),
        },
        Command::WhoAmI => match client.session().current_identity() {
            Some(identity) => format!(
                "{} ({})",
                identity.member_name(client.fallback_name()),
                identity.id
            ),
            None => "not signed in".to_string(),
        },
        Command::Create(name) => {
            let code = client.membership().create_circle(&name).await?;
            format!("created circle '{}' with code {}", name.trim(), code)
        }
        Command::Join(code) => {
            let circle_id = client.membership().join_circle(&code).await?;
            format!("joined circle {}", circle_id)
        }
        Command::Circles => {
            let state = client.directory().state();
            if state.circles.is_empty() {
                "no circles".to_string()
            } else {
                let mut out = String::new();
                for circle in &state.circles {
                    let active = state.active_circle_id.as_deref() == Some(circle.id.as_str());
                    describe_circle(&mut out, circle, active);
                }
                out.trim_end().to_string()
            }
        }
        Command::Use(circle_id) => {
            client.directory().set_active_circle(circle_id.as_deref())?;
            match circle_id {
                Some(id) => format!("active circle is now {}", id),
                None => "active circle cleared".to_string(),
            }
        }
        Command::Locate {
            latitude,
            longitude,
        } => {
            let stamp = client
                .presence()
                .update_member_location(Coordinates::new(latitude, longitude))
                .await?;
            format!("location published at {}", stamp.timestamp.to_rfc3339())
        }
        Command::Battery { level, charging } => {
            let snapshot = BatterySnapshot::new(level, charging).map_err(CircleError::from)?;
            client.presence().update_member_battery(snapshot).await?;
            format!("battery {}% published", snapshot.level)
        }
        Command::Track => {
            client.start_tracking().await?;
            "tracking started".to_string()
        }
        Command::Untrack => {
            if client.stop_tracking() {
                "tracking stopped".to_string()
            } else {
                "tracking was not running".to_string()
            }
        }
        Command::Sos => {
            client.sos().request()?;
            "send an emergency alert to your circle? (confirm / decline)".to_string()
        }
        Command::Confirm => {
            let state = client.sos().confirm()?;
            format!("SOS {}; 'cancel' to abort", state)
        }
        Command::Decline => {
            client.sos().decline()?;
            "SOS declined".to_string()
        }
        Command::Cancel => {
            if client.sos().cancel() {
                "SOS cancelled".to_string()
            } else {
                "nothing to cancel".to_string()
            }
        }
        Command::Status => status(client),
        Command::Help => HELP.to_string(),
        Command::Quit => return Ok(Outcome::Quit),
    };
    Ok(Outcome::Continue(text))
}
