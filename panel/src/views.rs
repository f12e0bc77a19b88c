use std::fmt::Write as _;

use climate_panel_common::{FanLevel, PowerState};

use crate::store::TemperatureEntry;

const EMPTY_LOG_TEMP: &str = "25";
const EMPTY_LOG_STAMP: &str = "data unavailable";

/// Snapshot of the control state taken under the lock.
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub power: PowerState,
    pub target_temp: i32,
    pub fan_level: FanLevel,
    pub elapsed_on: String,
    pub last_seen: String,
}

pub fn dashboard(
    view: &DashboardView,
    entries: &[TemperatureEntry],
    flashes: &[String],
    logged_in: bool,
) -> String {
    let (room_temp, room_stamp) = match entries.first() {
        Some(entry) => (entry.temperature.to_string(), entry.timestamp.clone()),
        None => (EMPTY_LOG_TEMP.to_string(), EMPTY_LOG_STAMP.to_string()),
    };

    let mut body = String::new();
    let _ = write!(
        body,
        r#"<div class="status">
  <p>Room temperature: <strong>{room_temp}&deg;C</strong> <span class="muted">({room_stamp})</span></p>
  <p>System: <strong>{power}</strong> &middot; Target: <strong>{target}&deg;C</strong> &middot; Fan: <strong>{fan}</strong></p>
  <p>On time: {elapsed}</p>
  <p class="muted">Device last seen: {last_seen}</p>
</div>
"#,
        room_temp = escape(&room_temp),
        room_stamp = escape(&room_stamp),
        power = view.power,
        target = view.target_temp,
        fan = view.fan_level.label(),
        elapsed = escape(&view.elapsed_on),
        last_seen = escape(&view.last_seen),
    );

    if logged_in {
        let checked = if view.power.is_on() { " checked" } else { "" };
        let _ = write!(
            body,
            r#"<form action="/poststate" method="post" class="controls">
  <label><input type="checkbox" name="onoffswitch"{checked}> System on</label>
  <label>Temperature <input type="number" name="temperature" min="10" max="29" value="{target}"></label>
  <label>Fan <select name="fan">{fan_options}</select></label>
  <button type="submit">Set</button>
</form>
"#,
            target = view.target_temp,
            fan_options = fan_options(view.fan_level),
        );
    }

    body.push_str("<table class=\"entries\">\n<tr><th>Time</th><th>Temperature</th></tr>\n");
    if entries.is_empty() {
        body.push_str("<tr><td colspan=\"2\"><em>No readings yet.</em></td></tr>\n");
    }
    for entry in entries {
        let _ = writeln!(
            body,
            "<tr id=\"entry-{}\"><td>{}</td><td>{}&deg;C</td></tr>",
            entry.id,
            escape(&entry.timestamp),
            entry.temperature
        );
    }
    body.push_str("</table>\n");

    layout(&body, flashes, logged_in)
}

pub fn login(error: Option<&str>, flashes: &[String]) -> String {
    let mut body = String::new();
    if let Some(error) = error {
        let _ = writeln!(body, r#"<p class="error"><strong>Error:</strong> {}</p>"#, escape(error));
    }
    body.push_str(
        r#"<form action="/login" method="post" class="login">
  <label>Username <input type="text" name="username"></label>
  <label>Password <input type="password" name="password"></label>
  <button type="submit">Login</button>
</form>
"#,
    );
    layout(&body, flashes, false)
}

fn fan_options(selected: FanLevel) -> String {
    let mut options = String::new();
    for level in FanLevel::ALL {
        let marker = if level == selected { " selected" } else { "" };
        let _ = write!(
            options,
            r#"<option value="{}"{marker}>{}</option>"#,
            level.index(),
            level.label()
        );
    }
    options
}

fn layout(body: &str, flashes: &[String], logged_in: bool) -> String {
    let nav = if logged_in {
        r#"<a href="/logout">log out</a>"#
    } else {
        r#"<a href="/login">log in</a>"#
    };

    let mut notices = String::new();
    for message in flashes {
        let _ = writeln!(notices, r#"<div class="flash">{}</div>"#, escape(message));
    }

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>AC Remote</title>
  <link rel="stylesheet" href="/static/style.css">
</head>
<body>
<div class="page">
  <h1>AC Remote</h1>
  <div class="nav">{nav}</div>
{notices}{body}</div>
</body>
</html>
"#
    )
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
