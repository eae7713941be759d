//! Alert text rendering
//!
//! Missing status is rendered as "Unknown". It is never shown as a lift
//! being out of service.

use crate::domain::status::{LiftState, LiftStatus};
use crate::domain::types::{AlertMessage, Side};

const UNKNOWN_NOTICE: &str = "Lift status unknown: no data received yet.";
const STALE_NOTICE: &str = "Live updates are unavailable; this is the last known status.";

/// Title-case an identifier: "greenwich-north" -> "Greenwich North"
pub fn format_tunnel_name(raw: &str) -> String {
    raw.split(['-', '_', ' '])
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Display label for a tunnel on the status view: "Greenwich Foot Tunnel"
pub fn tunnel_label(tunnel_id: &str) -> String {
    format!("{} Foot Tunnel", format_tunnel_name(tunnel_id))
}

/// Build the notification for an entrance (or tunnel) label
///
/// `status` is None when the feed has not reported this tunnel.
pub fn format_alert(label: &str, status: Option<&LiftStatus>) -> AlertMessage {
    format_entrance_alert(label, None, status)
}

/// Like `format_alert`, leading with the lift on the entrance's own side
pub fn format_entrance_alert(
    label: &str,
    side: Option<Side>,
    status: Option<&LiftStatus>,
) -> AlertMessage {
    let title = format!("Approaching {} Foot Tunnel", format_tunnel_name(label));

    let lift = |s: Side| status.map_or(LiftState::Unknown, |status| status.side(s));
    let order = match side {
        Some(Side::South) => [Side::South, Side::North],
        _ => [Side::North, Side::South],
    };

    let mut lines = Vec::with_capacity(3);
    if status.is_none() {
        lines.push(UNKNOWN_NOTICE.to_string());
    }
    for s in order {
        let marker = if Some(s) == side { " (this side)" } else { "" };
        lines.push(format!("{} lift{marker}: {}", side_name(s), lift(s).label()));
    }

    AlertMessage { title, body: lines.join("\n") }
}

fn side_name(side: Side) -> &'static str {
    match side {
        Side::North => "North",
        Side::South => "South",
    }
}

/// Append the stale-data notice to an already formatted alert
pub fn mark_stale(mut message: AlertMessage) -> AlertMessage {
    message.body.push('\n');
    message.body.push_str(STALE_NOTICE);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tunnel_name() {
        assert_eq!(format_tunnel_name("greenwich-north"), "Greenwich North");
        assert_eq!(format_tunnel_name("woolwich"), "Woolwich");
        assert_eq!(format_tunnel_name("north_woolwich-pier"), "North Woolwich Pier");
        assert_eq!(format_tunnel_name("--odd--"), "Odd");
        assert_eq!(format_tunnel_name(""), "");
    }

    #[test]
    fn test_tunnel_label() {
        assert_eq!(tunnel_label("greenwich"), "Greenwich Foot Tunnel");
    }

    #[test]
    fn test_title_has_readable_name() {
        let message = format_alert("greenwich-north", None);
        assert_eq!(message.title, "Approaching Greenwich North Foot Tunnel");
        assert!(!message.title.contains('-'));
    }

    #[test]
    fn test_known_status_body() {
        let status = LiftStatus::new(LiftState::Working, LiftState::NotWorking);
        let message = format_alert("woolwich-south", Some(&status));
        assert_eq!(message.body, "North lift: Working\nSouth lift: Not working");
    }

    #[test]
    fn test_absent_status_is_unknown_not_closed() {
        let message = format_alert("greenwich-south", None);
        assert!(message.body.contains("North lift: Unknown"));
        assert!(message.body.contains("South lift: Unknown"));
        assert!(message.body.contains("unknown"));
        assert!(!message.body.contains("Not working"));
    }

    #[test]
    fn test_partially_reported_status() {
        let status = LiftStatus::new(LiftState::Working, LiftState::Unknown);
        let message = format_alert("greenwich-north", Some(&status));
        assert_eq!(message.body, "North lift: Working\nSouth lift: Unknown");
    }

    #[test]
    fn test_south_entrance_leads_with_south_lift() {
        let status = LiftStatus::new(LiftState::Working, LiftState::NotWorking);
        let message = format_entrance_alert("woolwich-south", Some(Side::South), Some(&status));
        assert_eq!(message.body, "South lift (this side): Not working\nNorth lift: Working");
    }

    #[test]
    fn test_north_entrance_marks_north_lift() {
        let message = format_entrance_alert("greenwich-north", Some(Side::North), None);
        assert_eq!(
            message.body,
            format!("{UNKNOWN_NOTICE}\nNorth lift (this side): Unknown\nSouth lift: Unknown")
        );
    }

    #[test]
    fn test_mark_stale() {
        let status = LiftStatus::new(LiftState::Working, LiftState::Working);
        let message = mark_stale(format_alert("greenwich-north", Some(&status)));
        assert!(message.body.starts_with("North lift: Working\nSouth lift: Working\n"));
        assert!(message.body.ends_with(STALE_NOTICE));
    }
}
