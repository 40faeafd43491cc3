use crate::Error;
use crate::ssid::Ssid;

/// Parsed fields of `wpa_cli status` output we care about.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WpaStatus {
    pub wpa_state: String,
    pub ssid: Option<String>,
    pub ip_address: Option<String>,
}

/// Parse `wpa_cli status`-style `key=value` output.
pub fn parse_wpa_status(output: &str) -> WpaStatus {
    let mut status = WpaStatus::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "wpa_state" => status.wpa_state = value.to_string(),
            "ssid" => status.ssid = Some(value.to_string()),
            "ip_address" => status.ip_address = Some(value.to_string()),
            _ => {}
        }
    }
    status
}

/// Find the network id of an existing profile for `target` in
/// `wpa_cli list_networks` output (id / ssid / bssid / flags, tab separated,
/// one header line). SSIDs are compared normalized.
pub fn find_network_id(output: &str, target: &Ssid) -> Option<u32> {
    for line in output.lines().skip(1) {
        let mut parts = line.split('\t');
        let id = parts.next()?.trim();
        let ssid = parts.next().unwrap_or("");
        if Ssid::parse(ssid).as_ref() == Some(target) {
            if let Ok(id) = id.parse() {
                return Some(id);
            }
        }
    }
    None
}

/// Parse `nmcli -t -f ACTIVE,SSID device wifi list` output into the SSID of
/// the active entry, if any.
pub fn parse_nmcli_active_ssid(output: &str) -> Option<String> {
    for line in output.lines() {
        // Terse mode is colon separated; the SSID itself may contain colons,
        // so only split on the first one.
        let Some((active, ssid)) = line.split_once(':') else {
            continue;
        };
        if active == "yes" && !ssid.is_empty() {
            return Some(ssid.to_string());
        }
    }
    None
}

/// Parse `nmcli radio wifi` output ("enabled" / "disabled").
pub fn parse_radio_state(output: &str) -> bool {
    output.trim() == "enabled"
}

/// Parse `rfkill list wifi` output; blocked either way means the radio is off.
pub fn rfkill_blocked(output: &str) -> bool {
    output.lines().any(|line| {
        let line = line.trim();
        (line.starts_with("Soft blocked:") || line.starts_with("Hard blocked:"))
            && line.ends_with("yes")
    })
}

/// Map a failed platform command to the error taxonomy: security failures are
/// reported as such, everything else is a rejected request retried next tick.
pub fn classify_command_failure(context: &str, stderr: &str) -> Error {
    let lowered = stderr.to_lowercase();
    if lowered.contains("not authorized")
        || lowered.contains("permission denied")
        || lowered.contains("insufficient privileges")
    {
        Error::PermissionDenied(format!("{context}: {}", stderr.trim()))
    } else {
        Error::RequestRejected(format!("{context}: {}", stderr.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WPA_STATUS_CONNECTED: &str = "bssid=aa:bb:cc:dd:ee:ff\n\
        freq=2437\n\
        ssid=HomeNet\n\
        id=0\n\
        mode=station\n\
        wpa_state=COMPLETED\n\
        ip_address=192.168.1.23\n\
        address=11:22:33:44:55:66\n";

    #[test]
    fn wpa_status_connected_fields() {
        let status = parse_wpa_status(WPA_STATUS_CONNECTED);
        assert_eq!(status.wpa_state, "COMPLETED");
        assert_eq!(status.ssid.as_deref(), Some("HomeNet"));
        assert_eq!(status.ip_address.as_deref(), Some("192.168.1.23"));
    }

    #[test]
    fn wpa_status_disconnected_has_no_ssid() {
        let status = parse_wpa_status("wpa_state=SCANNING\naddress=11:22:33:44:55:66\n");
        assert_eq!(status.wpa_state, "SCANNING");
        assert_eq!(status.ssid, None);
    }

    #[test]
    fn network_id_found_by_normalized_ssid() {
        let listing = "network id / ssid / bssid / flags\n\
            0\tOfficeNet\tany\t[DISABLED]\n\
            3\tHomeNet\tany\t[CURRENT]\n";
        let target = Ssid::parse("HomeNet").unwrap();
        assert_eq!(find_network_id(listing, &target), Some(3));
    }

    #[test]
    fn network_id_matches_quoted_listing() {
        // Some supplicant builds list the stored (quoted) form.
        let listing = "network id / ssid / bssid / flags\n1\t\"HomeNet\"\tany\t\n";
        let target = Ssid::parse("HomeNet").unwrap();
        assert_eq!(find_network_id(listing, &target), Some(1));
    }

    #[test]
    fn unnamed_profile_is_skipped() {
        // A profile whose ssid was never set lists with an empty field; it
        // must not shadow the real entry.
        let listing = "network id / ssid / bssid / flags\n\
            2\t\tany\t\n\
            3\tHomeNet\tany\t\n";
        let target = Ssid::parse("HomeNet").unwrap();
        assert_eq!(find_network_id(listing, &target), Some(3));
    }

    #[test]
    fn network_id_absent() {
        let listing = "network id / ssid / bssid / flags\n0\tOfficeNet\tany\t\n";
        let target = Ssid::parse("HomeNet").unwrap();
        assert_eq!(find_network_id(listing, &target), None);
    }

    #[test]
    fn nmcli_active_entry_wins() {
        let output = "no:OfficeNet\nyes:HomeNet\nno:CafeGuest\n";
        assert_eq!(parse_nmcli_active_ssid(output).as_deref(), Some("HomeNet"));
    }

    #[test]
    fn nmcli_ssid_with_colon_survives() {
        let output = "yes:Home:Net\n";
        assert_eq!(parse_nmcli_active_ssid(output).as_deref(), Some("Home:Net"));
    }

    #[test]
    fn nmcli_no_active_entry() {
        assert_eq!(parse_nmcli_active_ssid("no:OfficeNet\nno:CafeGuest\n"), None);
        assert_eq!(parse_nmcli_active_ssid(""), None);
    }

    #[test]
    fn radio_state_parses() {
        assert!(parse_radio_state("enabled\n"));
        assert!(!parse_radio_state("disabled\n"));
    }

    #[test]
    fn rfkill_blocked_detection() {
        let blocked = "0: phy0: Wireless LAN\n\tSoft blocked: yes\n\tHard blocked: no\n";
        let unblocked = "0: phy0: Wireless LAN\n\tSoft blocked: no\n\tHard blocked: no\n";
        assert!(rfkill_blocked(blocked));
        assert!(!rfkill_blocked(unblocked));
    }

    #[test]
    fn security_failures_classify_as_permission_denied() {
        let err = classify_command_failure("nmcli connect", "Error: Not authorized.");
        assert!(matches!(err, Error::PermissionDenied(_)));
        let err = classify_command_failure("nmcli connect", "Error: No network with SSID");
        assert!(matches!(err, Error::RequestRejected(_)));
    }
}
