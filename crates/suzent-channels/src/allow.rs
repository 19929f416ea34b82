//! Allowlist checks for inbound social messages.
//!
//! Empty lists mean open access; otherwise the sender must appear (by id or
//! display name) in the global list or the platform-specific one.

use std::collections::{HashMap, HashSet};

pub fn is_authorized(
    allowed_users: &HashSet<String>,
    platform_allowlists: &HashMap<String, HashSet<String>>,
    platform: &str,
    sender_id: &str,
    sender_name: &str,
) -> bool {
    let platform_list = platform_allowlists.get(platform);

    if allowed_users.is_empty() && platform_list.map_or(true, |l| l.is_empty()) {
        return true;
    }

    let matches = |list: &HashSet<String>| {
        list.contains(sender_id) || (!sender_name.is_empty() && list.contains(sender_name))
    };

    if !allowed_users.is_empty() && matches(allowed_users) {
        return true;
    }
    platform_list.is_some_and(|l| !l.is_empty() && matches(l))
}
