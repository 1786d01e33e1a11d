//! Package manager command lines and output parsing

use discipline_util::{PackageName, ProfileId};

pub const LIST_USERS: &str = "pm list users";
pub const LIST_THIRD_PARTY: &str = "pm list packages -3";
pub const LIST_DISABLED: &str = "pm list packages -d";
pub const RESOLVE_HOME: &str =
    "cmd package resolve-activity --brief -a android.intent.action.MAIN -c android.intent.category.HOME";

/// `pm enable|disable-user --user N <package>`
pub fn set_enabled_command(package: &PackageName, profile: ProfileId, enabled: bool) -> String {
    let action = if enabled { "enable" } else { "disable-user" };
    format!("pm {} --user {} {}", action, profile, package)
}

/// Disabled packages whose name contains `package`; callers match exactly
pub fn query_disabled_command(package: &PackageName) -> String {
    format!("{} {}", LIST_DISABLED, package)
}

/// Profile ids from `pm list users` output, e.g. `UserInfo{0:Owner:13} running`
pub fn parse_profiles(output: &str) -> Vec<ProfileId> {
    let mut profiles = Vec::new();
    for (idx, _) in output.match_indices('{') {
        let rest = &output[idx + 1..];
        let Some((digits, _)) = rest.split_once(':') else {
            continue;
        };
        if let Ok(id) = digits.parse::<u32>() {
            let profile = ProfileId::new(id);
            if !profiles.contains(&profile) {
                profiles.push(profile);
            }
        }
    }
    profiles
}

/// Package names from `pm list packages` output (`package:com.example`)
pub fn parse_package_list(output: &str) -> Vec<PackageName> {
    output
        .lines()
        .map(|line| line.trim())
        .filter_map(|line| line.strip_prefix("package:"))
        .map(|name| PackageName::new(name.trim()))
        .filter(|name| name.is_well_formed())
        .collect()
}

/// Package of the resolved HOME activity.
///
/// `--brief` prints the priority line followed by `package/.Activity`.
/// When nothing (or only the chooser) resolves, there is no launcher.
pub fn parse_resolved_activity(output: &str) -> Option<PackageName> {
    output
        .lines()
        .rev()
        .map(|line| line.trim())
        .find_map(|line| line.split_once('/'))
        .map(|(package, _)| PackageName::new(package))
        .filter(|package| package.is_well_formed() && package.as_str() != "android")
}
