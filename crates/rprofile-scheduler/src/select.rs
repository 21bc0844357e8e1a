use rprofile_core::ConfigProvider;

/// Names a command applies to.
///
/// With `all`, every profile followed by every group (and nothing at all
/// when the configuration declares neither); otherwise just `requested`.
pub fn select(profiles: &[String], groups: &[String], requested: &str, all: bool) -> Vec<String> {
    if all {
        return profiles.iter().chain(groups).cloned().collect();
    }
    vec![requested.to_string()]
}

pub fn select_profiles_and_groups<C>(config: &C, requested: &str, all: bool) -> Vec<String>
where
    C: ConfigProvider + ?Sized,
{
    if all {
        select(&config.profile_names(), &config.group_names(), requested, true)
    } else {
        select(&[], &[], requested, false)
    }
}
