use std::sync::LazyLock;
use regex::Regex;
use shared::protocol::FALLBACK_DURATION;

/// `PT<minutes>M<seconds>[.<millis>]S`
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^PT(\d*)M(\d{1,2})(?:\.(\d{1,3}))?S$").expect("duration pattern is valid")
});

/// Normalize a scoreboard duration token such as `PT3M07.250S` into
/// `mm:ss.mmm`. Anything we cannot trust renders as `00:00.000`.
pub fn normalize_duration(raw: &str) -> String {
    let Some(caps) = DURATION_RE.captures(raw.trim()) else {
        tracing::debug!("Unparseable duration {:?}", raw);
        return FALLBACK_DURATION.to_string();
    };

    let minutes = &caps[1];
    let seconds = &caps[2];
    let millis = caps.get(3).map_or("", |m| m.as_str());

    // More than two minute digits means the feed is garbage
    if minutes.len() > 2 {
        return FALLBACK_DURATION.to_string();
    }

    format!("{:0>2}:{:0>2}.{:0<3}", minutes, seconds, millis)
}
