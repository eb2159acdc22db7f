//! Cache key prefixes used by the workers.

/// Weather lookups.
pub const WEATHER: &str = "cache:weather";

/// Calendar events.
pub const CALENDAR: &str = "cache:calendar";

/// GitHub activity.
pub const GITHUB: &str = "cache:github";

/// Daily health summaries from Garmin.
pub const GARMIN_HEALTH: &str = "cache:garmin:health";

/// Activity lists from Garmin.
pub const GARMIN_ACTIVITIES: &str = "cache:garmin:activities";
