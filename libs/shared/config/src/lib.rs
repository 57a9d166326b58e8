use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: String,
    pub server_port: u16,
    pub reminders: ReminderSettings,
    pub notifications: NotificationSettings,
}

/// Timing for the 24h reminder sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderSettings {
    pub sweep_interval_hours: u64,
    pub window_start_hours: i64,
    pub window_end_hours: i64,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            sweep_interval_hours: 12,
            window_start_hours: 24,
            window_end_hours: 36,
        }
    }
}

/// Upper bound for every reminder period and window edge, in hours.
pub const MAX_REMINDER_HOURS: i64 = 24 * 365;

impl ReminderSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_hours.saturating_mul(60 * 60))
    }

    /// Window and period are positive, ordered and no longer than a year.
    pub fn is_valid(&self) -> bool {
        let max = MAX_REMINDER_HOURS as u64;
        (1..=max).contains(&self.sweep_interval_hours)
            && self.window_start_hours >= 0
            && self.window_start_hours < self.window_end_hours
            && self.window_end_hours <= MAX_REMINDER_HOURS
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationSettings {
    pub send_timeout_secs: u64,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            send_timeout_secs: 10,
            workers: 4,
            queue_capacity: 256,
        }
    }
}

impl NotificationSettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let reminder_defaults = ReminderSettings::default();
        let notification_defaults = NotificationSettings::default();

        let mut reminders = ReminderSettings {
            sweep_interval_hours: parse_var("REMINDER_SWEEP_INTERVAL_HOURS", reminder_defaults.sweep_interval_hours),
            window_start_hours: parse_var("REMINDER_WINDOW_START_HOURS", reminder_defaults.window_start_hours),
            window_end_hours: parse_var("REMINDER_WINDOW_END_HOURS", reminder_defaults.window_end_hours),
        };

        if !reminders.is_valid() {
            warn!("Reminder window/interval misconfigured ({:?}), using defaults", reminders);
            reminders = reminder_defaults;
        }

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            server_port: parse_var("SERVER_PORT", 3000),
            reminders,
            notifications: NotificationSettings {
                send_timeout_secs: parse_var("NOTIFICATION_SEND_TIMEOUT_SECS", notification_defaults.send_timeout_secs),
                workers: parse_var("NOTIFICATION_WORKERS", notification_defaults.workers).max(1),
                queue_capacity: parse_var("NOTIFICATION_QUEUE_CAPACITY", notification_defaults.queue_capacity).max(1),
            },
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Token used for server-side writes (reminder sweeps, notification workers).
    /// Falls back to the anon key when no service role key is configured.
    pub fn service_token(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminder_defaults_match_daily_sweep_window() {
        let settings = ReminderSettings::default();
        assert_eq!(settings.sweep_interval(), Duration::from_secs(12 * 3600));
        assert_eq!(settings.window_start_hours, 24);
        assert_eq!(settings.window_end_hours, 36);
    }

    #[test]
    fn oversized_reminder_values_are_rejected() {
        let valid = ReminderSettings::default();
        assert!(valid.is_valid());

        let huge_interval = ReminderSettings { sweep_interval_hours: u64::MAX, ..valid.clone() };
        assert!(!huge_interval.is_valid());
        assert_eq!(huge_interval.sweep_interval(), Duration::from_secs(u64::MAX));

        let huge_window = ReminderSettings { window_end_hours: i64::MAX, ..valid.clone() };
        assert!(!huge_window.is_valid());

        let negative_start = ReminderSettings { window_start_hours: -5, ..valid.clone() };
        assert!(!negative_start.is_valid());

        let inverted = ReminderSettings { window_start_hours: 36, window_end_hours: 24, ..valid };
        assert!(!inverted.is_valid());
    }

    #[test]
    fn from_env_replaces_out_of_range_reminder_window() {
        env::set_var("REMINDER_WINDOW_END_HOURS", "9223372036854775807");
        let config = AppConfig::from_env();
        env::remove_var("REMINDER_WINDOW_END_HOURS");

        assert_eq!(config.reminders, ReminderSettings::default());
    }

    #[test]
    fn parse_var_falls_back_on_garbage() {
        env::set_var("MEDICONNECT_TEST_PARSE_VAR", "not-a-number");
        assert_eq!(parse_var("MEDICONNECT_TEST_PARSE_VAR", 7u64), 7);
        env::set_var("MEDICONNECT_TEST_PARSE_VAR", " 42 ");
        assert_eq!(parse_var("MEDICONNECT_TEST_PARSE_VAR", 7u64), 42);
        env::remove_var("MEDICONNECT_TEST_PARSE_VAR");
    }

    #[test]
    fn service_token_prefers_service_role_key() {
        let mut config = AppConfig {
            supabase_url: "http://localhost".into(),
            supabase_anon_key: "anon".into(),
            supabase_jwt_secret: "secret".into(),
            supabase_service_role_key: String::new(),
            server_port: 3000,
            reminders: ReminderSettings::default(),
            notifications: NotificationSettings::default(),
        };
        assert_eq!(config.service_token(), "anon");
        config.supabase_service_role_key = "service".into();
        assert_eq!(config.service_token(), "service");
    }
}
