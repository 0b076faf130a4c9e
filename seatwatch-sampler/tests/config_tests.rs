//! Loading a config file and wiring the scheduler from it

use seatwatch_common::config::{resolve_config_path, CONFIG_ENV_VAR};
use seatwatch_sampler::scheduler::QuietHours;
use seatwatch_sampler::{registry_from_config, AppConfig, SchedulerContext};
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
database_path = "/var/lib/seatwatch/seatwatch.db"

[sampler]
tick_interval_secs = 15
tick_margin_secs = 5
probe_concurrency = 3

[quiet_hours]
start = "01:30"
end = "05:00"

[[providers]]
tag = "lichtburg"
priority = 1
venue_patterns = ["Lichtburg"]
requires_credential = true

[providers.window]
start_offset_secs = -435
end_offset_secs = 0

[[providers]]
tag = "generic"
venue_patterns = ["Kino"]
capacity_probe = true

[[venue_windows]]
venue = "Kino am Markt"
start_offset_secs = -300
end_offset_secs = -290
"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_scheduler_wiring_from_file() {
    let file = write_config(CONFIG);
    let config = AppConfig::load(Some(file.path())).unwrap();
    config.validate().unwrap();

    let registry = registry_from_config(&config.providers).unwrap();
    assert_eq!(registry.tags(), vec!["lichtburg", "generic"]);
    assert_eq!(registry.classify("Lichtburg Essen").unwrap().tag(), "lichtburg");
    assert!(registry.get("lichtburg").unwrap().requires_credential());
    assert!(registry.get("generic").unwrap().supports_capacity_probe());

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect_lazy("sqlite::memory:")
        .unwrap();
    let ctx = SchedulerContext::new(pool, &config, registry).unwrap();

    assert_eq!(ctx.probe_limiter.available_permits(), 3);
    assert!(ctx.quiet_hours.is_enabled());
    assert_ne!(ctx.quiet_hours, QuietHours::disabled());

    let provider_window = ctx.windows.window_for("lichtburg", "Lichtburg Essen");
    assert_eq!((provider_window.start_offset_secs, provider_window.end_offset_secs), (-435, 0));

    // Venue window wins and is widened to tick + margin
    let venue_window = ctx.windows.window_for("generic", "KINO AM MARKT");
    assert_eq!(venue_window.start_offset_secs, -300);
    assert_eq!(venue_window.span_secs(), 20);
}

#[test]
fn test_invalid_file_is_rejected() {
    let file = write_config("[sampler]\ntick_interval_secs = \"soon\"\n");
    assert!(AppConfig::load(Some(file.path())).is_err());

    let file = write_config("[quiet_hours]\nstart = \"25:00\"\nend = \"05:00\"\n");
    let config = AppConfig::load(Some(file.path())).unwrap();
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn test_env_var_points_at_config() {
    let file = write_config(CONFIG);
    std::env::set_var(CONFIG_ENV_VAR, file.path());

    let resolved = resolve_config_path(None).unwrap();
    let config = AppConfig::load(Some(&resolved)).unwrap();
    assert_eq!(config.sampler.tick_interval_secs, 15);

    std::env::remove_var(CONFIG_ENV_VAR);
}
